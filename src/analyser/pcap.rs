//! Capture Parser.
//!
//! Decodes the classic packet-capture format: a 24-byte global header whose magic number
//! selects byte order and timestamp precision, followed by records made of a 16-byte
//! header and the captured bytes. Parsing is a single forward pass; [PcapReader] yields
//! records one at a time so callers can stop early on very large captures.
use etherparse::{LaxNetSlice, LaxSlicedPacket, NetSlice, SlicedPacket, TransportSlice};
use serde::Serialize;
use std::net::IpAddr;

use super::containers::{Endpoint, FiveTuple, PacketRecord, Transport};
use crate::errors::CaptureError;

pub const GLOBAL_HEADER_LEN: usize = 24;
pub const RECORD_HEADER_LEN: usize = 16;

const MAGIC_MICROS: u32 = 0xa1b2_c3d4;
const MAGIC_NANOS: u32 = 0xa1b2_3c4d;
const MAGIC_MICROS_SWAPPED: u32 = 0xd4c3_b2a1;
const MAGIC_NANOS_SWAPPED: u32 = 0x4d3c_b2a1;

pub const LINKTYPE_ETHERNET: u32 = 1;
pub const LINKTYPE_RAW_BSD: u32 = 12;
pub const LINKTYPE_RAW: u32 = 101;
pub const LINKTYPE_IPV4: u32 = 228;
pub const LINKTYPE_IPV6: u32 = 229;

const UDP_HEADER_LEN: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TimestampPrecision {
    Micros,
    Nanos,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ParseStatus {
    Complete,
    /// The buffer ended inside a record; everything before it was kept.
    Truncated,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CaptureHeader {
    pub byte_order: ByteOrder,
    pub precision: TimestampPrecision,
    pub version_major: u16,
    pub version_minor: u16,
    pub snapshot_length: u32,
    pub link_type: u32,
}

impl CaptureHeader {
    /// Decodes the global header, rejecting undersized buffers and unknown magic numbers.
    pub fn parse(buf: &[u8]) -> Result<Self, CaptureError> {
        if buf.len() < GLOBAL_HEADER_LEN {
            return Err(CaptureError::Malformed(format!(
                "buffer is {} bytes, shorter than the {GLOBAL_HEADER_LEN}-byte global header",
                buf.len()
            )));
        }

        let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let (byte_order, precision) = match magic {
            MAGIC_MICROS => (ByteOrder::LittleEndian, TimestampPrecision::Micros),
            MAGIC_NANOS => (ByteOrder::LittleEndian, TimestampPrecision::Nanos),
            MAGIC_MICROS_SWAPPED => (ByteOrder::BigEndian, TimestampPrecision::Micros),
            MAGIC_NANOS_SWAPPED => (ByteOrder::BigEndian, TimestampPrecision::Nanos),
            other => {
                return Err(CaptureError::Malformed(format!(
                    "unknown magic number {other:#010x}"
                )))
            }
        };

        Ok(Self {
            byte_order,
            precision,
            version_major: read_u16(byte_order, buf, 4),
            version_minor: read_u16(byte_order, buf, 6),
            snapshot_length: read_u32(byte_order, buf, 16),
            link_type: read_u32(byte_order, buf, 20),
        })
    }
}

/// Result of a full parse.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParsedCapture {
    pub header: CaptureHeader,
    pub records: Vec<PacketRecord>,
    pub truncated: bool,
    /// Records whose captured length exceeded the snapshot length and was clamped.
    pub clamped_records: usize,
}

impl ParsedCapture {
    pub fn status(&self) -> ParseStatus {
        if self.truncated {
            ParseStatus::Truncated
        } else {
            ParseStatus::Complete
        }
    }
}

/// Streaming record iterator over a capture buffer.
pub struct PcapReader<'a> {
    buf: &'a [u8],
    header: CaptureHeader,
    offset: usize,
    index: usize,
    truncated: bool,
    clamped: usize,
}

impl<'a> PcapReader<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self, CaptureError> {
        let header = CaptureHeader::parse(buf)?;
        log::debug!(
            "Capture header: {:?} {:?}, snaplen {}, link type {}",
            header.byte_order,
            header.precision,
            header.snapshot_length,
            header.link_type
        );
        Ok(Self {
            buf,
            header,
            offset: GLOBAL_HEADER_LEN,
            index: 0,
            truncated: false,
            clamped: 0,
        })
    }

    pub fn header(&self) -> &CaptureHeader {
        &self.header
    }

    /// True once the reader hit a partial record at the end of the buffer.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn clamped_records(&self) -> usize {
        self.clamped
    }

    fn read_record(&mut self) -> Option<PacketRecord> {
        let remaining = self.buf.len() - self.offset;
        if remaining == 0 {
            return None;
        }
        if remaining < RECORD_HEADER_LEN {
            log::warn!(
                "Capture ends inside a record header ({remaining} trailing bytes after record {})",
                self.index
            );
            self.truncated = true;
            return None;
        }

        let order = self.header.byte_order;
        let at = self.offset;
        let ts_sec = read_u32(order, self.buf, at);
        let ts_frac = read_u32(order, self.buf, at + 4);
        let mut captured_length = read_u32(order, self.buf, at + 8);
        let original_length = read_u32(order, self.buf, at + 12);

        let snaplen = self.header.snapshot_length;
        if snaplen > 0 && captured_length > snaplen {
            log::debug!(
                "Record {} declares {captured_length} captured bytes, clamping to snaplen {snaplen}",
                self.index
            );
            captured_length = snaplen;
            self.clamped += 1;
        }

        let body_start = at + RECORD_HEADER_LEN;
        let body_len = captured_length as usize;
        if self.buf.len() - body_start < body_len {
            log::warn!(
                "Record {} declares {body_len} bytes but only {} remain, stopping",
                self.index,
                self.buf.len() - body_start
            );
            self.truncated = true;
            return None;
        }
        let data = &self.buf[body_start..body_start + body_len];
        self.offset = body_start + body_len;

        let frac_nanos = match self.header.precision {
            TimestampPrecision::Micros => i64::from(ts_frac) * 1_000,
            TimestampPrecision::Nanos => i64::from(ts_frac),
        };
        let timestamp_nanos = i64::from(ts_sec) * 1_000_000_000 + frac_nanos;

        let decoded = decode_link(self.header.link_type, data);
        if decoded.is_none() {
            log::debug!("Record {} has no decodable 5-tuple", self.index);
        }
        let (five_tuple, payload_size) = match decoded {
            Some((tuple, payload)) => (Some(tuple), payload),
            None => (None, captured_length),
        };

        let record = PacketRecord {
            index: self.index,
            timestamp_nanos,
            captured_length,
            original_length,
            link_type: self.header.link_type,
            five_tuple,
            payload_size,
        };
        self.index += 1;
        Some(record)
    }
}

impl<'a> Iterator for PcapReader<'a> {
    type Item = PacketRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.truncated {
            return None;
        }
        self.read_record()
    }
}

/// Parses a whole capture buffer.
///
/// Fails only on an unusable global header. A partial trailing record stops the parse and
/// sets `truncated`; per-packet decode failures leave that record without a 5-tuple.
pub fn parse_capture(buf: &[u8]) -> Result<ParsedCapture, CaptureError> {
    let mut reader = PcapReader::new(buf)?;
    let records: Vec<PacketRecord> = reader.by_ref().collect();
    log::info!(
        "Parsed {} records{}",
        records.len(),
        if reader.truncated() { " (truncated)" } else { "" }
    );

    Ok(ParsedCapture {
        header: reader.header().clone(),
        records,
        truncated: reader.truncated(),
        clamped_records: reader.clamped_records(),
    })
}

fn read_u16(order: ByteOrder, buf: &[u8], at: usize) -> u16 {
    let bytes = [buf[at], buf[at + 1]];
    match order {
        ByteOrder::LittleEndian => u16::from_le_bytes(bytes),
        ByteOrder::BigEndian => u16::from_be_bytes(bytes),
    }
}

fn read_u32(order: ByteOrder, buf: &[u8], at: usize) -> u32 {
    let bytes = [buf[at], buf[at + 1], buf[at + 2], buf[at + 3]];
    match order {
        ByteOrder::LittleEndian => u32::from_le_bytes(bytes),
        ByteOrder::BigEndian => u32::from_be_bytes(bytes),
    }
}

/// Decodes link, network and transport layers into a 5-tuple and the transport payload size.
///
/// Records cut short by the snapshot length fail strict slicing; they are sliced again in
/// lax mode so the lengths declared in the IP header still count.
fn decode_link(link_type: u32, data: &[u8]) -> Option<(FiveTuple, u32)> {
    let ethernet = match link_type {
        LINKTYPE_ETHERNET => true,
        LINKTYPE_RAW | LINKTYPE_RAW_BSD | LINKTYPE_IPV4 | LINKTYPE_IPV6 => false,
        _ => return None,
    };
    let strict = if ethernet {
        SlicedPacket::from_ethernet(data).ok()
    } else {
        SlicedPacket::from_ip(data).ok()
    };
    match strict {
        Some(sliced) => decode_sliced(&sliced),
        None => decode_lax(ethernet, data),
    }
}

fn decode_sliced(sliced: &SlicedPacket<'_>) -> Option<(FiveTuple, u32)> {
    let (src, dst) = match sliced.net.as_ref()? {
        NetSlice::Ipv4(ipv4) => {
            let header = ipv4.header();
            (
                IpAddr::V4(header.source_addr()),
                IpAddr::V4(header.destination_addr()),
            )
        }
        NetSlice::Ipv6(ipv6) => {
            let header = ipv6.header();
            (
                IpAddr::V6(header.source_addr()),
                IpAddr::V6(header.destination_addr()),
            )
        }
        _ => return None,
    };
    let (transport, src_port, dst_port, payload) = match sliced.transport.as_ref()? {
        TransportSlice::Tcp(tcp) => (
            Transport::Tcp,
            tcp.source_port(),
            tcp.destination_port(),
            tcp.payload().len(),
        ),
        TransportSlice::Udp(udp) => (
            Transport::Udp,
            udp.source_port(),
            udp.destination_port(),
            udp.payload().len(),
        ),
        _ => return None,
    };
    five_tuple(src, dst, transport, src_port, dst_port, payload)
}

fn decode_lax(ethernet: bool, data: &[u8]) -> Option<(FiveTuple, u32)> {
    let sliced = if ethernet {
        LaxSlicedPacket::from_ethernet(data).ok()?
    } else {
        LaxSlicedPacket::from_ip(data).ok()?
    };
    let (src, dst, ip_payload_len) = match sliced.net.as_ref()? {
        LaxNetSlice::Ipv4(ipv4) => {
            let header = ipv4.header();
            let header_len = usize::from(header.ihl()) * 4;
            (
                IpAddr::V4(header.source_addr()),
                IpAddr::V4(header.destination_addr()),
                usize::from(header.total_len()).checked_sub(header_len)?,
            )
        }
        LaxNetSlice::Ipv6(ipv6) => {
            let header = ipv6.header();
            (
                IpAddr::V6(header.source_addr()),
                IpAddr::V6(header.destination_addr()),
                usize::from(header.payload_length()),
            )
        }
        _ => return None,
    };
    let (transport, src_port, dst_port, header_len) = match sliced.transport.as_ref()? {
        TransportSlice::Tcp(tcp) => (
            Transport::Tcp,
            tcp.source_port(),
            tcp.destination_port(),
            usize::from(tcp.data_offset()) * 4,
        ),
        TransportSlice::Udp(udp) => (
            Transport::Udp,
            udp.source_port(),
            udp.destination_port(),
            UDP_HEADER_LEN,
        ),
        _ => return None,
    };
    log::debug!("Recovered {transport:?} headers from a short record");
    five_tuple(
        src,
        dst,
        transport,
        src_port,
        dst_port,
        ip_payload_len.saturating_sub(header_len),
    )
}

fn five_tuple(
    src: IpAddr,
    dst: IpAddr,
    transport: Transport,
    src_port: u16,
    dst_port: u16,
    payload: usize,
) -> Option<(FiveTuple, u32)> {
    Some((
        FiveTuple {
            src: Endpoint {
                addr: src,
                port: src_port,
            },
            dst: Endpoint {
                addr: dst,
                port: dst_port,
            },
            transport,
        },
        u32::try_from(payload).ok()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    fn global_header(magic: [u8; 4], big_endian: bool, snaplen: u32, link: u32) -> Vec<u8> {
        let mut buf = magic.to_vec();
        let put16 = |v: u16| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        let put32 = |v: u32| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        buf.extend_from_slice(&put16(2));
        buf.extend_from_slice(&put16(4));
        buf.extend_from_slice(&put32(0));
        buf.extend_from_slice(&put32(0));
        buf.extend_from_slice(&put32(snaplen));
        buf.extend_from_slice(&put32(link));
        buf
    }

    fn record(big_endian: bool, sec: u32, frac: u32, data: &[u8], orig: u32) -> Vec<u8> {
        let put32 = |v: u32| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        let mut buf = Vec::new();
        buf.extend_from_slice(&put32(sec));
        buf.extend_from_slice(&put32(frac));
        buf.extend_from_slice(&put32(data.len() as u32));
        buf.extend_from_slice(&put32(orig));
        buf.extend_from_slice(data);
        buf
    }

    fn ipv4_udp(payload: usize) -> Vec<u8> {
        let total = 20 + 8 + payload;
        let mut p = vec![0x45, 0, (total >> 8) as u8, total as u8, 0, 0, 0, 0, 64, 17, 0, 0];
        p.extend_from_slice(&[192, 168, 1, 10]);
        p.extend_from_slice(&[10, 0, 0, 1]);
        p.extend_from_slice(&5353u16.to_be_bytes());
        p.extend_from_slice(&9001u16.to_be_bytes());
        p.extend_from_slice(&((8 + payload) as u16).to_be_bytes());
        p.extend_from_slice(&[0, 0]);
        p.extend(std::iter::repeat(0u8).take(payload));
        p
    }

    #[test]
    fn rejects_short_buffer() {
        let err = parse_capture(&[0xd4, 0xc3, 0xb2, 0xa1]).unwrap_err();
        assert!(matches!(err, CaptureError::Malformed(_)));
    }

    #[test]
    fn rejects_unknown_magic() {
        let buf = global_header([0xde, 0xad, 0xbe, 0xef], false, 65535, 1);
        assert!(matches!(parse_capture(&buf), Err(CaptureError::Malformed(_))));
    }

    #[test]
    fn all_four_magic_variants() {
        let cases = [
            ([0xd4, 0xc3, 0xb2, 0xa1], false, ByteOrder::LittleEndian, TimestampPrecision::Micros),
            ([0x4d, 0x3c, 0xb2, 0xa1], false, ByteOrder::LittleEndian, TimestampPrecision::Nanos),
            ([0xa1, 0xb2, 0xc3, 0xd4], true, ByteOrder::BigEndian, TimestampPrecision::Micros),
            ([0xa1, 0xb2, 0x3c, 0x4d], true, ByteOrder::BigEndian, TimestampPrecision::Nanos),
        ];
        for (magic, big, order, precision) in cases {
            let buf = global_header(magic, big, 65535, LINKTYPE_RAW);
            let parsed = parse_capture(&buf).unwrap();
            assert_eq!(parsed.header.byte_order, order);
            assert_eq!(parsed.header.precision, precision);
            assert_eq!(parsed.header.snapshot_length, 65535);
            assert_eq!(parsed.header.link_type, LINKTYPE_RAW);
            assert!(parsed.records.is_empty());
            assert_eq!(parsed.status(), ParseStatus::Complete);
        }
    }

    #[test]
    fn big_endian_nanosecond_timestamps() {
        let mut buf = global_header([0xa1, 0xb2, 0x3c, 0x4d], true, 65535, LINKTYPE_RAW);
        let packet = ipv4_udp(100);
        buf.extend(record(true, 7, 123_456_789, &packet, packet.len() as u32));
        let parsed = parse_capture(&buf).unwrap();
        assert_eq!(parsed.records[0].timestamp_nanos, 7_123_456_789);
        assert_eq!(parsed.records[0].payload_size, 100);
        let tuple = parsed.records[0].five_tuple.unwrap();
        assert_eq!(tuple.transport, Transport::Udp);
        assert_eq!(tuple.dst.port, 9001);
    }

    #[test]
    fn trailing_partial_record_keeps_earlier_records() {
        let mut buf = global_header([0xd4, 0xc3, 0xb2, 0xa1], false, 65535, LINKTYPE_RAW);
        let packet = ipv4_udp(32);
        buf.extend(record(false, 1, 0, &packet, packet.len() as u32));
        let mut partial = record(false, 2, 0, &packet, packet.len() as u32);
        partial.truncate(RECORD_HEADER_LEN + 5);
        buf.extend(partial);

        let parsed = parse_capture(&buf).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert!(parsed.truncated);
        assert_eq!(parsed.status(), ParseStatus::Truncated);
    }

    #[test]
    fn oversized_record_is_clamped_to_snaplen() {
        let mut buf = global_header([0xd4, 0xc3, 0xb2, 0xa1], false, 40, LINKTYPE_RAW);
        let packet = ipv4_udp(200);
        // header claims the full packet, body holds only snaplen bytes
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&(packet.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(packet.len() as u32).to_le_bytes());
        buf.extend_from_slice(&packet[..40]);

        let parsed = parse_capture(&buf).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].captured_length, 40);
        assert_eq!(parsed.clamped_records, 1);
        assert!(!parsed.truncated);
        // headers survive the clamp, so the declared payload still counts
        assert_eq!(parsed.records[0].five_tuple.unwrap().src.port, 5353);
        assert_eq!(parsed.records[0].payload_size, 200);
    }

    #[test]
    fn undecodable_packet_keeps_record_without_tuple() {
        let mut buf = global_header([0xd4, 0xc3, 0xb2, 0xa1], false, 65535, LINKTYPE_ETHERNET);
        let garbage = [0xffu8; 9];
        buf.extend(record(false, 1, 0, &garbage, 9));
        let parsed = parse_capture(&buf).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert!(parsed.records[0].five_tuple.is_none());
        assert_eq!(parsed.records[0].payload_size, 9);
    }

    #[test]
    fn vlan_tagged_ethernet_decodes() {
        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&0x8100u16.to_be_bytes());
        frame.extend_from_slice(&[0x00, 0x2a]);
        frame.extend_from_slice(&0x0800u16.to_be_bytes());
        frame.extend(ipv4_udp(16));
        let (tuple, payload) = decode_link(LINKTYPE_ETHERNET, &frame).unwrap();
        assert_eq!(tuple.src.port, 5353);
        assert_eq!(payload, 16);
    }

    fn ipv6_tcp(payload: usize) -> Vec<u8> {
        let mut p = vec![0x60, 0, 0, 0];
        p.extend_from_slice(&((20 + payload) as u16).to_be_bytes());
        p.extend_from_slice(&[6, 64]);
        p.extend_from_slice(&"2001:db8::10".parse::<Ipv6Addr>().unwrap().octets());
        p.extend_from_slice(&"2a01:4f8::1".parse::<Ipv6Addr>().unwrap().octets());
        p.extend_from_slice(&50_000u16.to_be_bytes());
        p.extend_from_slice(&9001u16.to_be_bytes());
        p.extend_from_slice(&[0; 8]);
        p.extend_from_slice(&[0x50, 0x18, 0xff, 0xff, 0, 0, 0, 0]);
        p.extend(std::iter::repeat(0u8).take(payload));
        p
    }

    #[test]
    fn raw_ipv6_tcp_decodes() {
        let mut buf = global_header([0xd4, 0xc3, 0xb2, 0xa1], false, 65535, LINKTYPE_RAW);
        let packet = ipv6_tcp(514);
        buf.extend(record(false, 1, 0, &packet, packet.len() as u32));

        let parsed = parse_capture(&buf).unwrap();
        let record = &parsed.records[0];
        let tuple = record.five_tuple.unwrap();
        assert_eq!(tuple.transport, Transport::Tcp);
        assert_eq!(tuple.src.addr, "2001:db8::10".parse::<IpAddr>().unwrap());
        assert_eq!(tuple.dst.port, 9001);
        assert_eq!(record.payload_size, 514);
    }

    #[test]
    fn ethernet_ipv6_decodes() {
        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&0x86ddu16.to_be_bytes());
        frame.extend(ipv6_tcp(100));
        let mut buf = global_header([0xd4, 0xc3, 0xb2, 0xa1], false, 65535, LINKTYPE_ETHERNET);
        buf.extend(record(false, 1, 0, &frame, frame.len() as u32));

        let parsed = parse_capture(&buf).unwrap();
        let tuple = parsed.records[0].five_tuple.unwrap();
        assert_eq!(tuple.dst.addr, "2a01:4f8::1".parse::<IpAddr>().unwrap());
        assert_eq!(tuple.src.port, 50_000);
        assert_eq!(parsed.records[0].payload_size, 100);
    }

    #[test]
    fn unsupported_link_type_keeps_record_without_tuple() {
        // 105 is IEEE 802.11
        let mut buf = global_header([0xd4, 0xc3, 0xb2, 0xa1], false, 65535, 105);
        let packet = ipv4_udp(64);
        buf.extend(record(false, 1, 0, &packet, packet.len() as u32));

        let parsed = parse_capture(&buf).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert!(parsed.records[0].five_tuple.is_none());
        assert_eq!(parsed.records[0].payload_size, packet.len() as u32);
        assert_eq!(parsed.status(), ParseStatus::Complete);
    }
}

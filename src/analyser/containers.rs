use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::net::IpAddr;

use super::utils;

/// Fixed size of a TOR cell on the wire.
pub const TOR_CELL_SIZE: u32 = 514;

/// Inter-arrival window (inclusive, microseconds) inside which packets form a burst.
pub const BURST_MIN_GAP_MICROS: i64 = 10_000;
pub const BURST_MAX_GAP_MICROS: i64 = 200_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Transport {
    Tcp,
    Udp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Transport::Tcp => write!(f, "TCP"),
            Transport::Udp => write!(f, "UDP"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Endpoint {
    pub addr: IpAddr,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.addr {
            IpAddr::V4(addr) => write!(f, "{}:{}", addr, self.port),
            IpAddr::V6(addr) => write!(f, "[{}]:{}", addr, self.port),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct FiveTuple {
    pub src: Endpoint,
    pub dst: Endpoint,
    pub transport: Transport,
}

/// One packet as decoded from a capture. Immutable once parsed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PacketRecord {
    pub index: usize,
    pub timestamp_nanos: i64,
    pub captured_length: u32,
    pub original_length: u32,
    pub link_type: u32,
    pub five_tuple: Option<FiveTuple>,
    /// Transport payload size when the 5-tuple decoded, otherwise the captured length.
    pub payload_size: u32,
}

impl PacketRecord {
    pub fn timestamp_micros(&self) -> i64 {
        self.timestamp_nanos / 1_000
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    fn index(self) -> usize {
        match self {
            Direction::Forward => 0,
            Direction::Reverse => 1,
        }
    }
}

/// Canonical identity of a bidirectional flow.
///
/// The lexicographically smaller (address, port) endpoint is always `forward`, so a
/// packet and its reply resolve to the same key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct FlowKey {
    pub forward: Endpoint,
    pub reverse: Endpoint,
    pub transport: Transport,
}

impl FlowKey {
    /// Canonicalizes a 5-tuple, returning the key and the packet's direction in it.
    pub fn canonical(tuple: &FiveTuple) -> (Self, Direction) {
        let (forward, reverse, direction) = match tuple.src.cmp(&tuple.dst) {
            Ordering::Greater => (tuple.dst, tuple.src, Direction::Reverse),
            _ => (tuple.src, tuple.dst, Direction::Forward),
        };
        (
            Self {
                forward,
                reverse,
                transport: tuple.transport,
            },
            direction,
        )
    }

    pub fn uses_port(&self, ports: &std::collections::HashSet<u16>) -> bool {
        ports.contains(&self.forward.port) || ports.contains(&self.reverse.port)
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} <-> {} ({})", self.forward, self.reverse, self.transport)
    }
}

/// A maximal single-direction run of packets with gaps inside the burst window.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Burst {
    pub direction: Direction,
    pub packet_count: u32,
    pub byte_total: u64,
    pub start_micros: i64,
    pub end_micros: i64,
    pub gaps_micros: Vec<i64>,
}

impl Burst {
    pub fn duration_micros(&self) -> i64 {
        self.end_micros - self.start_micros
    }
}

/// Burst still accepting packets.
#[derive(Clone, Debug)]
pub(crate) struct OpenBurst {
    pub burst: Burst,
}

impl OpenBurst {
    pub fn close(self) -> Option<Burst> {
        // a single qualifying gap is noise, not a burst
        if self.burst.gaps_micros.len() >= 2 {
            Some(self.burst)
        } else {
            None
        }
    }
}

/// Per-flow accumulator owned by the reconstructor for one capture analysis.
#[derive(Clone, Debug)]
pub struct FlowStatistics {
    pub key: FlowKey,
    pub first_seen_micros: i64,
    pub last_seen_micros: i64,
    pub packets: [u64; 2],
    pub bytes: [u64; 2],
    pub cell_sized_packets: u64,
    pub bursts: Vec<Burst>,
    pub(crate) last_by_direction: [Option<(i64, u32)>; 2],
    pub(crate) open_burst: Option<OpenBurst>,
    pub(crate) last_direction: Option<Direction>,
    pub(crate) gaps_micros: Vec<f64>,
}

impl FlowStatistics {
    pub fn new(key: FlowKey, first_seen_micros: i64) -> Self {
        Self {
            key,
            first_seen_micros,
            last_seen_micros: first_seen_micros,
            packets: [0; 2],
            bytes: [0; 2],
            cell_sized_packets: 0,
            bursts: Vec::new(),
            last_by_direction: [None; 2],
            open_burst: None,
            last_direction: None,
            gaps_micros: Vec::new(),
        }
    }

    pub fn packets_in(&self, direction: Direction) -> u64 {
        self.packets[direction.index()]
    }

    pub fn bytes_in(&self, direction: Direction) -> u64 {
        self.bytes[direction.index()]
    }

    pub fn total_packets(&self) -> u64 {
        self.packets[0] + self.packets[1]
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes[0] + self.bytes[1]
    }

    pub fn duration_micros(&self) -> i64 {
        self.last_seen_micros - self.first_seen_micros
    }

    /// Share of packets within the cell-size tolerance window.
    pub fn cell_ratio(&self) -> f64 {
        match self.total_packets() {
            0 => 0.0,
            total => self.cell_sized_packets as f64 / total as f64,
        }
    }

    /// Forward packets over all packets.
    pub fn directionality(&self) -> f64 {
        match self.total_packets() {
            0 => 0.0,
            total => self.packets_in(Direction::Forward) as f64 / total as f64,
        }
    }

    pub(crate) fn last_in(&self, direction: Direction) -> Option<(i64, u32)> {
        self.last_by_direction[direction.index()]
    }

    pub(crate) fn record(&mut self, direction: Direction, timestamp_micros: i64, size: u32) {
        let i = direction.index();
        self.packets[i] += 1;
        self.bytes[i] += u64::from(size);
        self.last_by_direction[i] = Some((timestamp_micros, size));
        self.last_direction = Some(direction);
        self.first_seen_micros = self.first_seen_micros.min(timestamp_micros);
        self.last_seen_micros = self.last_seen_micros.max(timestamp_micros);
    }

    pub(crate) fn record_gap(&mut self, gap_micros: i64) {
        self.gaps_micros.push(gap_micros as f64);
    }

    /// Mean same-direction inter-arrival gap in milliseconds.
    pub fn mean_gap_ms(&self) -> Option<f64> {
        utils::mean(&self.gaps_micros).map(|mean| mean / 1_000.0)
    }

    /// Sample standard deviation of the same-direction gaps in milliseconds.
    pub fn gap_std_dev_ms(&self) -> Option<f64> {
        utils::mean_std_dev(&self.gaps_micros).map(|(_, sd)| sd / 1_000.0)
    }
}

/// Plain, read-only view of one reconstructed flow.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlowSummary {
    pub index: usize,
    pub key: FlowKey,
    pub first_seen_micros: i64,
    pub last_seen_micros: i64,
    pub forward_packets: u64,
    pub reverse_packets: u64,
    pub forward_bytes: u64,
    pub reverse_bytes: u64,
    pub cell_ratio: f64,
    pub directionality: f64,
    pub tor_port: bool,
    pub is_likely_tor: bool,
    /// Endpoint on the known TOR port, the guard side of the session.
    pub guard_endpoint: Option<Endpoint>,
    pub mean_gap_ms: Option<f64>,
    pub gap_std_dev_ms: Option<f64>,
    pub bursts: Vec<Burst>,
}

impl FlowSummary {
    pub fn total_packets(&self) -> u64 {
        self.forward_packets + self.reverse_packets
    }

    pub fn total_bytes(&self) -> u64 {
        self.forward_bytes + self.reverse_bytes
    }

    pub fn duration_secs(&self) -> f64 {
        (self.last_seen_micros - self.first_seen_micros) as f64 / 1_000_000.0
    }
}

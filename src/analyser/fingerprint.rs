//! Session Fingerprinter.
//!
//! Summarizes one flow into pattern tags, a TOR-likelihood score and a content-addressed
//! hash. The hash covers only normalized values, so recomputing it from the same flow
//! always yields the same string.
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use super::containers::FlowSummary;
use super::flows::TOR_CELL_RATIO_THRESHOLD;
use super::utils::{self, get_md5_hash};

const LONG_LIVED_SECS: f64 = 600.0;
const SHORT_LIVED_SECS: f64 = 10.0;
const BURSTY_MIN_BURSTS: usize = 3;
const PERIODIC_MAX_CV: f64 = 0.25;
const PERIODIC_MIN_BURST_GAPS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternTag {
    TorPort,
    CellSized,
    MixedCellSizes,
    Balanced,
    UploadHeavy,
    DownloadHeavy,
    Bursty,
    Periodic,
    LongLived,
    ShortLived,
}

impl PatternTag {
    pub fn as_str(self) -> &'static str {
        match self {
            PatternTag::TorPort => "tor_port",
            PatternTag::CellSized => "cell_sized",
            PatternTag::MixedCellSizes => "mixed_cell_sizes",
            PatternTag::Balanced => "balanced",
            PatternTag::UploadHeavy => "upload_heavy",
            PatternTag::DownloadHeavy => "download_heavy",
            PatternTag::Bursty => "bursty",
            PatternTag::Periodic => "periodic",
            PatternTag::LongLived => "long_lived",
            PatternTag::ShortLived => "short_lived",
        }
    }
}

impl fmt::Display for PatternTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionFingerprint {
    pub hash: String,
    pub flow_index: usize,
    pub pattern_tags: Vec<PatternTag>,
    pub tor_likelihood: f64,
    pub duration_secs: u64,
    pub total_bytes: u64,
    pub guard_ips: BTreeSet<String>,
    pub exit_ips: BTreeSet<String>,
}

/// Fingerprints a flow. `exit_ips` are exit addresses attributed to the session by the
/// caller and may be empty.
pub fn fingerprint_flow(flow: &FlowSummary, exit_ips: &BTreeSet<String>) -> SessionFingerprint {
    let pattern_tags = pattern_tags(flow);
    let guard_ips: BTreeSet<String> = flow
        .guard_endpoint
        .iter()
        .map(|endpoint| endpoint.addr.to_string())
        .collect();
    let duration_secs = flow.duration_secs().round().max(0.0) as u64;

    let description = format!(
        "patterns={};duration={};bytes={};guards={};exits={}",
        pattern_tags
            .iter()
            .map(|tag| tag.as_str())
            .collect::<Vec<_>>()
            .join(","),
        duration_secs,
        flow.total_bytes(),
        guard_ips.iter().cloned().collect::<Vec<_>>().join(","),
        exit_ips.iter().cloned().collect::<Vec<_>>().join(","),
    );
    log::debug!("Fingerprinting flow {}: {description}", flow.index);

    SessionFingerprint {
        hash: get_md5_hash(&description),
        flow_index: flow.index,
        pattern_tags,
        tor_likelihood: tor_likelihood(flow),
        duration_secs,
        total_bytes: flow.total_bytes(),
        guard_ips,
        exit_ips: exit_ips.clone(),
    }
}

/// Tags in a fixed order, so the hashed description never depends on discovery order.
pub fn pattern_tags(flow: &FlowSummary) -> Vec<PatternTag> {
    let mut tags = BTreeSet::new();

    if flow.tor_port {
        tags.insert(PatternTag::TorPort);
    }
    if flow.cell_ratio > 0.6 {
        tags.insert(PatternTag::CellSized);
    } else if flow.cell_ratio > TOR_CELL_RATIO_THRESHOLD {
        tags.insert(PatternTag::MixedCellSizes);
    }
    if (0.3..=0.7).contains(&flow.directionality) {
        tags.insert(PatternTag::Balanced);
    }
    if let Some(upload) = upload_share(flow) {
        if upload > 0.75 {
            tags.insert(PatternTag::UploadHeavy);
        } else if upload < 0.25 {
            tags.insert(PatternTag::DownloadHeavy);
        }
    }
    if flow.bursts.len() >= BURSTY_MIN_BURSTS {
        tags.insert(PatternTag::Bursty);
    }
    if is_periodic(flow) {
        tags.insert(PatternTag::Periodic);
    }

    let duration = flow.duration_secs();
    if duration >= LONG_LIVED_SECS {
        tags.insert(PatternTag::LongLived);
    } else if duration < SHORT_LIVED_SECS {
        tags.insert(PatternTag::ShortLived);
    }

    tags.into_iter().collect()
}

/// Heuristic TOR-likelihood in [0, 1] from port, cell share, balance and burstiness.
pub fn tor_likelihood(flow: &FlowSummary) -> f64 {
    let port = if flow.tor_port { 1.0 } else { 0.0 };
    let cells = (flow.cell_ratio / 0.9).min(1.0);
    let balance = (1.0 - (flow.directionality - 0.5).abs() * 2.0).clamp(0.0, 1.0);
    let bursts = (flow.bursts.len() as f64 / 5.0).min(1.0);

    (0.30 * port + 0.40 * cells + 0.20 * balance + 0.10 * bursts).clamp(0.0, 1.0)
}

/// Share of bytes sent towards the guard side, when a guard side is known.
fn upload_share(flow: &FlowSummary) -> Option<f64> {
    let guard = flow.guard_endpoint?;
    let total = flow.total_bytes();
    if total == 0 {
        return None;
    }
    // packets travelling to the guard originate at the other endpoint
    let towards_guard = if guard == flow.key.forward {
        flow.reverse_bytes
    } else {
        flow.forward_bytes
    };
    Some(towards_guard as f64 / total as f64)
}

fn is_periodic(flow: &FlowSummary) -> bool {
    let gaps: Vec<f64> = flow
        .bursts
        .iter()
        .flat_map(|burst| burst.gaps_micros.iter().map(|&gap| gap as f64))
        .collect();
    if gaps.len() < PERIODIC_MIN_BURST_GAPS {
        return false;
    }
    match utils::mean_std_dev(&gaps) {
        Some((mean, sd)) if mean > 0.0 => sd / mean < PERIODIC_MAX_CV,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyser::containers::{Endpoint, FiveTuple, PacketRecord, Transport};
    use crate::analyser::flows::reconstruct;
    use crate::config::CaptureConfig;
    use std::net::{IpAddr, Ipv4Addr};

    fn tor_flow() -> FlowSummary {
        let client = Endpoint {
            addr: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
            port: 51234,
        };
        let guard = Endpoint {
            addr: IpAddr::V4(Ipv4Addr::new(85, 10, 20, 30)),
            port: 9001,
        };
        let records: Vec<PacketRecord> = (0..400)
            .map(|i| {
                let (src, dst) = if i % 2 == 0 { (client, guard) } else { (guard, client) };
                PacketRecord {
                    index: i,
                    timestamp_nanos: i as i64 * 15_000_000,
                    captured_length: 554,
                    original_length: 554,
                    link_type: 101,
                    five_tuple: Some(FiveTuple {
                        src,
                        dst,
                        transport: Transport::Tcp,
                    }),
                    payload_size: 514,
                }
            })
            .collect();
        reconstruct(&records, &CaptureConfig::default()).remove(0)
    }

    #[test]
    fn fingerprint_is_content_addressed() {
        let flow = tor_flow();
        let exits: BTreeSet<String> = ["203.0.113.7".to_string()].into_iter().collect();
        let a = fingerprint_flow(&flow, &exits);
        let b = fingerprint_flow(&flow, &exits);
        assert_eq!(a.hash, b.hash);

        let other = fingerprint_flow(&flow, &BTreeSet::new());
        assert_ne!(a.hash, other.hash);
    }

    #[test]
    fn tor_flow_has_expected_tags() {
        let flow = tor_flow();
        let print = fingerprint_flow(&flow, &BTreeSet::new());
        assert!(print.pattern_tags.contains(&PatternTag::TorPort));
        assert!(print.pattern_tags.contains(&PatternTag::CellSized));
        assert!(print.pattern_tags.contains(&PatternTag::Balanced));
        assert!(print.pattern_tags.contains(&PatternTag::ShortLived));
        assert_eq!(print.guard_ips.iter().next().unwrap(), "85.10.20.30");
        assert!(print.tor_likelihood > 0.85);
    }

    #[test]
    fn tags_are_sorted() {
        let tags = pattern_tags(&tor_flow());
        let mut sorted = tags.clone();
        sorted.sort();
        assert_eq!(tags, sorted);
    }
}

//! Flow & Burst Reconstructor.
//!
//! Groups packet records into bidirectional flows and accumulates timing, size and
//! directionality statistics for each. Records can be fed one at a time through
//! [FlowReconstructor::ingest] and a partial view taken at any point with
//! [FlowReconstructor::snapshot].
use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};

use super::containers::{
    Burst, Direction, FlowKey, FlowStatistics, FlowSummary, OpenBurst, PacketRecord,
    BURST_MAX_GAP_MICROS, BURST_MIN_GAP_MICROS, TOR_CELL_SIZE,
};
use crate::config::CaptureConfig;

lazy_static! {
    /// ORPort, DirPort, SOCKS, control and browser-bundle ports, plus 443 used by many relays.
    pub static ref TOR_PORTS: HashSet<u16> =
        [443, 9001, 9030, 9040, 9050, 9051, 9150, 9151].into_iter().collect();
}

/// Minimum cell-sized share for a flow to count as TOR-like.
pub const TOR_CELL_RATIO_THRESHOLD: f64 = 0.3;

/// Neither direction may carry more than 9 packets for every 1 in the other.
pub const MAX_DIRECTION_DOMINANCE: f64 = 9.0;

pub struct FlowReconstructor {
    cell_tolerance: u32,
    index: HashMap<FlowKey, usize>,
    flows: Vec<FlowStatistics>,
    ingested: u64,
    skipped: u64,
}

impl FlowReconstructor {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            cell_tolerance: config.cell_tolerance,
            index: HashMap::new(),
            flows: Vec::new(),
            ingested: 0,
            skipped: 0,
        }
    }

    /// Records seen so far, including those without a 5-tuple.
    pub fn ingested(&self) -> u64 {
        self.ingested
    }

    /// Records that could not be assigned to a flow.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    pub fn ingest(&mut self, record: &PacketRecord) {
        self.ingested += 1;
        let Some(tuple) = record.five_tuple.as_ref() else {
            self.skipped += 1;
            return;
        };

        let (key, direction) = FlowKey::canonical(tuple);
        let timestamp = record.timestamp_micros();
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                self.flows.push(FlowStatistics::new(key, timestamp));
                self.index.insert(key, self.flows.len() - 1);
                self.flows.len() - 1
            }
        };
        let stats = &mut self.flows[slot];

        update_bursts(stats, direction, timestamp, record.payload_size);

        if record.payload_size.abs_diff(TOR_CELL_SIZE) <= self.cell_tolerance {
            stats.cell_sized_packets += 1;
        }
        stats.record(direction, timestamp, record.payload_size);
    }

    /// Summaries of the flows seen so far. Open bursts are closed on the copies only, so
    /// ingestion can continue afterwards.
    pub fn snapshot(&self) -> Vec<FlowSummary> {
        self.flows
            .iter()
            .enumerate()
            .map(|(index, stats)| {
                let mut stats = stats.clone();
                close_open_burst(&mut stats);
                summarize(index, &stats)
            })
            .collect()
    }

    pub fn finish(mut self) -> Vec<FlowSummary> {
        log::info!(
            "Reconstructed {} flows from {} records ({} without a 5-tuple)",
            self.flows.len(),
            self.ingested,
            self.skipped
        );
        for stats in self.flows.iter_mut() {
            close_open_burst(stats);
        }
        self.flows
            .iter()
            .enumerate()
            .map(|(index, stats)| summarize(index, stats))
            .collect()
    }
}

/// Reconstructs every flow in an ordered record sequence.
pub fn reconstruct(records: &[PacketRecord], config: &CaptureConfig) -> Vec<FlowSummary> {
    let mut reconstructor = FlowReconstructor::new(config);
    for record in records {
        reconstructor.ingest(record);
    }
    reconstructor.finish()
}

/// The TOR heuristic: known port, enough cell-sized packets, and no lopsided direction.
pub fn is_likely_tor(key: &FlowKey, cell_ratio: f64, forward: u64, reverse: u64) -> bool {
    if !key.uses_port(&TOR_PORTS) || cell_ratio <= TOR_CELL_RATIO_THRESHOLD {
        return false;
    }
    let (hi, lo) = (forward.max(reverse) as f64, forward.min(reverse) as f64);
    lo > 0.0 && hi / lo <= MAX_DIRECTION_DOMINANCE
}

/// A burst is a run of consecutive same-direction packets whose gaps all fall in the
/// burst window. A packet from the other direction ends the run, so no packet is shared
/// between two bursts.
fn update_bursts(stats: &mut FlowStatistics, direction: Direction, timestamp: i64, size: u32) {
    let continues_run = stats.last_direction == Some(direction);
    if !continues_run {
        close_open_burst(stats);
    }

    let Some((prev_ts, prev_size)) = stats.last_in(direction) else {
        return;
    };
    let gap = timestamp - prev_ts;
    if gap >= 0 {
        stats.record_gap(gap);
    }

    if !continues_run || !(BURST_MIN_GAP_MICROS..=BURST_MAX_GAP_MICROS).contains(&gap) {
        close_open_burst(stats);
        return;
    }

    match stats.open_burst.as_mut() {
        Some(open) => {
            open.burst.packet_count += 1;
            open.burst.byte_total += u64::from(size);
            open.burst.end_micros = timestamp;
            open.burst.gaps_micros.push(gap);
        }
        None => {
            stats.open_burst = Some(OpenBurst {
                burst: Burst {
                    direction,
                    packet_count: 2,
                    byte_total: u64::from(prev_size) + u64::from(size),
                    start_micros: prev_ts,
                    end_micros: timestamp,
                    gaps_micros: vec![gap],
                },
            });
        }
    }
}

fn close_open_burst(stats: &mut FlowStatistics) {
    if let Some(burst) = stats.open_burst.take().and_then(OpenBurst::close) {
        stats.bursts.push(burst);
    }
}

fn summarize(index: usize, stats: &FlowStatistics) -> FlowSummary {
    let key = stats.key;
    let forward = stats.packets_in(Direction::Forward);
    let reverse = stats.packets_in(Direction::Reverse);
    let cell_ratio = stats.cell_ratio();
    let guard_endpoint = if TOR_PORTS.contains(&key.forward.port) {
        Some(key.forward)
    } else if TOR_PORTS.contains(&key.reverse.port) {
        Some(key.reverse)
    } else {
        None
    };

    FlowSummary {
        index,
        key,
        first_seen_micros: stats.first_seen_micros,
        last_seen_micros: stats.last_seen_micros,
        forward_packets: forward,
        reverse_packets: reverse,
        forward_bytes: stats.bytes_in(Direction::Forward),
        reverse_bytes: stats.bytes_in(Direction::Reverse),
        cell_ratio,
        directionality: stats.directionality(),
        tor_port: guard_endpoint.is_some(),
        is_likely_tor: is_likely_tor(&key, cell_ratio, forward, reverse),
        guard_endpoint,
        mean_gap_ms: stats.mean_gap_ms(),
        gap_std_dev_ms: stats.gap_std_dev_ms(),
        bursts: stats.bursts.clone(),
    }
}

//! End-to-end analysis: capture bytes to a case report.
//!
//! Parse the capture, rebuild flows, fingerprint the TOR-like ones and, when a relay
//! catalog is supplied, score candidate paths, feed per-flow evidence into the entry
//! inference engine and rate the leading hypothesis.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::containers::FlowSummary;
use super::fingerprint::{fingerprint_flow, SessionFingerprint};
use super::flows::FlowReconstructor;
use super::pcap::{CaptureHeader, ParseStatus, PcapReader};
use crate::config::Config;
use crate::errors::Result;
use crate::inference::bayes::{EntryInference, Likelihood, RankedEntry};
use crate::inference::confidence::{
    ConfidenceCalculator, ConfidenceResult, EvidenceSignals, CAVEAT,
};
use crate::inference::path::{PathCandidate, PathScorer};
use crate::inference::relay::{RelayCatalog, RelayFlag, RelayInfo, RelayRole};

/// Exit identifier used when no scored path exists for a guard.
pub const UNKNOWN_EXIT: &str = "unknown";

#[derive(Clone, Debug)]
pub struct AnalysisOptions {
    /// Stop after this many records for a lower-latency partial reconstruction.
    pub max_packets: Option<usize>,
    /// Restrict inference to one flow index.
    pub flow: Option<usize>,
    /// Capture and flow metadata only, no relay inference.
    pub metaonly: bool,
    pub top_k: usize,
    /// Per-role candidate pool size for triple generation.
    pub pool: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            max_packets: None,
            flow: None,
            metaonly: false,
            top_k: 5,
            pool: 6,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CaptureSummary {
    pub header: CaptureHeader,
    pub status: ParseStatus,
    pub records: u64,
    pub records_without_tuple: u64,
    pub clamped_records: usize,
    /// Stopped early because of `max_packets`.
    pub partial: bool,
}

/// Evidence derived for one flow matched to a catalog relay.
#[derive(Clone, Debug, Serialize)]
pub struct FlowEvidence {
    pub flow_index: usize,
    pub guard: String,
    pub exit: String,
    pub likelihood: Likelihood,
}

#[derive(Clone, Debug, Serialize)]
pub struct CaseReport {
    pub generated_at: DateTime<Utc>,
    pub capture: CaptureSummary,
    pub flows: Vec<FlowSummary>,
    pub fingerprints: Vec<SessionFingerprint>,
    pub paths: Vec<PathCandidate>,
    pub evidence: Vec<FlowEvidence>,
    pub entries: Vec<RankedEntry>,
    pub entropy: Option<f64>,
    pub confidence: Option<ConfidenceResult>,
    pub caveat: String,
}

impl CaseReport {
    pub fn likely_tor_flows(&self) -> impl Iterator<Item = &FlowSummary> {
        self.flows.iter().filter(|flow| flow.is_likely_tor)
    }
}

/// Runs the whole pipeline over one capture buffer.
pub fn analyse(
    buf: &[u8],
    catalog: Option<&RelayCatalog>,
    config: &Config,
    options: &AnalysisOptions,
) -> Result<CaseReport> {
    log::info!("Starting analysis.");
    config.validate()?;

    let (capture, flows) = reconstruct_capture(buf, config, options)?;

    let selected: Vec<&FlowSummary> = flows
        .iter()
        .filter(|flow| flow.is_likely_tor)
        .filter(|flow| options.flow.map_or(true, |index| flow.index == index))
        .collect();
    log::info!("{} of {} flows look like TOR sessions", selected.len(), flows.len());

    let mut report = CaseReport {
        generated_at: Utc::now(),
        capture,
        flows: flows.clone(),
        fingerprints: Vec::new(),
        paths: Vec::new(),
        evidence: Vec::new(),
        entries: Vec::new(),
        entropy: None,
        confidence: None,
        caveat: CAVEAT.to_string(),
    };

    let catalog = match catalog {
        Some(catalog) if !options.metaonly && !catalog.is_empty() => catalog,
        _ => {
            if !options.metaonly {
                log::warn!("No relay catalog, skipping relay inference.");
            }
            report.fingerprints = selected
                .iter()
                .map(|flow| fingerprint_flow(flow, &BTreeSet::new()))
                .collect();
            return Ok(report);
        }
    };

    infer_entries(&mut report, &selected, catalog, config, options)?;
    Ok(report)
}

/// Streams records from the buffer into the reconstructor.
fn reconstruct_capture(
    buf: &[u8],
    config: &Config,
    options: &AnalysisOptions,
) -> Result<(CaptureSummary, Vec<FlowSummary>)> {
    let mut reader = PcapReader::new(buf)?;
    let mut reconstructor = FlowReconstructor::new(&config.capture);
    let limit = options.max_packets.unwrap_or(usize::MAX);

    let mut partial = false;
    for record in reader.by_ref() {
        reconstructor.ingest(&record);
        if reconstructor.ingested() as usize >= limit {
            partial = true;
            log::info!("Stopping after {limit} records (partial reconstruction).");
            break;
        }
    }

    let status = if reader.truncated() {
        ParseStatus::Truncated
    } else {
        ParseStatus::Complete
    };
    let summary = CaptureSummary {
        header: reader.header().clone(),
        status,
        records: reconstructor.ingested(),
        records_without_tuple: reconstructor.skipped(),
        clamped_records: reader.clamped_records(),
        partial,
    };
    Ok((summary, reconstructor.finish()))
}

fn infer_entries(
    report: &mut CaseReport,
    selected: &[&FlowSummary],
    catalog: &RelayCatalog,
    config: &Config,
    options: &AnalysisOptions,
) -> Result<()> {
    let scorer = PathScorer::default();

    // flows whose guard-side address is a known relay
    let matched: Vec<(&FlowSummary, &RelayInfo)> = selected
        .iter()
        .filter_map(|flow| {
            let endpoint = flow.guard_endpoint?;
            catalog
                .find_by_address(&endpoint.addr)
                .map(|relay| (*flow, relay))
        })
        .collect();
    log::info!("{} flows matched a catalog relay", matched.len());

    let mut guards = catalog.pool(RelayRole::Guard, options.pool);
    for (_, relay) in &matched {
        if !guards.iter().any(|g| g.fingerprint == relay.fingerprint) {
            guards.push(*relay);
        }
    }
    let middles = catalog.pool(RelayRole::Middle, options.pool);
    let exits = catalog.pool(RelayRole::Exit, options.pool);
    if guards.is_empty() {
        log::warn!("Catalog has no entry-capable relays, skipping relay inference.");
        report.fingerprints = selected
            .iter()
            .map(|flow| fingerprint_flow(flow, &BTreeSet::new()))
            .collect();
        return Ok(());
    }

    let paths = scorer.rank_paths(&guards, &middles, &exits, None);

    let mut engine = EntryInference::new(&config.inference)?;
    engine.set_priors(guards.iter().copied())?;

    let mut by_exit: BTreeMap<String, Vec<(&str, Likelihood)>> = BTreeMap::new();
    for (flow, relay) in &matched {
        let exit = paths
            .iter()
            .find(|path| path.guard == relay.fingerprint)
            .map(|path| path.exit.clone())
            .unwrap_or_else(|| UNKNOWN_EXIT.to_string());
        let exit_ips: BTreeSet<String> = catalog
            .get(&exit)
            .map(|relay| relay.addresses.iter().map(|a| a.to_string()).collect())
            .unwrap_or_default();

        let fingerprint = fingerprint_flow(flow, &exit_ips);
        let likelihood = Likelihood::new(
            temporal_overlap(flow, relay),
            fingerprint.tor_likelihood,
            stability(&scorer, relay),
        )?;

        report.evidence.push(FlowEvidence {
            flow_index: flow.index,
            guard: relay.fingerprint.clone(),
            exit: exit.clone(),
            likelihood,
        });
        report.fingerprints.push(fingerprint);
        by_exit
            .entry(exit)
            .or_default()
            .push((relay.fingerprint.as_str(), likelihood));
    }

    // unmatched TOR-like flows still get a fingerprint
    for flow in selected {
        if !matched.iter().any(|(m, _)| m.index == flow.index) {
            report.fingerprints.push(fingerprint_flow(flow, &BTreeSet::new()));
        }
    }
    report.fingerprints.sort_by_key(|print| print.flow_index);

    for (exit, batch) in &by_exit {
        engine.observe_exit(exit, batch)?;
    }

    report.entries = engine.ranked_entries(options.top_k);
    report.entropy = Some(engine.entropy());

    let signals = leading_signals(&report.entries, &matched, &paths, &engine);
    report.confidence = Some(ConfidenceCalculator::new(&config.confidence)?.calculate(&signals));

    report.paths = paths.into_iter().take(options.top_k).collect();
    Ok(())
}

/// 1.0 when the relay was active throughout the flow, less for partial or no overlap.
fn temporal_overlap(flow: &FlowSummary, relay: &RelayInfo) -> f64 {
    let (Some(start), Some(end)) = (
        DateTime::<Utc>::from_timestamp_micros(flow.first_seen_micros),
        DateTime::<Utc>::from_timestamp_micros(flow.last_seen_micros),
    ) else {
        return 0.5;
    };
    if relay.first_seen <= start && relay.last_seen >= end {
        1.0
    } else if relay.active_during(start, end) {
        0.6
    } else {
        0.1
    }
}

fn stability(scorer: &PathScorer, relay: &RelayInfo) -> f64 {
    let flag = if relay.has_flag(RelayFlag::Stable) { 1.0 } else { 0.0 };
    (0.4 * flag + 0.6 * scorer.uptime_curve.eval(relay.active_days())).clamp(0.0, 1.0)
}

/// Confidence inputs for the top-ranked entry candidate.
fn leading_signals(
    entries: &[RankedEntry],
    matched: &[(&FlowSummary, &RelayInfo)],
    paths: &[PathCandidate],
    engine: &EntryInference,
) -> EvidenceSignals {
    let Some(leader) = entries.first() else {
        return EvidenceSignals::default();
    };
    let leader_flows: Vec<&FlowSummary> = matched
        .iter()
        .filter(|(_, relay)| relay.fingerprint == leader.fingerprint)
        .map(|(flow, _)| *flow)
        .collect();
    let observations = engine.observations(&leader.fingerprint).unwrap_or_default();
    let best_path = paths.iter().find(|path| path.guard == leader.fingerprint);

    let volume = leader_flows.iter().map(|flow| flow.total_packets()).sum();
    let timing_similarity = if observations.is_empty() {
        None
    } else {
        Some(
            observations
                .iter()
                .map(|o| o.likelihood.temporal_overlap())
                .sum::<f64>()
                / observations.len() as f64,
        )
    };

    let exits: BTreeSet<&str> = observations.iter().map(|o| o.exit.as_str()).collect();
    let categories = [
        !leader_flows.is_empty(),
        leader_flows.iter().any(|flow| !flow.bursts.is_empty()),
        best_path.is_some(),
        !observations.is_empty(),
        exits.len() > 1,
    ];

    EvidenceSignals {
        volume,
        timing_similarity,
        session_overlap: best_path.map(|path| path.breakdown.uptime),
        diversity: categories.iter().filter(|&&present| present).count() as u32,
    }
}

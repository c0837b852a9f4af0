//! Bayesian Entry Inference Engine.
//!
//! Holds a prior over candidate entry relays (consensus weight plus additive smoothing)
//! and an append-only log of evidence observations per candidate. Posteriors are computed
//! lazily and cached; every mutation takes `&mut self` and invalidates or patches the
//! cache in the same call, so a reader never sees a half-applied observation.
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::relay::RelayInfo;
use crate::config::InferenceConfig;
use crate::errors::InferenceError;

/// Likelihood assumed for a candidate with no evidence.
pub const NEUTRAL_LIKELIHOOD: f64 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum InferenceState {
    Uninitialized,
    PriorsSet,
    Updating(usize),
}

/// The three likelihood components of one observation, each in [0, 1].
///
/// Only [Likelihood::new] builds one, so every stored value has been range-checked.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Likelihood {
    temporal_overlap: f64,
    traffic_similarity: f64,
    stability: f64,
}

impl Likelihood {
    pub fn new(
        temporal_overlap: f64,
        traffic_similarity: f64,
        stability: f64,
    ) -> Result<Self, InferenceError> {
        let likelihood = Self {
            temporal_overlap,
            traffic_similarity,
            stability,
        };
        likelihood.validate()?;
        Ok(likelihood)
    }

    pub fn temporal_overlap(&self) -> f64 {
        self.temporal_overlap
    }

    pub fn traffic_similarity(&self) -> f64 {
        self.traffic_similarity
    }

    pub fn stability(&self) -> f64 {
        self.stability
    }

    fn validate(&self) -> Result<(), InferenceError> {
        for (name, value) in [
            ("temporal_overlap", self.temporal_overlap),
            ("traffic_similarity", self.traffic_similarity),
            ("stability", self.stability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(InferenceError::InvalidLikelihood { name, value });
            }
        }
        Ok(())
    }
}

/// One recorded evidence update, kept for audit.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EvidenceObservation {
    pub sequence: usize,
    pub entry: String,
    pub exit: String,
    pub likelihood: Likelihood,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankedEntry {
    pub fingerprint: String,
    pub prior: f64,
    pub posterior: f64,
    pub likelihood: f64,
    pub observations: usize,
}

#[derive(Clone, Debug)]
struct Candidate {
    prior: f64,
    observations: Vec<EvidenceObservation>,
    score_sum: f64,
}

#[derive(Clone, Debug)]
struct PosteriorCache {
    masses: BTreeMap<String, f64>,
    total: f64,
}

impl PosteriorCache {
    fn probability(&self, fingerprint: &str) -> Option<f64> {
        self.masses.get(fingerprint).map(|mass| mass / self.total)
    }
}

pub struct EntryInference {
    /// time, traffic, stability; normalized to sum to one
    weights: [f64; 3],
    smoothing: f64,
    candidates: BTreeMap<String, Candidate>,
    observation_count: usize,
    cache: RwLock<Option<PosteriorCache>>,
}

impl EntryInference {
    pub fn new(config: &InferenceConfig) -> Result<Self, InferenceError> {
        config
            .validate()
            .map_err(|e| InferenceError::InvalidWeights(e.to_string()))?;
        Ok(Self::with_validated(config))
    }

    fn with_validated(config: &InferenceConfig) -> Self {
        let raw = [
            config.time_weight,
            config.traffic_weight,
            config.stability_weight,
        ];
        let sum: f64 = raw.iter().sum();

        Self {
            weights: raw.map(|w| w / sum),
            smoothing: config.smoothing,
            candidates: BTreeMap::new(),
            observation_count: 0,
            cache: RwLock::new(None),
        }
    }

    pub fn state(&self) -> InferenceState {
        match (self.candidates.is_empty(), self.observation_count) {
            (true, _) => InferenceState::Uninitialized,
            (false, 0) => InferenceState::PriorsSet,
            (false, k) => InferenceState::Updating(k),
        }
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    pub fn observation_count(&self) -> usize {
        self.observation_count
    }

    /// Sets priors from relay consensus weights, discarding any earlier evidence.
    pub fn set_priors<'a, I>(&mut self, relays: I) -> Result<(), InferenceError>
    where
        I: IntoIterator<Item = &'a RelayInfo>,
    {
        let weights = relays
            .into_iter()
            .map(|relay| (relay.fingerprint.clone(), relay.consensus_weight))
            .collect();
        self.set_prior_weights(weights)
    }

    /// Sets priors from (fingerprint, weight) pairs. Nothing changes unless every pair is
    /// valid.
    pub fn set_prior_weights(&mut self, weights: Vec<(String, f64)>) -> Result<(), InferenceError> {
        if weights.is_empty() {
            return Err(InferenceError::InvalidPriorInput(
                "candidate relay list is empty".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for (fingerprint, weight) in &weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(InferenceError::InvalidPriorInput(format!(
                    "relay {fingerprint} has weight {weight}"
                )));
            }
            if !seen.insert(fingerprint.as_str()) {
                return Err(InferenceError::InvalidPriorInput(format!(
                    "relay {fingerprint} listed twice"
                )));
            }
        }
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return Err(InferenceError::InvalidPriorInput(
                "total consensus weight is zero".to_string(),
            ));
        }

        let n = weights.len() as f64;
        let normalizer = 1.0 + n * self.smoothing;
        self.candidates = weights
            .into_iter()
            .map(|(fingerprint, weight)| {
                let prior = (weight / total + self.smoothing) / normalizer;
                (
                    fingerprint,
                    Candidate {
                        prior,
                        observations: Vec::new(),
                        score_sum: 0.0,
                    },
                )
            })
            .collect();
        self.observation_count = 0;
        *self.cache.get_mut() = None;
        log::info!("Priors set over {} candidate entry relays", self.candidates.len());
        Ok(())
    }

    /// Appends one observation for `entry` and invalidates the cached posterior.
    pub fn update_evidence(
        &mut self,
        entry: &str,
        temporal_overlap: f64,
        traffic_similarity: f64,
        stability: f64,
        exit: &str,
    ) -> Result<(), InferenceError> {
        self.check_candidate(entry)?;
        let likelihood = Likelihood::new(temporal_overlap, traffic_similarity, stability)?;

        self.append(entry, exit, likelihood);
        *self.cache.get_mut() = None;
        log::debug!("Evidence #{} for {entry} via exit {exit}", self.observation_count);
        Ok(())
    }

    /// Applies a batch of observations tied to one newly observed exit.
    ///
    /// Only the supplied candidates' posterior masses are recomputed; if a posterior is
    /// cached it is patched in place instead of being rebuilt from every candidate.
    pub fn observe_exit(
        &mut self,
        exit: &str,
        batch: &[(&str, Likelihood)],
    ) -> Result<(), InferenceError> {
        for (entry, likelihood) in batch {
            self.check_candidate(entry)?;
            likelihood.validate()?;
        }

        for (entry, likelihood) in batch {
            self.append(entry, exit, *likelihood);
        }

        let candidates = &self.candidates;
        if let Some(cache) = self.cache.get_mut().as_mut() {
            let touched: BTreeSet<&str> = batch.iter().map(|(entry, _)| *entry).collect();
            for entry in touched {
                if let Some(candidate) = candidates.get(entry) {
                    let mass = candidate.prior * aggregate_likelihood(candidate);
                    let old = cache.masses.insert(entry.to_string(), mass).unwrap_or(0.0);
                    cache.total += mass - old;
                }
            }
        }
        log::debug!("Exit {exit} contributed {} observations", batch.len());
        Ok(())
    }

    pub fn prior(&self, fingerprint: &str) -> Option<f64> {
        self.candidates.get(fingerprint).map(|c| c.prior)
    }

    /// Aggregate likelihood currently attributed to a candidate.
    pub fn likelihood(&self, fingerprint: &str) -> Option<f64> {
        self.candidates
            .get(fingerprint)
            .map(aggregate_likelihood)
    }

    /// Audit trail of observations recorded against a candidate.
    pub fn observations(&self, fingerprint: &str) -> Option<&[EvidenceObservation]> {
        self.candidates
            .get(fingerprint)
            .map(|c| c.observations.as_slice())
    }

    pub fn exits_observed(&self) -> BTreeSet<&str> {
        self.candidates
            .values()
            .flat_map(|c| c.observations.iter().map(|o| o.exit.as_str()))
            .collect()
    }

    pub fn posterior_probability(&self, fingerprint: &str) -> Result<f64, InferenceError> {
        self.check_candidate(fingerprint)?;
        self.with_posterior(|cache| cache.probability(fingerprint))
            .ok_or_else(|| InferenceError::UnknownCandidate(fingerprint.to_string()))
    }

    /// Full posterior distribution; empty before priors are set.
    pub fn posterior_probabilities(&self) -> BTreeMap<String, f64> {
        if self.candidates.is_empty() {
            return BTreeMap::new();
        }
        self.with_posterior(|cache| {
            cache
                .masses
                .iter()
                .map(|(fp, mass)| (fp.clone(), mass / cache.total))
                .collect()
        })
    }

    /// Candidates by posterior, highest first; ties go to the higher prior.
    pub fn ranked_entries(&self, top_k: usize) -> Vec<RankedEntry> {
        let posterior = self.posterior_probabilities();
        let mut ranked: Vec<RankedEntry> = self
            .candidates
            .iter()
            .map(|(fingerprint, candidate)| RankedEntry {
                fingerprint: fingerprint.clone(),
                prior: candidate.prior,
                posterior: posterior.get(fingerprint).copied().unwrap_or(0.0),
                likelihood: aggregate_likelihood(candidate),
                observations: candidate.observations.len(),
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.posterior
                .total_cmp(&a.posterior)
                .then_with(|| b.prior.total_cmp(&a.prior))
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });
        ranked.truncate(top_k);
        ranked
    }

    /// Shannon entropy of the posterior in nats. `ln(n)` means no discriminating evidence.
    pub fn entropy(&self) -> f64 {
        self.posterior_probabilities()
            .values()
            .filter(|&&p| p > 0.0)
            .map(|&p| -p * p.ln())
            .sum()
    }

    fn check_candidate(&self, fingerprint: &str) -> Result<(), InferenceError> {
        if self.candidates.is_empty() {
            return Err(InferenceError::PriorsNotSet);
        }
        if !self.candidates.contains_key(fingerprint) {
            return Err(InferenceError::UnknownCandidate(fingerprint.to_string()));
        }
        Ok(())
    }

    fn append(&mut self, entry: &str, exit: &str, likelihood: Likelihood) {
        let score = weighted_score(&likelihood, &self.weights);
        let sequence = self.observation_count;
        if let Some(candidate) = self.candidates.get_mut(entry) {
            candidate.observations.push(EvidenceObservation {
                sequence,
                entry: entry.to_string(),
                exit: exit.to_string(),
                likelihood,
            });
            candidate.score_sum += score;
            self.observation_count += 1;
        }
    }

    fn with_posterior<R>(&self, f: impl FnOnce(&PosteriorCache) -> R) -> R {
        let guard = self.cache.upgradable_read();
        if let Some(cache) = guard.as_ref() {
            return f(cache);
        }
        let mut guard = RwLockUpgradableReadGuard::upgrade(guard);
        let cache = guard.insert(self.compute_posterior());
        f(cache)
    }

    fn compute_posterior(&self) -> PosteriorCache {
        let mut masses: BTreeMap<String, f64> = self
            .candidates
            .iter()
            .map(|(fp, c)| (fp.clone(), c.prior * aggregate_likelihood(c)))
            .collect();
        let mut total: f64 = masses.values().sum();
        if !(total.is_finite() && total > 0.0) {
            log::warn!("Posterior mass vanished, falling back to priors");
            masses = self
                .candidates
                .iter()
                .map(|(fp, c)| (fp.clone(), c.prior))
                .collect();
            total = masses.values().sum();
        }
        PosteriorCache { masses, total }
    }
}

impl Default for EntryInference {
    fn default() -> Self {
        Self::with_validated(&InferenceConfig::default())
    }
}

fn weighted_score(likelihood: &Likelihood, weights: &[f64; 3]) -> f64 {
    weights[0] * likelihood.temporal_overlap
        + weights[1] * likelihood.traffic_similarity
        + weights[2] * likelihood.stability
}

/// Mean weighted score over the candidate's observations, from the running sum.
fn aggregate_likelihood(candidate: &Candidate) -> f64 {
    if candidate.observations.is_empty() {
        return NEUTRAL_LIKELIHOOD;
    }
    candidate.score_sum / candidate.observations.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn engine(weights: &[(&str, f64)]) -> EntryInference {
        let mut engine = EntryInference::default();
        engine
            .set_prior_weights(weights.iter().map(|(fp, w)| (fp.to_string(), *w)).collect())
            .unwrap();
        engine
    }

    fn total(engine: &EntryInference) -> f64 {
        engine.posterior_probabilities().values().sum()
    }

    #[test]
    fn priors_follow_consensus_weight() {
        let engine = engine(&[("A", 1000.0), ("B", 2000.0), ("C", 3000.0)]);
        assert!((engine.prior("A").unwrap() - 0.167).abs() < 0.01);
        assert!((engine.prior("B").unwrap() - 0.333).abs() < 0.01);
        assert!((engine.prior("C").unwrap() - 0.500).abs() < 0.01);
        assert_eq!(engine.state(), InferenceState::PriorsSet);
    }

    #[test]
    fn smoothing_keeps_zero_weight_candidates_alive() {
        let engine = engine(&[("A", 0.0), ("B", 100.0)]);
        assert!(engine.prior("A").unwrap() > 0.0);
        assert!((engine.prior("A").unwrap() + engine.prior("B").unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn invalid_prior_input_is_rejected() {
        let mut engine = EntryInference::default();
        assert!(matches!(
            engine.set_prior_weights(Vec::new()),
            Err(InferenceError::InvalidPriorInput(_))
        ));
        assert!(matches!(
            engine.set_prior_weights(vec![("A".into(), 0.0), ("B".into(), 0.0)]),
            Err(InferenceError::InvalidPriorInput(_))
        ));
        assert!(matches!(
            engine.set_prior_weights(vec![("A".into(), -1.0), ("B".into(), 5.0)]),
            Err(InferenceError::InvalidPriorInput(_))
        ));
        assert!(matches!(
            engine.set_prior_weights(vec![("A".into(), 1.0), ("A".into(), 5.0)]),
            Err(InferenceError::InvalidPriorInput(_))
        ));
        assert_eq!(engine.state(), InferenceState::Uninitialized);
    }

    #[test]
    fn contract_violations_leave_state_untouched() {
        let mut engine = engine(&[("A", 1.0), ("B", 1.0)]);
        let before = engine.posterior_probabilities();

        assert_eq!(
            engine.update_evidence("Z", 0.5, 0.5, 0.5, "X"),
            Err(InferenceError::UnknownCandidate("Z".to_string()))
        );
        assert!(matches!(
            engine.update_evidence("A", 1.2, 0.5, 0.5, "X"),
            Err(InferenceError::InvalidLikelihood { name: "temporal_overlap", .. })
        ));
        assert!(matches!(
            engine.update_evidence("A", 0.5, f64::NAN, 0.5, "X"),
            Err(InferenceError::InvalidLikelihood { .. })
        ));
        let good = Likelihood::new(0.9, 0.9, 0.9).unwrap();
        assert!(engine.observe_exit("X", &[("A", good), ("Z", good)]).is_err());

        assert_eq!(engine.observation_count(), 0);
        assert_eq!(engine.posterior_probabilities(), before);
    }

    #[test]
    fn exit_batch_rejects_out_of_range_likelihoods() {
        let mut engine = engine(&[("A", 1.0), ("B", 1.0)]);
        let before = engine.posterior_probabilities();
        let forged = Likelihood {
            temporal_overlap: 50.0,
            traffic_similarity: -3.0,
            stability: 9.0,
        };
        let good = Likelihood::new(0.9, 0.9, 0.9).unwrap();

        assert!(matches!(
            engine.observe_exit("X", &[("B", good), ("A", forged)]),
            Err(InferenceError::InvalidLikelihood { name: "temporal_overlap", .. })
        ));
        assert_eq!(engine.observation_count(), 0);
        assert!(engine.observations("B").unwrap().is_empty());
        assert_eq!(engine.posterior_probabilities(), before);
    }

    #[test]
    fn default_engine_normalizes_weights() {
        let mut defaulted = EntryInference::default();
        let mut built = EntryInference::new(&InferenceConfig::default()).unwrap();
        for engine in [&mut defaulted, &mut built] {
            engine
                .set_prior_weights(vec![("A".into(), 1.0), ("B".into(), 1.0)])
                .unwrap();
            engine.update_evidence("A", 1.0, 1.0, 1.0, "X").unwrap();
        }
        // full evidence must aggregate to exactly 1 once the weights sum to one
        assert!((defaulted.likelihood("A").unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(defaulted.posterior_probabilities(), built.posterior_probabilities());
    }

    #[test]
    fn tiny_evidence_still_beats_none() {
        let mut engine = engine(&[("A", 1.0), ("B", 1.0)]);
        engine.update_evidence("A", 1e-7, 1e-7, 1e-7, "X").unwrap();
        engine.update_evidence("B", 0.0, 0.0, 0.0, "X").unwrap();
        assert!(engine.posterior_probability("A").unwrap() > engine.posterior_probability("B").unwrap());
    }

    #[test]
    fn all_zero_evidence_falls_back_to_priors() {
        let mut engine = engine(&[("A", 1.0), ("B", 3.0)]);
        engine.update_evidence("A", 0.0, 0.0, 0.0, "X").unwrap();
        engine.update_evidence("B", 0.0, 0.0, 0.0, "X").unwrap();
        assert!((total(&engine) - 1.0).abs() < 1e-12);
        assert!((engine.posterior_probability("A").unwrap() - engine.prior("A").unwrap()).abs() < 1e-12);
    }

    #[test]
    fn update_before_priors_fails() {
        let mut engine = EntryInference::default();
        assert_eq!(
            engine.update_evidence("A", 0.5, 0.5, 0.5, "X"),
            Err(InferenceError::PriorsNotSet)
        );
        assert!(engine.posterior_probabilities().is_empty());
    }

    #[test]
    fn stronger_evidence_wins_with_equal_priors() {
        let mut engine = engine(&[("A", 500.0), ("B", 500.0)]);
        engine.update_evidence("A", 0.8, 0.9, 0.7, "X").unwrap();
        engine.update_evidence("B", 0.4, 0.5, 0.3, "X").unwrap();
        let a = engine.posterior_probability("A").unwrap();
        let b = engine.posterior_probability("B").unwrap();
        assert!(a > b);
        assert_eq!(engine.ranked_entries(1)[0].fingerprint, "A");
        assert_eq!(engine.state(), InferenceState::Updating(2));
    }

    #[test]
    fn unobserved_candidates_keep_prior_proportional_mass() {
        let mut engine = engine(&[("A", 100.0), ("B", 200.0), ("C", 300.0)]);
        engine.update_evidence("A", 1.0, 1.0, 1.0, "X").unwrap();
        let b = engine.posterior_probability("B").unwrap();
        let c = engine.posterior_probability("C").unwrap();
        let ratio = engine.prior("B").unwrap() / engine.prior("C").unwrap();
        assert!((b / c - ratio).abs() < 1e-9);
    }

    #[test]
    fn cache_is_invalidated_by_updates() {
        let mut engine = engine(&[("A", 1.0), ("B", 1.0)]);
        let before = engine.posterior_probability("A").unwrap();
        engine.update_evidence("A", 1.0, 1.0, 1.0, "X").unwrap();
        let after = engine.posterior_probability("A").unwrap();
        assert!(after > before);
    }

    #[test]
    fn patched_exit_rescoring_matches_full_recompute() {
        let good = Likelihood::new(0.9, 0.8, 0.7).unwrap();
        let weak = Likelihood::new(0.1, 0.2, 0.3).unwrap();

        let mut patched = engine(&[("A", 1.0), ("B", 2.0), ("C", 3.0)]);
        patched.update_evidence("C", 0.5, 0.5, 0.5, "X1").unwrap();
        // warm the cache so the batch is applied as a patch
        let _ = patched.posterior_probabilities();
        patched.observe_exit("X2", &[("A", good), ("B", weak)]).unwrap();

        let mut replayed = engine(&[("A", 1.0), ("B", 2.0), ("C", 3.0)]);
        replayed.update_evidence("C", 0.5, 0.5, 0.5, "X1").unwrap();
        replayed.update_evidence("A", 0.9, 0.8, 0.7, "X2").unwrap();
        replayed.update_evidence("B", 0.1, 0.2, 0.3, "X2").unwrap();

        for (fp, p) in replayed.posterior_probabilities() {
            assert!((patched.posterior_probability(&fp).unwrap() - p).abs() < 1e-12);
        }
        assert_eq!(patched.exits_observed().len(), 2);
        assert_eq!(patched.observations("A").unwrap()[0].exit, "X2");
    }

    #[test]
    fn entropy_spans_uniform_to_concentrated() {
        let mut engine = engine(&[("A", 1.0), ("B", 1.0), ("C", 1.0), ("D", 1.0)]);
        assert!((engine.entropy() - 4f64.ln()).abs() < 1e-9);

        for _ in 0..5 {
            engine.update_evidence("A", 1.0, 1.0, 1.0, "X").unwrap();
            for fp in ["B", "C", "D"] {
                engine.update_evidence(fp, 0.0, 0.0, 0.0, "X").unwrap();
            }
        }
        assert!(engine.entropy() < 0.01);
        assert!(engine.posterior_probability("A").unwrap() > 0.99);
    }

    #[test]
    fn rejects_degenerate_weights() {
        let config = InferenceConfig {
            time_weight: 0.0,
            traffic_weight: 0.0,
            stability_weight: 0.0,
            smoothing: 0.01,
        };
        assert!(matches!(
            EntryInference::new(&config),
            Err(InferenceError::InvalidWeights(_))
        ));
    }

    #[test]
    fn engine_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EntryInference>();
    }

    proptest! {
        #[test]
        fn posterior_always_normalized(
            weights in proptest::collection::vec(0.0f64..10_000.0, 1..12),
            updates in proptest::collection::vec((0usize..12, 0.0f64..=1.0, 0.0f64..=1.0, 0.0f64..=1.0), 0..40),
        ) {
            let mut weights = weights;
            weights[0] += 1.0;
            let names: Vec<String> = (0..weights.len()).map(|i| format!("R{i}")).collect();
            let mut engine = EntryInference::default();
            engine.set_prior_weights(names.iter().cloned().zip(weights.iter().copied()).collect()).unwrap();
            for (i, t, tr, s) in updates {
                let fp = &names[i % names.len()];
                engine.update_evidence(fp, t, tr, s, "X").unwrap();
                prop_assert!((total(&engine) - 1.0).abs() <= 0.01);
            }
            prop_assert!((total(&engine) - 1.0).abs() <= 0.01);
        }

        #[test]
        fn higher_evidence_means_higher_posterior(lo in 0.0f64..0.99, delta in 0.001f64..0.5) {
            let hi = (lo + delta).min(1.0);
            prop_assume!(hi > lo);
            let mut engine = engine(&[("A", 10.0), ("B", 10.0)]);
            engine.update_evidence("A", hi, hi, hi, "X").unwrap();
            engine.update_evidence("B", lo, lo, lo, "X").unwrap();
            prop_assert!(engine.posterior_probability("A").unwrap() > engine.posterior_probability("B").unwrap());
        }

        #[test]
        fn higher_evidence_wins_near_zero(lo in 0.0f64..1e-6, delta in 1e-9f64..1e-6) {
            let hi = lo + delta;
            prop_assume!(hi > lo);
            let mut engine = engine(&[("A", 10.0), ("B", 10.0)]);
            engine.update_evidence("A", hi, hi, hi, "X").unwrap();
            engine.update_evidence("B", lo, lo, lo, "X").unwrap();
            prop_assert!(engine.posterior_probability("A").unwrap() > engine.posterior_probability("B").unwrap());
        }
    }
}

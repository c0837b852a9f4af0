//! Confidence Calculator.
//!
//! Turns accumulated evidence signals into a bounded quality/consistency score. This is
//! not a probability. The score starts from a fixed baseline, never exceeds
//! [MAX_CONFIDENCE], and always travels with an uncertainty margin and an estimated
//! false-positive rate that widen as evidence shrinks.
use serde::Serialize;
use std::fmt;

use crate::config::{ConfidenceConfig, ConfigError};

pub const BASELINE_CONFIDENCE: f64 = 0.15;
pub const MAX_CONFIDENCE: f64 = 0.85;

pub const CAVEAT: &str = "Metadata-only, non-identifying estimate: ranks the relative \
plausibility of candidate relays from packet sizes, timing and relay metadata. It does not \
identify any person, and no payload content was inspected.";

const VOLUME_WEIGHT: f64 = 0.40;
const TIMING_WEIGHT: f64 = 0.35;
const OVERLAP_WEIGHT: f64 = 0.15;
const PRIOR_WEIGHT: f64 = 0.10;
const PRIOR_DECAY: f64 = 0.7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Accumulated signals for the leading hypothesis.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EvidenceSignals {
    /// Independent supporting observations, e.g. packets in matched flows
    pub volume: u64,
    /// Timing similarity in [0, 1]
    pub timing_similarity: Option<f64>,
    /// Session overlap in [0, 1]
    pub session_overlap: Option<f64>,
    /// Distinct independent evidence categories present
    pub diversity: u32,
}

impl EvidenceSignals {
    pub fn is_empty(&self) -> bool {
        self.volume == 0
            && self.timing_similarity.is_none()
            && self.session_overlap.is_none()
            && self.diversity == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SubScores {
    pub volume: f64,
    pub timing: f64,
    pub overlap: f64,
    pub prior: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConfidenceResult {
    pub score: f64,
    pub level: ConfidenceLevel,
    pub uncertainty_margin: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub false_positive_rate: f64,
    pub sub_scores: SubScores,
    pub contributing_factors: Vec<String>,
    pub limiting_factors: Vec<String>,
    /// Set when no signals were supplied and the baseline was returned.
    pub empty_evidence: bool,
    pub caveat: String,
}

#[derive(Clone, Debug, Default)]
pub struct ConfidenceCalculator {
    config: ConfidenceConfig,
}

impl ConfidenceCalculator {
    pub fn new(config: &ConfidenceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
        })
    }

    pub fn calculate(&self, signals: &EvidenceSignals) -> ConfidenceResult {
        if signals.is_empty() {
            log::debug!("Empty evidence set, returning baseline confidence");
            return self.baseline();
        }

        let sub_scores = SubScores {
            volume: volume_score(signals.volume),
            timing: unit_signal("timing similarity", signals.timing_similarity),
            overlap: unit_signal("session overlap", signals.session_overlap),
            prior: prior_term(signals.diversity),
        };
        let weighted = VOLUME_WEIGHT * sub_scores.volume
            + TIMING_WEIGHT * sub_scores.timing
            + OVERLAP_WEIGHT * sub_scores.overlap
            + PRIOR_WEIGHT * sub_scores.prior;
        let score = (BASELINE_CONFIDENCE + (1.0 - BASELINE_CONFIDENCE) * weighted)
            .clamp(0.0, MAX_CONFIDENCE);

        // the level discretizes the weighted average, not the baseline-lifted score
        let level = self.level(weighted);
        let (contributing_factors, limiting_factors) = factors(signals, &sub_scores);
        self.result(score, level, sub_scores, contributing_factors, limiting_factors, false)
    }

    pub fn level(&self, score: f64) -> ConfidenceLevel {
        if score >= self.config.high_threshold {
            ConfidenceLevel::High
        } else if score >= self.config.medium_threshold {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    fn baseline(&self) -> ConfidenceResult {
        let sub_scores = SubScores {
            volume: 0.0,
            timing: 0.0,
            overlap: 0.0,
            prior: 0.0,
        };
        self.result(
            BASELINE_CONFIDENCE,
            self.level(BASELINE_CONFIDENCE),
            sub_scores,
            Vec::new(),
            vec!["no evidence signals were supplied".to_string()],
            true,
        )
    }

    fn result(
        &self,
        score: f64,
        level: ConfidenceLevel,
        sub_scores: SubScores,
        contributing_factors: Vec<String>,
        limiting_factors: Vec<String>,
        empty_evidence: bool,
    ) -> ConfidenceResult {
        let uncertainty_margin = uncertainty_margin(level, sub_scores.volume);
        ConfidenceResult {
            score,
            level,
            uncertainty_margin,
            lower_bound: (score - uncertainty_margin).max(0.0),
            upper_bound: (score + uncertainty_margin).min(MAX_CONFIDENCE),
            false_positive_rate: false_positive_rate(level, sub_scores.volume),
            sub_scores,
            contributing_factors,
            limiting_factors,
            empty_evidence,
            caveat: CAVEAT.to_string(),
        }
    }
}

/// Volume thresholds: none, <1k, <5k, <20k, <50k, 50k and above.
pub fn volume_score(volume: u64) -> f64 {
    match volume {
        0 => 0.0,
        1..=999 => 0.25,
        1_000..=4_999 => 0.50,
        5_000..=19_999 => 0.70,
        20_000..=49_999 => 0.85,
        _ => 1.0,
    }
}

/// Diminishing returns in the number of independent evidence categories.
pub fn prior_term(diversity: u32) -> f64 {
    1.0 - (-PRIOR_DECAY * f64::from(diversity)).exp()
}

/// Half-width of the reported interval; wider for lower levels and thinner evidence.
pub fn uncertainty_margin(level: ConfidenceLevel, volume_score: f64) -> f64 {
    let base = match level {
        ConfidenceLevel::High => 0.08,
        ConfidenceLevel::Medium => 0.12,
        ConfidenceLevel::Low => 0.20,
    };
    base * (2.0 - volume_score.clamp(0.0, 1.0))
}

pub fn false_positive_rate(level: ConfidenceLevel, volume_score: f64) -> f64 {
    let base = match level {
        ConfidenceLevel::High => 0.05,
        ConfidenceLevel::Medium => 0.15,
        ConfidenceLevel::Low => 0.30,
    };
    base * (2.0 - volume_score.clamp(0.0, 1.0))
}

fn unit_signal(name: &str, value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_nan() => {
            log::warn!("Ignoring NaN {name} signal");
            0.0
        }
        Some(v) if !(0.0..=1.0).contains(&v) => {
            log::warn!("Clamping out-of-range {name} signal {v}");
            v.clamp(0.0, 1.0)
        }
        Some(v) => v,
        None => 0.0,
    }
}

fn factors(signals: &EvidenceSignals, sub: &SubScores) -> (Vec<String>, Vec<String>) {
    let mut contributing = Vec::new();
    let mut limiting = Vec::new();

    let volume = format!(
        "evidence volume of {} observations (sub-score {:.2})",
        signals.volume, sub.volume
    );
    if sub.volume >= 0.5 {
        contributing.push(volume);
    } else {
        limiting.push(volume);
    }

    match signals.timing_similarity {
        Some(_) if sub.timing >= 0.5 => {
            contributing.push(format!("timing similarity {:.2}", sub.timing))
        }
        Some(_) => limiting.push(format!("weak timing similarity {:.2}", sub.timing)),
        None => limiting.push("no timing correlation available".to_string()),
    }

    match signals.session_overlap {
        Some(_) if sub.overlap >= 0.5 => {
            contributing.push(format!("session overlap {:.2}", sub.overlap))
        }
        Some(_) => limiting.push(format!("limited session overlap {:.2}", sub.overlap)),
        None => limiting.push("no session overlap measured".to_string()),
    }

    if signals.diversity >= 2 {
        contributing.push(format!(
            "{} independent evidence categories",
            signals.diversity
        ));
    } else {
        limiting.push(format!(
            "only {} independent evidence category",
            signals.diversity
        ));
    }

    (contributing, limiting)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strong() -> EvidenceSignals {
        EvidenceSignals {
            volume: 80_000,
            timing_similarity: Some(1.0),
            session_overlap: Some(1.0),
            diversity: 6,
        }
    }

    #[test]
    fn empty_evidence_returns_baseline() {
        let result = ConfidenceCalculator::default().calculate(&EvidenceSignals::default());
        assert!(result.empty_evidence);
        assert_eq!(result.score, BASELINE_CONFIDENCE);
        assert_eq!(result.level, ConfidenceLevel::Low);
        assert!(!result.caveat.is_empty());
    }

    #[test]
    fn volume_thresholds() {
        assert_eq!(volume_score(0), 0.0);
        assert_eq!(volume_score(999), 0.25);
        assert_eq!(volume_score(1_000), 0.50);
        assert_eq!(volume_score(4_999), 0.50);
        assert_eq!(volume_score(5_000), 0.70);
        assert_eq!(volume_score(20_000), 0.85);
        assert_eq!(volume_score(49_999), 0.85);
        assert_eq!(volume_score(50_000), 1.0);
    }

    #[test]
    fn strong_evidence_is_capped() {
        let result = ConfidenceCalculator::default().calculate(&strong());
        assert_eq!(result.score, MAX_CONFIDENCE);
        assert_eq!(result.level, ConfidenceLevel::High);
        assert!(result.upper_bound <= MAX_CONFIDENCE);
        assert!(result.limiting_factors.is_empty());
    }

    #[test]
    fn thin_evidence_widens_margin_and_false_positives() {
        let calc = ConfidenceCalculator::default();
        let rich = calc.calculate(&EvidenceSignals {
            volume: 1_000,
            timing_similarity: Some(0.2),
            session_overlap: Some(0.2),
            diversity: 1,
        });
        let thin = calc.calculate(&EvidenceSignals {
            volume: 10,
            timing_similarity: Some(0.2),
            session_overlap: Some(0.2),
            diversity: 1,
        });
        assert_eq!(rich.level, thin.level);
        assert!(thin.uncertainty_margin > rich.uncertainty_margin);
        assert!(thin.false_positive_rate > rich.false_positive_rate);
    }

    #[test]
    fn prior_term_has_diminishing_returns() {
        let gains: Vec<f64> = (0..5).map(|d| prior_term(d + 1) - prior_term(d)).collect();
        assert!(gains.windows(2).all(|w| w[1] < w[0]));
        assert_eq!(prior_term(0), 0.0);
    }

    #[test]
    fn levels_follow_configured_thresholds() {
        let calc = ConfidenceCalculator::new(&ConfidenceConfig {
            medium_threshold: 0.3,
            high_threshold: 0.6,
        })
        .unwrap();
        assert_eq!(calc.level(0.29), ConfidenceLevel::Low);
        assert_eq!(calc.level(0.3), ConfidenceLevel::Medium);
        assert_eq!(calc.level(0.6), ConfidenceLevel::High);
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        let inverted = ConfidenceConfig {
            medium_threshold: 0.8,
            high_threshold: 0.6,
        };
        assert!(matches!(
            ConfidenceCalculator::new(&inverted),
            Err(ConfigError::ValidationError(_))
        ));
        let unreachable = ConfidenceConfig {
            medium_threshold: 0.5,
            high_threshold: 0.95,
        };
        assert!(ConfidenceCalculator::new(&unreachable).is_err());
    }

    #[test]
    fn level_comes_from_weighted_average() {
        // volume 0.5, timing 0.5, overlap 0.2, prior 0 -> weighted 0.405
        let just_below = ConfidenceCalculator::default().calculate(&EvidenceSignals {
            volume: 1_000,
            timing_similarity: Some(0.5),
            session_overlap: Some(0.2),
            diversity: 0,
        });
        assert_eq!(just_below.level, ConfidenceLevel::Low);

        // volume 0.5, timing 0.6, overlap 0.1 -> weighted 0.425, lifted score ~0.51
        let lifted_past_medium = ConfidenceCalculator::default().calculate(&EvidenceSignals {
            volume: 1_000,
            timing_similarity: Some(0.6),
            session_overlap: Some(0.1),
            diversity: 0,
        });
        assert!(lifted_past_medium.score >= 0.5);
        assert_eq!(lifted_past_medium.level, ConfidenceLevel::Low);

        // volume 0.5, timing 0.8, overlap 0.2 -> weighted 0.51
        let medium = ConfidenceCalculator::default().calculate(&EvidenceSignals {
            volume: 1_000,
            timing_similarity: Some(0.8),
            session_overlap: Some(0.2),
            diversity: 0,
        });
        assert_eq!(medium.level, ConfidenceLevel::Medium);
    }

    #[test]
    fn out_of_range_signals_are_clamped() {
        let result = ConfidenceCalculator::default().calculate(&EvidenceSignals {
            volume: 100,
            timing_similarity: Some(3.0),
            session_overlap: Some(f64::NAN),
            diversity: 1,
        });
        assert_eq!(result.sub_scores.timing, 1.0);
        assert_eq!(result.sub_scores.overlap, 0.0);
    }

    proptest! {
        #[test]
        fn score_is_always_bounded(
            volume in any::<u64>(),
            timing in proptest::option::of(-1.0f64..2.0),
            overlap in proptest::option::of(-1.0f64..2.0),
            diversity in any::<u32>(),
        ) {
            let result = ConfidenceCalculator::default().calculate(&EvidenceSignals {
                volume,
                timing_similarity: timing,
                session_overlap: overlap,
                diversity,
            });
            prop_assert!(result.score >= 0.0 && result.score <= MAX_CONFIDENCE);
            prop_assert!(result.lower_bound <= result.score && result.score <= result.upper_bound);
            prop_assert!(result.false_positive_rate > 0.0);
        }
    }
}

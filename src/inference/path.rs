//! Path Plausibility Scorer.
//!
//! Scores (guard, middle, exit) triples from relay metadata alone. The score is a pure
//! function of the three relays: uptime/overlap, bandwidth and role components are
//! combined, damped by a diversity penalty for shared infrastructure, and remapped onto
//! [0.05, 0.98].
//!
//! The curve breakpoints are defaults, not law. What callers can rely on is their shape:
//! every curve is monotonic non-decreasing and saturates.
use serde::Serialize;
use std::cmp::Ordering;

use super::relay::{RelayFlag, RelayInfo, RelayRole};

pub const MIN_PATH_SCORE: f64 = 0.05;
pub const MAX_PATH_SCORE: f64 = 0.98;
pub const DIVERSITY_FLOOR: f64 = 0.25;

const OVERLAP_WEIGHTS: [f64; 3] = [0.35, 0.35, 0.30];
const OVERLAP_SHARE: f64 = 0.6;
const BANDWIDTH_WEIGHTS: [f64; 3] = [0.35, 0.25, 0.40];
const ROLE_WEIGHTS: [f64; 3] = [0.35, 0.25, 0.40];
const COMPOSITE_WEIGHTS: (f64, f64, f64) = (0.28, 0.42, 0.30);
const ROLE_SCORE_FLOOR: f64 = 0.05;

const BANDWIDTH_SPREAD_ALLOWANCE: f64 = 0.15;
const BANDWIDTH_SPREAD_FLOOR: f64 = 0.75;
const BANDWIDTH_TAIL_CEILING: f64 = 0.99;

const SAME_AS_GUARD_EXIT: f64 = 0.65;
const SAME_COUNTRY_GUARD_EXIT: f64 = 0.70;
const SAME_AS_ADJACENT: f64 = 0.85;
const SAME_COUNTRY_ADJACENT: f64 = 0.90;
const SAME_FAMILY_GUARD_EXIT: f64 = 0.50;

/// Monotonic piecewise-linear curve, flat beyond its first and last breakpoints.
#[derive(Clone, Debug, PartialEq)]
pub struct PiecewiseCurve {
    points: Vec<(f64, f64)>,
}

impl PiecewiseCurve {
    /// Returns `None` unless there are at least two points with strictly increasing x and
    /// non-decreasing y.
    pub fn new(points: Vec<(f64, f64)>) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        let ordered = points
            .windows(2)
            .all(|pair| pair[0].0 < pair[1].0 && pair[0].1 <= pair[1].1);
        if !ordered || points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return None;
        }
        Some(Self { points })
    }

    fn from_static(points: &[(f64, f64)]) -> Self {
        Self {
            points: points.to_vec(),
        }
    }

    pub fn eval(&self, x: f64) -> f64 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];
        if x.is_nan() || x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }
        for pair in self.points.windows(2) {
            let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
            if x <= x1 {
                return y0 + (y1 - y0) * (x - x0) / (x1 - x0);
            }
        }
        last.1
    }

    pub fn last_point(&self) -> (f64, f64) {
        self.points[self.points.len() - 1]
    }
}

/// Per-component breakdown of one triple's score.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub uptime: f64,
    pub bandwidth: f64,
    pub role: f64,
    pub diversity_penalty: f64,
    pub raw_composite: f64,
    pub score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PathCandidate {
    pub guard: String,
    pub middle: String,
    pub exit: String,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// Scoring curves. `Default` carries the documented default breakpoints.
#[derive(Clone, Debug, PartialEq)]
pub struct PathScorer {
    /// Weighted pairwise overlap, days
    pub overlap_curve: PiecewiseCurve,
    /// Mean individual active duration, days
    pub uptime_curve: PiecewiseCurve,
    /// Advertised bandwidth, MB/s
    pub bandwidth_curve: PiecewiseCurve,
    /// Raw composite to final score
    pub remap_curve: PiecewiseCurve,
}

impl Default for PathScorer {
    fn default() -> Self {
        Self {
            overlap_curve: PiecewiseCurve::from_static(&[
                (0.0, 0.0),
                (1.0, 0.10),
                (7.0, 0.35),
                (30.0, 0.60),
                (90.0, 0.80),
                (180.0, 0.90),
                (365.0, 0.97),
            ]),
            uptime_curve: PiecewiseCurve::from_static(&[
                (0.0, 0.0),
                (1.0, 0.05),
                (7.0, 0.25),
                (30.0, 0.55),
                (90.0, 0.75),
                (180.0, 0.88),
                (365.0, 0.95),
                (730.0, 0.98),
            ]),
            bandwidth_curve: PiecewiseCurve::from_static(&[
                (0.0, 0.01),
                (0.1, 0.08),
                (1.0, 0.25),
                (5.0, 0.50),
                (10.0, 0.65),
                (25.0, 0.78),
                (50.0, 0.87),
                (100.0, 0.93),
            ]),
            remap_curve: PiecewiseCurve::from_static(&[
                (0.0, 0.05),
                (0.2, 0.10),
                (0.4, 0.30),
                (0.6, 0.62),
                (0.8, 0.88),
                (1.0, 0.98),
            ]),
        }
    }
}

impl PathScorer {
    /// Uptime/overlap component: pairwise overlap of the active windows and the relays'
    /// own active durations, each through its curve.
    pub fn uptime_score(&self, guard: &RelayInfo, middle: &RelayInfo, exit: &RelayInfo) -> f64 {
        let overlap = OVERLAP_WEIGHTS[0] * guard.overlap_days(middle)
            + OVERLAP_WEIGHTS[1] * middle.overlap_days(exit)
            + OVERLAP_WEIGHTS[2] * guard.overlap_days(exit);

        let durations = [guard.active_days(), middle.active_days(), exit.active_days()];
        let typical = if durations.iter().any(|&d| d <= 0.0) {
            durations.iter().sum::<f64>() / 3.0
        } else {
            durations.iter().product::<f64>().cbrt()
        };

        OVERLAP_SHARE * self.overlap_curve.eval(overlap)
            + (1.0 - OVERLAP_SHARE) * self.uptime_curve.eval(typical)
    }

    /// Single relay bandwidth in (0, 1): near zero when unknown, never reaching one.
    pub fn relay_bandwidth_score(&self, bytes_per_sec: u64) -> f64 {
        let mbps = bytes_per_sec as f64 / 1_000_000.0;
        let (last_x, last_y) = self.bandwidth_curve.last_point();
        if mbps <= last_x {
            return self.bandwidth_curve.eval(mbps);
        }
        last_y + (BANDWIDTH_TAIL_CEILING - last_y) * (1.0 - last_x / mbps)
    }

    /// Weighted geometric mean of the three relay scores, damped when they are unequal.
    pub fn bandwidth_score(&self, guard: &RelayInfo, middle: &RelayInfo, exit: &RelayInfo) -> f64 {
        let scores = [
            self.relay_bandwidth_score(guard.bandwidth),
            self.relay_bandwidth_score(middle.bandwidth),
            self.relay_bandwidth_score(exit.bandwidth),
        ];
        let log_mean: f64 = scores
            .iter()
            .zip(BANDWIDTH_WEIGHTS)
            .map(|(s, w)| w * s.ln())
            .sum();
        let combined = log_mean.exp();

        let mean = scores.iter().sum::<f64>() / 3.0;
        let spread = (scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / 3.0).sqrt();
        let damping = if spread > BANDWIDTH_SPREAD_ALLOWANCE {
            (1.0 - (spread - BANDWIDTH_SPREAD_ALLOWANCE)).max(BANDWIDTH_SPREAD_FLOOR)
        } else {
            1.0
        };
        combined * damping
    }

    /// Weighted harmonic mean of per-role flag points, so one weak link dominates.
    pub fn role_score(&self, guard: &RelayInfo, middle: &RelayInfo, exit: &RelayInfo) -> f64 {
        let points = [
            role_points(guard, RelayRole::Guard),
            role_points(middle, RelayRole::Middle),
            role_points(exit, RelayRole::Exit),
        ];
        let denominator: f64 = points.iter().zip(ROLE_WEIGHTS).map(|(p, w)| w / p).sum();
        1.0 / denominator
    }

    /// Scores one triple.
    pub fn score(&self, guard: &RelayInfo, middle: &RelayInfo, exit: &RelayInfo) -> ScoreBreakdown {
        let uptime = self.uptime_score(guard, middle, exit);
        let bandwidth = self.bandwidth_score(guard, middle, exit);
        let role = self.role_score(guard, middle, exit);
        let diversity_penalty = diversity_penalty(guard, middle, exit);

        let (wu, wb, wr) = COMPOSITE_WEIGHTS;
        let raw_composite = (wu * uptime + wb * bandwidth + wr * role) * diversity_penalty;
        let score = self
            .remap_curve
            .eval(raw_composite)
            .clamp(MIN_PATH_SCORE, MAX_PATH_SCORE);

        ScoreBreakdown {
            uptime,
            bandwidth,
            role,
            diversity_penalty,
            raw_composite,
            score,
        }
    }

    /// Scores every triple drawn from the pools that does not reuse a relay, best first.
    ///
    /// Ties fall back to the uptime component, then bandwidth, then fingerprints.
    pub fn rank_paths(
        &self,
        guards: &[&RelayInfo],
        middles: &[&RelayInfo],
        exits: &[&RelayInfo],
        top_n: Option<usize>,
    ) -> Vec<PathCandidate> {
        let mut candidates = Vec::new();
        for guard in guards {
            for middle in middles {
                if middle.fingerprint == guard.fingerprint {
                    continue;
                }
                for exit in exits {
                    if exit.fingerprint == guard.fingerprint
                        || exit.fingerprint == middle.fingerprint
                    {
                        continue;
                    }
                    let breakdown = self.score(guard, middle, exit);
                    candidates.push(PathCandidate {
                        guard: guard.fingerprint.clone(),
                        middle: middle.fingerprint.clone(),
                        exit: exit.fingerprint.clone(),
                        score: breakdown.score,
                        breakdown,
                    });
                }
            }
        }
        log::debug!(
            "Scored {} triples from {}x{}x{} pools",
            candidates.len(),
            guards.len(),
            middles.len(),
            exits.len()
        );

        candidates.sort_by(compare_candidates);
        if let Some(n) = top_n {
            candidates.truncate(n);
        }
        candidates
    }
}

/// Score with the default curves.
pub fn path_plausibility(guard: &RelayInfo, middle: &RelayInfo, exit: &RelayInfo) -> f64 {
    PathScorer::default().score(guard, middle, exit).score
}

fn compare_candidates(a: &PathCandidate, b: &PathCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.breakdown.uptime.total_cmp(&a.breakdown.uptime))
        .then_with(|| b.breakdown.bandwidth.total_cmp(&a.breakdown.bandwidth))
        .then_with(|| a.guard.cmp(&b.guard))
        .then_with(|| a.middle.cmp(&b.middle))
        .then_with(|| a.exit.cmp(&b.exit))
}

/// Additive flag points for a relay in a role, in [ROLE_SCORE_FLOOR, 1].
pub fn role_points(relay: &RelayInfo, role: RelayRole) -> f64 {
    let role_flag = match role {
        RelayRole::Guard => Some(RelayFlag::Guard),
        RelayRole::Exit => Some(RelayFlag::Exit),
        RelayRole::Middle => None,
    };
    let table: &[(RelayFlag, f64)] = match role_flag {
        Some(_) => &[
            (RelayFlag::Stable, 0.20),
            (RelayFlag::Fast, 0.15),
            (RelayFlag::Valid, 0.10),
            (RelayFlag::Running, 0.05),
        ],
        None => &[
            (RelayFlag::Fast, 0.35),
            (RelayFlag::Stable, 0.30),
            (RelayFlag::Valid, 0.20),
            (RelayFlag::Running, 0.15),
        ],
    };

    let mut points: f64 = table
        .iter()
        .filter(|(flag, _)| relay.has_flag(*flag))
        .map(|(_, value)| value)
        .sum();
    if let Some(flag) = role_flag {
        if relay.has_flag(flag) {
            points += 0.50;
        }
    }
    points.clamp(ROLE_SCORE_FLOOR, 1.0)
}

/// Multiplicative penalty for shared AS, country or family, floored at [DIVERSITY_FLOOR].
///
/// Sharing one AS and country across all three hops without a family link multiplies out
/// to about 0.266, above the floor. The raw composite of such a path is therefore only
/// cut to roughly a quarter; the gap below a quarter of the diverse score comes from the
/// remap curve, which is steeper in its middle band than near zero.
pub fn diversity_penalty(guard: &RelayInfo, middle: &RelayInfo, exit: &RelayInfo) -> f64 {
    let mut penalty = 1.0;

    if same_asn(guard, exit) {
        penalty *= SAME_AS_GUARD_EXIT;
    }
    if same_country(guard, exit) {
        penalty *= SAME_COUNTRY_GUARD_EXIT;
    }
    for (a, b) in [(guard, middle), (middle, exit)] {
        if same_asn(a, b) {
            penalty *= SAME_AS_ADJACENT;
        }
        if same_country(a, b) {
            penalty *= SAME_COUNTRY_ADJACENT;
        }
    }
    if guard.shares_family(exit) {
        penalty *= SAME_FAMILY_GUARD_EXIT;
    }

    f64::max(penalty, DIVERSITY_FLOOR)
}

fn same_asn(a: &RelayInfo, b: &RelayInfo) -> bool {
    matches!((a.asn, b.asn), (Some(x), Some(y)) if x == y)
}

fn same_country(a: &RelayInfo, b: &RelayInfo) -> bool {
    match (a.country.as_deref(), b.country.as_deref()) {
        (Some(x), Some(y)) => x.eq_ignore_ascii_case(y),
        _ => false,
    }
}

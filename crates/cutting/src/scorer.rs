//! Multi-objective solution scoring.
//!
//! Seven objectives are each normalized to `[0, 100]` with a piecewise
//! curve and combined with weights that must sum to 1. Scoring is a pure
//! function of the solution and the weights; the only write is the explicit
//! [`MultiObjectiveScorer::score_and_cache`].

use std::cmp::Ordering;
use std::fmt::Write;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use kerfnest_core::{Error, ManufacturingMetrics, Result, ScoreBreakdown};
use kerfnest_d2::{NestingSolution, SolutionRanker};

use crate::config::CuttingConfig;
use crate::metrics::estimate_metrics;

/// Allowed deviation of the weight sum from 1.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// Scores closer than this compare as equal.
pub const SCORE_EPSILON: f64 = 0.1;

/// Objective weights. Construct through [`ScoringWeights::new`] or a preset
/// so the sum is always validated.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScoringWeights {
    utilization: f64,
    cut_length: f64,
    pierce_count: f64,
    machine_time: f64,
    thermal_risk: f64,
    remnant_value: f64,
    total_cost: f64,
}

impl Default for ScoringWeights {
    /// Material waste first, then machine effort.
    fn default() -> Self {
        Self {
            utilization: 0.35,
            cut_length: 0.20,
            pierce_count: 0.15,
            machine_time: 0.15,
            thermal_risk: 0.05,
            remnant_value: 0.05,
            total_cost: 0.05,
        }
    }
}

impl ScoringWeights {
    /// Validated weights: each non-negative and finite, sum within
    /// [`WEIGHT_SUM_TOLERANCE`] of 1. Weights are never renormalized.
    pub fn new(
        utilization: f64,
        cut_length: f64,
        pierce_count: f64,
        machine_time: f64,
        thermal_risk: f64,
        remnant_value: f64,
        total_cost: f64,
    ) -> Result<Self> {
        let weights = Self {
            utilization,
            cut_length,
            pierce_count,
            machine_time,
            thermal_risk,
            remnant_value,
            total_cost,
        };
        weights.validate()?;
        Ok(weights)
    }

    pub fn maximize_profit() -> Self {
        Self {
            utilization: 0.30,
            cut_length: 0.20,
            pierce_count: 0.15,
            machine_time: 0.20,
            thermal_risk: 0.05,
            remnant_value: 0.05,
            total_cost: 0.05,
        }
    }

    pub fn maximize_utilization() -> Self {
        Self {
            utilization: 0.8,
            cut_length: 0.05,
            pierce_count: 0.05,
            machine_time: 0.05,
            thermal_risk: 0.025,
            remnant_value: 0.025,
            total_cost: 0.0,
        }
    }

    pub fn minimize_time() -> Self {
        Self {
            utilization: 0.2,
            cut_length: 0.3,
            pierce_count: 0.2,
            machine_time: 0.25,
            thermal_risk: 0.025,
            remnant_value: 0.0,
            total_cost: 0.025,
        }
    }

    /// Weights in canonical objective order.
    pub fn as_array(&self) -> [f64; 7] {
        [
            self.utilization,
            self.cut_length,
            self.pierce_count,
            self.machine_time,
            self.thermal_risk,
            self.remnant_value,
            self.total_cost,
        ]
    }

    pub fn sum(&self) -> f64 {
        self.as_array().iter().sum()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(w) = self.as_array().iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(Error::ConfigError(format!(
                "scoring weights must be non-negative, got {}",
                w
            )));
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(Error::ConfigError(format!(
                "scoring weights must sum to 1.0, got {:.4}",
                sum
            )));
        }
        Ok(())
    }
}

/// Utilization percent to score. Full marks come slowly above 90%.
pub fn utilization_curve(utilization: f64) -> f64 {
    let u = utilization;
    let score = if u >= 90.0 {
        98.0 + (u - 90.0) * 0.2
    } else if u >= 80.0 {
        90.0 + (u - 80.0) * 0.8
    } else if u >= 70.0 {
        70.0 + (u - 70.0) * 2.0
    } else if u >= 60.0 {
        40.0 + (u - 60.0) * 3.0
    } else {
        u * 0.67
    };
    score.clamp(0.0, 100.0)
}

/// Cut length relative to `4 * sqrt(part_area)`, the perimeter of one square
/// holding all parts.
pub fn cut_length_curve(cut_length: f64, part_area: f64) -> f64 {
    if part_area <= 0.0 {
        return 0.0;
    }
    let ratio = cut_length / (4.0 * part_area.sqrt()).max(1.0);
    let score = if ratio <= 1.5 {
        100.0
    } else if ratio <= 2.5 {
        100.0 - (ratio - 1.5) * 40.0
    } else if ratio <= 4.0 {
        60.0 - (ratio - 2.5) * 20.0
    } else {
        30.0 - (ratio - 4.0) * 10.0
    };
    score.clamp(0.0, 100.0)
}

/// Five points off for every pierce beyond one per part.
pub fn pierce_curve(pierces: usize, parts: usize) -> f64 {
    if parts == 0 {
        return 0.0;
    }
    let extra = pierces.saturating_sub(parts) as f64;
    (100.0 - extra * 5.0).clamp(0.0, 100.0)
}

/// Machine time against an expectation of 60 s per 1000 mm² of parts.
pub fn machine_time_curve(seconds: f64, part_area: f64) -> f64 {
    if seconds <= 0.0 {
        return 0.0;
    }
    let expected = part_area / 1000.0 * 60.0;
    let ratio = seconds / expected.max(1.0);
    let score = if ratio <= 0.8 {
        100.0
    } else if ratio <= 1.2 {
        100.0 - (ratio - 0.8) * 125.0
    } else {
        50.0 - (ratio - 1.2) * 25.0
    };
    score.clamp(0.0, 100.0)
}

/// Cost per mm² of parts. An unknown (zero) cost is neutral.
pub fn cost_curve(total_cost: f64, part_area: f64) -> f64 {
    if total_cost <= 0.0 {
        return 50.0;
    }
    let per_area = total_cost / part_area.max(1.0);
    let score = if per_area <= 0.001 {
        100.0
    } else if per_area <= 0.002 {
        100.0 - (per_area - 0.001) * 50_000.0
    } else {
        50.0 - (per_area - 0.002) * 25_000.0
    };
    score.clamp(0.0, 100.0)
}

/// Weighted multi-objective scorer. Defaults to profit-oriented weights.
#[derive(Debug, Clone)]
pub struct MultiObjectiveScorer {
    weights: ScoringWeights,
    cutting: CuttingConfig,
}

impl Default for MultiObjectiveScorer {
    fn default() -> Self {
        Self::maximize_profit()
    }
}

impl MultiObjectiveScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self {
            weights,
            cutting: CuttingConfig::default(),
        }
    }

    /// Profit-oriented weights.
    pub fn maximize_profit() -> Self {
        Self::new(ScoringWeights::maximize_profit())
    }

    /// Machine and material settings used when a solution carries no metrics.
    pub fn with_cutting_config(mut self, cutting: CuttingConfig) -> Self {
        self.cutting = cutting;
        self
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Metrics attached to the solution, or a fresh estimate.
    fn metrics(&self, solution: &NestingSolution) -> ManufacturingMetrics {
        solution
            .metrics()
            .cloned()
            .unwrap_or_else(|| estimate_metrics(solution, &self.cutting))
    }

    /// Per-objective scores and the weighted total.
    pub fn breakdown(&self, solution: &NestingSolution) -> ScoreBreakdown {
        let metrics = self.metrics(solution);
        self.breakdown_for(solution, &metrics)
    }

    fn breakdown_for(&self, solution: &NestingSolution, metrics: &ManufacturingMetrics) -> ScoreBreakdown {
        // placed plus failed, the area the job asked for
        let part_area = solution.used_area()
            + solution
                .failed_parts()
                .iter()
                .map(|f| f.polygon.area())
                .sum::<f64>();

        let mut breakdown = ScoreBreakdown {
            utilization: utilization_curve(solution.utilization()),
            cut_length: cut_length_curve(metrics.cut_length, part_area),
            pierce_count: pierce_curve(metrics.pierce_count, solution.placed().len()),
            machine_time: machine_time_curve(metrics.machine_time(), part_area),
            thermal_risk: (100.0 * (1.0 - metrics.thermal_risk)).clamp(0.0, 100.0),
            remnant_value: (100.0 * metrics.remnant_value).clamp(0.0, 100.0),
            cost: cost_curve(metrics.total_cost, part_area),
            total: 0.0,
        };
        breakdown.total = breakdown
            .components()
            .iter()
            .zip(self.weights.as_array())
            .map(|((_, score), weight)| score * weight)
            .sum::<f64>()
            .clamp(0.0, 100.0);
        breakdown
    }

    /// Weighted score in `[0, 100]`. Does not touch the solution.
    pub fn score(&self, solution: &NestingSolution) -> f64 {
        self.breakdown(solution).total
    }

    /// Scores the solution and stores its metrics and breakdown on it.
    pub fn score_and_cache(&self, solution: &mut NestingSolution) -> f64 {
        let metrics = self.metrics(solution);
        let breakdown = self.breakdown_for(solution, &metrics);
        let total = breakdown.total;
        solution.set_metrics(metrics);
        solution.cache_breakdown(breakdown);
        total
    }

    /// `Greater` when `a` scores better than `b` by at least [`SCORE_EPSILON`].
    pub fn compare(&self, a: &NestingSolution, b: &NestingSolution) -> Ordering {
        let (sa, sb) = (self.score(a), self.score(b));
        if (sa - sb).abs() < SCORE_EPSILON {
            Ordering::Equal
        } else if sa > sb {
            Ordering::Greater
        } else {
            Ordering::Less
        }
    }

    /// Human-readable table of sub-scores and their weighted contributions.
    pub fn explain(&self, solution: &NestingSolution) -> String {
        let breakdown = self.breakdown(solution);
        let mut out = String::new();
        let _ = writeln!(out, "score {:.1}/100", breakdown.total);
        for ((name, score), weight) in breakdown.components().iter().zip(self.weights.as_array()) {
            let _ = writeln!(
                out,
                "  {:<14} {:>6.1} x {:.3} = {:>5.1}",
                name,
                score,
                weight,
                score * weight
            );
        }
        let (weakest, score) = breakdown.weakest();
        let _ = write!(out, "weakest: {} ({:.1})", weakest, score);
        out
    }
}

impl SolutionRanker for MultiObjectiveScorer {
    fn compare(&self, a: &NestingSolution, b: &NestingSolution) -> Ordering {
        MultiObjectiveScorer::compare(self, a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use kerfnest_core::SheetConstraints;
    use kerfnest_d2::{PlacedPart, Polygon};
    use std::sync::Arc;

    fn layout(count: usize, size: f64) -> NestingSolution {
        let part = Arc::new(Polygon::rectangle("p", size, size));
        let placed = (0..count)
            .map(|i| PlacedPart::new(Arc::clone(&part), 5.0 + i as f64 * (size + 2.0), 5.0, 0.0))
            .collect();
        NestingSolution::new(SheetConstraints::new(1000.0, 500.0)).with_placed(placed)
    }

    #[test]
    fn test_weight_presets_are_valid() {
        for weights in [
            ScoringWeights::default(),
            ScoringWeights::maximize_profit(),
            ScoringWeights::maximize_utilization(),
            ScoringWeights::minimize_time(),
        ] {
            assert!(weights.validate().is_ok());
            assert_relative_eq!(weights.sum(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_weight_sum_validation() {
        assert!(ScoringWeights::new(0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0).is_err());
        assert!(ScoringWeights::new(0.5, 0.5, 0.5, 0.0, 0.0, 0.0, 0.0).is_err());
        assert!(ScoringWeights::new(0.305, 0.2, 0.15, 0.2, 0.05, 0.05, 0.05).is_ok());
        assert!(ScoringWeights::new(1.2, -0.2, 0.0, 0.0, 0.0, 0.0, 0.0).is_err());
        match ScoringWeights::new(1.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0) {
            Err(Error::ConfigError(msg)) => assert!(msg.contains("1.5")),
            other => panic!("expected ConfigError, got {:?}", other),
        }
    }

    #[test]
    fn test_utilization_curve() {
        assert_relative_eq!(utilization_curve(0.0), 0.0);
        assert_relative_eq!(utilization_curve(50.0), 33.5, epsilon = 1e-9);
        assert_relative_eq!(utilization_curve(80.0), 90.0, epsilon = 1e-9);
        assert_relative_eq!(utilization_curve(90.0), 98.0, epsilon = 1e-9);
        assert_relative_eq!(utilization_curve(100.0), 100.0, epsilon = 1e-9);
        // diminishing returns above 90%
        assert!(utilization_curve(95.0) - utilization_curve(90.0) < utilization_curve(85.0) - utilization_curve(80.0));
    }

    #[test]
    fn test_other_curves_stay_in_range() {
        for ratio in [0.0, 0.5, 1.0, 2.0, 3.0, 5.0, 50.0] {
            let c = cut_length_curve(ratio * 400.0, 10_000.0);
            assert!((0.0..=100.0).contains(&c));
            let t = machine_time_curve(ratio * 600.0 + 1.0, 10_000.0);
            assert!((0.0..=100.0).contains(&t));
            let k = cost_curve(ratio * 10.0, 10_000.0);
            assert!((0.0..=100.0).contains(&k));
        }
        assert_relative_eq!(pierce_curve(5, 5), 100.0);
        assert_relative_eq!(pierce_curve(7, 5), 90.0);
        assert_relative_eq!(pierce_curve(0, 0), 0.0);
        assert_relative_eq!(cost_curve(0.0, 100.0), 50.0);
    }

    #[test]
    fn test_score_is_pure_and_bounded() {
        let scorer = MultiObjectiveScorer::default();
        let solution = layout(6, 60.0);
        let first = scorer.score(&solution);
        let second = scorer.score(&solution);
        assert_relative_eq!(first, second);
        assert!((0.0..=100.0).contains(&first));
        assert!(solution.breakdown().is_none());
        assert!(solution.metrics().is_none());
    }

    #[test]
    fn test_score_and_cache_writes_breakdown() {
        let scorer = MultiObjectiveScorer::new(ScoringWeights::maximize_utilization());
        let mut solution = layout(4, 50.0);
        let total = scorer.score_and_cache(&mut solution);
        let cached = solution.breakdown().unwrap();
        assert_relative_eq!(cached.total, total);
        assert!(solution.metrics().is_some());
        // cached metrics feed back into pure scoring
        assert_relative_eq!(scorer.score(&solution), total);
    }

    #[test]
    fn test_denser_layout_wins_on_utilization() {
        let scorer = MultiObjectiveScorer::new(ScoringWeights::maximize_utilization());
        let dense = layout(8, 100.0);
        let sparse = layout(2, 100.0);
        assert_eq!(scorer.compare(&dense, &sparse), Ordering::Greater);
        assert_eq!(scorer.compare(&sparse, &dense), Ordering::Less);
        assert_eq!(scorer.compare(&dense, &dense), Ordering::Equal);
    }

    #[test]
    fn test_explain_lists_every_objective() {
        let scorer = MultiObjectiveScorer::maximize_profit();
        let text = scorer.explain(&layout(3, 40.0));
        for name in [
            "utilization",
            "cut_length",
            "pierce_count",
            "machine_time",
            "thermal_risk",
            "remnant_value",
            "cost",
        ] {
            assert!(text.contains(name), "{}", name);
        }
        assert!(text.contains("weakest"));
    }
}

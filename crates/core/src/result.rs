//! Measured manufacturing metrics and score breakdowns attached to a solution.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Manufacturing metrics measured or estimated for a layout.
///
/// Lengths are in sheet units (mm), times in seconds, cost in currency units.
/// Risk and remnant scores are normalized to `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ManufacturingMetrics {
    /// Total area of placed parts.
    pub used_area: f64,
    /// Sum of all cut contour lengths (outer rings and holes).
    pub cut_length: f64,
    /// Number of tool entries.
    pub pierce_count: usize,
    /// Travel distance with the tool off.
    pub rapid_distance: f64,
    pub cut_time: f64,
    pub rapid_time: f64,
    pub pierce_time: f64,
    pub total_cost: f64,
    /// 0 = no heat build-up, 1 = critical.
    pub thermal_risk: f64,
    /// 0 = no reusable offcut, 1 = the whole usable sheet is free.
    pub remnant_value: f64,
}

impl ManufacturingMetrics {
    /// Total machine time (cut + rapid + pierce).
    pub fn machine_time(&self) -> f64 {
        self.cut_time + self.rapid_time + self.pierce_time
    }
}

/// Per-objective sub-scores (each in `[0, 100]`) and the weighted total.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScoreBreakdown {
    pub utilization: f64,
    pub cut_length: f64,
    pub pierce_count: f64,
    pub machine_time: f64,
    pub thermal_risk: f64,
    pub remnant_value: f64,
    pub cost: f64,
    pub total: f64,
}

impl ScoreBreakdown {
    /// Sub-scores in canonical objective order.
    pub fn components(&self) -> [(&'static str, f64); 7] {
        [
            ("utilization", self.utilization),
            ("cut_length", self.cut_length),
            ("pierce_count", self.pierce_count),
            ("machine_time", self.machine_time),
            ("thermal_risk", self.thermal_risk),
            ("remnant_value", self.remnant_value),
            ("cost", self.cost),
        ]
    }

    /// Weakest objective, useful for explanations.
    pub fn weakest(&self) -> (&'static str, f64) {
        self.components()
            .into_iter()
            .fold(("utilization", f64::INFINITY), |acc, c| {
                if c.1 < acc.1 {
                    c
                } else {
                    acc
                }
            })
    }
}

/// Short summary of a finished run.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunSummary {
    pub total_requested: usize,
    pub total_placed: usize,
    pub total_failed: usize,
    pub total_rejected: usize,
    /// Percent, `[0, 100]`.
    pub utilization: f64,
    pub score: Option<f64>,
    pub time_ms: u64,
    pub strategy: String,
}

impl RunSummary {
    /// Returns true if every requested part was placed.
    pub fn all_placed(&self) -> bool {
        self.total_failed == 0 && self.total_rejected == 0
    }
}

//! Thermal model for heat-affected zone (HAZ) risk.
//!
//! When consecutive pierces are close in space and time, the material has
//! insufficient time to cool, leading to warping and discoloration.
//!
//! # Model
//!
//! Each pierce point deposits heat that decays with distance and time. The
//! accumulated heat at a pierce is the sum of contributions from all prior
//! pierces.
//!
//! ```text
//! Heat(i) = Σ_{j < i} exp(-d²(pᵢ, pⱼ) / (2 × σ²)) × exp(-(tᵢ - tⱼ) / τ)
//! ```
//!
//! where `σ` is the HAZ radius and `τ` is the cooling time constant. The
//! risk of a sequence is its peak accumulated heat relative to the critical
//! heat, clamped to `[0, 1]`.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use kerfnest_core::Point;

/// Configuration for the thermal model.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ThermalConfig {
    /// Heat-affected zone radius in mm.
    pub haz_radius: f64,
    /// Cooling time constant in seconds.
    pub cooling_time_constant: f64,
    /// Accumulated heat at which the risk saturates at 1.
    pub critical_heat: f64,
    /// When false the risk is always 0.
    pub enabled: bool,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            haz_radius: 3.0,
            cooling_time_constant: 15.0,
            critical_heat: 1.0,
            enabled: true,
        }
    }
}

/// Heat contribution from a single cut: `exp(-d² / (2σ²)) × exp(-Δt / τ)`.
#[inline]
pub fn heat_contribution(dist_sq: f64, elapsed_time: f64, haz_radius: f64, cooling_time: f64) -> f64 {
    let sigma_sq = haz_radius * haz_radius;
    let spatial = (-dist_sq / (2.0 * sigma_sq)).exp();
    let temporal = (-elapsed_time / cooling_time).exp();
    spatial * temporal
}

/// Highest heat accumulated at any pierce of the sequence.
///
/// `times` holds the cumulative time at each pierce, in seconds.
pub fn peak_heat(pierce_points: &[Point], times: &[f64], config: &ThermalConfig) -> f64 {
    let n = pierce_points.len().min(times.len());
    let mut peak: f64 = 0.0;
    for i in 1..n {
        let accumulated: f64 = (0..i)
            .map(|j| {
                heat_contribution(
                    pierce_points[i].distance_sq(&pierce_points[j]),
                    times[i] - times[j],
                    config.haz_radius,
                    config.cooling_time_constant,
                )
            })
            .sum();
        peak = peak.max(accumulated);
    }
    peak
}

/// Estimates the time at each pierce.
///
/// Before each pierce the head travels from the previous pierce point (a
/// closed contour ends where it started) after cutting the previous
/// contour. Speeds are in mm/s.
pub fn estimate_cut_times(
    pierce_points: &[Point],
    perimeters: &[f64],
    rapid_speed: f64,
    cut_speed: f64,
    home: Point,
) -> Vec<f64> {
    let Some(first) = pierce_points.first() else {
        return Vec::new();
    };

    let mut times = Vec::with_capacity(pierce_points.len());
    let mut current_time = home.distance(first) / rapid_speed;
    times.push(current_time);

    for i in 1..pierce_points.len() {
        if let Some(perimeter) = perimeters.get(i - 1) {
            current_time += perimeter / cut_speed;
        }
        current_time += pierce_points[i - 1].distance(&pierce_points[i]) / rapid_speed;
        times.push(current_time);
    }
    times
}

/// Thermal risk of a cutting sequence in `[0, 1]`.
pub fn thermal_risk(
    pierce_points: &[Point],
    perimeters: &[f64],
    rapid_speed: f64,
    cut_speed: f64,
    home: Point,
    config: &ThermalConfig,
) -> f64 {
    if !config.enabled || pierce_points.len() < 2 || config.critical_heat <= 0.0 {
        return 0.0;
    }
    let times = estimate_cut_times(pierce_points, perimeters, rapid_speed, cut_speed, home);
    (peak_heat(pierce_points, &times, config) / config.critical_heat).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_heat_contribution_at_zero_distance() {
        assert_relative_eq!(heat_contribution(0.0, 0.0, 3.0, 15.0), 1.0);
    }

    #[test]
    fn test_heat_decays_with_distance_and_time() {
        let near = heat_contribution(1.0, 0.0, 3.0, 15.0);
        let far = heat_contribution(100.0, 0.0, 3.0, 15.0);
        assert!(near > far);
        assert!(far < 0.01);

        let aged = heat_contribution(0.0, 60.0, 3.0, 15.0);
        assert!(aged < 0.1);
    }

    #[test]
    fn test_estimate_cut_times() {
        let pierce = vec![Point::new(10.0, 0.0), Point::new(20.0, 0.0)];
        let times = estimate_cut_times(&pierce, &[40.0, 40.0], 1000.0, 100.0, Point::new(0.0, 0.0));
        assert_eq!(times.len(), 2);
        // 10mm rapid at 1000mm/s
        assert_relative_eq!(times[0], 0.01, epsilon = 1e-9);
        // + 40mm cut at 100mm/s + 10mm rapid
        assert_relative_eq!(times[1], 0.42, epsilon = 1e-9);
        assert!(estimate_cut_times(&[], &[], 1000.0, 100.0, Point::new(0.0, 0.0)).is_empty());
    }

    #[test]
    fn test_distant_pierces_are_safe() {
        let config = ThermalConfig::default();
        let points = vec![Point::new(0.0, 0.0), Point::new(100.0, 100.0)];
        let risk = thermal_risk(&points, &[10.0, 10.0], 250.0, 50.0, Point::new(0.0, 0.0), &config);
        assert!(risk < 1e-9);
    }

    #[test]
    fn test_close_fast_pierces_are_risky() {
        let config = ThermalConfig {
            critical_heat: 0.5,
            ..ThermalConfig::default()
        };
        let points = vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.5, 0.5)];
        let risk = thermal_risk(&points, &[1.0, 1.0, 1.0], 250.0, 50.0, Point::new(0.0, 0.0), &config);
        assert_relative_eq!(risk, 1.0);
    }

    #[test]
    fn test_more_cooling_less_heat() {
        let config = ThermalConfig::default();
        let points = [Point::new(0.0, 0.0), Point::new(2.0, 0.0)];
        let fast = peak_heat(&points, &[0.0, 0.01], &config);
        let slow = peak_heat(&points, &[0.0, 60.0], &config);
        assert!(fast > slow);
    }

    #[test]
    fn test_disabled_returns_zero() {
        let config = ThermalConfig {
            enabled: false,
            ..ThermalConfig::default()
        };
        let points = vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)];
        let risk = thermal_risk(&points, &[1.0, 1.0], 250.0, 50.0, Point::new(0.0, 0.0), &config);
        assert_eq!(risk, 0.0);
    }
}

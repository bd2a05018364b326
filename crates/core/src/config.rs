//! Nesting job configuration.
//!
//! Every struct here follows the same pattern: a `Default`, `with_*` builder
//! methods and a `validate()` that returns [`Error::ConfigError`] for values
//! the engine cannot work with. [`NestingConfig::new`] validates the whole
//! tree so that a bad configuration fails before any geometry work.
//!
//! | Section | Options |
//! |---------|---------|
//! | `sheet` | `width`, `height`, `margin_left`, `margin_right`, `margin_top`, `margin_bottom` |
//! | `spacing` | `kerf_width`, `min_web` |
//! | `rotation` | `allowed_angles`, `grain_sensitive`, `per_part_overrides` |
//! | `optimization` | `max_runtime_seconds`, `num_multi_starts`, `target_utilization` |

use std::collections::HashMap;

use crate::geometry::{normalize_angle, BoundingBox};
use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Angular tolerance (degrees) used when matching rotations.
pub const ANGLE_TOLERANCE: f64 = 0.1;

/// Sheet dimensions and edge margins.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SheetConstraints {
    pub width: f64,
    pub height: f64,
    pub margin_left: f64,
    pub margin_right: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,
}

impl Default for SheetConstraints {
    fn default() -> Self {
        Self::new(1220.0, 2440.0)
    }
}

impl SheetConstraints {
    /// Creates a sheet with the default 5 mm margins.
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            margin_left: 5.0,
            margin_right: 5.0,
            margin_top: 5.0,
            margin_bottom: 5.0,
        }
    }

    /// 1220 x 2440 with 10 mm margins.
    pub fn standard_4x8() -> Self {
        Self::new(1220.0, 2440.0).with_margin(10.0)
    }

    /// 1524 x 3048 with 10 mm margins.
    pub fn standard_5x10() -> Self {
        Self::new(1524.0, 3048.0).with_margin(10.0)
    }

    /// 1000 x 2000 with 10 mm margins.
    pub fn metric_1x2() -> Self {
        Self::new(1000.0, 2000.0).with_margin(10.0)
    }

    /// 600 x 400 with 5 mm margins.
    pub fn small_test() -> Self {
        Self::new(600.0, 400.0)
    }

    /// Sets all four margins.
    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin_left = margin;
        self.margin_right = margin;
        self.margin_top = margin;
        self.margin_bottom = margin;
        self
    }

    /// Sets margins individually.
    pub fn with_margins(mut self, left: f64, right: f64, top: f64, bottom: f64) -> Self {
        self.margin_left = left;
        self.margin_right = right;
        self.margin_top = top;
        self.margin_bottom = bottom;
        self
    }

    /// Total sheet area.
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn usable_width(&self) -> f64 {
        self.width - self.margin_left - self.margin_right
    }

    pub fn usable_height(&self) -> f64 {
        self.height - self.margin_top - self.margin_bottom
    }

    pub fn usable_area(&self) -> f64 {
        self.usable_width() * self.usable_height()
    }

    /// `[margin_left, width - margin_right] x [margin_bottom, height - margin_top]`.
    pub fn usable_bounds(&self) -> BoundingBox {
        BoundingBox::new(
            self.margin_left,
            self.margin_bottom,
            self.width - self.margin_right,
            self.height - self.margin_top,
        )
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.width) || !positive(self.height) {
            return Err(Error::ConfigError(format!(
                "sheet dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        let margins = [
            self.margin_left,
            self.margin_right,
            self.margin_top,
            self.margin_bottom,
        ];
        if margins.iter().any(|m| *m < 0.0 || !m.is_finite()) {
            return Err(Error::ConfigError(format!(
                "sheet margins must be non-negative, got {:?}",
                margins
            )));
        }
        if self.usable_width() <= 0.0 || self.usable_height() <= 0.0 {
            return Err(Error::ConfigError(format!(
                "margins leave no usable area on a {}x{} sheet",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Kerf and minimum web between neighbouring parts.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpacingConstraints {
    pub kerf_width: f64,
    pub min_web: f64,
}

impl Default for SpacingConstraints {
    fn default() -> Self {
        Self {
            kerf_width: 0.3,
            min_web: 3.0,
        }
    }
}

impl SpacingConstraints {
    pub fn new(kerf_width: f64, min_web: f64) -> Self {
        Self {
            kerf_width,
            min_web,
        }
    }

    /// No clearance at all; parts may touch.
    pub fn none() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Clearance required between two placed parts.
    pub fn total_spacing(&self) -> f64 {
        self.kerf_width + self.min_web
    }

    /// Outward offset applied to each part.
    pub fn offset_per_part(&self) -> f64 {
        self.kerf_width / 2.0 + self.min_web
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |v: f64| !(v >= 0.0) || !v.is_finite();
        if invalid(self.kerf_width) || invalid(self.min_web) {
            return Err(Error::ConfigError(format!(
                "kerf ({}) and min web ({}) must be non-negative",
                self.kerf_width, self.min_web
            )));
        }
        Ok(())
    }
}

/// Full manufacturing clearance model used by the NFP engine.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ManufacturingConstraints {
    pub kerf_width: f64,
    pub min_web: f64,
    pub lead_in_clearance: f64,
    pub thermal_buffer: f64,
}

impl ManufacturingConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kerf_width(mut self, kerf: f64) -> Self {
        self.kerf_width = kerf;
        self
    }

    pub fn with_min_web(mut self, web: f64) -> Self {
        self.min_web = web;
        self
    }

    pub fn with_lead_in_clearance(mut self, clearance: f64) -> Self {
        self.lead_in_clearance = clearance;
        self
    }

    pub fn with_thermal_buffer(mut self, buffer: f64) -> Self {
        self.thermal_buffer = buffer;
        self
    }

    /// Inward offset applied to a raw geometric NFP:
    /// `kerf/2 + min_web + lead_in_clearance + thermal_buffer`.
    pub fn nfp_offset(&self) -> f64 {
        self.kerf_width / 2.0 + self.min_web + self.lead_in_clearance + self.thermal_buffer
    }

    /// Returns true if no clearance is required.
    pub fn is_zero(&self) -> bool {
        self.nfp_offset() == 0.0
    }

    pub fn validate(&self) -> Result<()> {
        let values = [
            ("kerf_width", self.kerf_width),
            ("min_web", self.min_web),
            ("lead_in_clearance", self.lead_in_clearance),
            ("thermal_buffer", self.thermal_buffer),
        ];
        for (name, value) in values {
            if !(value >= 0.0) || !value.is_finite() {
                return Err(Error::ConfigError(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

impl From<&SpacingConstraints> for ManufacturingConstraints {
    fn from(spacing: &SpacingConstraints) -> Self {
        Self::new()
            .with_kerf_width(spacing.kerf_width)
            .with_min_web(spacing.min_web)
    }
}

/// Allowed rotation angles, globally and per part.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RotationConstraints {
    /// Angles in degrees, normalized to `[0, 360)`.
    pub allowed_angles: Vec<f64>,
    /// Material grain direction matters; only 0 and 180 degrees are used
    /// when the global set contains them.
    pub grain_sensitive: bool,
    pub per_part_overrides: HashMap<String, Vec<f64>>,
}

impl Default for RotationConstraints {
    fn default() -> Self {
        Self::cardinal()
    }
}

impl RotationConstraints {
    /// Creates constraints from a list of angles. Angles are normalized and deduplicated.
    pub fn new(angles: impl IntoIterator<Item = f64>) -> Self {
        Self {
            allowed_angles: normalize_angles(angles),
            grain_sensitive: false,
            per_part_overrides: HashMap::new(),
        }
    }

    pub fn no_rotation() -> Self {
        Self::new([0.0]).with_grain_sensitive(true)
    }

    pub fn cardinal() -> Self {
        Self::new([0.0, 90.0, 180.0, 270.0])
    }

    /// 45 degree steps.
    pub fn eight_way() -> Self {
        Self::new((0..8).map(|i| i as f64 * 45.0))
    }

    /// 10 degree steps.
    pub fn fine_grain() -> Self {
        Self::new((0..36).map(|i| i as f64 * 10.0))
    }

    pub fn with_grain_sensitive(mut self, grain_sensitive: bool) -> Self {
        self.grain_sensitive = grain_sensitive;
        self
    }

    /// Overrides the allowed angles for one part.
    pub fn with_part_override(
        mut self,
        part_id: impl Into<String>,
        angles: impl IntoIterator<Item = f64>,
    ) -> Self {
        self.per_part_overrides
            .insert(part_id.into(), normalize_angles(angles));
        self
    }

    /// Angles allowed for `part_id`.
    ///
    /// A per-part override is taken as is. Otherwise, when the material is
    /// grain sensitive, only angles along the grain (0 and 180) are kept,
    /// unless none of the global angles lies along it.
    pub fn allowed_for(&self, part_id: &str) -> Vec<f64> {
        if let Some(angles) = self.per_part_overrides.get(part_id) {
            return angles.clone();
        }
        if self.grain_sensitive {
            let along_grain: Vec<f64> = self
                .allowed_angles
                .iter()
                .copied()
                .filter(|&a| is_along_grain(a))
                .collect();
            if !along_grain.is_empty() {
                return along_grain;
            }
        }
        self.allowed_angles.clone()
    }

    /// Returns true if `angle` matches an allowed angle within [`ANGLE_TOLERANCE`].
    pub fn is_allowed(&self, part_id: &str, angle: f64) -> bool {
        let angle = normalize_angle(angle);
        self.allowed_for(part_id).iter().any(|a| {
            let d = (a - angle).abs();
            d < ANGLE_TOLERANCE || (360.0 - d) < ANGLE_TOLERANCE
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.allowed_angles.is_empty() {
            return Err(Error::ConfigError(
                "at least one rotation angle must be allowed".into(),
            ));
        }
        if let Some((id, _)) = self.per_part_overrides.iter().find(|(_, a)| a.is_empty()) {
            return Err(Error::ConfigError(format!(
                "rotation override for part '{}' allows no angles",
                id
            )));
        }
        Ok(())
    }
}

fn is_along_grain(angle: f64) -> bool {
    [0.0, 180.0, 360.0]
        .iter()
        .any(|g| (angle - g).abs() < ANGLE_TOLERANCE)
}

fn normalize_angles(angles: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut out: Vec<f64> = Vec::new();
    for a in angles.into_iter().filter(|a| a.is_finite()) {
        let a = normalize_angle(a);
        if !out.iter().any(|b| (a - b).abs() < ANGLE_TOLERANCE) {
            out.push(a);
        }
    }
    out
}

/// Search budget and strategy switches.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OptimizationSettings {
    pub max_runtime_seconds: f64,
    pub num_multi_starts: usize,
    /// Target utilization in percent.
    pub target_utilization: f64,
    pub enable_local_search: bool,
    pub enable_simulated_annealing: bool,
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            max_runtime_seconds: 60.0,
            num_multi_starts: 10,
            target_utilization: 80.0,
            enable_local_search: true,
            enable_simulated_annealing: false,
        }
    }
}

impl OptimizationSettings {
    pub fn with_max_runtime_seconds(mut self, seconds: f64) -> Self {
        self.max_runtime_seconds = seconds;
        self
    }

    pub fn with_num_multi_starts(mut self, n: usize) -> Self {
        self.num_multi_starts = n;
        self
    }

    pub fn with_target_utilization(mut self, percent: f64) -> Self {
        self.target_utilization = percent;
        self
    }

    pub fn with_local_search(mut self, enabled: bool) -> Self {
        self.enable_local_search = enabled;
        self
    }

    pub fn with_simulated_annealing(mut self, enabled: bool) -> Self {
        self.enable_simulated_annealing = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_runtime_seconds.is_nan() || self.max_runtime_seconds <= 0.0 {
            return Err(Error::ConfigError(format!(
                "max_runtime_seconds must be positive, got {}",
                self.max_runtime_seconds
            )));
        }
        if !(0.0..=100.0).contains(&self.target_utilization) {
            return Err(Error::ConfigError(format!(
                "target_utilization must be within [0, 100], got {}",
                self.target_utilization
            )));
        }
        Ok(())
    }
}

/// Complete configuration for one nesting job.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NestingConfig {
    pub sheet: SheetConstraints,
    pub spacing: SpacingConstraints,
    pub rotation: RotationConstraints,
    pub optimization: OptimizationSettings,
}

impl NestingConfig {
    /// Creates and validates a configuration.
    pub fn new(
        sheet: SheetConstraints,
        spacing: SpacingConstraints,
        rotation: RotationConstraints,
        optimization: OptimizationSettings,
    ) -> Result<Self> {
        let config = Self {
            sheet,
            spacing,
            rotation,
            optimization,
        };
        config.validate()?;
        Ok(config)
    }

    /// Convenience constructor for a sheet with default spacing, rotation and budget.
    pub fn for_sheet(sheet: SheetConstraints) -> Result<Self> {
        Self::new(
            sheet,
            SpacingConstraints::default(),
            RotationConstraints::default(),
            OptimizationSettings::default(),
        )
    }

    pub fn with_spacing(mut self, spacing: SpacingConstraints) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn with_rotation(mut self, rotation: RotationConstraints) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_optimization(mut self, optimization: OptimizationSettings) -> Self {
        self.optimization = optimization;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.sheet.validate()?;
        self.spacing.validate()?;
        self.rotation.validate()?;
        self.optimization.validate()
    }
}

//! Machine and material configuration for manufacturing estimates.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use kerfnest_core::{Error, Result, SpacingConstraints};

use crate::thermal::ThermalConfig;

/// Material properties for laser cutting.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Material {
    pub name: String,
    /// Sheet thickness in mm.
    pub thickness: f64,
    /// Kerf width in mm.
    pub kerf_width: f64,
    /// Minimum web between parts in mm.
    pub min_web: f64,
    /// Cutting speed in mm/min.
    pub cutting_speed: f64,
    /// Rapid traverse speed in mm/min.
    pub rapid_speed: f64,
    /// Seconds per pierce.
    pub pierce_time: f64,
    /// Sheet price per square meter.
    pub cost_per_sqm: f64,
}

impl Default for Material {
    fn default() -> Self {
        Self::mild_steel_3mm()
    }
}

impl Material {
    pub fn mild_steel_3mm() -> Self {
        Self::preset("mild_steel_3mm", 3.0, 0.3, 3.0, 3000.0, 15000.0, 0.5, 25.0)
    }

    pub fn stainless_steel_3mm() -> Self {
        Self::preset("stainless_steel_3mm", 3.0, 0.35, 4.0, 2500.0, 15000.0, 0.7, 45.0)
    }

    pub fn aluminum_3mm() -> Self {
        Self::preset("aluminum_3mm", 3.0, 0.25, 2.5, 3500.0, 15000.0, 0.4, 35.0)
    }

    pub fn mild_steel_5mm() -> Self {
        Self::preset("mild_steel_5mm", 5.0, 0.4, 5.0, 2000.0, 15000.0, 0.8, 40.0)
    }

    pub fn acrylic_3mm() -> Self {
        Self::preset("acrylic_3mm", 3.0, 0.15, 2.0, 4000.0, 20000.0, 0.2, 15.0)
    }

    /// Looks up a built-in material by name.
    pub fn by_name(name: &str) -> Option<Self> {
        Self::library().into_iter().find(|m| m.name == name)
    }

    /// All built-in materials.
    pub fn library() -> Vec<Self> {
        vec![
            Self::mild_steel_3mm(),
            Self::stainless_steel_3mm(),
            Self::aluminum_3mm(),
            Self::mild_steel_5mm(),
            Self::acrylic_3mm(),
        ]
    }

    #[allow(clippy::too_many_arguments)]
    fn preset(
        name: &str,
        thickness: f64,
        kerf_width: f64,
        min_web: f64,
        cutting_speed: f64,
        rapid_speed: f64,
        pierce_time: f64,
        cost_per_sqm: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            thickness,
            kerf_width,
            min_web,
            cutting_speed,
            rapid_speed,
            pierce_time,
            cost_per_sqm,
        }
    }

    /// Part spacing implied by this material.
    pub fn spacing(&self) -> SpacingConstraints {
        SpacingConstraints::new(self.kerf_width, self.min_web)
    }

    /// Cutting speed in mm/s.
    pub fn cut_speed_per_sec(&self) -> f64 {
        self.cutting_speed / 60.0
    }

    /// Rapid speed in mm/s.
    pub fn rapid_speed_per_sec(&self) -> f64 {
        self.rapid_speed / 60.0
    }
}

/// Configuration for manufacturing metric estimation.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CuttingConfig {
    pub material: Material,

    /// Machine cost per hour of cutting, rapid and pierce time.
    pub machine_rate_per_hour: f64,

    /// Home position for the cutting head (start point of the rapid tour).
    /// Default is (0.0, 0.0).
    pub home_position: (f64, f64),

    /// Thermal model configuration.
    pub thermal: ThermalConfig,

    /// Neighbouring parts whose edges lie within one kerf of each other
    /// are separated by a single shared cut.
    pub common_edge_cutting: bool,
}

impl Default for CuttingConfig {
    fn default() -> Self {
        Self {
            material: Material::default(),
            machine_rate_per_hour: 60.0,
            home_position: (0.0, 0.0),
            thermal: ThermalConfig::default(),
            common_edge_cutting: false,
        }
    }
}

impl CuttingConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn with_machine_rate(mut self, per_hour: f64) -> Self {
        self.machine_rate_per_hour = per_hour;
        self
    }

    /// Sets the home position.
    pub fn with_home_position(mut self, x: f64, y: f64) -> Self {
        self.home_position = (x, y);
        self
    }

    pub fn with_thermal(mut self, thermal: ThermalConfig) -> Self {
        self.thermal = thermal;
        self
    }

    pub fn with_common_edge_cutting(mut self, enabled: bool) -> Self {
        self.common_edge_cutting = enabled;
        self
    }

    /// Rejects non-positive speeds and negative times, costs or radii.
    pub fn validate(&self) -> Result<()> {
        let m = &self.material;
        let positive = [
            ("cutting_speed", m.cutting_speed),
            ("rapid_speed", m.rapid_speed),
            ("haz_radius", self.thermal.haz_radius),
            ("cooling_time_constant", self.thermal.cooling_time_constant),
            ("critical_heat", self.thermal.critical_heat),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::ConfigError(format!("{} must be positive, got {}", name, value)));
            }
        }
        let non_negative = [
            ("pierce_time", m.pierce_time),
            ("cost_per_sqm", m.cost_per_sqm),
            ("machine_rate_per_hour", self.machine_rate_per_hour),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(Error::ConfigError(format!("{} must be non-negative, got {}", name, value)));
            }
        }
        Ok(())
    }
}

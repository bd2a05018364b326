//! # kerfnest Core
//!
//! Shared types for the kerfnest irregular 2D nesting engine.
//!
//! This crate holds everything the geometry and cutting crates agree on:
//!
//! - **Errors**: [`Error`], [`Result`]
//! - **Value types**: [`Point`], [`BoundingBox`], [`normalize_angle`]
//! - **Configuration**: [`NestingConfig`] and its sections ([`SheetConstraints`],
//!   [`SpacingConstraints`], [`RotationConstraints`], [`OptimizationSettings`]) plus
//!   [`ManufacturingConstraints`] for the NFP engine
//! - **Robust predicates**: [`robust::orient2d`], [`robust::ScalingConfig`]
//! - **Genetic algorithm**: [`GaRunner`] over a [`GaProblem`], with
//!   [`PermutationChromosome`] for sequence search
//! - **Result records**: [`ManufacturingMetrics`], [`ScoreBreakdown`], [`RunSummary`]
//!
//! ## Configuration
//!
//! ```rust
//! use kerfnest_core::{NestingConfig, RotationConstraints, SheetConstraints, SpacingConstraints};
//!
//! let config = NestingConfig::for_sheet(SheetConstraints::standard_4x8())
//!     .unwrap()
//!     .with_spacing(SpacingConstraints::new(0.2, 2.0))
//!     .with_rotation(RotationConstraints::eight_way());
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization support

pub mod config;
pub mod error;
pub mod ga;
pub mod geometry;
pub mod result;
pub mod robust;

pub use config::{
    ManufacturingConstraints, NestingConfig, OptimizationSettings, RotationConstraints,
    SheetConstraints, SpacingConstraints, ANGLE_TOLERANCE,
};
pub use error::{Error, Result};
pub use ga::{GaConfig, GaProblem, GaResult, GaRunner, Individual, PermutationChromosome};
pub use geometry::{normalize_angle, BoundingBox, PartId, Point};
pub use result::{ManufacturingMetrics, RunSummary, ScoreBreakdown};

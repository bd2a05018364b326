//! Manufacturing metrics and multi-objective scoring for 2D nesting results.
//!
//! Given a nesting solution (placed parts with positions and rotations),
//! this crate estimates what cutting it would cost and rates it:
//! - Cut length, pierce count and rapid travel of a greedy cutting sequence
//! - Machine time and total cost from material and machine settings
//! - Heat-accumulation risk and the value of the remaining offcut
//!
//! # Scoring
//!
//! Each objective is normalized to `[0, 100]` and combined with validated
//! [`ScoringWeights`]. [`NestingPipeline`] ties placement, refinement and
//! scoring together.
//!
//! ```rust
//! use kerfnest_core::{NestingConfig, OptimizationSettings, SheetConstraints};
//! use kerfnest_cutting::{NestingPipeline, ScoringWeights};
//! use kerfnest_d2::Polygon;
//!
//! let config = NestingConfig::for_sheet(SheetConstraints::small_test())
//!     .unwrap()
//!     .with_optimization(OptimizationSettings::default().with_num_multi_starts(2));
//! let pipeline = NestingPipeline::new(config)
//!     .unwrap()
//!     .with_weights(ScoringWeights::maximize_utilization());
//!
//! let parts = vec![Polygon::rectangle("a", 100.0, 50.0), Polygon::circle("b", 20.0, 24)];
//! let solution = pipeline.run(&parts).unwrap();
//! assert!(solution.breakdown().is_some());
//! ```

pub mod config;
pub mod metrics;
pub mod pipeline;
pub mod scorer;
pub mod thermal;

pub use config::{CuttingConfig, Material};
pub use metrics::{
    common_edge_length, estimate_metrics, extract_contours, plan_sequence, remnant_value,
    CutContour, SequencedCut,
};
pub use pipeline::NestingPipeline;
pub use scorer::{MultiObjectiveScorer, ScoringWeights};
pub use thermal::ThermalConfig;

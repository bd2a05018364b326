//! # kerfnest 2D
//!
//! Irregular 2D nesting of polygonal parts onto rectangular sheets.
//!
//! This crate provides the geometry kernel, the No-Fit Polygon engine and its
//! cache, collision detection with a grid broad phase, and the placement
//! search with its multi-pass, multi-start and refinement stages.
//!
//! ## Features
//!
//! - Polygon geometry with holes, repair of malformed outlines
//! - NFP computation (convex fast path, decomposition, conservative fallback)
//! - Pluggable ordering, candidate generation and position scoring
//! - Early termination and cooperative time budgets
//! - Multi-start over independent orderings in parallel
//! - Genetic search over part sequences, and a fine-grid gap-filling pass
//! - Simulated annealing / hill climbing on finished layouts
//!
//! ## Quick Start
//!
//! ```rust
//! use kerfnest_core::{NestingConfig, RotationConstraints, SheetConstraints, SpacingConstraints};
//! use kerfnest_d2::{Nester, Polygon};
//!
//! let config = NestingConfig::for_sheet(SheetConstraints::new(600.0, 400.0))
//!     .unwrap()
//!     .with_spacing(SpacingConstraints::new(0.2, 2.0))
//!     .with_rotation(RotationConstraints::cardinal());
//!
//! let parts: Vec<Polygon> = (0..5)
//!     .map(|i| Polygon::rectangle(format!("rect{}", i), 100.0, 50.0))
//!     .collect();
//!
//! let nester = Nester::new(config).unwrap();
//! let solution = nester.nest(&parts);
//!
//! println!("Placed {} parts, utilization: {:.1}%",
//!     solution.placed().len(),
//!     solution.utilization());
//! ```
//!
//! ## Geometry Creation
//!
//! ```rust
//! use kerfnest_d2::Polygon;
//!
//! // Rectangle
//! let rect = Polygon::rectangle("r1", 100.0, 50.0);
//!
//! // Circle (approximated)
//! let circle = Polygon::circle("c1", 25.0, 32);
//!
//! // L-shape
//! let l_shape = Polygon::l_shape("l1", 100.0, 80.0, 30.0, 30.0);
//!
//! // Custom polygon
//! let custom = Polygon::from_coords("custom", &[(0.0, 0.0), (100.0, 0.0), (50.0, 80.0)]);
//! assert!(custom.area() > 0.0);
//! ```
//!
//! ## Refinement
//!
//! ```rust
//! use kerfnest_core::{NestingConfig, SheetConstraints};
//! use kerfnest_d2::{LocalRefiner, MultiStart, Nester, Polygon, RefineConfig};
//!
//! let config = NestingConfig::for_sheet(SheetConstraints::small_test()).unwrap();
//! let nester = Nester::new(config).unwrap();
//! let parts = vec![
//!     Polygon::l_shape("a", 60.0, 60.0, 30.0, 30.0),
//!     Polygon::rectangle("b", 40.0, 20.0),
//! ];
//!
//! let best = MultiStart::new(nester.clone()).run(&parts);
//! let refined = LocalRefiner::new(nester, RefineConfig::hill_climbing().with_seed(1))
//!     .refine(&best);
//! assert!(refined.solution.utilization() >= best.utilization());
//! ```

pub mod candidates;
pub mod collision;
pub mod ga_ordering;
pub mod geometry;
pub mod multi_start;
pub mod nester;
pub mod nfp;
pub mod ordering;
pub mod refine;
pub mod scoring;
pub mod solution;
pub mod spatial_index;

pub use candidates::{CandidateContext, CandidatePolicy, GridCandidates, NfpCandidates};
pub use collision::{CollisionDetector, PlacedPart, Rejection};
pub use ga_ordering::GeneticOrdering;
pub use geometry::Polygon;
pub use multi_start::{MultiStart, SolutionRanker, UtilizationRanker};
pub use nester::{Nester, PlacementState, SizeTier};
pub use nfp::{CacheStats, NfpCache, NfpEngine, NfpMethod, NfpResult};
pub use ordering::{difficulty, OrderingPolicy, PartOrdering};
pub use refine::{AcceptanceRule, LocalRefiner, RefineConfig, RefineResult};
pub use scoring::{BottomLeftCompactness, PositionScorer};
pub use solution::{FailureReason, NestingSolution, PlacementFailure};
pub use spatial_index::{BoxTree, GridIndex};

// Re-export core types
pub use kerfnest_core::{
    BoundingBox, Error, GaConfig, ManufacturingConstraints, NestingConfig, Point, Result, RotationConstraints,
    SheetConstraints, SpacingConstraints,
};

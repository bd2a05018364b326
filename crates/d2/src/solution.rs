//! Nesting results.

use std::sync::Arc;

use kerfnest_core::{
    BoundingBox, ManufacturingMetrics, PartId, RunSummary, ScoreBreakdown, SheetConstraints,
};

use crate::collision::PlacedPart;
use crate::geometry::Polygon;

/// Why a part ended up unplaced.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// The rotated part is larger than the usable sheet region at every allowed angle.
    DoesNotFit,
    /// Every candidate position collided.
    NoValidPosition,
    /// The time budget ran out or the run was cancelled before the part was tried.
    BudgetExhausted,
    /// The input outline was malformed and could not be repaired.
    InvalidGeometry(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::DoesNotFit => write!(f, "larger than the usable sheet region"),
            FailureReason::NoValidPosition => write!(f, "no collision-free position found"),
            FailureReason::BudgetExhausted => write!(f, "search budget exhausted"),
            FailureReason::InvalidGeometry(msg) => write!(f, "invalid geometry: {}", msg),
        }
    }
}

/// A part that could not be placed. An expected outcome, never fatal.
#[derive(Debug, Clone, thiserror::Error)]
#[error("part '{part_id}' not placed: {reason}")]
pub struct PlacementFailure {
    pub part_id: PartId,
    pub reason: FailureReason,
    /// The outline as submitted, kept so later stages can retry it.
    pub polygon: Arc<Polygon>,
}

impl PlacementFailure {
    pub fn new(polygon: Arc<Polygon>, reason: FailureReason) -> Self {
        Self {
            part_id: polygon.id().to_string(),
            reason,
            polygon,
        }
    }
}

/// Placements on one sheet plus everything that did not make it.
///
/// Utilization is always derived from the placed parts. The score breakdown
/// is only ever written through [`NestingSolution::cache_breakdown`] and is
/// dropped whenever the placements change.
#[derive(Debug, Clone)]
pub struct NestingSolution {
    sheet: SheetConstraints,
    placed: Vec<PlacedPart>,
    failed_parts: Vec<PlacementFailure>,
    rejected_parts: Vec<PlacementFailure>,
    metrics: Option<ManufacturingMetrics>,
    breakdown: Option<ScoreBreakdown>,
    /// Name of the ordering/strategy that produced the layout.
    pub strategy: String,
    pub elapsed_ms: u64,
}

impl NestingSolution {
    pub fn new(sheet: SheetConstraints) -> Self {
        Self {
            sheet,
            placed: Vec::new(),
            failed_parts: Vec::new(),
            rejected_parts: Vec::new(),
            metrics: None,
            breakdown: None,
            strategy: String::new(),
            elapsed_ms: 0,
        }
    }

    pub fn with_placed(mut self, placed: Vec<PlacedPart>) -> Self {
        self.set_placed(placed);
        self
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = strategy.into();
        self
    }

    pub fn sheet(&self) -> &SheetConstraints {
        &self.sheet
    }

    pub fn sheet_width(&self) -> f64 {
        self.sheet.width
    }

    pub fn sheet_height(&self) -> f64 {
        self.sheet.height
    }

    pub fn sheet_area(&self) -> f64 {
        self.sheet.area()
    }

    /// Placed parts in commit order.
    pub fn placed(&self) -> &[PlacedPart] {
        &self.placed
    }

    pub fn failed_parts(&self) -> &[PlacementFailure] {
        &self.failed_parts
    }

    /// Parts excluded before placement because their geometry was unusable.
    pub fn rejected_parts(&self) -> &[PlacementFailure] {
        &self.rejected_parts
    }

    /// Replaces the placements, invalidating metrics and score.
    pub fn set_placed(&mut self, placed: Vec<PlacedPart>) {
        self.placed = placed;
        self.invalidate();
    }

    pub fn push_placed(&mut self, part: PlacedPart) {
        self.placed.push(part);
        self.invalidate();
    }

    pub fn push_failed(&mut self, failure: PlacementFailure) {
        self.failed_parts.push(failure);
    }

    pub fn set_failed(&mut self, failed: Vec<PlacementFailure>) {
        self.failed_parts = failed;
    }

    pub fn push_rejected(&mut self, failure: PlacementFailure) {
        self.rejected_parts.push(failure);
    }

    fn invalidate(&mut self) {
        self.metrics = None;
        self.breakdown = None;
    }

    pub fn used_area(&self) -> f64 {
        self.placed.iter().map(PlacedPart::area).sum()
    }

    /// Placed area as a percentage of the sheet area, in `[0, 100]`.
    pub fn utilization(&self) -> f64 {
        let sheet_area = self.sheet_area();
        if self.placed.is_empty() || sheet_area <= 0.0 {
            return 0.0;
        }
        (self.used_area() / sheet_area * 100.0).clamp(0.0, 100.0)
    }

    /// Returns true if no part failed or was rejected.
    pub fn is_complete(&self) -> bool {
        self.failed_parts.is_empty() && self.rejected_parts.is_empty()
    }

    /// Absolute geometry of every placed part.
    pub fn placed_geometries(&self) -> Vec<Polygon> {
        self.placed.iter().map(PlacedPart::geometry).collect()
    }

    /// Bounding box of all placed geometry.
    pub fn layout_bounds(&self) -> Option<BoundingBox> {
        self.placed
            .iter()
            .map(PlacedPart::bounding_box)
            .reduce(|a, b| a.union(&b))
    }

    pub fn metrics(&self) -> Option<&ManufacturingMetrics> {
        self.metrics.as_ref()
    }

    pub fn set_metrics(&mut self, metrics: ManufacturingMetrics) {
        self.metrics = Some(metrics);
    }

    pub fn breakdown(&self) -> Option<&ScoreBreakdown> {
        self.breakdown.as_ref()
    }

    /// Stores a score breakdown computed for the current placements.
    pub fn cache_breakdown(&mut self, breakdown: ScoreBreakdown) {
        self.breakdown = Some(breakdown);
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            total_requested: self.placed.len() + self.failed_parts.len() + self.rejected_parts.len(),
            total_placed: self.placed.len(),
            total_failed: self.failed_parts.len(),
            total_rejected: self.rejected_parts.len(),
            utilization: self.utilization(),
            score: self.breakdown.as_ref().map(|b| b.total),
            time_ms: self.elapsed_ms,
            strategy: self.strategy.clone(),
        }
    }
}

//! Placement validation with a grid broad phase and an exact narrow phase.
//!
//! The detector owns the accepted set of placed parts. Only two operations
//! change it: [`CollisionDetector::clear`] and a successful
//! [`CollisionDetector::try_place`]. A rejected placement leaves the state
//! untouched.
//!
//! Checks run in this order:
//!
//! 1. The candidate's bounding box must lie inside the usable sheet region.
//! 2. Placed parts whose boxes do not overlap the candidate's box grown by
//!    the required spacing are skipped.
//! 3. The remaining pairs are tested exactly. With spacing, both shapes are
//!    grown by half the spacing before the intersection test.

use std::sync::Arc;

use kerfnest_core::{normalize_angle, BoundingBox, SheetConstraints};

use crate::geometry::Polygon;
use crate::spatial_index::{BoxTree, GridIndex, DEFAULT_CELL_SIZE};

/// Intersection area treated as touching rather than overlapping.
pub const OVERLAP_TOLERANCE: f64 = 1e-6;

/// Tolerance on the sheet-bounds check.
pub const BOUNDS_TOLERANCE: f64 = 1e-6;

/// Placed-part count up to which the grid is bypassed.
pub const DEFAULT_INDEX_THRESHOLD: usize = 8;

/// A part committed at a position and rotation.
///
/// The absolute geometry is `polygon.rotate(rotation).translate(x, y)`.
#[derive(Debug, Clone)]
pub struct PlacedPart {
    pub polygon: Arc<Polygon>,
    pub x: f64,
    pub y: f64,
    /// Degrees in `[0, 360)`.
    pub rotation: f64,
}

impl PlacedPart {
    pub fn new(polygon: Arc<Polygon>, x: f64, y: f64, rotation: f64) -> Self {
        Self {
            polygon,
            x,
            y,
            rotation: normalize_angle(rotation),
        }
    }

    pub fn id(&self) -> &str {
        self.polygon.id()
    }

    /// Area of the part (rotation and translation preserve it).
    pub fn area(&self) -> f64 {
        self.polygon.area()
    }

    /// Part geometry in its local frame after rotation.
    pub fn rotated(&self) -> Polygon {
        self.polygon.rotate(self.rotation)
    }

    /// Absolute geometry on the sheet.
    pub fn geometry(&self) -> Polygon {
        self.rotated().translate(self.x, self.y)
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.geometry().bounding_box()
    }

    /// Same part moved to a new position and rotation.
    pub fn moved(&self, x: f64, y: f64, rotation: f64) -> Self {
        Self::new(Arc::clone(&self.polygon), x, y, rotation)
    }
}

/// Why a placement was refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("part '{id}' extends outside the usable sheet region")]
    OutOfBounds { id: String },

    #[error("part '{id}' has geometry that cannot be tested")]
    InvalidGeometry { id: String },

    #[error("part '{id}' collides with placed part #{index} '{other}'")]
    Collision {
        id: String,
        index: usize,
        other: String,
    },
}

/// A placed part with its derived geometry cached for later checks.
#[derive(Debug, Clone)]
struct PlacedEntry {
    part: PlacedPart,
    geometry: Polygon,
    bbox: BoundingBox,
    /// Geometry grown by half the spacing; `None` when spacing is zero.
    buffered: Option<Polygon>,
    /// Axis-aligned rectangle: box tests are exact.
    is_rect: bool,
}

fn is_axis_rect(geometry: &Polygon, bbox: &BoundingBox) -> bool {
    geometry.hole_count() == 0 && geometry.area() >= bbox.area() * (1.0 - 1e-9)
}

fn box_overlap_area(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let w = a.max_x.min(b.max_x) - a.min_x.max(b.min_x);
    let h = a.max_y.min(b.max_y) - a.min_y.max(b.min_y);
    if w > 0.0 && h > 0.0 {
        w * h
    } else {
        0.0
    }
}

/// Collision detector for one sheet.
#[derive(Debug, Clone)]
pub struct CollisionDetector {
    sheet_area: f64,
    bounds: BoundingBox,
    spacing: f64,
    index_threshold: usize,
    grid: GridIndex,
    tree: BoxTree,
    placed: Vec<PlacedEntry>,
}

impl CollisionDetector {
    /// Creates an empty detector for `sheet` requiring `spacing` clearance
    /// between parts.
    pub fn new(sheet: &SheetConstraints, spacing: f64) -> Self {
        let bounds = sheet.usable_bounds();
        Self {
            sheet_area: sheet.area(),
            bounds,
            spacing: spacing.max(0.0),
            index_threshold: DEFAULT_INDEX_THRESHOLD,
            grid: GridIndex::new(bounds, DEFAULT_CELL_SIZE),
            tree: BoxTree::new(),
            placed: Vec::new(),
        }
    }

    /// Rebuilds a detector from a layout that has already been validated.
    ///
    /// Parts are accepted without re-checking.
    pub fn from_layout(
        sheet: &SheetConstraints,
        spacing: f64,
        parts: impl IntoIterator<Item = PlacedPart>,
    ) -> Self {
        let mut detector = Self::new(sheet, spacing);
        for part in parts {
            let geometry = part.geometry();
            let buffered = detector.buffered(&geometry);
            detector.commit(part, geometry, buffered);
        }
        detector
    }

    /// Grid cell size for the broad phase.
    pub fn with_cell_size(mut self, cell_size: f64) -> Self {
        self.grid = GridIndex::new(self.bounds, cell_size);
        self.grid.rebuild(self.placed.iter().enumerate().map(|(i, e)| (i, &e.bbox)));
        self
    }

    /// Compares every candidate against every placed part (no grid).
    pub fn without_index(mut self) -> Self {
        self.index_threshold = usize::MAX;
        self
    }

    pub fn with_index_threshold(mut self, threshold: usize) -> Self {
        self.index_threshold = threshold;
        self
    }

    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    /// Usable sheet region.
    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    pub fn len(&self) -> usize {
        self.placed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placed.is_empty()
    }

    /// Accepted parts in placement order.
    pub fn placed(&self) -> impl Iterator<Item = &PlacedPart> {
        self.placed.iter().map(|e| &e.part)
    }

    /// Bounding boxes of accepted parts in placement order.
    pub fn placed_boxes(&self) -> impl Iterator<Item = &BoundingBox> {
        self.placed.iter().map(|e| &e.bbox)
    }

    /// Consumes the detector and returns the accepted parts.
    pub fn into_placed(self) -> Vec<PlacedPart> {
        self.placed.into_iter().map(|e| e.part).collect()
    }

    pub fn used_area(&self) -> f64 {
        self.placed.iter().map(|e| e.part.area()).sum()
    }

    /// Placed area as a percentage of the full sheet area.
    pub fn utilization(&self) -> f64 {
        if self.sheet_area <= 0.0 {
            return 0.0;
        }
        (self.used_area() / self.sheet_area * 100.0).clamp(0.0, 100.0)
    }

    /// Smallest bounding-box gap between `bbox` and any placed part.
    pub fn nearest_gap(&self, bbox: &BoundingBox) -> Option<f64> {
        self.tree.nearest_gap(bbox, self.bounds.diagonal().max(1.0))
    }

    /// Empties the accepted set.
    pub fn clear(&mut self) {
        self.placed.clear();
        self.grid.clear();
        self.tree = BoxTree::new();
    }

    /// Validates a placement without committing it.
    pub fn check(
        &self,
        polygon: &Polygon,
        x: f64,
        y: f64,
        rotation: f64,
    ) -> Result<(), Rejection> {
        self.check_rotated(&polygon.rotate(normalize_angle(rotation)), x, y)
    }

    /// Like [`CollisionDetector::check`] for a part that is already rotated.
    pub fn check_rotated(&self, rotated: &Polygon, x: f64, y: f64) -> Result<(), Rejection> {
        self.check_geometry(&rotated.translate(x, y)).map(|_| ())
    }

    pub fn can_place(&self, polygon: &Polygon, x: f64, y: f64, rotation: f64) -> bool {
        self.check(polygon, x, y, rotation).is_ok()
    }

    /// Commits the placement if it passes every check. On failure nothing changes.
    pub fn try_place(&mut self, polygon: &Arc<Polygon>, x: f64, y: f64, rotation: f64) -> bool {
        self.place(PlacedPart::new(Arc::clone(polygon), x, y, rotation))
            .is_ok()
    }

    /// Commits `part` if it passes every check, reporting why otherwise.
    pub fn place(&mut self, part: PlacedPart) -> Result<(), Rejection> {
        let geometry = part.geometry();
        let buffered = self.check_geometry(&geometry)?;
        self.commit(part, geometry, buffered);
        Ok(())
    }

    /// Runs all checks on absolute geometry; returns the buffered shape for reuse.
    fn check_geometry(&self, geometry: &Polygon) -> Result<Option<Polygon>, Rejection> {
        let id = || geometry.id().to_string();
        if !geometry.exterior().iter().all(|p| p.is_finite()) {
            return Err(Rejection::InvalidGeometry { id: id() });
        }

        let bbox = geometry.bounding_box();
        if !self.bounds.contains_box(&bbox, BOUNDS_TOLERANCE) {
            return Err(Rejection::OutOfBounds { id: id() });
        }

        let query = bbox.expanded(self.spacing);
        let nearby: Vec<usize> = if self.placed.len() > self.index_threshold {
            self.grid.candidates(&query)
        } else {
            (0..self.placed.len()).collect()
        };

        let is_rect = is_axis_rect(geometry, &bbox);
        let mut buffered: Option<Option<Polygon>> = None;
        for index in nearby {
            let entry = &self.placed[index];
            if !query.overlaps(&entry.bbox) {
                continue;
            }

            let collides = if is_rect && entry.is_rect {
                if self.spacing > 0.0 {
                    bbox.distance_to(&entry.bbox) < self.spacing - 1e-9
                } else {
                    box_overlap_area(&bbox, &entry.bbox) > OVERLAP_TOLERANCE
                }
            } else {
                match &entry.buffered {
                    Some(other) => {
                        let own = buffered.get_or_insert_with(|| self.buffered(geometry));
                        match own {
                            Some(own) => own.overlaps(other, OVERLAP_TOLERANCE),
                            None => return Err(Rejection::InvalidGeometry { id: id() }),
                        }
                    }
                    None => geometry.overlaps(&entry.geometry, OVERLAP_TOLERANCE),
                }
            };
            if collides {
                return Err(Rejection::Collision {
                    id: id(),
                    index,
                    other: entry.part.id().to_string(),
                });
            }
        }

        Ok(match buffered {
            Some(b) => b,
            None => self.buffered(geometry),
        })
    }

    fn buffered(&self, geometry: &Polygon) -> Option<Polygon> {
        if self.spacing > 0.0 {
            geometry.buffer(self.spacing / 2.0)
        } else {
            None
        }
    }

    fn commit(&mut self, part: PlacedPart, geometry: Polygon, buffered: Option<Polygon>) {
        let bbox = geometry.bounding_box();
        let index = self.placed.len();
        self.grid.insert(index, &bbox);
        self.tree.insert(index, bbox);
        self.placed.push(PlacedEntry {
            is_rect: is_axis_rect(&geometry, &bbox),
            part,
            geometry,
            bbox,
            buffered,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(id: &str, size: f64) -> Arc<Polygon> {
        Arc::new(Polygon::rectangle(id, size, size))
    }

    fn sheet() -> SheetConstraints {
        SheetConstraints::new(600.0, 400.0)
    }

    #[test]
    fn test_accepts_and_rejects_overlap() {
        let mut detector = CollisionDetector::new(&sheet(), 0.0);
        let a = square("a", 50.0);
        assert!(detector.try_place(&a, 10.0, 10.0, 0.0));
        assert!(!detector.try_place(&a, 40.0, 40.0, 0.0));
        assert_eq!(detector.len(), 1);

        // touching edges is allowed without spacing
        assert!(detector.try_place(&a, 60.0, 10.0, 0.0));
        assert_eq!(detector.len(), 2);
    }

    #[test]
    fn test_rejection_reasons() {
        let mut detector = CollisionDetector::new(&sheet(), 0.0);
        let a = square("a", 50.0);
        assert!(detector.try_place(&a, 10.0, 10.0, 0.0));

        assert_eq!(
            detector.check(&a, 0.0, 10.0, 0.0),
            Err(Rejection::OutOfBounds { id: "a".into() })
        );
        assert_eq!(
            detector.check(&a, 560.0, 10.0, 0.0),
            Err(Rejection::OutOfBounds { id: "a".into() })
        );
        match detector.check(&a, 30.0, 30.0, 0.0) {
            Err(Rejection::Collision { index, other, .. }) => {
                assert_eq!(index, 0);
                assert_eq!(other, "a");
            }
            other => panic!("expected collision, got {:?}", other),
        }
    }

    #[test]
    fn test_failed_place_leaves_state_unchanged() {
        let mut detector = CollisionDetector::new(&sheet(), 2.0);
        let a = square("a", 50.0);
        assert!(detector.try_place(&a, 10.0, 10.0, 0.0));
        let before: Vec<(f64, f64)> = detector.placed().map(|p| (p.x, p.y)).collect();

        assert!(!detector.try_place(&a, 61.0, 10.0, 0.0));
        assert!(!detector.try_place(&a, 1000.0, 10.0, 0.0));

        let after: Vec<(f64, f64)> = detector.placed().map(|p| (p.x, p.y)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_spacing_is_enforced() {
        let mut detector = CollisionDetector::new(&sheet(), 4.0);
        let a = square("a", 50.0);
        assert!(detector.try_place(&a, 10.0, 10.0, 0.0));
        // 2 units apart, 4 required
        assert!(!detector.can_place(&a, 62.0, 10.0, 0.0));
        // 5 units apart
        assert!(detector.can_place(&a, 65.0, 10.0, 0.0));
    }

    #[test]
    fn test_rotation_is_applied() {
        let mut detector = CollisionDetector::new(&sheet(), 0.0);
        let bar = Arc::new(Polygon::rectangle("bar", 100.0, 20.0));
        // rotated 90 degrees the bar occupies x in [-20, 0]
        assert!(!detector.can_place(&bar, 10.0, 10.0, 90.0));
        assert!(detector.try_place(&bar, 30.0, 10.0, 90.0));
        let placed = detector.placed().next().unwrap();
        let bbox = placed.bounding_box();
        assert_relative_eq!(bbox.min_x, 10.0, epsilon = 1e-9);
        assert_relative_eq!(bbox.max_y, 110.0, epsilon = 1e-9);
    }

    #[test]
    fn test_indexed_matches_linear() {
        let mut indexed = CollisionDetector::new(&sheet(), 1.0).with_index_threshold(0);
        let mut linear = CollisionDetector::new(&sheet(), 1.0).without_index();
        let a = square("a", 30.0);

        for i in 0..8 {
            for j in 0..5 {
                let (x, y) = (10.0 + i as f64 * 35.0, 10.0 + j as f64 * 35.0);
                assert_eq!(indexed.try_place(&a, x, y, 0.0), linear.try_place(&a, x, y, 0.0));
            }
        }
        assert_eq!(indexed.len(), 40);
        for (x, y) in [(20.0, 20.0), (300.0, 200.0), (44.5, 10.0), (500.0, 300.0)] {
            assert_eq!(indexed.can_place(&a, x, y, 0.0), linear.can_place(&a, x, y, 0.0));
        }
    }

    #[test]
    fn test_clear_and_utilization() {
        let mut detector = CollisionDetector::new(&SheetConstraints::new(200.0, 200.0), 0.0);
        let a = square("a", 100.0);
        assert!(detector.try_place(&a, 5.0, 5.0, 0.0));
        assert_relative_eq!(detector.utilization(), 25.0);
        assert_relative_eq!(detector.used_area(), 10000.0);

        detector.clear();
        assert!(detector.is_empty());
        assert_relative_eq!(detector.utilization(), 0.0);
        assert!(detector.try_place(&a, 5.0, 5.0, 0.0));
    }

    #[test]
    fn test_from_layout_and_nearest_gap() {
        let a = square("a", 40.0);
        let layout = vec![
            PlacedPart::new(Arc::clone(&a), 10.0, 10.0, 0.0),
            PlacedPart::new(Arc::clone(&a), 100.0, 10.0, 0.0),
        ];
        let detector = CollisionDetector::from_layout(&sheet(), 0.0, layout).with_cell_size(50.0);
        assert_eq!(detector.len(), 2);
        assert!(!detector.can_place(&a, 110.0, 20.0, 0.0));

        let query = BoundingBox::new(55.0, 10.0, 60.0, 50.0);
        assert_relative_eq!(detector.nearest_gap(&query).unwrap(), 5.0);
    }

    #[test]
    fn test_placed_part_normalizes_rotation() {
        let part = PlacedPart::new(square("a", 10.0), 0.0, 0.0, -90.0);
        assert_relative_eq!(part.rotation, 270.0);
        let moved = part.moved(5.0, 5.0, 450.0);
        assert_relative_eq!(moved.rotation, 90.0);
        assert_eq!(moved.id(), "a");
    }
}

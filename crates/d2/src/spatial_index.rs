//! Spatial indexes over placed parts.
//!
//! - [`GridIndex`]: uniform grid broad phase for collision checks. Each placed
//!   part is registered in every cell its bounding box overlaps; a candidate is
//!   only compared against parts sharing a cell.
//! - [`BoxTree`]: R*-tree of placed bounding boxes for nearest-gap queries
//!   used by position scoring.

use std::collections::HashMap;

use kerfnest_core::BoundingBox;
use rstar::{primitives::Rectangle, RTree, RTreeObject, AABB};

/// Default grid cell edge length in sheet units.
pub const DEFAULT_CELL_SIZE: f64 = 100.0;

/// Uniform grid over the sheet mapping cells to placed-part indices.
#[derive(Debug, Clone)]
pub struct GridIndex {
    cell_size: f64,
    bounds: BoundingBox,
    max_col: i32,
    max_row: i32,
    cells: HashMap<(i32, i32), Vec<usize>>,
    len: usize,
}

impl GridIndex {
    /// Creates an empty grid covering `bounds`. Non-positive cell sizes use the default.
    pub fn new(bounds: BoundingBox, cell_size: f64) -> Self {
        let cell_size = if cell_size > 0.0 {
            cell_size
        } else {
            DEFAULT_CELL_SIZE
        };
        Self {
            cell_size,
            bounds,
            max_col: ((bounds.width() / cell_size).floor() as i32).max(0),
            max_row: ((bounds.height() / cell_size).floor() as i32).max(0),
            cells: HashMap::new(),
            len: 0,
        }
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Number of registered parts.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of non-empty cells.
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    fn cell_range(&self, bbox: &BoundingBox) -> (i32, i32, i32, i32) {
        let col = |x: f64| {
            (((x - self.bounds.min_x) / self.cell_size).floor() as i32).clamp(0, self.max_col)
        };
        let row = |y: f64| {
            (((y - self.bounds.min_y) / self.cell_size).floor() as i32).clamp(0, self.max_row)
        };
        (col(bbox.min_x), row(bbox.min_y), col(bbox.max_x), row(bbox.max_y))
    }

    /// Registers part `index` in every cell overlapped by `bbox`.
    pub fn insert(&mut self, index: usize, bbox: &BoundingBox) {
        let (c0, r0, c1, r1) = self.cell_range(bbox);
        for col in c0..=c1 {
            for row in r0..=r1 {
                self.cells.entry((col, row)).or_default().push(index);
            }
        }
        self.len += 1;
    }

    /// Indices of parts sharing at least one cell with `bbox`, ascending and unique.
    pub fn candidates(&self, bbox: &BoundingBox) -> Vec<usize> {
        let (c0, r0, c1, r1) = self.cell_range(bbox);
        let mut found: Vec<usize> = Vec::new();
        for col in c0..=c1 {
            for row in r0..=r1 {
                if let Some(indices) = self.cells.get(&(col, row)) {
                    found.extend_from_slice(indices);
                }
            }
        }
        found.sort_unstable();
        found.dedup();
        found
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.len = 0;
    }

    /// Replaces the contents with `(index, bbox)` pairs.
    pub fn rebuild<'a>(&mut self, entries: impl IntoIterator<Item = (usize, &'a BoundingBox)>) {
        self.clear();
        for (index, bbox) in entries {
            self.insert(index, bbox);
        }
    }
}

/// A bounding box tagged with the index of the placed part it belongs to.
#[derive(Debug, Clone)]
pub struct IndexedRectangle {
    rectangle: Rectangle<[f64; 2]>,
    pub bbox: BoundingBox,
    pub index: usize,
}

impl IndexedRectangle {
    pub fn new(bbox: BoundingBox, index: usize) -> Self {
        Self {
            rectangle: Rectangle::from_corners([bbox.min_x, bbox.min_y], [bbox.max_x, bbox.max_y]),
            bbox,
            index,
        }
    }
}

impl RTreeObject for IndexedRectangle {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.rectangle.envelope()
    }
}

/// R*-tree of placed bounding boxes.
#[derive(Debug, Default, Clone)]
pub struct BoxTree {
    tree: RTree<IndexedRectangle>,
}

impl BoxTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_boxes(boxes: impl IntoIterator<Item = BoundingBox>) -> Self {
        let entries = boxes
            .into_iter()
            .enumerate()
            .map(|(i, b)| IndexedRectangle::new(b, i))
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn insert(&mut self, index: usize, bbox: BoundingBox) {
        self.tree.insert(IndexedRectangle::new(bbox, index));
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Boxes intersecting `bbox` (touching counts).
    pub fn query(&self, bbox: &BoundingBox) -> impl Iterator<Item = &IndexedRectangle> {
        let envelope = AABB::from_corners([bbox.min_x, bbox.min_y], [bbox.max_x, bbox.max_y]);
        self.tree.locate_in_envelope_intersecting(&envelope)
    }

    /// Smallest box-to-box gap between `bbox` and any stored box, searching
    /// no further than `max_radius`.
    pub fn nearest_gap(&self, bbox: &BoundingBox, max_radius: f64) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let mut radius = (max_radius / 64.0).max(1.0);
        loop {
            let best = self
                .query(&bbox.expanded(radius))
                .map(|e| e.bbox.distance_to(bbox))
                .fold(f64::INFINITY, f64::min);
            // Every box within `radius` is in the query, so a hit at or
            // below it is the true minimum.
            if best <= radius {
                return Some(best);
            }
            if radius >= max_radius {
                return best.is_finite().then_some(best);
            }
            radius = (radius * 2.0).min(max_radius);
        }
    }
}

//! Position scoring for placement candidates. Higher is better.

use kerfnest_core::BoundingBox;

use crate::collision::CollisionDetector;

/// Scores a candidate placement given by the bounding box it would occupy.
pub trait PositionScorer: Send + Sync {
    fn score(&self, detector: &CollisionDetector, bbox: &BoundingBox, rotation: f64) -> f64;

    /// Score at which the search for the current part stops and commits.
    fn good_enough(&self) -> f64;
}

/// Bottom-left bias plus a proximity bonus toward already placed parts.
///
/// - bottom-left: `(xs^e + ys^e) * bl_weight`, where `xs` and `ys` are 1 at
///   the usable region's lower-left corner and 0 at the opposite edges
/// - compactness: `compactness_weight / (gap + 1)` with `gap` the box
///   distance to the nearest placed part beyond the required spacing; the
///   first part uses `corner_weight / (corner_distance + 1)` instead
/// - tie-breakers: `-rotation_penalty` for non-zero rotations and
///   `+edge_bonus` per usable-region edge the part sits on
#[derive(Debug, Clone, PartialEq)]
pub struct BottomLeftCompactness {
    pub bl_weight: f64,
    /// Must be greater than 1 so corners dominate merely low positions.
    pub exponent: f64,
    pub compactness_weight: f64,
    pub corner_weight: f64,
    pub rotation_penalty: f64,
    pub edge_bonus: f64,
    /// Early-exit threshold. The default, `compactness_weight + bl_weight`,
    /// is only reachable by a candidate that touches a placed part and also
    /// sits low and left; mere contact somewhere on the sheet keeps searching.
    pub good_enough: f64,
}

impl Default for BottomLeftCompactness {
    fn default() -> Self {
        Self {
            bl_weight: 200.0,
            exponent: 2.0,
            compactness_weight: 5000.0,
            corner_weight: 2000.0,
            rotation_penalty: 2.0,
            edge_bonus: 3.0,
            good_enough: 5200.0,
        }
    }
}

impl BottomLeftCompactness {
    pub fn with_good_enough(mut self, threshold: f64) -> Self {
        self.good_enough = threshold;
        self
    }

    pub fn with_exponent(mut self, exponent: f64) -> Self {
        self.exponent = exponent;
        self
    }
}

const EDGE_TOLERANCE: f64 = 1e-6;

impl PositionScorer for BottomLeftCompactness {
    fn score(&self, detector: &CollisionDetector, bbox: &BoundingBox, rotation: f64) -> f64 {
        let bounds = detector.bounds();
        let relative = |offset: f64, span: f64| {
            if span > 0.0 {
                (1.0 - offset / span).clamp(0.0, 1.0)
            } else {
                1.0
            }
        };
        let xs = relative(bbox.min_x - bounds.min_x, bounds.width());
        let ys = relative(bbox.min_y - bounds.min_y, bounds.height());
        let mut score = (xs.powf(self.exponent) + ys.powf(self.exponent)) * self.bl_weight;

        score += match detector.nearest_gap(bbox) {
            Some(gap) => {
                let excess = (gap - detector.spacing()).max(0.0);
                self.compactness_weight / (excess + 1.0)
            }
            None => {
                let dx = bbox.min_x - bounds.min_x;
                let dy = bbox.min_y - bounds.min_y;
                self.corner_weight / (dx.hypot(dy) + 1.0)
            }
        };

        if rotation.abs() > 1e-9 {
            score -= self.rotation_penalty;
        }
        if (bbox.min_x - bounds.min_x).abs() <= EDGE_TOLERANCE {
            score += self.edge_bonus;
        }
        if (bbox.min_y - bounds.min_y).abs() <= EDGE_TOLERANCE {
            score += self.edge_bonus;
        }
        score
    }

    fn good_enough(&self) -> f64 {
        self.good_enough
    }
}

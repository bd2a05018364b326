//! Candidate position generation for one part at one rotation.
//!
//! Candidates are translations of the rotated part's local origin. Every
//! policy yields them bottom-left first (ascending y, then ascending x), and
//! that order breaks score ties during placement.

use std::sync::Arc;

use kerfnest_core::{BoundingBox, Point};

use crate::collision::CollisionDetector;
use crate::geometry::Polygon;
use crate::nfp::{point_outside_all, NfpEngine};

/// Default cap on positions per rotation.
pub const DEFAULT_MAX_POSITIONS: usize = 4000;

/// Smallest and largest adaptive grid step.
pub const MIN_GRID_STEP: f64 = 2.0;
pub const MAX_GRID_STEP: f64 = 25.0;

/// A placed part as seen by the NFP policy: its rotated local shape,
/// grown by the required spacing, and its translation.
#[derive(Debug, Clone)]
pub struct StationaryPart {
    pub shape: Arc<Polygon>,
    pub x: f64,
    pub y: f64,
}

/// Inputs for candidate generation.
pub struct CandidateContext<'a> {
    /// The part as submitted (unrotated).
    pub part: &'a Polygon,
    /// The part rotated by `rotation`.
    pub rotated: &'a Polygon,
    pub rotation: f64,
    /// Valid translations keeping the rotated part inside the usable sheet.
    pub ifp: BoundingBox,
    /// Grid step imposed by the caller (multi-pass tiers).
    pub step_hint: Option<f64>,
    pub placed: &'a [StationaryPart],
    pub engine: &'a NfpEngine,
    pub detector: &'a CollisionDetector,
}

/// Enumerates candidate translations for one part at one rotation.
pub trait CandidatePolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Candidates in generation order.
    fn candidates(&self, ctx: &CandidateContext<'_>) -> Vec<Point>;

    /// Returns true if the policy reads [`CandidateContext::placed`].
    fn uses_nfp(&self) -> bool {
        false
    }
}

/// Adaptive grid step: a quarter of the part's smaller extent, clamped.
pub fn adaptive_step(rotated: &Polygon) -> f64 {
    let bbox = rotated.bounding_box();
    (bbox.width().min(bbox.height()) / 4.0).clamp(MIN_GRID_STEP, MAX_GRID_STEP)
}

fn sort_bottom_left(points: &mut Vec<Point>) {
    points.sort_by(|a, b| {
        a.y.partial_cmp(&b.y)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
    });
    points.dedup_by(|a, b| a.approx_eq(b, 1e-9));
}

/// Grid positions within the IFP, with the upper edges always included.
///
/// With `contact_lines` the grid also gets the x and y lines at which the
/// part would sit exactly `spacing` right of or above a placed part.
#[derive(Debug, Clone)]
pub struct GridCandidates {
    /// Fixed step; adaptive when `None`.
    pub step: Option<f64>,
    pub max_positions: usize,
    pub contact_lines: bool,
}

impl Default for GridCandidates {
    fn default() -> Self {
        Self {
            step: None,
            max_positions: DEFAULT_MAX_POSITIONS,
            contact_lines: true,
        }
    }
}

impl GridCandidates {
    pub fn with_step(step: f64) -> Self {
        Self {
            step: Some(step),
            ..Default::default()
        }
    }

    fn axis(min: f64, max: f64, step: f64, extra: impl Iterator<Item = f64>) -> Vec<f64> {
        let span = (max - min).max(0.0);
        let n = (span / step).floor() as usize;
        let mut values: Vec<f64> = (0..=n).map(|i| min + i as f64 * step).collect();
        if values.last().map_or(true, |&v| max - v > 1e-9) {
            values.push(max.max(min));
        }
        values.extend(extra.filter(|v| *v >= min && *v <= max));
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        values.dedup_by(|a, b| (*a - *b).abs() <= 1e-9);
        values
    }
}

impl CandidatePolicy for GridCandidates {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn candidates(&self, ctx: &CandidateContext<'_>) -> Vec<Point> {
        let mut step = ctx
            .step_hint
            .or(self.step)
            .unwrap_or_else(|| adaptive_step(ctx.rotated))
            .max(MIN_GRID_STEP / 4.0);

        let ifp = &ctx.ifp;
        let count = |step: f64| {
            ((ifp.width() / step).floor() + 2.0) * ((ifp.height() / step).floor() + 2.0)
        };
        let max_positions = self.max_positions.max(1) as f64;
        if count(step) > max_positions {
            step *= (count(step) / max_positions).sqrt();
            while count(step) > max_positions {
                step *= 1.05;
            }
        }

        let local = ctx.rotated.bounding_box();
        let spacing = ctx.detector.spacing();
        let boxes: Vec<BoundingBox> = if self.contact_lines {
            ctx.detector.placed_boxes().copied().collect()
        } else {
            Vec::new()
        };
        let xs = Self::axis(
            ifp.min_x,
            ifp.max_x,
            step,
            boxes.iter().map(|b| b.max_x + spacing - local.min_x),
        );
        let ys = Self::axis(
            ifp.min_y,
            ifp.max_y,
            step,
            boxes.iter().map(|b| b.max_y + spacing - local.min_y),
        );
        ys.iter()
            .flat_map(|&y| xs.iter().map(move |&x| Point::new(x, y)))
            .take(self.max_positions.max(1))
            .collect()
    }
}

/// Vertices of the placed parts' NFPs that lie inside the IFP and outside
/// every NFP, plus the IFP corners.
#[derive(Debug, Clone)]
pub struct NfpCandidates {
    pub max_positions: usize,
}

impl Default for NfpCandidates {
    fn default() -> Self {
        Self {
            max_positions: DEFAULT_MAX_POSITIONS,
        }
    }
}

impl CandidatePolicy for NfpCandidates {
    fn name(&self) -> &'static str {
        "nfp"
    }

    fn uses_nfp(&self) -> bool {
        true
    }

    fn candidates(&self, ctx: &CandidateContext<'_>) -> Vec<Point> {
        let ifp = &ctx.ifp;
        let mut nfps: Vec<Polygon> = Vec::with_capacity(ctx.placed.len());
        for stationary in ctx.placed {
            match ctx
                .engine
                .compute_nfp(&stationary.shape, ctx.part, ctx.rotation)
            {
                Ok(Some(result)) => {
                    let nfp = result.polygon.translate(stationary.x, stationary.y);
                    if nfp.bounding_box().intersects(ifp) {
                        nfps.push(nfp);
                    }
                }
                Ok(None) => {}
                Err(e) => log::warn!("NFP candidates skipped a placed part: {}", e),
            }
        }

        let mut raw: Vec<Point> = vec![
            Point::new(ifp.min_x, ifp.min_y),
            Point::new(ifp.max_x, ifp.min_y),
            Point::new(ifp.min_x, ifp.max_y),
            Point::new(ifp.max_x, ifp.max_y),
        ];
        for nfp in &nfps {
            for v in nfp.exterior() {
                raw.push(*v);
                // Projections onto the sheet edges catch the slots along the margins.
                raw.push(Point::new(v.x.clamp(ifp.min_x, ifp.max_x), ifp.min_y));
                raw.push(Point::new(ifp.min_x, v.y.clamp(ifp.min_y, ifp.max_y)));
            }
        }

        let refs: Vec<&Polygon> = nfps.iter().collect();
        let mut points: Vec<Point> = raw
            .into_iter()
            .filter(|p| ifp.contains_point(p) && point_outside_all(*p, &refs))
            .collect();
        sort_bottom_left(&mut points);
        points.truncate(self.max_positions.max(1));
        points
    }
}

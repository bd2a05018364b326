//! Part ordering policies.
//!
//! The order in which parts are committed decides most of the achievable
//! density: early placements shape the free space every later part has to
//! fit into.

use std::cmp::Ordering;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::geometry::Polygon;

/// Produces a total order over parts before placement.
pub trait OrderingPolicy: Send + Sync {
    /// Short name used in logs and solution summaries.
    fn name(&self) -> String;

    /// Indices into `parts` in placement order. Must be a permutation.
    fn order(&self, parts: &[Arc<Polygon>]) -> Vec<usize>;
}

/// Packing difficulty estimate in `[0, 1]` (higher is harder).
///
/// Weighted sum of five shape penalties: concavity (area over hull area),
/// elongation (isoperimetric quotient), aspect-ratio extremity on a log
/// scale, vertex count, and concavity depth.
pub fn difficulty(polygon: &Polygon) -> f64 {
    let aspect = polygon.aspect_ratio();
    let aspect_penalty = if aspect > 0.0 {
        (aspect.ln().abs() / 2.0).min(1.0)
    } else {
        1.0
    };
    let vertex_penalty = (polygon.vertex_count() as f64 / 50.0).min(1.0);

    let score = (1.0 - polygon.convexity()) * 0.3
        + (1.0 - polygon.compactness()) * 0.2
        + aspect_penalty * 0.2
        + vertex_penalty * 0.15
        + polygon.concavity_depth() * 0.15;
    score.clamp(0.0, 1.0)
}

/// Built-in orderings.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PartOrdering {
    /// Hard and large parts first: `0.6 * difficulty + 0.4 * relative area`.
    #[default]
    DifficultyFirst,
    AreaDescending,
    AreaAscending,
    PerimeterDescending,
    WidthDescending,
    HeightDescending,
    /// Most convex first.
    ConvexityDescending,
    /// Input order.
    AsGiven,
    /// Seeded shuffle.
    Random(u64),
}

impl PartOrdering {
    /// Orderings tried by multi-start, most promising first.
    pub fn multi_start_set(count: usize) -> Vec<PartOrdering> {
        const SEEDS: [u64; 6] = [42, 123, 456, 789, 1000, 2000];
        let mut set = vec![
            PartOrdering::DifficultyFirst,
            PartOrdering::AreaDescending,
            PartOrdering::PerimeterDescending,
            PartOrdering::WidthDescending,
            PartOrdering::HeightDescending,
            PartOrdering::ConvexityDescending,
        ];
        set.extend(SEEDS.iter().map(|&s| PartOrdering::Random(s)));
        let mut seed = 3000;
        while set.len() < count {
            set.push(PartOrdering::Random(seed));
            seed += 1000;
        }
        set.truncate(count.max(1));
        set
    }
}

fn sort_desc_by<F>(parts: &[Arc<Polygon>], key: F) -> Vec<usize>
where
    F: Fn(&Polygon) -> f64,
{
    let keys: Vec<f64> = parts.iter().map(|p| key(p)).collect();
    let mut indices: Vec<usize> = (0..parts.len()).collect();
    // Stable sort keeps input order for ties.
    indices.sort_by(|&a, &b| keys[b].partial_cmp(&keys[a]).unwrap_or(Ordering::Equal));
    indices
}

impl OrderingPolicy for PartOrdering {
    fn name(&self) -> String {
        match self {
            PartOrdering::DifficultyFirst => "difficulty_first".into(),
            PartOrdering::AreaDescending => "area_desc".into(),
            PartOrdering::AreaAscending => "area_asc".into(),
            PartOrdering::PerimeterDescending => "perimeter_desc".into(),
            PartOrdering::WidthDescending => "width_desc".into(),
            PartOrdering::HeightDescending => "height_desc".into(),
            PartOrdering::ConvexityDescending => "convexity_desc".into(),
            PartOrdering::AsGiven => "as_given".into(),
            PartOrdering::Random(seed) => format!("random_{}", seed),
        }
    }

    fn order(&self, parts: &[Arc<Polygon>]) -> Vec<usize> {
        match self {
            PartOrdering::DifficultyFirst => {
                let max_area = parts.iter().map(|p| p.area()).fold(0.0_f64, f64::max);
                sort_desc_by(parts, |p| {
                    let relative_area = if max_area > 0.0 { p.area() / max_area } else { 0.0 };
                    difficulty(p) * 0.6 + relative_area * 0.4
                })
            }
            PartOrdering::AreaDescending => sort_desc_by(parts, Polygon::area),
            PartOrdering::AreaAscending => sort_desc_by(parts, |p| -p.area()),
            PartOrdering::PerimeterDescending => sort_desc_by(parts, Polygon::perimeter),
            PartOrdering::WidthDescending => sort_desc_by(parts, |p| p.bounding_box().width()),
            PartOrdering::HeightDescending => sort_desc_by(parts, |p| p.bounding_box().height()),
            PartOrdering::ConvexityDescending => sort_desc_by(parts, Polygon::convexity),
            PartOrdering::AsGiven => (0..parts.len()).collect(),
            PartOrdering::Random(seed) => {
                let mut rng = StdRng::seed_from_u64(*seed);
                let mut indices: Vec<usize> = (0..parts.len()).collect();
                indices.shuffle(&mut rng);
                indices
            }
        }
    }
}

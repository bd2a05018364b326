//! Manufacturing metric estimation for a finished layout.
//!
//! Every placed part contributes one cut contour per ring. Holes must be cut
//! before the exterior of the same part, otherwise the part drops out of the
//! sheet with its holes still uncut. Contours are sequenced greedily: from
//! the current head position, the nearest ready contour is cut next, pierced
//! at its vertex closest to the head.
//!
//! With common-edge cutting enabled, exterior edges of neighbouring parts
//! that lie within one kerf of each other are cut once.

use kerfnest_core::{ManufacturingMetrics, Point};
use kerfnest_d2::NestingSolution;

use crate::config::CuttingConfig;
use crate::thermal::thermal_risk;

const SQ_MM_PER_SQ_M: f64 = 1_000_000.0;
const EDGE_TOLERANCE: f64 = 1e-6;

/// A closed contour to be cut.
#[derive(Debug, Clone)]
pub struct CutContour {
    /// Index of the placed part this contour belongs to.
    pub part: usize,
    pub is_hole: bool,
    /// Absolute ring vertices.
    pub vertices: Vec<Point>,
    pub length: f64,
}

/// A contour in cutting order with its chosen pierce point.
#[derive(Debug, Clone)]
pub struct SequencedCut {
    pub contour: usize,
    pub pierce: Point,
    /// Rapid travel from the previous pierce (or home) to this one.
    pub rapid: f64,
}

fn ring_edges(ring: &[Point]) -> impl Iterator<Item = (Point, Point)> + '_ {
    ring.iter().copied().zip(ring.iter().copied().cycle().skip(1))
}

fn ring_length(ring: &[Point]) -> f64 {
    if ring.len() < 2 {
        return 0.0;
    }
    ring_edges(ring).map(|(a, b)| a.distance(&b)).sum()
}

/// Length along `a0 -> a1` covered by a parallel edge `b0 -> b1` lying at
/// most `reach` away from it.
fn parallel_overlap(a0: Point, a1: Point, b0: Point, b1: Point, reach: f64) -> f64 {
    let len = a0.distance(&a1);
    let other = b0.distance(&b1);
    if len <= EDGE_TOLERANCE || other <= EDGE_TOLERANCE {
        return 0.0;
    }
    let (ux, uy) = ((a1.x - a0.x) / len, (a1.y - a0.y) / len);
    let (ex, ey) = (b1.x - b0.x, b1.y - b0.y);
    if (ux * ey - uy * ex).abs() / other > EDGE_TOLERANCE {
        return 0.0;
    }
    let distance = (ux * (b0.y - a0.y) - uy * (b0.x - a0.x)).abs();
    if distance > reach {
        return 0.0;
    }
    let t0 = ux * (b0.x - a0.x) + uy * (b0.y - a0.y);
    let t1 = ux * (b1.x - a0.x) + uy * (b1.y - a0.y);
    (t0.max(t1).min(len) - t0.min(t1).max(0.0)).max(0.0)
}

/// Total length of exterior edges that two different parts share within
/// `kerf`, i.e. the cut length saved by common-edge cutting.
pub fn common_edge_length(solution: &NestingSolution, kerf: f64) -> f64 {
    let reach = kerf.max(0.0) + EDGE_TOLERANCE;
    let parts: Vec<_> = solution
        .placed()
        .iter()
        .map(|p| {
            let geometry = p.geometry();
            (geometry.bounding_box(), geometry.exterior().to_vec())
        })
        .collect();

    let mut shared = 0.0;
    for (i, (box_a, ring_a)) in parts.iter().enumerate() {
        for (box_b, ring_b) in &parts[i + 1..] {
            if !box_a.expanded(reach).overlaps(box_b) {
                continue;
            }
            for (a0, a1) in ring_edges(ring_a) {
                for (b0, b1) in ring_edges(ring_b) {
                    shared += parallel_overlap(a0, a1, b0, b1, reach);
                }
            }
        }
    }
    shared
}

/// Cut contours of every placed part, holes first.
pub fn extract_contours(solution: &NestingSolution) -> Vec<CutContour> {
    let mut contours = Vec::new();
    for (index, placed) in solution.placed().iter().enumerate() {
        let geometry = placed.geometry();
        for hole in geometry.holes() {
            contours.push(CutContour {
                part: index,
                is_hole: true,
                length: ring_length(hole),
                vertices: hole.clone(),
            });
        }
        contours.push(CutContour {
            part: index,
            is_hole: false,
            length: ring_length(geometry.exterior()),
            vertices: geometry.exterior().to_vec(),
        });
    }
    contours
}

/// Nearest-neighbour cutting sequence starting from `home`.
pub fn plan_sequence(contours: &[CutContour], home: Point) -> Vec<SequencedCut> {
    let n = contours.len();
    let mut cut = vec![false; n];
    let mut holes_left = std::collections::HashMap::<usize, usize>::new();
    for c in contours.iter().filter(|c| c.is_hole) {
        *holes_left.entry(c.part).or_insert(0) += 1;
    }

    let mut order = Vec::with_capacity(n);
    let mut position = home;

    for _ in 0..n {
        let mut best: Option<(usize, Point, f64)> = None;
        for (id, contour) in contours.iter().enumerate() {
            if cut[id] {
                continue;
            }
            let ready = contour.is_hole || holes_left.get(&contour.part).copied().unwrap_or(0) == 0;
            if !ready {
                continue;
            }
            let Some((pierce, dist)) = contour
                .vertices
                .iter()
                .map(|v| (*v, position.distance(v)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
            else {
                continue;
            };
            if best.as_ref().map_or(true, |(_, _, d)| dist < *d) {
                best = Some((id, pierce, dist));
            }
        }

        let Some((id, pierce, rapid)) = best else {
            break;
        };
        cut[id] = true;
        if contours[id].is_hole {
            if let Some(left) = holes_left.get_mut(&contours[id].part) {
                *left = left.saturating_sub(1);
            }
        }
        order.push(SequencedCut {
            contour: id,
            pierce,
            rapid,
        });
        position = pierce;
    }
    order
}

/// Largest reusable offcut as a fraction of the usable area.
///
/// The offcut is the bigger of the full-height strip right of the layout and
/// the full-width strip above it. An empty layout leaves the whole usable
/// region free.
pub fn remnant_value(solution: &NestingSolution) -> f64 {
    let usable = solution.sheet().usable_bounds();
    let usable_area = usable.area();
    if usable_area <= 0.0 {
        return 0.0;
    }
    let Some(layout) = solution.layout_bounds() else {
        return 1.0;
    };
    let right = (usable.max_x - layout.max_x).max(0.0) * usable.height();
    let top = (usable.max_y - layout.max_y).max(0.0) * usable.width();
    (right.max(top) / usable_area).clamp(0.0, 1.0)
}

/// Estimates manufacturing metrics for `solution`.
pub fn estimate_metrics(solution: &NestingSolution, config: &CuttingConfig) -> ManufacturingMetrics {
    let material = &config.material;
    let home = Point::new(config.home_position.0, config.home_position.1);
    let contours = extract_contours(solution);
    let sequence = plan_sequence(&contours, home);

    let mut cut_length: f64 = contours.iter().map(|c| c.length).sum();
    if config.common_edge_cutting {
        let shared = common_edge_length(solution, material.kerf_width);
        cut_length = (cut_length - shared).max(0.0);
    }
    let rapid_distance: f64 = sequence.iter().map(|s| s.rapid).sum();
    let pierce_count = sequence.len();

    let cut_speed = material.cut_speed_per_sec();
    let rapid_speed = material.rapid_speed_per_sec();
    let cut_time = if cut_speed > 0.0 { cut_length / cut_speed } else { 0.0 };
    let rapid_time = if rapid_speed > 0.0 {
        rapid_distance / rapid_speed
    } else {
        0.0
    };
    let pierce_time = pierce_count as f64 * material.pierce_time;

    let pierces: Vec<Point> = sequence.iter().map(|s| s.pierce).collect();
    let lengths: Vec<f64> = sequence.iter().map(|s| contours[s.contour].length).collect();
    let thermal = if cut_speed > 0.0 && rapid_speed > 0.0 {
        thermal_risk(&pierces, &lengths, rapid_speed, cut_speed, home, &config.thermal)
    } else {
        0.0
    };

    let material_cost = solution.sheet_area() / SQ_MM_PER_SQ_M * material.cost_per_sqm;
    let machine_cost = (cut_time + rapid_time + pierce_time) / 3600.0 * config.machine_rate_per_hour;

    ManufacturingMetrics {
        used_area: solution.used_area(),
        cut_length,
        pierce_count,
        rapid_distance,
        cut_time,
        rapid_time,
        pierce_time,
        total_cost: material_cost + machine_cost,
        thermal_risk: thermal,
        remnant_value: remnant_value(solution),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use kerfnest_core::SheetConstraints;
    use kerfnest_d2::{PlacedPart, Polygon};
    use std::sync::Arc;

    fn solution(parts: Vec<PlacedPart>) -> NestingSolution {
        NestingSolution::new(SheetConstraints::new(1000.0, 500.0)).with_placed(parts)
    }

    fn plate_with_hole() -> Arc<Polygon> {
        Arc::new(Polygon::rectangle("plate", 100.0, 100.0).with_hole(vec![
            Point::new(40.0, 40.0),
            Point::new(60.0, 40.0),
            Point::new(60.0, 60.0),
            Point::new(40.0, 60.0),
        ]))
    }

    #[test]
    fn test_cut_length_and_pierces() {
        let s = solution(vec![
            PlacedPart::new(plate_with_hole(), 5.0, 5.0, 0.0),
            PlacedPart::new(Arc::new(Polygon::rectangle("r", 50.0, 20.0)), 200.0, 5.0, 0.0),
        ]);
        let metrics = estimate_metrics(&s, &CuttingConfig::default());
        assert_eq!(metrics.pierce_count, 3);
        assert_relative_eq!(metrics.cut_length, 400.0 + 80.0 + 140.0, epsilon = 1e-9);
        // 620mm at 50mm/s + 3 pierces at 0.5s
        assert_relative_eq!(metrics.cut_time, 12.4, epsilon = 1e-9);
        assert_relative_eq!(metrics.pierce_time, 1.5, epsilon = 1e-9);
        assert!(metrics.rapid_distance > 0.0);
        assert_relative_eq!(metrics.used_area, 10_000.0 - 400.0 + 1000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_common_edge_cutting_discounts_shared_edges() {
        let panel = Arc::new(Polygon::rectangle("panel", 100.0, 50.0));
        // 0.3mm apart, exactly the mild steel kerf
        let s = solution(vec![
            PlacedPart::new(Arc::clone(&panel), 5.0, 5.0, 0.0),
            PlacedPart::new(Arc::clone(&panel), 105.3, 5.0, 0.0),
        ]);
        assert_relative_eq!(common_edge_length(&s, 0.3), 50.0, epsilon = 1e-6);

        let separate = estimate_metrics(&s, &CuttingConfig::default());
        let shared = estimate_metrics(&s, &CuttingConfig::new().with_common_edge_cutting(true));
        assert_relative_eq!(separate.cut_length, 600.0, epsilon = 1e-9);
        assert_relative_eq!(shared.cut_length, 550.0, epsilon = 1e-6);
        assert!(shared.cut_time < separate.cut_time);
        assert_eq!(shared.pierce_count, separate.pierce_count);
    }

    #[test]
    fn test_common_edge_needs_parts_within_kerf() {
        let panel = Arc::new(Polygon::rectangle("panel", 100.0, 50.0));
        let apart = solution(vec![
            PlacedPart::new(Arc::clone(&panel), 5.0, 5.0, 0.0),
            PlacedPart::new(Arc::clone(&panel), 110.0, 5.0, 0.0),
        ]);
        assert_relative_eq!(common_edge_length(&apart, 0.3), 0.0);

        // partial overlap along the shared side
        let offset = solution(vec![
            PlacedPart::new(Arc::clone(&panel), 5.0, 5.0, 0.0),
            PlacedPart::new(panel, 5.0, 55.2, 0.0),
        ]);
        assert_relative_eq!(common_edge_length(&offset, 0.3), 100.0, epsilon = 1e-6);
    }

    #[test]
    fn test_holes_cut_before_exterior() {
        let s = solution(vec![PlacedPart::new(plate_with_hole(), 5.0, 5.0, 0.0)]);
        let contours = extract_contours(&s);
        let sequence = plan_sequence(&contours, Point::new(0.0, 0.0));
        assert_eq!(sequence.len(), 2);
        // the exterior is nearer to home but has to wait for its hole
        assert!(contours[sequence[0].contour].is_hole);
        assert!(!contours[sequence[1].contour].is_hole);
    }

    #[test]
    fn test_nearest_neighbour_rapid_distance() {
        let square = Arc::new(Polygon::rectangle("sq", 10.0, 10.0));
        let s = solution(vec![
            PlacedPart::new(Arc::clone(&square), 300.0, 5.0, 0.0),
            PlacedPart::new(Arc::clone(&square), 5.0, 5.0, 0.0),
            PlacedPart::new(square, 100.0, 5.0, 0.0),
        ]);
        let contours = extract_contours(&s);
        let sequence = plan_sequence(&contours, Point::new(0.0, 0.0));
        let parts: Vec<usize> = sequence.iter().map(|c| contours[c.contour].part).collect();
        assert_eq!(parts, vec![1, 2, 0]);
        // (0,0) -> (5,5), then lower-left corner to corner along y = 5
        let expected = 50.0_f64.sqrt() + 95.0 + 200.0;
        assert_relative_eq!(sequence.iter().map(|c| c.rapid).sum::<f64>(), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_remnant_value() {
        let empty = solution(vec![]);
        assert_relative_eq!(remnant_value(&empty), 1.0);

        // usable region 990 x 490; layout ends at x = 105, y = 105
        let s = solution(vec![PlacedPart::new(
            Arc::new(Polygon::rectangle("a", 100.0, 100.0)),
            5.0,
            5.0,
            0.0,
        )]);
        let expected = (890.0 * 490.0) / (990.0 * 490.0);
        assert_relative_eq!(remnant_value(&s), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_cost_includes_material_and_machine_time() {
        let s = solution(vec![PlacedPart::new(
            Arc::new(Polygon::rectangle("a", 100.0, 100.0)),
            5.0,
            5.0,
            0.0,
        )]);
        let metrics = estimate_metrics(&s, &CuttingConfig::default());
        // 0.5 m² of mild steel at 25/m²
        let material = 12.5;
        let machine = metrics.machine_time() / 3600.0 * 60.0;
        assert_relative_eq!(metrics.total_cost, material + machine, epsilon = 1e-9);
    }

    #[test]
    fn test_empty_layout_metrics() {
        let metrics = estimate_metrics(&solution(vec![]), &CuttingConfig::default());
        assert_eq!(metrics.pierce_count, 0);
        assert_relative_eq!(metrics.cut_length, 0.0);
        assert_relative_eq!(metrics.thermal_risk, 0.0);
        assert_relative_eq!(metrics.remnant_value, 1.0);
    }
}

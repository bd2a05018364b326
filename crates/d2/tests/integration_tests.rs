//! Integration tests for kerfnest-d2.

use std::sync::Arc;

use approx::assert_relative_eq;
use kerfnest_d2::{
    CollisionDetector, FailureReason, LocalRefiner, ManufacturingConstraints, MultiStart,
    NestingConfig, NestingSolution, Nester, NfpCandidates, NfpEngine, NfpMethod, PartOrdering,
    Point, Polygon, RefineConfig, RotationConstraints, SheetConstraints, SpacingConstraints,
};

fn config(width: f64, height: f64) -> NestingConfig {
    NestingConfig::for_sheet(SheetConstraints::new(width, height))
        .unwrap()
        .with_spacing(SpacingConstraints::none())
        .with_rotation(RotationConstraints::no_rotation())
}

/// Raw and spacing-buffered pairwise overlap plus containment.
fn assert_layout_valid(solution: &NestingSolution, spacing: f64) {
    let geoms = solution.placed_geometries();
    let bounds = solution.sheet().usable_bounds();
    for g in &geoms {
        assert!(
            bounds.contains_box(&g.bounding_box(), 1e-6),
            "{} leaves the usable region",
            g.id()
        );
    }
    for i in 0..geoms.len() {
        for j in (i + 1)..geoms.len() {
            assert!(
                geoms[i].intersection_area(&geoms[j]) < 1e-6,
                "{} overlaps {}",
                geoms[i].id(),
                geoms[j].id()
            );
            if spacing > 0.0 {
                let half = spacing / 2.0 - 1e-3;
                if let (Some(a), Some(b)) = (geoms[i].buffer(half), geoms[j].buffer(half)) {
                    assert!(
                        a.intersection_area(&b) < 1e-6,
                        "{} is closer than {} to {}",
                        geoms[i].id(),
                        spacing,
                        geoms[j].id()
                    );
                }
            }
        }
    }
}

mod geometry_tests {
    use super::*;

    #[test]
    fn test_rectangle_geometry() {
        let rect = Polygon::rectangle("rect1", 20.0, 15.0);
        assert_relative_eq!(rect.area(), 300.0, epsilon = 1e-9);
        assert_relative_eq!(rect.perimeter(), 70.0, epsilon = 1e-9);
        assert!(rect.is_convex());
        assert_eq!(rect.vertex_count(), 4);
    }

    #[test]
    fn test_circle_approximation() {
        let circle = Polygon::circle("circle1", 10.0, 64);
        let expected = std::f64::consts::PI * 100.0;
        assert!((circle.area() - expected).abs() < 3.0);
        assert!(circle.is_convex());
        assert_eq!(circle.vertex_count(), 64);
    }

    #[test]
    fn test_l_shape_non_convex() {
        let ell = Polygon::l_shape("l1", 30.0, 30.0, 15.0, 15.0);
        assert!(!ell.is_convex());
        assert_relative_eq!(ell.area(), 675.0, epsilon = 1e-9);
        assert!(ell.hull_area() > ell.area());
    }

    #[test]
    fn test_rotation_round_trip() {
        let ell = Polygon::l_shape("l1", 80.0, 50.0, 30.0, 20.0);
        for angle in [15.0, 45.0, 90.0, 137.5, 270.0] {
            let back = ell.rotate(angle).rotate(-angle);
            assert_relative_eq!(back.area(), ell.area(), epsilon = 1e-6);
            assert_eq!(back.vertex_count(), ell.vertex_count());
        }
    }

    #[test]
    fn test_translation_round_trip() {
        let ell = Polygon::l_shape("l1", 80.0, 50.0, 30.0, 20.0);
        let back = ell.translate(123.25, -47.5).translate(-123.25, 47.5);
        for (a, b) in ell.exterior().iter().zip(back.exterior()) {
            assert!(a.approx_eq(b, 1e-9));
        }
    }

    #[test]
    fn test_fingerprint_ignores_ids() {
        let a = Polygon::rectangle("a", 40.0, 20.0);
        let b = Polygon::rectangle("b", 40.0, 20.0);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), a.rotate(90.0).fingerprint());
    }
}

mod nfp_tests {
    use super::*;

    #[test]
    fn test_equal_squares_nfp_area() {
        let engine = NfpEngine::new(ManufacturingConstraints::default());
        let a = Polygon::rectangle("a", 50.0, 50.0);
        let b = Polygon::rectangle("b", 50.0, 50.0);
        let nfp = engine.compute_nfp(&a, &b, 0.0).unwrap().unwrap();
        assert_relative_eq!(nfp.polygon.area(), 10_000.0, epsilon = 1.0);

        let bbox = nfp.polygon.bounding_box();
        assert_relative_eq!(bbox.width(), 100.0, epsilon = 1e-3);
        assert_relative_eq!(bbox.height(), 100.0, epsilon = 1e-3);
        assert_relative_eq!(bbox.min_x, -50.0, epsilon = 1e-3);
        assert_relative_eq!(bbox.min_y, -50.0, epsilon = 1e-3);
    }

    #[test]
    fn test_nfp_separates_colliding_positions() {
        let engine = NfpEngine::new(ManufacturingConstraints::default());
        let stationary = Polygon::l_shape("a", 60.0, 60.0, 30.0, 30.0);
        let orbiting = Polygon::rectangle("b", 20.0, 20.0);
        let nfp = engine.compute_nfp(&stationary, &orbiting, 0.0).unwrap().unwrap();

        let samples = [
            (Point::new(-40.0, 10.0), false),
            (Point::new(70.0, 70.0), false),
            (Point::new(10.0, 10.0), true),
            (Point::new(5.0, 40.0), true),
        ];
        for (sample, inside) in samples {
            let placed = orbiting.translate(sample.x, sample.y);
            let overlap = stationary.intersection_area(&placed);
            assert_eq!(nfp.polygon.contains_point(sample), inside, "{:?}", sample);
            if inside {
                assert!(overlap > 1e-6, "{:?} should collide", sample);
            } else {
                assert!(overlap < 1e-6, "{:?} should be free", sample);
            }
        }
    }

    #[test]
    fn test_cache_idempotence() {
        let engine = NfpEngine::new(ManufacturingConstraints::default());
        let a = Polygon::l_shape("a", 60.0, 40.0, 20.0, 20.0);
        let b = Polygon::circle("b", 10.0, 16);

        let first = engine.compute_nfp(&a, &b, 90.0).unwrap().unwrap();
        let second = engine.compute_nfp(&a, &b, 90.0).unwrap().unwrap();
        assert_ne!(first.method, NfpMethod::Cached);
        assert_eq!(second.method, NfpMethod::Cached);
        assert_relative_eq!(first.polygon.area(), second.polygon.area(), epsilon = 1e-9);
        assert_eq!(first.polygon.vertex_count(), second.polygon.vertex_count());
        assert_eq!(engine.cache().stats().hits, 1);
    }
}

mod nester_tests {
    use super::*;

    #[test]
    fn test_single_rectangle_stays_in_placement_region() {
        let nester = Nester::new(config(600.0, 400.0)).unwrap();
        let solution = nester.nest(&[Polygon::rectangle("r", 100.0, 50.0)]);
        assert_eq!(solution.placed().len(), 1);
        let p = &solution.placed()[0];
        assert!((5.0 - 1e-9..=495.0 + 1e-9).contains(&p.x));
        assert!((5.0 - 1e-9..=345.0 + 1e-9).contains(&p.y));
    }

    #[test]
    fn test_ten_squares_all_placed() {
        let nester = Nester::new(config(200.0, 200.0))
            .unwrap()
            .with_ordering(PartOrdering::DifficultyFirst);
        let parts: Vec<Polygon> = (0..10)
            .map(|i| Polygon::rectangle(format!("sq{}", i), 30.0, 30.0))
            .collect();
        let solution = nester.nest(&parts);
        assert_eq!(solution.placed().len(), 10);
        assert!(solution.failed_parts().is_empty());
        assert_relative_eq!(solution.utilization(), 22.5, epsilon = 1e-9);
        assert_layout_valid(&solution, 0.0);
    }

    #[test]
    fn test_oversized_part_never_blocks_smaller_ones() {
        let nester = Nester::new(config(300.0, 200.0)).unwrap();
        let parts = vec![
            Polygon::rectangle("small1", 40.0, 40.0),
            Polygon::rectangle("giant", 1000.0, 1000.0),
            Polygon::rectangle("small2", 40.0, 40.0),
            Polygon::rectangle("small3", 40.0, 40.0),
        ];
        let solution = nester.nest(&parts);
        assert_eq!(solution.placed().len(), 3);
        assert_eq!(solution.failed_parts().len(), 1);
        assert_eq!(solution.failed_parts()[0].part_id, "giant");
        assert_eq!(solution.failed_parts()[0].reason, FailureReason::DoesNotFit);
    }

    #[test]
    fn test_mixed_shapes_with_spacing() {
        let cfg = config(500.0, 300.0)
            .with_spacing(SpacingConstraints::new(0.5, 2.0))
            .with_rotation(RotationConstraints::cardinal());
        let nester = Nester::new(cfg).unwrap();
        let mut parts = vec![
            Polygon::l_shape("ell1", 90.0, 70.0, 40.0, 30.0),
            Polygon::l_shape("ell2", 90.0, 70.0, 40.0, 30.0),
            Polygon::circle("disc", 25.0, 24),
        ];
        parts.extend((0..6).map(|i| Polygon::rectangle(format!("r{}", i), 60.0, 25.0)));
        let solution = nester.nest(&parts);
        assert_eq!(solution.placed().len(), parts.len());
        assert_layout_valid(&solution, 2.5);
    }

    #[test]
    fn test_nfp_candidates_produce_valid_layout() {
        let cfg = config(300.0, 300.0).with_spacing(SpacingConstraints::new(0.0, 2.0));
        let nester = Nester::new(cfg)
            .unwrap()
            .with_candidate_policy(NfpCandidates::default());
        let parts: Vec<Polygon> = (0..5)
            .map(|i| Polygon::l_shape(format!("l{}", i), 70.0, 70.0, 35.0, 35.0))
            .collect();
        let solution = nester.nest(&parts);
        assert_eq!(solution.placed().len(), 5);
        assert_layout_valid(&solution, 2.0);
    }

    #[test]
    fn test_utilization_bounds() {
        let nester = Nester::new(config(200.0, 200.0)).unwrap();
        let empty = nester.nest(&[]);
        assert_relative_eq!(empty.utilization(), 0.0);

        let solution = nester.nest(&[Polygon::rectangle("a", 190.0, 190.0)]);
        let u = solution.utilization();
        assert!(u > 0.0 && u <= 100.0);
        assert_relative_eq!(u, 190.0 * 190.0 / 40_000.0 * 100.0, epsilon = 1e-9);
    }
}

mod refinement_tests {
    use super::*;

    #[test]
    fn test_refinement_never_worse_than_input() {
        let nester = Nester::new(config(200.0, 200.0)).unwrap();
        let solution = nester.nest(&[Polygon::rectangle("only", 120.0, 120.0)]);
        let result = LocalRefiner::new(nester, RefineConfig::default().with_seed(5)).refine(&solution);
        assert!(result.solution.utilization() >= solution.utilization() - 1e-9);
        assert_layout_valid(&result.solution, 0.0);
    }

    #[test]
    fn test_multi_start_then_refine_pipeline() {
        let cfg = config(300.0, 250.0)
            .with_spacing(SpacingConstraints::new(0.2, 1.0))
            .with_rotation(RotationConstraints::cardinal());
        let nester = Nester::new(cfg).unwrap();
        let mut parts: Vec<Polygon> = (0..4)
            .map(|i| Polygon::l_shape(format!("l{}", i), 60.0, 50.0, 25.0, 20.0))
            .collect();
        parts.extend((0..4).map(|i| Polygon::rectangle(format!("r{}", i), 45.0, 30.0)));

        let best = MultiStart::new(nester.clone()).run(&parts);
        assert_layout_valid(&best, 1.2);
        let refined = LocalRefiner::new(nester, RefineConfig::default().with_seed(17)).refine(&best);
        assert!(refined.solution.utilization() >= best.utilization() - 1e-9);
        assert_layout_valid(&refined.solution, 1.2);
    }
}

mod collision_tests {
    use super::*;

    #[test]
    fn test_detector_matches_exact_overlap() {
        let sheet = SheetConstraints::new(400.0, 400.0);
        let mut detector = CollisionDetector::new(&sheet, 0.0);
        let ell = Arc::new(Polygon::l_shape("ell", 100.0, 100.0, 50.0, 50.0));
        assert!(detector.try_place(&ell, 5.0, 5.0, 0.0));

        let square = Polygon::rectangle("sq", 40.0, 40.0);
        // in the notch of the L
        assert!(detector.can_place(&square, 60.0, 60.0, 0.0));
        // over the L's arm
        assert!(!detector.can_place(&square, 20.0, 20.0, 0.0));
    }

    #[test]
    fn test_grid_and_bruteforce_agree() {
        let sheet = SheetConstraints::new(1000.0, 1000.0);
        let mut indexed = CollisionDetector::new(&sheet, 1.0).with_index_threshold(0);
        let mut brute = CollisionDetector::new(&sheet, 1.0).without_index();
        let part = Arc::new(Polygon::rectangle("p", 30.0, 30.0));
        for i in 0..8 {
            for j in 0..8 {
                let (x, y) = (10.0 + i as f64 * 60.0, 10.0 + j as f64 * 60.0);
                assert!(indexed.try_place(&part, x, y, 0.0));
                assert!(brute.try_place(&part, x, y, 0.0));
            }
        }
        let sample = Polygon::circle("sample", 14.0, 16);
        for x in (20..500).step_by(37) {
            for y in (20..500).step_by(41) {
                let (x, y) = (x as f64, y as f64);
                assert_eq!(
                    indexed.can_place(&sample, x, y, 0.0),
                    brute.can_place(&sample, x, y, 0.0),
                    "({}, {})",
                    x,
                    y
                );
            }
        }
    }
}

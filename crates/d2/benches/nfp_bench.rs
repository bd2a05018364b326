//! Benchmarks for 2D nesting operations.
//!
//! Measures NFP computation (cold and cached), collision checks against a
//! populated sheet, and nester throughput at various part counts.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kerfnest_d2::{
    CollisionDetector, ManufacturingConstraints, NestingConfig, Nester, NfpEngine, Polygon,
    RotationConstraints, SheetConstraints, SpacingConstraints,
};

fn bench_nfp_compute(c: &mut Criterion) {
    let mut group = c.benchmark_group("nfp_compute");
    let pairs = [
        (
            "convex",
            Polygon::rectangle("a", 80.0, 40.0),
            Polygon::circle("b", 20.0, 24),
        ),
        (
            "concave",
            Polygon::l_shape("a", 80.0, 80.0, 30.0, 30.0),
            Polygon::l_shape("b", 60.0, 40.0, 20.0, 15.0),
        ),
    ];

    for (name, a, b) in &pairs {
        group.bench_with_input(BenchmarkId::new("cold", name), &(a, b), |bench, (a, b)| {
            bench.iter(|| {
                let engine = NfpEngine::new(ManufacturingConstraints::default());
                black_box(engine.compute_nfp(black_box(a), black_box(b), 90.0))
            })
        });

        let engine = NfpEngine::new(ManufacturingConstraints::default());
        let _ = engine.compute_nfp(a, b, 90.0);
        group.bench_with_input(BenchmarkId::new("cached", name), &(a, b), |bench, (a, b)| {
            bench.iter(|| black_box(engine.compute_nfp(black_box(a), black_box(b), 90.0)))
        });
    }
    group.finish();
}

fn bench_collision_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("collision_check");
    let sheet = SheetConstraints::new(2000.0, 2000.0);
    let part = Arc::new(Polygon::l_shape("p", 60.0, 60.0, 25.0, 25.0));

    for &n in &[10usize, 100, 400] {
        let mut detector = CollisionDetector::new(&sheet, 2.0);
        let per_row = 25;
        for i in 0..n {
            let x = 10.0 + (i % per_row) as f64 * 75.0;
            let y = 10.0 + (i / per_row) as f64 * 75.0;
            detector.try_place(&part, x, y, 0.0);
        }
        let sample = Polygon::circle("sample", 15.0, 24);
        group.bench_with_input(BenchmarkId::new("placed", n), &detector, |b, d| {
            b.iter(|| black_box(d.can_place(black_box(&sample), 1000.0, 1000.0, 0.0)))
        });
    }
    group.finish();
}

fn bench_nester(c: &mut Criterion) {
    let mut group = c.benchmark_group("nester");
    group.sample_size(10);

    for &n in &[5usize, 20, 50] {
        let parts: Vec<Polygon> = (0..n)
            .map(|i| {
                let w = 20.0 + (i as f64 * 3.0) % 30.0;
                let h = 15.0 + (i as f64 * 7.0) % 25.0;
                if i % 3 == 0 {
                    Polygon::l_shape(format!("L{}", i), w + 10.0, h + 10.0, w / 2.0, h / 2.0)
                } else {
                    Polygon::rectangle(format!("R{}", i), w, h)
                }
            })
            .collect();
        let config = NestingConfig::for_sheet(SheetConstraints::new(500.0, 500.0))
            .unwrap()
            .with_spacing(SpacingConstraints::new(0.2, 1.0))
            .with_rotation(RotationConstraints::cardinal());
        let nester = Nester::new(config).unwrap();

        group.bench_with_input(BenchmarkId::new("mixed", n), &parts, |b, parts| {
            b.iter(|| black_box(nester.nest(black_box(parts))))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_nfp_compute, bench_collision_check, bench_nester);
criterion_main!(benches);

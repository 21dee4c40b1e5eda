use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use nalgebra::{DVector, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ylmflux::engine::FluxEngine;

fn random_vector(rng: &mut StdRng, n: usize) -> DVector<f64> {
    DVector::from_fn(n, |_, _| rng.random_range(-1.0..1.0))
}

/// Uniform random in [0, 2π)
#[inline]
fn rand_angle(rng: &mut StdRng) -> f64 {
    rng.random::<f64>() * std::f64::consts::TAU
}

fn bench_rotate_xy(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xA1u64);
    let samples = 1_000usize;

    for lmax in [2usize, 10, 20] {
        let engine = FluxEngine::<f64>::with_lmax(lmax).unwrap();
        let y = random_vector(&mut rng, engine.n_coeffs());

        c.bench_function(&format!("rotation/rotate_xy_lmax={lmax}"), |b| {
            b.iter_batched(
                || {
                    (0..samples)
                        .map(|_| (rand_angle(&mut rng) / 2.0, rand_angle(&mut rng)))
                        .collect::<Vec<_>>()
                },
                |angles| {
                    for (inc, obl) in angles {
                        let out = engine.rotate_xy(black_box(&y), inc, obl).unwrap();
                        black_box(out);
                    }
                },
                BatchSize::LargeInput,
            )
        });
    }
}

fn bench_rotate_xy_backward(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xA2u64);
    let engine = FluxEngine::<f64>::with_lmax(10).unwrap();
    let n = engine.n_coeffs();
    let y = random_vector(&mut rng, n);
    let seed = random_vector(&mut rng, n);

    c.bench_function("rotation/rotate_xy_backward_lmax=10", |b| {
        b.iter(|| {
            let g = engine
                .rotate_xy_backward(black_box(&y), 1.1, 0.4, black_box(&seed))
                .unwrap();
            black_box(g);
        })
    });
}

fn bench_rotate_axis(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xA3u64);
    let engine = FluxEngine::<f64>::with_lmax(10).unwrap();
    let y = random_vector(&mut rng, engine.n_coeffs());
    let axis = Vector3::new(0.3, -0.5, 0.8);

    c.bench_function("rotation/rotate_axis_lmax=10", |b| {
        b.iter(|| {
            let out = engine
                .rotate(black_box(&y), &axis, black_box(0.7))
                .unwrap();
            black_box(out);
        })
    });
}

/// Table construction: basis matrices, frame changes, binomials.
fn bench_engine_new(c: &mut Criterion) {
    c.bench_function("rotation/engine_new_lmax=10", |b| {
        b.iter(|| {
            let engine = FluxEngine::<f64>::with_lmax(black_box(10)).unwrap();
            black_box(engine);
        })
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default();
    targets = bench_rotate_xy, bench_rotate_xy_backward, bench_rotate_axis, bench_engine_new
);
criterion_main!(benches);

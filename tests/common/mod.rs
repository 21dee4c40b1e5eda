#![allow(dead_code)]

use approx::assert_relative_eq;
use nalgebra::{DVector, Vector3};
use rand::rngs::StdRng;
use rand::Rng;

/// Map with `Y_00 = 1` and the other coefficients uniform in `[-amp, amp]`.
pub fn random_map(rng: &mut StdRng, lmax: usize, amp: f64) -> DVector<f64> {
    let n = (lmax + 1) * (lmax + 1);
    DVector::from_fn(n, |i, _| {
        if i == 0 {
            1.0
        } else {
            rng.random_range(-amp..=amp)
        }
    })
}

pub fn random_vector(rng: &mut StdRng, n: usize) -> DVector<f64> {
    DVector::from_fn(n, |_, _| rng.random_range(-1.0..=1.0))
}

/// Uniformly distributed unit vector.
pub fn random_axis(rng: &mut StdRng) -> Vector3<f64> {
    let z: f64 = rng.random_range(-1.0..=1.0);
    let phi = rng.random_range(0.0..std::f64::consts::TAU);
    let rho = (1.0 - z * z).sqrt();
    Vector3::new(rho * phi.cos(), rho * phi.sin(), z)
}

/// Central difference `(f(x + h) − f(x − h)) / 2h`.
pub fn central_difference(f: impl Fn(f64) -> f64, x: f64, h: f64) -> f64 {
    (f(x + h) - f(x - h)) / (2.0 * h)
}

pub fn assert_vectors_close(actual: &DVector<f64>, expected: &DVector<f64>, epsilon: f64) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected.iter()) {
        assert_relative_eq!(*a, *e, epsilon = epsilon);
    }
}

/// Composite Simpson rule on `[a, b]` with `n` (even) intervals.
pub fn simpson(f: impl Fn(f64) -> f64, a: f64, b: f64, n: usize) -> f64 {
    assert!(n % 2 == 0, "Simpson needs an even number of intervals");
    let h = (b - a) / n as f64;
    let mut acc = f(a) + f(b);
    for k in 1..n {
        let w = if k % 2 == 1 { 4.0 } else { 2.0 };
        acc += w * f(a + k as f64 * h);
    }
    acc * h / 3.0
}

/// `∬ I dA` over the unit disk, with `I` given at the sky point `(x, y)`.
///
/// The disk is parametrized by the visible hemisphere, `x = sin θ cos φ`, `y = sin θ sin φ`,
/// `dA = sin θ cos θ dθ dφ`, which keeps the integrand smooth up to the limb.
pub fn disk_integral(intensity: impl Fn(f64, f64) -> f64, n_theta: usize, n_phi: usize) -> f64 {
    let half_pi = std::f64::consts::FRAC_PI_2;
    simpson(
        |theta| {
            let (s, c) = theta.sin_cos();
            if c < 1e-12 {
                return 0.0;
            }
            let ring = simpson(
                |phi| intensity(s * phi.cos(), s * phi.sin()),
                0.0,
                std::f64::consts::TAU,
                n_phi,
            );
            ring * s * c
        },
        0.0,
        half_pi,
        n_theta,
    )
}

mod common;

use std::f64::consts::{FRAC_PI_2, PI};

use nalgebra::{DVector, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ylmflux::constants::DPI;
use ylmflux::engine::FluxEngine;
use ylmflux::flux_errors::FluxError;

use crate::common::{assert_vectors_close, random_axis, random_map, random_vector};

#[test]
fn test_quarter_turn_scenario() {
    let engine = FluxEngine::<f64>::with_lmax(1).unwrap();
    let y = DVector::from_vec(vec![0.0, 0.0, 1.0, 0.0]);

    let y = engine.rotate(&y, &Vector3::x(), -FRAC_PI_2).unwrap();
    assert_vectors_close(&y, &DVector::from_vec(vec![0.0, 1.0, 0.0, 0.0]), 1e-15);

    let y = engine.rotate(&y, &Vector3::z(), -FRAC_PI_2).unwrap();
    assert_vectors_close(&y, &DVector::from_vec(vec![0.0, 0.0, 0.0, 1.0]), 1e-15);

    let y = engine.rotate(&y, &Vector3::y(), -FRAC_PI_2).unwrap();
    assert_vectors_close(&y, &DVector::from_vec(vec![0.0, 0.0, 1.0, 0.0]), 1e-15);
}

#[test]
fn test_full_turn_closure() {
    let mut rng = StdRng::seed_from_u64(7);
    let engine = FluxEngine::<f64>::with_lmax(6).unwrap();
    for _ in 0..10 {
        let y = random_map(&mut rng, 6, 1.0);
        let axis = random_axis(&mut rng) * rng.random_range(0.1..10.0_f64);
        let turned = engine.rotate(&y, &axis, DPI).unwrap();
        assert_vectors_close(&turned, &y, 1e-12);
    }
    for axis in [Vector3::x(), Vector3::y(), Vector3::z()] {
        let y = random_map(&mut rng, 6, 1.0);
        assert_vectors_close(&engine.rotate(&y, &axis, DPI).unwrap(), &y, 1e-12);
    }
}

#[test]
fn test_rotate_xy_transpose_is_adjoint() {
    let mut rng = StdRng::seed_from_u64(11);
    let engine = FluxEngine::<f64>::with_lmax(5).unwrap();
    let n = engine.n_coeffs();
    for _ in 0..20 {
        let inc = rng.random_range(0.0..PI);
        let obl = rng.random_range(-PI..PI);
        let y = random_vector(&mut rng, n);
        let z = random_vector(&mut rng, n);

        let lhs = engine.rotate_xy(&y, inc, obl).unwrap().dot(&z);
        let rhs = y.dot(&engine.rotate_xy_transpose(&z, inc, obl).unwrap());
        assert!((lhs - rhs).abs() < 1e-12, "{lhs} vs {rhs}");
    }
}

#[test]
fn test_transpose_is_not_negated_angles() {
    let mut rng = StdRng::seed_from_u64(13);
    let engine = FluxEngine::<f64>::with_lmax(3).unwrap();
    let n = engine.n_coeffs();
    for _ in 0..20 {
        let inc = rng.random_range(0.1..3.0);
        let obl = rng.random_range(0.1..3.0);
        let y = random_vector(&mut rng, n);

        let transpose = engine.rotate_xy_transpose(&y, inc, obl).unwrap();
        let negated = engine.rotate_xy(&y, -inc, -obl).unwrap();
        assert!((transpose - negated).amax() > 1e-3);

        // being orthogonal, the transpose also undoes the rotation
        let there = engine.rotate_xy(&y, inc, obl).unwrap();
        let back = engine.rotate_xy_transpose(&there, inc, obl).unwrap();
        assert_vectors_close(&back, &y, 1e-12);
    }
}

#[test]
fn test_rotations_preserve_norm() {
    let mut rng = StdRng::seed_from_u64(17);
    let engine = FluxEngine::<f64>::with_lmax(8).unwrap();
    let y = random_map(&mut rng, 8, 0.5);
    let axis = random_axis(&mut rng);
    let out = engine.rotate(&y, &axis, 1.234).unwrap();
    assert!((out.norm() - y.norm()).abs() < 1e-12);
    let out = engine.rotate_xy(&y, 0.7, -2.1).unwrap();
    assert!((out.norm() - y.norm()).abs() < 1e-12);
}

#[test]
fn test_rotation_errors() {
    let engine = FluxEngine::<f64>::with_lmax(2).unwrap();
    let y = DVector::zeros(9);
    assert!(matches!(
        engine.rotate(&y, &Vector3::zeros(), 1.0),
        Err(FluxError::DomainError { param: "axis", .. })
    ));
    assert!(matches!(
        engine.rotate_xy(&DVector::zeros(10), 1.0, 0.0),
        Err(FluxError::ShapeMismatch { what: "y", expected: 9, found: 10 })
    ));
    assert!(matches!(
        engine.rotate_xy_backward(&y, 1.0, 0.0, &DVector::zeros(4)),
        Err(FluxError::ShapeMismatch { what: "seed", .. })
    ));
    assert!(matches!(
        engine.rotate_xy(&y, f64::NAN, 0.0),
        Err(FluxError::DomainError { param: "inc", .. })
    ));
    assert!(matches!(
        engine.rotate(&y, &Vector3::x(), f64::INFINITY),
        Err(FluxError::DomainError { param: "angle", .. })
    ));
}

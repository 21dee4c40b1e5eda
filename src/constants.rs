//! # Constants and type definitions for ylmflux
//!
//! This module centralizes the **numerical limits**, **default tolerances**, and **common type
//! definitions** used throughout the crate.
//!
//! ## Overview
//!
//! - Limits on the spherical-harmonic degree handled by an engine
//! - Iteration caps and switch-over points of the elliptic-integral machinery
//! - Default geometric cutoffs of the occultation solver
//! - Core type aliases and index helpers for coefficient vectors
//!
//! Every tunable default here has a matching field in
//! [`EngineParams`](crate::params::EngineParams); the constants only seed the defaults.

// -------------------------------------------------------------------------------------------------
// Angles
// -------------------------------------------------------------------------------------------------

/// 2π, one full turn
pub const DPI: f64 = 2. * std::f64::consts::PI;

// -------------------------------------------------------------------------------------------------
// Limits and tolerances
// -------------------------------------------------------------------------------------------------

/// Largest spherical-harmonic degree an engine accepts.
///
/// The closed-form occultation terms lose accuracy through binomial cancellation well before
/// this degree in double precision; the cap mostly bounds table sizes.
pub const MAX_LMAX: usize = 50;

/// Maximum number of iterations of the Bulirsch `cel` loop.
pub const ELLIP_MAX_ITER: usize = 200;

/// Maximum number of terms summed by the small-parameter series of the elliptic family.
pub const SERIES_MAX_TERMS: usize = 2000;

/// Default parameter value below which the elliptic family is summed as a power series
/// instead of being recursed upward from `K` and `E`.
pub const SERIES_CUTOFF: f64 = 0.5;

/// Default impact parameter below which the occultor is treated as centered when
/// propagating gradients to `(xo, yo)`.
pub const CENTERED_CUTOFF: f64 = 1e-8;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in radians
pub type Radian = f64;

// -------------------------------------------------------------------------------------------------
// Coefficient vector layout
// -------------------------------------------------------------------------------------------------

/// Position of the `(l, m)` coefficient in a coefficient vector: `l² + l + m`.
#[inline]
pub fn lm_index(l: usize, m: i64) -> usize {
    ((l * l + l) as i64 + m) as usize
}

/// Number of coefficients of a map of degree `lmax`: `(lmax + 1)²`.
#[inline]
pub const fn n_coeffs(lmax: usize) -> usize {
    (lmax + 1) * (lmax + 1)
}

/// Recover `lmax` from a coefficient count, if the count is a perfect square.
pub fn lmax_from_len(n: usize) -> Option<usize> {
    if n == 0 {
        return None;
    }
    let mut l = (n as f64).sqrt() as usize;
    while (l + 1) * (l + 1) > n {
        l -= 1;
    }
    while (l + 2) * (l + 2) <= n {
        l += 1;
    }
    if (l + 1) * (l + 1) == n {
        Some(l)
    } else {
        None
    }
}

#[cfg(test)]
mod constants_test {
    use super::*;

    #[test]
    fn test_lm_index_ordering() {
        assert_eq!(lm_index(0, 0), 0);
        assert_eq!(lm_index(1, -1), 1);
        assert_eq!(lm_index(1, 0), 2);
        assert_eq!(lm_index(1, 1), 3);
        assert_eq!(lm_index(2, -2), 4);
        assert_eq!(lm_index(3, 3), 15);
    }

    #[test]
    fn test_lmax_from_len() {
        assert_eq!(lmax_from_len(1), Some(0));
        assert_eq!(lmax_from_len(4), Some(1));
        assert_eq!(lmax_from_len(16), Some(3));
        assert_eq!(lmax_from_len(2601), Some(50));
        assert_eq!(lmax_from_len(0), None);
        assert_eq!(lmax_from_len(5), None);
        assert_eq!(lmax_from_len(15), None);
    }
}

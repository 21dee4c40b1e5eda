//! # Special functions
//!
//! Factorials, half-integer factorials and integer square roots used as exact building blocks
//! by the basis-change matrices and the rotation recursion.
//!
//! Two flavours are exposed:
//!
//! * the public `f64` functions ([`factorial`], [`half_factorial`], [`sqrt_int`],
//!   [`invsqrt_int`]) which validate their argument and return a [`FluxError::DomainError`]
//!   outside their domain,
//! * generic crate-internal versions (`*_t`) evaluated in any [`Real`] precision, used while
//!   building the engine tables so that the double-double shadow path never inherits rounded
//!   double-precision constants.
//!
//! Notation: `half_factorial(n) = (n/2)! = Γ(n/2 + 1)`. Odd `n` give half-integer factorials,
//! e.g. `half_factorial(-1) = Γ(1/2) = √π` and `half_factorial(1) = Γ(3/2) = √π/2`; negative
//! even `n` hit the poles of Γ.

use crate::flux_errors::FluxError;
use crate::scalar::Real;

/// `√π` rounded to the nearest double.
pub const SQRT_PI: f64 = 1.772_453_850_905_516;

/// `n!` for `n ≥ 0`.
///
/// Exact up to `n = 22` (the largest factorial representable without rounding), correctly
/// accumulated beyond; overflows to `+∞` past `n = 170`.
pub fn factorial(n: i64) -> Result<f64, FluxError> {
    if n < 0 {
        return Err(FluxError::domain("n", n as f64, "[0, inf), integer"));
    }
    Ok(factorial_t::<f64>(n as usize))
}

/// `(n/2)! = Γ(n/2 + 1)` for integer `n`.
///
/// Negative even arguments are poles of the Gamma function and return a domain error.
pub fn half_factorial(n: i64) -> Result<f64, FluxError> {
    half_factorial_t::<f64>(n).ok_or_else(|| {
        FluxError::domain("n", n as f64, "integers except negative even values")
    })
}

/// `√n` for `n ≥ 0`.
pub fn sqrt_int(n: i64) -> Result<f64, FluxError> {
    if n < 0 {
        return Err(FluxError::domain("n", n as f64, "[0, inf), integer"));
    }
    Ok(sqrt_int_t::<f64>(n as usize))
}

/// `1/√n` for `n > 0`.
pub fn invsqrt_int(n: i64) -> Result<f64, FluxError> {
    if n <= 0 {
        return Err(FluxError::domain("n", n as f64, "(0, inf), integer"));
    }
    Ok(invsqrt_int_t::<f64>(n as usize))
}

pub(crate) fn factorial_t<T: Real>(n: usize) -> T {
    (2..=n).fold(T::one(), |acc, k| acc * T::from_usize(k))
}

/// Generic `(n/2)!`; `None` at the poles (negative even `n`).
pub(crate) fn half_factorial_t<T: Real>(n: i64) -> Option<T> {
    if n % 2 == 0 {
        if n < 0 {
            return None;
        }
        return Some(factorial_t((n / 2) as usize));
    }

    // odd n: walk from Γ(1/2) = √π with Γ(x + 1) = x Γ(x)
    let mut value = T::pi().sqrt();
    let mut k = -1_i64;
    while k < n {
        k += 2;
        value *= T::ratio(k, 2);
    }
    while k > n {
        value *= T::ratio(2, k);
        k -= 2;
    }
    Some(value)
}

/// `1 / (n/2)!`, zero at the poles of the Gamma function.
pub(crate) fn inv_half_factorial_t<T: Real>(n: i64) -> T {
    match half_factorial_t::<T>(n) {
        Some(v) => T::one() / v,
        None => T::zero(),
    }
}

#[inline]
pub(crate) fn sqrt_int_t<T: Real>(n: usize) -> T {
    T::from_usize(n).sqrt()
}

#[inline]
pub(crate) fn invsqrt_int_t<T: Real>(n: usize) -> T {
    T::one() / T::from_usize(n).sqrt()
}

/// Rows `0..=n` of Pascal's triangle, `binom[a][b] = C(a, b)`.
pub(crate) fn binomial_table<T: Real>(n: usize) -> Vec<Vec<T>> {
    let mut rows: Vec<Vec<T>> = Vec::with_capacity(n + 1);
    for a in 0..=n {
        let mut row = vec![T::one(); a + 1];
        for b in 1..a {
            row[b] = rows[a - 1][b - 1] + rows[a - 1][b];
        }
        rows.push(row);
    }
    rows
}

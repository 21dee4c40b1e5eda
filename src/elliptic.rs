//! # Complete elliptic integrals
//!
//! All three complete integrals are evaluated through Bulirsch's general complete elliptic
//! integral
//!
//! ```text
//! cel(kc, p, a, b) = ∫₀^{π/2} (a cos²θ + b sin²θ) / ((cos²θ + p sin²θ) √(cos²θ + kc² sin²θ)) dθ
//! ```
//!
//! whose Landen/AGM-type iteration converges quadratically. With the parameter convention
//! `m = 1 − kc²`:
//!
//! * `K(m)    = cel(kc, 1, 1, 1)`
//! * `E(m)    = cel(kc, 1, 1, kc²)`
//! * `Π(n, m) = cel(kc, 1 − n, 1, 1)`
//!
//! Convergence criterion
//! -----------------
//! The iteration stops when the running AGM pair `(g, kc)` satisfies `|g − kc| ≤ g·√ε`, with
//! `ε` the epsilon of the scalar type; the final step squares the residual error so the result
//! is accurate to `O(ε)`. The number of iterations is capped (default
//! [`ELLIP_MAX_ITER`](crate::constants::ELLIP_MAX_ITER)) and exhausting it is reported as
//! [`FluxError::NumericInstability`].
//!
//! Edge behaviour
//! -----------------
//! * `kc = 0` (`m = 1`) never satisfies the criterion; it is replaced by `ε²`, which leaves
//!   finite integrals unchanged to working precision (`E(1) = 1`).
//! * `K(1)` and `Π(n, 1)` diverge logarithmically as `m → 1⁻` and are returned as `+∞`.

use crate::constants::ELLIP_MAX_ITER;
use crate::flux_errors::{ensure_finite, FluxError};
use crate::scalar::Real;

/// Bulirsch's `cel(kc, p, a, b)` for `p > 0`.
pub(crate) fn cel<T: Real>(kc: T, p: T, a: T, b: T, max_iter: usize) -> Result<T, FluxError> {
    if !(p > T::zero()) {
        return Err(FluxError::domain("p", p.to_f64(), "(0, inf)"));
    }

    let ca = T::epsilon().sqrt();
    let mut kc = kc.abs();
    if kc == T::zero() {
        kc = T::epsilon() * T::epsilon();
    }

    let mut e = kc;
    let mut m = T::one();
    let mut p = p.sqrt();
    let mut a = a;
    let mut b = b / p;

    for _ in 0..max_iter {
        let f = a;
        a += b / p;
        let g = e / p;
        b += f * g;
        b += b;
        p += g;
        let g = m;
        m += kc;
        if (g - kc).abs() <= g * ca {
            return Ok(T::frac_pi_2() * (a * m + b) / (m * (m + p)));
        }
        kc = e.sqrt();
        kc += kc;
        e = kc * m;
    }

    Err(FluxError::NumericInstability(format!(
        "cel did not converge in {max_iter} iterations"
    )))
}

/// Complementary modulus `kc = √(1 − m)`.
#[inline]
fn complementary<T: Real>(m: T) -> T {
    (T::one() - m).sqrt()
}

pub(crate) fn ellip_k_t<T: Real>(m: T, max_iter: usize) -> Result<T, FluxError> {
    if m == T::one() {
        return Ok(T::from_f64(f64::INFINITY));
    }
    cel(complementary(m), T::one(), T::one(), T::one(), max_iter)
}

pub(crate) fn ellip_e_t<T: Real>(m: T, max_iter: usize) -> Result<T, FluxError> {
    if m == T::one() {
        return Ok(T::one());
    }
    let kc = complementary(m);
    cel(kc, T::one(), T::one(), kc * kc, max_iter)
}

pub(crate) fn ellip_pi_t<T: Real>(n: T, m: T, max_iter: usize) -> Result<T, FluxError> {
    if m == T::one() {
        return Ok(T::from_f64(f64::INFINITY));
    }
    cel(complementary(m), T::one() - n, T::one(), T::one(), max_iter)
}

fn check_parameter(m: f64) -> Result<f64, FluxError> {
    let m = ensure_finite("m", m)?;
    if !(0.0..=1.0).contains(&m) {
        return Err(FluxError::domain("m", m, "[0, 1]"));
    }
    Ok(m)
}

/// Complete elliptic integral of the first kind `K(m)`.
///
/// Returns `+∞` at `m = 1`.
///
/// # Errors
/// [`FluxError::DomainError`] if `m ∉ [0, 1]` or `m` is not finite.
pub fn ellip_k(m: f64) -> Result<f64, FluxError> {
    ellip_k_t(check_parameter(m)?, ELLIP_MAX_ITER)
}

/// Complete elliptic integral of the second kind `E(m)`, with `E(1) = 1`.
pub fn ellip_e(m: f64) -> Result<f64, FluxError> {
    ellip_e_t(check_parameter(m)?, ELLIP_MAX_ITER)
}

/// Complete elliptic integral of the third kind `Π(n, m)`.
///
/// The characteristic must satisfy `n < 1`; `n = 1` is the pole of the integrand and larger
/// values only define a principal value, which is not supported. Returns `+∞` at `m = 1`.
pub fn ellip_pi(n: f64, m: f64) -> Result<f64, FluxError> {
    let m = check_parameter(m)?;
    let n = ensure_finite("n", n)?;
    if n >= 1.0 {
        return Err(FluxError::domain("n", n, "(-inf, 1)"));
    }
    ellip_pi_t(n, m, ELLIP_MAX_ITER)
}

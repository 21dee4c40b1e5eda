//! # Basis changes
//!
//! Three bases of the degree-`L` function space on the visible hemisphere are used:
//!
//! * the real spherical harmonics `Y_lm` (the coefficient vector `y`),
//! * the polynomial basis `p̃_n`, with `μ = l − m`, `ν = l + m`:
//!   `x^{μ/2} y^{ν/2}` for even `ν` and `x^{(μ−1)/2} y^{(ν−1)/2} z` for odd `ν`,
//! * the Green's basis `g̃_n`, chosen so that each `g̃_n` is the curl of a vector field whose
//!   boundary integrals have closed forms (see [`crate::occultation`]).
//!
//! The matrices mapping between them are
//!
//! * `A1` (`Y_lm → p̃`), obtained by expanding each harmonic in Cartesian monomials and reducing
//!   `z² = 1 − x² − y²`,
//! * `A2 = G⁻¹` (`p̃ → g̃`), where the columns of `G` hold `g̃_n` written in `p̃`,
//! * `A = A2 · A1`.
//!
//! `G` has at most three entries per column and is block upper-triangular by degree, so the
//! inversion is a Gauss–Jordan elimination that skips structural zeros.
//!
//! The unocculted flux of a map is `rᵀ · A1 · y`, with `r_n = ∬_disk p̃_n dA` known in closed
//! form.

use nalgebra::{DMatrix, DVector};

use crate::constants::{lm_index, n_coeffs};
use crate::flux_errors::FluxError;
use crate::scalar::Real;
use crate::special::{factorial_t, half_factorial_t, inv_half_factorial_t};

/// The monomial `x^x · y^y · z^z` with `z ∈ {0, 1}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Monomial {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl Monomial {
    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Monomial { x, y, z }
    }

    /// Index `n` of the polynomial basis element `p̃_n` equal to this monomial.
    pub fn index(&self) -> usize {
        let l = self.x + self.y + self.z;
        lm_index(l, self.y as i64 - self.x as i64)
    }

    /// The monomial `p̃_n` for the `(l, m)` pair of index `n`.
    pub fn from_lm(l: usize, m: i64) -> Self {
        let mu = (l as i64 - m) as usize;
        let nu = (l as i64 + m) as usize;
        if nu % 2 == 0 {
            Monomial::new(mu / 2, nu / 2, 0)
        } else {
            Monomial::new((mu - 1) / 2, (nu - 1) / 2, 1)
        }
    }

    /// Total degree.
    pub fn degree(&self) -> usize {
        self.x + self.y + self.z
    }

    fn eval<T: Real>(&self, x: T, y: T, z: T) -> T {
        let v = x.powi(self.x as u32) * y.powi(self.y as u32);
        if self.z == 1 {
            v * z
        } else {
            v
        }
    }
}

/// A polynomial as a list of `(monomial, coefficient)` terms.
pub type Polynomial<T> = Vec<(Monomial, T)>;

fn push_term<T: Real>(poly: &mut Polynomial<T>, mono: Monomial, c: T) {
    if c == T::zero() {
        return;
    }
    match poly.iter_mut().find(|(m, _)| *m == mono) {
        Some((_, v)) => *v += c,
        None => poly.push((mono, c)),
    }
}

/// Normalization `A(l, m)` of the real harmonic `Y_lm`, `m ≥ 0`.
fn harmonic_norm<T: Real>(l: usize, m: usize) -> T {
    let two_minus_delta = if m == 0 { T::one() } else { T::two() };
    let num = two_minus_delta * T::from_usize(2 * l + 1) * factorial_t::<T>(l - m);
    let den = T::from_i64(4) * T::pi() * factorial_t::<T>(l + m);
    (num / den).sqrt()
}

/// Coefficient of `x^{m−j} y^j z^k` in the expansion of `Y_lm`, up to normalization and sign.
fn harmonic_term<T: Real>(l: usize, m: usize, j: usize, k: usize) -> T {
    let (li, mi, ki) = (l as i64, m as i64, k as i64);
    let num = T::two().powi(l as u32)
        * factorial_t::<T>(m)
        * half_factorial_t::<T>(li + mi + ki - 1).unwrap_or_else(T::zero);
    let den = factorial_t::<T>(j) * factorial_t::<T>(k) * factorial_t::<T>(m - j) * factorial_t::<T>(l - m - k);
    num / den * inv_half_factorial_t::<T>(-li + mi + ki - 1)
}

/// Multinomial weight of `x^{p−q} y^q` in `(1 − x² − y²)^{k/2}`, `k` even.
fn z_power_term<T: Real>(p: usize, q: usize, k: usize) -> T {
    factorial_t::<T>(k / 2)
        / (factorial_t::<T>(q / 2) * factorial_t::<T>((k - p) / 2) * factorial_t::<T>((p - q) / 2))
}

/// `Y_lm` as a polynomial in `x`, `y` and at most one power of `z`.
pub fn harmonic_polynomial<T: Real>(l: usize, m: i64) -> Polynomial<T> {
    let mut poly = Vec::new();
    let am = m.unsigned_abs() as usize;
    let norm = harmonic_norm::<T>(l, am);

    for j in 0..=am {
        let (keep, sign) = if m >= 0 {
            (j % 2 == 0, if (j / 2) % 2 == 0 { 1 } else { -1 })
        } else {
            (j % 2 == 1, if ((j.saturating_sub(1)) / 2) % 2 == 0 { 1 } else { -1 })
        };
        if !keep {
            continue;
        }
        let sign = T::from_i64(sign);

        for k in 0..=(l - am) {
            let b = harmonic_term::<T>(l, am, j, k);
            if b == T::zero() {
                continue;
            }
            let coeff = norm * b * sign;
            // z^k = z^{k mod 2} (1 − x² − y²)^{⌊k/2⌋}
            let (k_even, z) = if k % 2 == 0 { (k, 0) } else { (k - 1, 1) };
            for p in (0..=k_even).step_by(2) {
                for q in (0..=p).step_by(2) {
                    let parity = if (p / 2) % 2 == 0 { T::one() } else { -T::one() };
                    let c = coeff * z_power_term::<T>(p, q, k_even) * parity;
                    push_term(&mut poly, Monomial::new(am - j + p - q, j + q, z), c);
                }
            }
        }
    }
    poly
}

/// The Green's basis element `g̃_lm` as a polynomial.
pub fn green_polynomial<T: Real>(l: usize, m: i64) -> Polynomial<T> {
    let mu = (l as i64 - m) as usize;
    let nu = (l as i64 + m) as usize;
    let mut g = Vec::new();

    if nu % 2 == 0 {
        push_term(&mut g, Monomial::new(mu / 2, nu / 2, 0), T::ratio(mu as i64 + 2, 2));
    } else if l == 1 && m == 0 {
        push_term(&mut g, Monomial::new(0, 0, 1), T::one());
    } else if mu == 1 && l % 2 == 0 {
        push_term(&mut g, Monomial::new(l - 2, 1, 1), T::from_i64(3));
    } else if mu == 1 {
        push_term(&mut g, Monomial::new(l - 3, 0, 1), -T::one());
        push_term(&mut g, Monomial::new(l - 1, 0, 1), T::one());
        push_term(&mut g, Monomial::new(l - 3, 2, 1), T::from_i64(4));
    } else {
        let a = T::ratio(mu as i64 - 3, 2);
        if mu >= 5 {
            push_term(&mut g, Monomial::new((mu - 5) / 2, (nu - 1) / 2, 1), a);
            push_term(&mut g, Monomial::new((mu - 5) / 2, (nu + 3) / 2, 1), -a);
        }
        push_term(
            &mut g,
            Monomial::new((mu - 1) / 2, (nu - 1) / 2, 1),
            -T::ratio(mu as i64 + 3, 2),
        );
    }
    g
}

/// Solve `G · X = B` by Gauss–Jordan elimination with partial pivoting.
///
/// Row operations are only issued for non-zero multipliers and only touch the non-zero entries
/// of the pivot row, which keeps the cost near `O(nnz · N)` for the sparse `G`.
fn gauss_jordan<T: Real>(mut g: DMatrix<T>, mut rhs: DMatrix<T>) -> Result<DMatrix<T>, FluxError> {
    let n = g.nrows();
    if g.ncols() != n || rhs.nrows() != n {
        return Err(FluxError::shape("basis system", n, rhs.nrows()));
    }

    for k in 0..n {
        let mut pivot = k;
        let mut best = g[(k, k)].abs();
        for r in (k + 1)..n {
            let v = g[(r, k)].abs();
            if v > best {
                best = v;
                pivot = r;
            }
        }
        if best == T::zero() {
            return Err(FluxError::NumericInstability(format!(
                "singular basis matrix at column {k}"
            )));
        }
        if pivot != k {
            g.swap_rows(k, pivot);
            rhs.swap_rows(k, pivot);
        }

        let inv = T::one() / g[(k, k)];
        let g_cols: Vec<usize> = (k..n).filter(|&c| g[(k, c)] != T::zero()).collect();
        let rhs_cols: Vec<usize> = (0..rhs.ncols())
            .filter(|&c| rhs[(k, c)] != T::zero())
            .collect();
        for &c in &g_cols {
            g[(k, c)] *= inv;
        }
        for &c in &rhs_cols {
            rhs[(k, c)] *= inv;
        }

        for r in 0..n {
            if r == k {
                continue;
            }
            let f = g[(r, k)];
            if f == T::zero() {
                continue;
            }
            for &c in &g_cols {
                let v = g[(k, c)];
                g[(r, c)] -= f * v;
            }
            for &c in &rhs_cols {
                let v = rhs[(k, c)];
                rhs[(r, c)] -= f * v;
            }
        }
    }
    Ok(rhs)
}

/// `r_n = ∬_disk p̃_n dA`.
fn disk_integral<T: Real>(mono: Monomial) -> T {
    if mono.x % 2 == 1 || mono.y % 2 == 1 {
        return T::zero();
    }
    let (a, c) = ((mono.x / 2) as i64, (mono.y / 2) as i64);
    let angular = half_factorial_t::<T>(2 * a - 1).unwrap_or_else(T::zero)
        * half_factorial_t::<T>(2 * c - 1).unwrap_or_else(T::zero);
    if mono.z == 0 {
        angular * inv_half_factorial_t::<T>(2 * a + 2 * c + 2)
    } else {
        angular * T::pi().sqrt() * T::half() * inv_half_factorial_t::<T>(2 * a + 2 * c + 3)
    }
}

/// Change-of-basis matrices of a degree-`L` engine.
#[derive(Debug, Clone)]
pub struct Basis<T: Real> {
    lmax: usize,
    a1: DMatrix<T>,
    a1_inv: DMatrix<T>,
    a2: DMatrix<T>,
    a: DMatrix<T>,
    r_t: DVector<T>,
    r_t_a1: DVector<T>,
}

impl<T: Real> Basis<T> {
    pub fn new(lmax: usize) -> Result<Self, FluxError> {
        let n = n_coeffs(lmax);

        let mut a1 = DMatrix::<T>::zeros(n, n);
        let mut g = DMatrix::<T>::zeros(n, n);
        for l in 0..=lmax {
            for m in -(l as i64)..=(l as i64) {
                let col = lm_index(l, m);
                for (mono, c) in harmonic_polynomial::<T>(l, m) {
                    a1[(mono.index(), col)] += c;
                }
                for (mono, c) in green_polynomial::<T>(l, m) {
                    g[(mono.index(), col)] += c;
                }
            }
        }

        let a1_inv = gauss_jordan(a1.clone(), DMatrix::<T>::identity(n, n))?;
        let a2 = gauss_jordan(g.clone(), DMatrix::<T>::identity(n, n))?;
        let a = gauss_jordan(g, a1.clone())?;

        let r_t = DVector::<T>::from_iterator(
            n,
            (0..=lmax).flat_map(|l| {
                (-(l as i64)..=(l as i64)).map(move |m| disk_integral::<T>(Monomial::from_lm(l, m)))
            }),
        );
        let r_t_a1 = a1.tr_mul(&r_t);

        Ok(Basis {
            lmax,
            a1,
            a1_inv,
            a2,
            a,
            r_t,
            r_t_a1,
        })
    }

    pub fn lmax(&self) -> usize {
        self.lmax
    }

    /// `Y_lm → p̃`.
    pub fn a1(&self) -> &DMatrix<T> {
        &self.a1
    }

    /// `p̃ → Y_lm`, for maps given as polynomials.
    pub fn a1_inv(&self) -> &DMatrix<T> {
        &self.a1_inv
    }

    /// `p̃ → g̃`.
    pub fn a2(&self) -> &DMatrix<T> {
        &self.a2
    }

    /// `Y_lm → g̃`.
    pub fn a(&self) -> &DMatrix<T> {
        &self.a
    }

    /// Full-disk integrals of the polynomial basis.
    pub fn r_t(&self) -> &DVector<T> {
        &self.r_t
    }

    /// `rᵀ · A1` stored as a column: the unocculted flux is `r_t_a1 · y`.
    pub fn r_t_a1(&self) -> &DVector<T> {
        &self.r_t_a1
    }
}

/// The polynomial basis `p̃` at the sky point `(x, y)`.
///
/// Points outside the unit disk have no surface behind them and evaluate to NaN.
pub fn poly_basis<T: Real>(lmax: usize, x: T, y: T) -> DVector<T> {
    let n = n_coeffs(lmax);
    let z2 = T::one() - x * x - y * y;
    if !(z2 >= T::zero()) {
        return DVector::from_element(n, T::from_f64(f64::NAN));
    }
    let z = z2.sqrt();
    DVector::from_iterator(
        n,
        (0..=lmax).flat_map(|l| {
            (-(l as i64)..=(l as i64)).map(move |m| Monomial::from_lm(l, m).eval(x, y, z))
        }),
    )
}

/// `p̃` and its partial derivatives with respect to `x` and `y` at `(x, y)`.
///
/// Terms carrying `z` have unbounded derivatives on the limb.
pub fn poly_basis_gradient<T: Real>(
    lmax: usize,
    x: T,
    y: T,
) -> (DVector<T>, DVector<T>, DVector<T>) {
    let n = n_coeffs(lmax);
    let value = poly_basis(lmax, x, y);
    let z2 = T::one() - x * x - y * y;
    if !(z2 >= T::zero()) {
        let nan = DVector::from_element(n, T::from_f64(f64::NAN));
        return (value, nan.clone(), nan);
    }
    let z = z2.sqrt();

    let mut dx = DVector::<T>::zeros(n);
    let mut dy = DVector::<T>::zeros(n);
    for l in 0..=lmax {
        for m in -(l as i64)..=(l as i64) {
            let idx = lm_index(l, m);
            let mono = Monomial::from_lm(l, m);
            let (i, j) = (mono.x as u32, mono.y as u32);
            let zf = if mono.z == 1 { z } else { T::one() };

            let mut gx = if i > 0 {
                T::from_usize(mono.x) * x.powi(i - 1) * y.powi(j) * zf
            } else {
                T::zero()
            };
            let mut gy = if j > 0 {
                T::from_usize(mono.y) * x.powi(i) * y.powi(j - 1) * zf
            } else {
                T::zero()
            };
            if mono.z == 1 {
                // ∂z/∂x = −x/z
                let base = x.powi(i) * y.powi(j);
                gx -= base * x / z;
                gy -= base * y / z;
            }
            dx[idx] = gx;
            dy[idx] = gy;
        }
    }
    (value, dx, dy)
}

#[cfg(test)]
mod basis_test {
    use super::*;
    use approx::assert_relative_eq;
    use itertools::iproduct;
    use std::f64::consts::PI;

    #[test]
    fn test_monomial_index_round_trip() {
        for l in 0..6usize {
            for m in -(l as i64)..=(l as i64) {
                let mono = Monomial::from_lm(l, m);
                assert_eq!(mono.index(), lm_index(l, m));
                assert_eq!(mono.degree(), l);
            }
        }
    }

    #[test]
    fn test_low_order_harmonics() {
        // Y_00 = 1 / (2 √π), Y_10 = √(3 / 4π) z, Y_1,-1 = √(3 / 4π) y
        let y00 = harmonic_polynomial::<f64>(0, 0);
        assert_eq!(y00.len(), 1);
        assert_relative_eq!(y00[0].1, 0.5 / PI.sqrt(), max_relative = 1e-15);

        let c1 = (3.0 / (4.0 * PI)).sqrt();
        let y10 = harmonic_polynomial::<f64>(1, 0);
        assert_eq!(y10, vec![(Monomial::new(0, 0, 1), y10[0].1)]);
        assert_relative_eq!(y10[0].1, c1, max_relative = 1e-15);

        let y1m1 = harmonic_polynomial::<f64>(1, -1);
        assert_eq!(y1m1[0].0, Monomial::new(0, 1, 0));
        assert_relative_eq!(y1m1[0].1, c1, max_relative = 1e-15);
    }

    #[test]
    fn test_y20_reduces_z_squared() {
        // Y_20 = √(5/16π) (3z² − 1) = √(5/16π) (2 − 3x² − 3y²)
        let c = (5.0 / (16.0 * PI)).sqrt();
        let poly = harmonic_polynomial::<f64>(2, 0);
        let get = |mono: Monomial| {
            poly.iter()
                .find(|(m, _)| *m == mono)
                .map(|(_, v)| *v)
                .unwrap_or(0.0)
        };
        assert_relative_eq!(get(Monomial::new(0, 0, 0)), 2.0 * c, max_relative = 1e-14);
        assert_relative_eq!(get(Monomial::new(2, 0, 0)), -3.0 * c, max_relative = 1e-14);
        assert_relative_eq!(get(Monomial::new(0, 2, 0)), -3.0 * c, max_relative = 1e-14);
    }

    #[test]
    fn test_polynomial_to_harmonics() {
        let basis = Basis::<f64>::new(3).unwrap();
        let n = n_coeffs(3);
        let product = basis.a1_inv() * basis.a1();
        for (r, c) in iproduct!(0..n, 0..n) {
            let expected = if r == c { 1.0 } else { 0.0 };
            assert!((product[(r, c)] - expected).abs() < 1e-12);
        }

        // the map I = z is 2 √(π/3) · Y_10
        let mut p = DVector::<f64>::zeros(n);
        p[Monomial::from_lm(1, 0).index()] = 1.0;
        let y = basis.a1_inv() * p;
        assert_relative_eq!(y[lm_index(1, 0)], 2.0 * (PI / 3.0).sqrt(), max_relative = 1e-13);
        assert!(y.iter().enumerate().all(|(i, v)| i == lm_index(1, 0) || v.abs() < 1e-13));
    }

    #[test]
    fn test_green_inverse() {
        let basis = Basis::<f64>::new(4).unwrap();
        let n = n_coeffs(4);
        let mut g = DMatrix::<f64>::zeros(n, n);
        for l in 0..=4usize {
            for m in -(l as i64)..=(l as i64) {
                for (mono, c) in green_polynomial::<f64>(l, m) {
                    g[(mono.index(), lm_index(l, m))] += c;
                }
            }
        }
        let id = &g * basis.a2();
        for (r, c) in iproduct!(0..n, 0..n) {
            let expected = if r == c { 1.0 } else { 0.0 };
            assert!((id[(r, c)] - expected).abs() < 1e-12);
        }
        let a = basis.a2() * basis.a1();
        assert!((a - basis.a()).abs().max() < 1e-12);
    }

    #[test]
    fn test_disk_integrals() {
        let basis = Basis::<f64>::new(2).unwrap();
        // ∬ 1 = π, ∬ z = 2π/3, ∬ x² = π/4
        assert_relative_eq!(basis.r_t()[0], PI, max_relative = 1e-15);
        assert_relative_eq!(basis.r_t()[2], 2.0 * PI / 3.0, max_relative = 1e-15);
        assert_relative_eq!(basis.r_t()[lm_index(2, -2)], PI / 4.0, max_relative = 1e-15);
        assert_eq!(basis.r_t()[lm_index(1, 1)], 0.0);

        // the uniform map Y_00 has flux √π / 2
        assert_relative_eq!(basis.r_t_a1()[0], PI.sqrt() / 2.0, max_relative = 1e-15);
    }

    #[test]
    fn test_poly_basis_outside_disk_is_nan() {
        let p = poly_basis::<f64>(2, 0.9, 0.9);
        assert!(p.iter().all(|v| v.is_nan()));
        let p = poly_basis::<f64>(1, 0.3, 0.4);
        assert_relative_eq!(p[2], (1.0f64 - 0.25).sqrt(), max_relative = 1e-15);
    }

    #[test]
    fn test_poly_basis_gradient_matches_differences() {
        let (x, y, h) = (0.21, -0.37, 1e-6);
        let (_, dx, dy) = poly_basis_gradient::<f64>(3, x, y);
        let fx = (poly_basis::<f64>(3, x + h, y) - poly_basis::<f64>(3, x - h, y)) / (2.0 * h);
        let fy = (poly_basis::<f64>(3, x, y + h) - poly_basis::<f64>(3, x, y - h)) / (2.0 * h);
        for n in 0..16 {
            assert!((dx[n] - fx[n]).abs() < 1e-8);
            assert!((dy[n] - fy[n]).abs() < 1e-8);
        }
    }
}

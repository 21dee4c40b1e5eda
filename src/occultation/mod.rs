//! # Occultation solution vector
//!
//! For an occultor of radius `r` centered at `(0, b)` in the sky plane, the solution vector
//! `sᵀ(b, r)` holds the integrals of the Green's basis over the visible region,
//!
//! ```text
//! s_n = ∬_V g̃_n dA,   V = unit disk \ occultor disk,
//! ```
//!
//! so that the flux of a map is `sᵀ · A · y`. By Green's theorem each `s_n` reduces to a limb
//! term `Q` (along the unit circle, from `π − λ` to `2π + λ`) minus an occultor term `P` (along
//! the occultor boundary, from `π − φ` to `2π + φ`):
//!
//! * terms without `z` are sums of [`h_table`] entries,
//! * terms with `z³` use the occultor arc integrals of [`OccultorArc`],
//! * `s_2` (the `z` term) additionally needs an elliptic integral of the third kind, which has a
//!   removable singularity at `b = r`.
//!
//! ## Regimes
//!
//! | regime        | condition                 | boundary                               |
//! |---------------|---------------------------|----------------------------------------|
//! | `Unocculted`  | `r = 0` or `b ≥ 1 + r`    | full limb, `λ = π/2`, no occultor term |
//! | `Complete`    | `b ≤ r − 1`               | none, `s = 0`                          |
//! | `Inside`      | `b + r ≤ 1`               | full limb and full occultor circle     |
//! | `Partial`     | otherwise                 | limb and occultor arcs meeting at λ, φ |
//!
//! The intersection angles use the factored forms of `cos λ` and `cos φ`, which stay accurate at
//! grazing contacts (`b ≈ 1 ± r`).
//!
//! ## Gradients
//!
//! Moving the occultor only moves its own boundary, so
//! `∂s_n/∂b = −∮ g̃_n (y − b) dt` and `∂s_n/∂r = −r ∮ g̃_n dt` along the occultor arc inside the
//! disk. Both vanish in the `Unocculted` and `Complete` regimes.

pub mod arcs;

use log::trace;
use nalgebra::DVector;

use crate::basis::{green_polynomial, Polynomial};
use crate::constants::{lm_index, n_coeffs};
use crate::elliptic::cel;
use crate::flux_errors::FluxError;
use crate::scalar::Real;
use crate::special::binomial_table;

use self::arcs::{h_table, OccultorArc, SolverSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Regime {
    Unocculted,
    Complete,
    Inside,
    Partial,
}

impl Regime {
    pub fn classify<T: Real>(b: T, r: T) -> Regime {
        let one = T::one();
        if r == T::zero() || b >= one + r {
            Regime::Unocculted
        } else if b <= r - one {
            Regime::Complete
        } else if b + r <= one {
            Regime::Inside
        } else {
            Regime::Partial
        }
    }
}

/// `sᵀ` with its derivatives.
#[derive(Debug, Clone, PartialEq)]
pub struct SolutionGradient<T: Real> {
    pub s: DVector<T>,
    pub ds_db: DVector<T>,
    pub ds_dr: DVector<T>,
}

/// Angles bounding the visible limb (`λ`) and the occultor arc inside the disk (`φ`).
struct Angles<T: Real> {
    lambda: T,
    phi: T,
}

fn angles<T: Real>(regime: Regime, b: T, r: T) -> Angles<T> {
    let one = T::one();
    match regime {
        Regime::Partial => {
            let two_b = T::two() * b;
            let sin_l = (one - r * r + b * b) / two_b;
            let cos_l = ((r - b + one) * (r + b - one) * (b + one - r) * (b + one + r)).sqrt() / two_b;
            let two_br = two_b * r;
            let sin_p = (one - r * r - b * b) / two_br;
            let cos_p = ((b + r - one) * (b + r + one) * (one - b + r) * (one + b - r)).sqrt() / two_br;
            Angles {
                lambda: sin_l.atan2(cos_l),
                phi: sin_p.atan2(cos_p),
            }
        }
        _ => Angles {
            lambda: T::frac_pi_2(),
            phi: T::frac_pi_2(),
        },
    }
}

/// Evaluates `sᵀ(b, r)` for a fixed degree.
#[derive(Debug, Clone)]
pub struct OccultationSolver<T: Real> {
    lmax: usize,
    green: Vec<Polynomial<T>>,
    binom: Vec<Vec<T>>,
    settings: SolverSettings,
}

impl<T: Real> OccultationSolver<T> {
    pub fn new(lmax: usize, settings: SolverSettings) -> Self {
        let green = (0..=lmax)
            .flat_map(|l| (-(l as i64)..=(l as i64)).map(move |m| green_polynomial::<T>(l, m)))
            .collect();
        OccultationSolver {
            lmax,
            green,
            binom: binomial_table(lmax + 4),
            settings,
        }
    }

    pub fn lmax(&self) -> usize {
        self.lmax
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    fn table_size(&self) -> usize {
        self.lmax + 4
    }

    fn check_geometry(b: T, r: T) -> Result<(), FluxError> {
        if !b.is_finite() || b < T::zero() {
            return Err(FluxError::domain("b", b.to_f64(), "[0, inf), finite"));
        }
        if !r.is_finite() || r < T::zero() {
            return Err(FluxError::domain("r", r.to_f64(), "[0, inf), finite"));
        }
        Ok(())
    }

    /// `∫ x^i y^j dt` along the occultor arc.
    fn poly_arc(&self, hp: &[Vec<T>], b: T, r: T, i: usize, j: usize) -> T {
        let sum: T = (0..=j)
            .map(|k| {
                self.binom[j][k] * b.powi((j - k) as u32) * r.powi(k as u32) * hp[i][k]
            })
            .sum();
        r.powi(i as u32) * sum
    }

    /// The `z`-term correction for `s_2`.
    ///
    /// `xi` is smooth through `b = r` and vanishes there, but both closed-form terms grow like
    /// `1 / (b − r)` and cancel. Inside a window of half-width `ε^{1/3}` it is replaced by the
    /// parabola through `0` and the closed form at the window edges.
    fn xi(&self, regime: Regime, b: T, r: T) -> Result<T, FluxError> {
        let diff = b - r;
        let window = T::from_f64(T::epsilon().to_f64().cbrt());
        if diff.abs() >= window {
            return self.xi_closed_form(regime, b, r);
        }
        let h = window.min(r * T::half());
        if diff == T::zero() || h == T::zero() {
            return Ok(T::zero());
        }
        let above = self.xi_closed_form(Regime::classify(r + h, r), r + h, r)?;
        let below = self.xi_closed_form(Regime::classify(r - h, r), r - h, r)?;
        let slope = (above - below) / (T::two() * h);
        let curvature = (above + below) / (T::two() * h * h);
        Ok(diff * (slope + diff * curvature))
    }

    fn xi_closed_form(&self, regime: Regime, b: T, r: T) -> Result<T, FluxError> {
        if b == r {
            return Ok(T::zero());
        }
        let one = T::one();
        let iters = self.settings.ellip_max_iter;
        let delta = (one - b + r) * (one + b - r);
        let sign = (r - b).signum_or_zero();
        let diff = b - r;

        match regime {
            Regime::Inside => {
                let kc2 = (one - b - r) * (one + b + r) / delta;
                let kc = kc2.sqrt();
                let p = ((b + r) / diff) * ((b + r) / diff);
                let t1 = T::two() * T::pi() * sign;
                let t2 = (r * r - b * b) * T::from_i64(4) * delta.sqrt() / (diff * diff)
                    * cel(kc, p, one, kc2, iters)?;
                Ok(t1 - t2)
            }
            _ => {
                let four_br = T::from_i64(4) * b * r;
                let k2 = delta / four_br;
                let kc2 = (b + r - one) * (b + r + one) / four_br;
                let (k, kc) = (k2.sqrt(), kc2.sqrt());
                let t1 = T::from_i64(4) * sign * ((b + r) * k).atan2(diff.abs() * kc);
                let t2 = -(T::from_i64(4) * four_br.sqrt() * k2 * (b + r) / diff)
                    * cel(kc, one / (diff * diff), one, T::zero(), iters)?;
                Ok(t1 - t2)
            }
        }
    }

    /// `sᵀ(b, r)`.
    pub fn solve(&self, b: T, r: T) -> Result<DVector<T>, FluxError> {
        Self::check_geometry(b, r)?;
        let regime = Regime::classify(b, r);
        trace!("occultation regime {regime:?} at b = {b}, r = {r}");

        let n = n_coeffs(self.lmax);
        if regime == Regime::Complete {
            return Ok(DVector::zeros(n));
        }

        let size = self.table_size();
        let ang = angles(regime, b, r);
        let hl = h_table(ang.lambda, size);

        let occulted = regime != Regime::Unocculted;
        let (hp, arc) = if occulted {
            let arc = OccultorArc::new(
                b,
                r,
                regime == Regime::Inside,
                self.lmax + 2,
                &self.binom,
                &self.settings,
            )?;
            (h_table(ang.phi, size), Some(arc))
        } else {
            (Vec::new(), None)
        };

        let mut s = DVector::<T>::zeros(n);
        for l in 0..=self.lmax {
            for m in -(l as i64)..=(l as i64) {
                let mu = (l as i64 - m) as usize;
                let nu = (l as i64 + m) as usize;

                let (q, p) = if nu % 2 == 0 {
                    let (a, c) = (mu / 2, nu / 2);
                    let p = if occulted {
                        self.poly_arc(&hp, b, r, a + 2, c)
                    } else {
                        T::zero()
                    };
                    (hl[a + 2][c], p)
                } else if l == 1 && m == 0 {
                    let q = (T::pi() + T::two() * ang.lambda) / T::from_i64(3);
                    let p = match &arc {
                        Some(arc) => {
                            let xi = self.xi(regime, b, r)?;
                            (T::pi() + T::two() * ang.phi - arc.integral(0, 0, 3)
                                + (r * r - b * b) * arc.integral(0, 0, 1)
                                + xi)
                                / T::from_i64(6)
                        }
                        None => T::zero(),
                    };
                    (q, p)
                } else {
                    let p = match &arc {
                        Some(arc) if mu == 1 && l % 2 == 0 => {
                            b * arc.integral(l - 2, 0, 3) - arc.integral(l - 2, 1, 3)
                        }
                        Some(arc) if mu == 1 => {
                            b * arc.integral(l - 3, 1, 3) - arc.integral(l - 3, 2, 3)
                        }
                        Some(arc) => arc.integral((mu - 1) / 2, (nu - 1) / 2, 3),
                        None => T::zero(),
                    };
                    (T::zero(), p)
                };
                s[lm_index(l, m)] = q - p;
            }
        }
        Ok(s)
    }

    /// `sᵀ(b, r)` together with `∂sᵀ/∂b` and `∂sᵀ/∂r`.
    pub fn solve_with_gradient(&self, b: T, r: T) -> Result<SolutionGradient<T>, FluxError> {
        let s = self.solve(b, r)?;
        let n = s.len();
        let regime = Regime::classify(b, r);
        if matches!(regime, Regime::Unocculted | Regime::Complete) {
            return Ok(SolutionGradient {
                s,
                ds_db: DVector::zeros(n),
                ds_dr: DVector::zeros(n),
            });
        }

        let ang = angles(regime, b, r);
        let hp = h_table(ang.phi, self.table_size());
        let arc = OccultorArc::new(
            b,
            r,
            regime == Regime::Inside,
            self.lmax + 2,
            &self.binom,
            &self.settings,
        )?;
        let along = |i: usize, j: usize, z: usize| -> T {
            if z == 0 {
                self.poly_arc(&hp, b, r, i, j)
            } else {
                arc.integral(i, j, 1)
            }
        };

        let mut ds_db = DVector::<T>::zeros(n);
        let mut ds_dr = DVector::<T>::zeros(n);
        for (idx, poly) in self.green.iter().enumerate() {
            let mut db = T::zero();
            let mut dr = T::zero();
            for &(mono, c) in poly {
                let base = along(mono.x, mono.y, mono.z);
                db += c * (along(mono.x, mono.y + 1, mono.z) - b * base);
                dr += c * base;
            }
            ds_db[idx] = -db;
            ds_dr[idx] = -r * dr;
        }

        Ok(SolutionGradient { s, ds_db, ds_dr })
    }

    /// `(ḏb, ḏr)` for a seed on `sᵀ`.
    pub fn backward(&self, b: T, r: T, seed: &DVector<T>) -> Result<(T, T), FluxError> {
        let expected = n_coeffs(self.lmax);
        if seed.len() != expected {
            return Err(FluxError::shape("seed", expected, seed.len()));
        }
        let grad = self.solve_with_gradient(b, r)?;
        Ok((grad.ds_db.dot(seed), grad.ds_dr.dot(seed)))
    }
}

#[cfg(test)]
mod occultation_test {
    use super::*;
    use crate::basis::Basis;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn solver(lmax: usize) -> OccultationSolver<f64> {
        OccultationSolver::new(
            lmax,
            SolverSettings {
                ellip_max_iter: 200,
                series_cutoff: 0.5,
                series_max_terms: 2000,
            },
        )
    }

    #[test]
    fn test_regimes() {
        assert_eq!(Regime::classify(0.5, 0.0), Regime::Unocculted);
        assert_eq!(Regime::classify(1.5, 0.5), Regime::Unocculted);
        assert_eq!(Regime::classify(0.2, 1.5), Regime::Complete);
        assert_eq!(Regime::classify(0.2, 0.3), Regime::Inside);
        assert_eq!(Regime::classify(0.9, 0.3), Regime::Partial);
    }

    #[test]
    fn test_unocculted_matches_disk_integrals() {
        let basis = Basis::<f64>::new(4).unwrap();
        let s = solver(4).solve(3.0, 0.5).unwrap();
        // sᵀ A = rᵀ A1 without occultor
        let lhs = basis.a().tr_mul(&s);
        assert!((lhs - basis.r_t_a1()).amax() < 1e-12);
    }

    #[test]
    fn test_uniform_disk_area() {
        // s_0 integrates g̃_0 = 1 over the visible area
        let sv = solver(2);
        let (b, r) = (0.3, 0.2);
        let s = sv.solve(b, r).unwrap();
        assert_relative_eq!(s[0], PI - PI * r * r, max_relative = 1e-13);

        // lens area for a partial occultation
        let (b, r): (f64, f64) = (0.95, 0.4);
        let s = sv.solve(b, r).unwrap();
        let lens = r * r * ((b * b + r * r - 1.0) / (2.0 * b * r)).acos()
            + ((b * b + 1.0 - r * r) / (2.0 * b)).acos()
            - 0.5 * ((-b + r + 1.0) * (b + r - 1.0) * (b - r + 1.0) * (b + r + 1.0)).sqrt();
        assert_relative_eq!(s[0], PI - lens, max_relative = 1e-13);
    }

    #[test]
    fn test_complete_and_domain() {
        let sv = solver(3);
        assert_eq!(sv.solve(0.1, 2.0).unwrap(), DVector::zeros(16));
        assert!(matches!(
            sv.solve(-0.1, 0.2),
            Err(FluxError::DomainError { param: "b", .. })
        ));
        assert!(matches!(
            sv.solve(0.1, f64::NAN),
            Err(FluxError::DomainError { param: "r", .. })
        ));
    }

    #[test]
    fn test_continuity_across_b_equals_r() {
        let sv = solver(3);
        for &r in &[0.3, 0.8] {
            let at = sv.solve(r, r).unwrap();
            let below = sv.solve(r - 1e-9, r).unwrap();
            let above = sv.solve(r + 1e-9, r).unwrap();
            assert!((&at - below).amax() < 1e-7);
            assert!((at - above).amax() < 1e-7);
        }
    }

    #[test]
    fn test_accuracy_near_b_equals_r() {
        use crate::scalar::DoubleDouble;

        let settings = *solver(3).settings();
        let sv = OccultationSolver::<f64>::new(3, settings);
        let shadow = OccultationSolver::<DoubleDouble>::new(3, settings);
        for &r in &[0.25, 0.7] {
            for &d in &[-1e-5, -1e-7, -2.31e-9, -1e-12, 0.0, 1e-12, 2.31e-9, 1e-7, 1e-5, 1e-4] {
                let b: f64 = r + d;
                let s = sv.solve(b, r).unwrap();
                let reference = shadow
                    .solve(DoubleDouble::from(b), DoubleDouble::from(r))
                    .unwrap();
                let scale = reference.iter().fold(0.0f64, |m, v| m.max(v.abs().to_f64()));
                let worst = s
                    .iter()
                    .zip(reference.iter())
                    .fold(0.0f64, |m, (a, e)| {
                        m.max((DoubleDouble::from(*a) - *e).abs().to_f64())
                    });
                assert!(worst / scale < 1e-11, "b - r = {d}, r = {r}: {worst:.2e}");
            }
        }
    }

    #[test]
    fn test_gradient_matches_differences() {
        let sv = solver(4);
        let h = 1e-6;
        for &(b, r) in &[(0.25, 0.3), (0.8, 0.45), (1.1, 0.3), (0.0, 0.4)] {
            let g = sv.solve_with_gradient(b, r).unwrap();
            let fd_r = (sv.solve(b, r + h).unwrap() - sv.solve(b, r - h).unwrap()) / (2.0 * h);
            assert!((&g.ds_dr - fd_r).amax() < 1e-6, "ds/dr at b={b} r={r}");
            if b > 0.0 {
                let fd_b =
                    (sv.solve(b + h, r).unwrap() - sv.solve(b - h, r).unwrap()) / (2.0 * h);
                assert!((&g.ds_db - fd_b).amax() < 1e-6, "ds/db at b={b} r={r}");
            } else {
                let fd_b = (sv.solve(h, r).unwrap() - g.s.clone()) / h;
                assert!((&g.ds_db - fd_b).amax() < 1e-5, "one-sided ds/db at b=0");
            }
        }
    }

    #[test]
    fn test_backward_contracts_seed() {
        let sv = solver(2);
        let seed = DVector::from_fn(9, |i, _| 0.5 - 0.1 * i as f64);
        let g = sv.solve_with_gradient(0.7, 0.5).unwrap();
        let (db, dr) = sv.backward(0.7, 0.5, &seed).unwrap();
        assert_relative_eq!(db, g.ds_db.dot(&seed), max_relative = 1e-15);
        assert_relative_eq!(dr, g.ds_dr.dot(&seed), max_relative = 1e-15);
        assert_eq!(
            sv.backward(0.7, 0.5, &DVector::zeros(4)),
            Err(FluxError::shape("seed", 9, 4))
        );
    }
}

//! Boundary integrals along the limb and the occultor arcs.
//!
//! * [`h_table`]: `H_{u,v}(α) = ∫_{π−α}^{2π+α} cos^u t sin^v t dt`, the building block of every
//!   integral without a `z` factor.
//! * [`EllipticFamily`]: `T_v(m) = ∫_{−π/2}^{π/2} sin^{2v}t cos²t / √(1 − m sin²t) dt` and
//!   `U_v(m) = ∫_{−π/2}^{π/2} sin^{2v}t √(1 − m sin²t) dt`, obtained either from their power
//!   series in `m` or by upward recursion from `K` and `E`.
//! * [`OccultorArc`]: `∫ x^i y^j z^s dt` along the occultor boundary `x = r cos t`,
//!   `y = b + r sin t` for `s ∈ {1, 3}`, expressed through the elliptic family after the
//!   substitution `y = (b − r) + 2r S`.
//!
//! The upward recursion amplifies rounding errors by roughly `m^{−v}`, so it is only used when
//! `m` is large enough for the amplification over the whole table to stay below `100`; below
//! that the series converges fast and is used instead.

use crate::elliptic::cel;
use crate::flux_errors::FluxError;
use crate::scalar::Real;

/// Tunables shared by the occultation routines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    pub ellip_max_iter: usize,
    pub series_cutoff: f64,
    pub series_max_terms: usize,
}

/// `H[u][v]` for `u, v ∈ 0..size`.
pub(crate) fn h_table<T: Real>(alpha: T, size: usize) -> Vec<Vec<T>> {
    let mut h = vec![vec![T::zero(); size]; size];
    if size == 0 {
        return h;
    }
    let (s, c) = alpha.sin_cos();

    h[0][0] = T::two() * alpha + T::pi();
    if size > 1 {
        h[0][1] = -T::two() * c;
    }
    for v in 0..size.saturating_sub(2) {
        let vf = T::from_usize(v);
        h[0][v + 2] = ((vf + T::one()) * h[0][v] - T::two() * c * s.powi(v as u32 + 1))
            / (vf + T::two());
    }
    // odd u vanish by symmetry of the interval about 3π/2
    for u in (0..size.saturating_sub(2)).step_by(2) {
        let uf = T::from_usize(u);
        for v in 0..size {
            h[u + 2][v] = (T::two() * c.powi(u as u32 + 1) * s.powi(v as u32 + 1)
                + (uf + T::one()) * h[u][v])
                / T::from_usize(u + v + 2);
        }
    }
    h
}

/// `T_v` and `U_v` for `v ∈ 0..=vmax`.
#[derive(Debug, Clone)]
pub(crate) struct EllipticFamily<T: Real> {
    pub t: Vec<T>,
    pub u: Vec<T>,
}

impl<T: Real> EllipticFamily<T> {
    /// Evaluate at parameter `m` with complementary parameter `kc2 = 1 − m` supplied in a
    /// cancellation-free form by the caller.
    pub fn new(vmax: usize, m: T, kc2: T, settings: &SolverSettings) -> Result<Self, FluxError> {
        if kc2 <= T::zero() {
            // m = 1: the integrands reduce to sin^{2v}t |cos t|
            let limit: Vec<T> = (0..=vmax)
                .map(|v| T::two() / T::from_usize(2 * v + 1))
                .collect();
            return Ok(EllipticFamily {
                t: limit.clone(),
                u: limit,
            });
        }

        let stable_floor = 10f64.powf(-2.0 / vmax.max(1) as f64);
        let switch = T::from_f64(settings.series_cutoff.max(stable_floor));
        if m < switch {
            Self::series(vmax, m, settings.series_max_terms)
        } else {
            Self::recursion(vmax, m, kc2, settings.ellip_max_iter)
        }
    }

    fn series(vmax: usize, m: T, max_terms: usize) -> Result<Self, FluxError> {
        let mut t = Vec::with_capacity(vmax + 1);
        let mut u = Vec::with_capacity(vmax + 1);
        let eps = T::epsilon();

        // W_j = ∫ sin^{2j}
        let mut w_v = T::pi();
        for v in 0..=vmax {
            if v > 0 {
                w_v *= T::ratio(2 * v as i64 - 1, 2 * v as i64);
            }

            let mut sum_t = T::zero();
            let mut sum_u = T::zero();
            let mut c_t = T::one();
            let mut c_u = T::one();
            let mut m_n = T::one();
            let mut w = w_v;
            let mut n = 0usize;
            loop {
                let j = v + n;
                let term_t = c_t * m_n * w / T::from_usize(2 * j + 2);
                let term_u = c_u * m_n * w;
                sum_t += term_t;
                sum_u += term_u;
                if term_t.abs() <= eps * sum_t.abs() && term_u.abs() <= eps * sum_u.abs() {
                    break;
                }
                n += 1;
                if n > max_terms {
                    return Err(FluxError::NumericInstability(format!(
                        "elliptic series did not converge in {max_terms} terms (m = {m})"
                    )));
                }
                let nf = T::from_usize(n);
                c_t *= (nf - T::half()) / nf;
                c_u *= (nf - T::ratio(3, 2)) / nf;
                m_n *= m;
                w *= T::ratio(2 * j as i64 + 1, 2 * j as i64 + 2);
            }
            t.push(sum_t);
            u.push(sum_u);
        }
        Ok(EllipticFamily { t, u })
    }

    fn recursion(vmax: usize, m: T, kc2: T, max_iter: usize) -> Result<Self, FluxError> {
        let kc = kc2.sqrt();
        let k = cel(kc, T::one(), T::one(), T::one(), max_iter)?;
        let e = cel(kc, T::one(), T::one(), kc2, max_iter)?;

        // F_v = ∫ sin^{2v} / √(1 − m sin²)
        let mut f = Vec::with_capacity(vmax + 2);
        f.push(T::two() * k);
        f.push(T::two() * (k - e) / m);
        for v in 1..=vmax {
            let vf = T::from_usize(v);
            let next = (T::two() * vf * (T::one() + m) * f[v]
                - (T::two() * vf - T::one()) * f[v - 1])
                / ((T::two() * vf + T::one()) * m);
            f.push(next);
        }

        let t = (0..=vmax).map(|v| f[v] - f[v + 1]).collect();
        let u = (0..=vmax).map(|v| f[v] - m * f[v + 1]).collect();
        Ok(EllipticFamily { t, u })
    }
}

/// Integrals of `x^i y^j z^s` (`s ∈ {1, 3}`) along the occultor arc inside the disk.
#[derive(Debug, Clone)]
pub(crate) struct OccultorArc<'a, T: Real> {
    b: T,
    r: T,
    /// `N¹_d`
    n1: Vec<T>,
    /// `N³_d`
    n3: Vec<T>,
    binom: &'a [Vec<T>],
}

impl<'a, T: Real> OccultorArc<'a, T> {
    /// Arc tables for degrees `d ∈ 0..=dmax`.
    ///
    /// `inside` selects the full-circle parametrization (`b + r ≤ 1`); otherwise the arc ends on
    /// the limb.
    pub fn new(
        b: T,
        r: T,
        inside: bool,
        dmax: usize,
        binom: &'a [Vec<T>],
        settings: &SolverSettings,
    ) -> Result<Self, FluxError> {
        let one = T::one();
        // 1 − (b − r)²
        let delta = (one - b + r) * (one + b - r);
        let sqrt_delta = delta.sqrt();

        let (n1, n3) = if inside {
            let m = T::from_i64(4) * b * r / delta;
            let kc2 = (one - b - r) * (one + b + r) / delta;
            let fam = EllipticFamily::new(dmax + 1, m, kc2, settings)?;
            let d15 = delta * sqrt_delta;
            let n1 = (0..=dmax).map(|v| sqrt_delta * fam.u[v]).collect();
            let n3 = (0..=dmax)
                .map(|v| d15 * (fam.u[v] - m * fam.u[v + 1]))
                .collect();
            (n1, n3)
        } else {
            let four_br = T::from_i64(4) * b * r;
            let k2 = delta / four_br;
            let kc2 = (b + r - one) * (b + r + one) / four_br;
            let fam = EllipticFamily::new(dmax + 1, k2, kc2, settings)?;
            let k = k2.sqrt();
            let scale3 = four_br * four_br.sqrt();
            let n1 = (0..=dmax)
                .map(|v| sqrt_delta * k.powi(2 * v as u32 + 1) * fam.t[v])
                .collect();
            let n3 = (0..=dmax)
                .map(|v| scale3 * k.powi(2 * v as u32 + 4) * (fam.t[v] - fam.t[v + 1]))
                .collect();
            (n1, n3)
        };

        Ok(OccultorArc {
            b,
            r,
            n1,
            n3,
            binom,
        })
    }

    /// `∫ x^i y^j z^s dt` over the arc, `s ∈ {1, 3}`.
    pub fn integral(&self, i: usize, j: usize, s: usize) -> T {
        if i % 2 == 1 {
            return T::zero();
        }
        let table = if s == 1 { &self.n1 } else { &self.n3 };
        let a = i / 2;
        let (b, r) = (self.b, self.r);

        // x^i = r^i 4^a S^a (1 − S)^a, y = (b − r) + 2 r S
        let lead = r.powi(i as u32) * T::from_i64(4).powi(a as u32);
        let shift = b - r;
        let two_r = T::two() * r;

        let mut total = T::zero();
        for p in 0..=a {
            let cp = if p % 2 == 0 {
                self.binom[a][p]
            } else {
                -self.binom[a][p]
            };
            for q in 0..=j {
                let cq = self.binom[j][q] * shift.powi((j - q) as u32) * two_r.powi(q as u32);
                total += cp * cq * table[a + p + q];
            }
        }
        T::two() * lead * total
    }
}

#[cfg(test)]
mod arcs_test {
    use super::*;
    use crate::special::binomial_table;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn settings() -> SolverSettings {
        SolverSettings {
            ellip_max_iter: 200,
            series_cutoff: 0.5,
            series_max_terms: 2000,
        }
    }

    /// Composite Simpson rule on [a, b].
    fn simpson(f: impl Fn(f64) -> f64, a: f64, b: f64, n: usize) -> f64 {
        let h = (b - a) / n as f64;
        let mut sum = f(a) + f(b);
        for k in 1..n {
            let w = if k % 2 == 1 { 4.0 } else { 2.0 };
            sum += w * f(a + k as f64 * h);
        }
        sum * h / 3.0
    }

    #[test]
    fn test_h_table_against_quadrature() {
        let alpha = 0.37;
        let h = h_table(alpha, 6);
        for u in 0..6 {
            for v in 0..6 {
                let q = simpson(
                    |t| t.cos().powi(u as i32) * t.sin().powi(v as i32),
                    PI - alpha,
                    2.0 * PI + alpha,
                    2000,
                );
                assert!((h[u][v] - q).abs() < 1e-10, "H[{u}][{v}]");
            }
        }
    }

    #[test]
    fn test_family_series_and_recursion_agree() {
        // both regimes evaluated away from their preferred range
        let m: f64 = 0.55;
        let s = EllipticFamily::<f64>::series(6, m, 4000).unwrap();
        let r = EllipticFamily::<f64>::recursion(6, m, 1.0 - m, 200).unwrap();
        for v in 0..=6 {
            assert_relative_eq!(s.t[v], r.t[v], max_relative = 1e-11);
            assert_relative_eq!(s.u[v], r.u[v], max_relative = 1e-11);
        }
    }

    #[test]
    fn test_family_against_quadrature() {
        for &m in &[0.0, 0.2, 0.8, 0.99] {
            let fam = EllipticFamily::<f64>::new(4, m, 1.0 - m, &settings()).unwrap();
            for v in 0..=4 {
                let t = simpson(
                    |x| x.sin().powi(2 * v) * x.cos().powi(2) / (1.0 - m * x.sin().powi(2)).sqrt(),
                    -PI / 2.0,
                    PI / 2.0,
                    4000,
                );
                let u = simpson(
                    |x| x.sin().powi(2 * v) * (1.0 - m * x.sin().powi(2)).sqrt(),
                    -PI / 2.0,
                    PI / 2.0,
                    4000,
                );
                assert_relative_eq!(fam.t[v as usize], t, max_relative = 1e-8);
                assert_relative_eq!(fam.u[v as usize], u, max_relative = 1e-8);
            }
        }
    }

    #[test]
    fn test_family_limit_at_unit_parameter() {
        let fam = EllipticFamily::<f64>::new(3, 1.0, 0.0, &settings()).unwrap();
        assert_eq!(fam.t, vec![2.0, 2.0 / 3.0, 0.4, 2.0 / 7.0]);
        assert_eq!(fam.u, fam.t);
    }

    #[test]
    fn test_arc_integrals_against_quadrature() {
        let binom = binomial_table::<f64>(8);
        // (b, r, inside, φ)
        let cases: [(f64, f64, bool); 3] =
            [(0.3, 0.4, true), (0.9, 0.3, false), (0.5, 0.6, false)];
        for &(b, r, inside) in &cases {
            let phi: f64 = if inside {
                PI / 2.0
            } else {
                ((1.0 - r * r - b * b) / (2.0 * b * r)).asin()
            };
            let arc = OccultorArc::new(b, r, inside, 6, &binom, &settings()).unwrap();
            for &(i, j, s) in &[(0, 0, 1), (0, 0, 3), (2, 1, 1), (2, 2, 3), (4, 0, 3), (1, 1, 1)] {
                let q = simpson(
                    |t| {
                        let x = r * t.cos();
                        let y = b + r * t.sin();
                        let z2 = (1.0 - x * x - y * y).max(0.0);
                        x.powi(i) * y.powi(j) * z2.sqrt().powi(s)
                    },
                    PI - phi,
                    2.0 * PI + phi,
                    20000,
                );
                let a = arc.integral(i as usize, j as usize, s as usize);
                // √z endpoints slow the quadrature down on the limb
                let tol = if inside || s == 3 { 1e-7 } else { 2e-5 };
                assert!((a - q).abs() < tol, "b={b} r={r} ({i},{j},{s}): {a} vs {q}");
            }
        }
    }
}

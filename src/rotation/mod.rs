//! # Rotation engine
//!
//! Rotations of a real spherical-harmonic coefficient vector, with reverse-mode gradients.
//!
//! ## Building blocks
//!
//! * **z-rotations** are block-diagonal with `2 × 2` mixes of `(y_{l,m}, y_{l,−m})` by
//!   `cos mθ`, `sin mθ`, evaluated in closed form (see [`ZRotation`]). Their angle derivative is
//!   closed form too.
//! * **Fixed frame changes** `X = D(R_y(π/2))` and `Y = D(R_x(−π/2))` carry the z-axis onto the
//!   x- and y-axes. They are computed once per engine by the
//!   [Ivanic–Ruedenberg recursion](ivanic) and stored per degree.
//! * Rotations about x and y are conjugated z-rotations:
//!   `D_x(α) = X D_z(α) Xᵀ`, `D_y(β) = Y D_z(β) Yᵀ`.
//!
//! ## Composite operators
//!
//! * `rotate_xy(y, inc, obl) = D_z(obl) · D_x(π/2 − inc) · y` tilts the native `ŷ` axis to the
//!   inclination `inc` from the line of sight, then turns it by the obliquity `obl` in the sky
//!   plane.
//! * `rotate_xy_transpose(y, inc, obl) = X D_z(π/2 − inc)ᵀ Xᵀ D_z(obl)ᵀ · y` is the literal
//!   transpose of that operator, factor by factor in reverse order. It is a separate code path
//!   and is **not** `rotate_xy` with negated angles.
//! * `rotate(y, axis, angle) = D_z(φ) D_y(ϑ) D_z(angle) D_y(−ϑ) D_z(−φ) · y` where `(ϑ, φ)` are
//!   the polar angles of `axis`.
//!
//! Every rotation returns a fresh vector; inputs are never mutated. Vectors must have length
//! `(L + 1)²` for the engine's degree `L`.

pub mod ivanic;

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use crate::constants::n_coeffs;
use crate::flux_errors::{ensure_finite, FluxError};
use crate::scalar::Real;

use self::ivanic::wigner_blocks;

/// `cos mθ` and `sin mθ` for `m = 0..=lmax`.
#[derive(Debug, Clone)]
pub struct ZRotation<T: Real> {
    cos: Vec<T>,
    sin: Vec<T>,
}

impl<T: Real> ZRotation<T> {
    pub fn new(theta: T, lmax: usize) -> Self {
        let (s1, c1) = theta.sin_cos();
        let mut cos = Vec::with_capacity(lmax + 1);
        let mut sin = Vec::with_capacity(lmax + 1);
        cos.push(T::one());
        sin.push(T::zero());
        for m in 1..=lmax {
            let (c, s) = (cos[m - 1], sin[m - 1]);
            cos.push(c * c1 - s * s1);
            sin.push(s * c1 + c * s1);
        }
        ZRotation { cos, sin }
    }

    fn lmax(&self) -> usize {
        self.cos.len() - 1
    }

    /// `D_z(θ) · y`.
    pub fn apply(&self, y: &DVector<T>) -> DVector<T> {
        let mut out = y.clone();
        for l in 1..=self.lmax() {
            let center = l * l + l;
            for m in 1..=l {
                let (c, s) = (self.cos[m], self.sin[m]);
                let (yp, ym) = (y[center + m], y[center - m]);
                out[center + m] = c * yp - s * ym;
                out[center - m] = s * yp + c * ym;
            }
        }
        out
    }

    /// `D_z(θ)ᵀ · y`.
    pub fn apply_transpose(&self, y: &DVector<T>) -> DVector<T> {
        let mut out = y.clone();
        for l in 1..=self.lmax() {
            let center = l * l + l;
            for m in 1..=l {
                let (c, s) = (self.cos[m], self.sin[m]);
                let (yp, ym) = (y[center + m], y[center - m]);
                out[center + m] = c * yp + s * ym;
                out[center - m] = -s * yp + c * ym;
            }
        }
        out
    }

    /// `dD_z/dθ · y`.
    pub fn apply_derivative(&self, y: &DVector<T>) -> DVector<T> {
        let mut out = DVector::<T>::zeros(y.len());
        for l in 1..=self.lmax() {
            let center = l * l + l;
            for m in 1..=l {
                let mf = T::from_usize(m);
                let (c, s) = (self.cos[m], self.sin[m]);
                let (yp, ym) = (y[center + m], y[center - m]);
                out[center + m] = mf * (-s * yp - c * ym);
                out[center - m] = mf * (c * yp - s * ym);
            }
        }
        out
    }

    /// `(dD_z/dθ)ᵀ · y`.
    pub fn apply_transpose_derivative(&self, y: &DVector<T>) -> DVector<T> {
        let mut out = DVector::<T>::zeros(y.len());
        for l in 1..=self.lmax() {
            let center = l * l + l;
            for m in 1..=l {
                let mf = T::from_usize(m);
                let (c, s) = (self.cos[m], self.sin[m]);
                let (yp, ym) = (y[center + m], y[center - m]);
                out[center + m] = mf * (-s * yp + c * ym);
                out[center - m] = mf * (-c * yp - s * ym);
            }
        }
        out
    }
}

/// Per-degree block-diagonal matrix product.
fn apply_blocks<T: Real>(blocks: &[DMatrix<T>], y: &DVector<T>) -> DVector<T> {
    let mut out = DVector::<T>::zeros(y.len());
    for (l, block) in blocks.iter().enumerate() {
        let start = l * l;
        let len = 2 * l + 1;
        let seg = block * y.rows(start, len);
        out.rows_mut(start, len).copy_from(&seg);
    }
    out
}

fn apply_blocks_transpose<T: Real>(blocks: &[DMatrix<T>], y: &DVector<T>) -> DVector<T> {
    let mut out = DVector::<T>::zeros(y.len());
    for (l, block) in blocks.iter().enumerate() {
        let start = l * l;
        let len = 2 * l + 1;
        let seg = block.tr_mul(&y.rows(start, len));
        out.rows_mut(start, len).copy_from(&seg);
    }
    out
}

/// Gradients of `rotate_xy` or `rotate_xy_transpose`.
#[derive(Debug, Clone, PartialEq)]
pub struct XyGradient<T: Real> {
    pub y: DVector<T>,
    pub inc: T,
    pub obl: T,
}

/// Rotation operators of a fixed degree.
#[derive(Debug, Clone)]
pub struct Rotation<T: Real> {
    lmax: usize,
    /// `D(R_y(π/2))`, z → x.
    x_frame: Vec<DMatrix<T>>,
    /// `D(R_x(−π/2))`, z → y.
    y_frame: Vec<DMatrix<T>>,
}

impl<T: Real> Rotation<T> {
    pub fn new(lmax: usize) -> Self {
        let (o, i) = (T::zero(), T::one());
        let ry_quarter = Matrix3::new(o, o, i, o, i, o, -i, o, o);
        let rx_minus_quarter = Matrix3::new(i, o, o, o, o, i, o, -i, o);
        Rotation {
            lmax,
            x_frame: wigner_blocks(&ry_quarter, lmax),
            y_frame: wigner_blocks(&rx_minus_quarter, lmax),
        }
    }

    pub fn lmax(&self) -> usize {
        self.lmax
    }

    pub(crate) fn check_len(&self, what: &'static str, v: &DVector<T>) -> Result<(), FluxError> {
        let expected = n_coeffs(self.lmax);
        if v.len() != expected {
            return Err(FluxError::shape(what, expected, v.len()));
        }
        Ok(())
    }

    /// Angles must be finite; the offending one is named in the error.
    fn check_angle(name: &'static str, angle: T) -> Result<(), FluxError> {
        ensure_finite(name, angle.to_f64()).map(|_| ())
    }

    fn z(&self, theta: T) -> ZRotation<T> {
        ZRotation::new(theta, self.lmax)
    }

    fn check_tilt(inc: T, obl: T) -> Result<(), FluxError> {
        Self::check_angle("inc", inc)?;
        Self::check_angle("obl", obl)
    }

    fn alpha(inc: T) -> T {
        T::frac_pi_2() - inc
    }

    // --- elementary rotations ----------------------------------------------------------------

    pub fn rotate_z(&self, y: &DVector<T>, theta: T) -> Result<DVector<T>, FluxError> {
        self.check_len("y", y)?;
        Self::check_angle("theta", theta)?;
        Ok(self.z(theta).apply(y))
    }

    /// `(ḏy, ḏθ)` for `rotate_z`.
    pub fn rotate_z_backward(
        &self,
        y: &DVector<T>,
        theta: T,
        seed: &DVector<T>,
    ) -> Result<(DVector<T>, T), FluxError> {
        self.check_len("y", y)?;
        self.check_len("seed", seed)?;
        Self::check_angle("theta", theta)?;
        let z = self.z(theta);
        Ok((z.apply_transpose(seed), seed.dot(&z.apply_derivative(y))))
    }

    pub fn rotate_x(&self, y: &DVector<T>, alpha: T) -> Result<DVector<T>, FluxError> {
        self.check_len("y", y)?;
        Self::check_angle("alpha", alpha)?;
        let v = apply_blocks_transpose(&self.x_frame, y);
        let v = self.z(alpha).apply(&v);
        Ok(apply_blocks(&self.x_frame, &v))
    }

    pub fn rotate_y(&self, y: &DVector<T>, beta: T) -> Result<DVector<T>, FluxError> {
        self.check_len("y", y)?;
        Self::check_angle("beta", beta)?;
        Ok(self.rotate_y_unchecked(y, beta))
    }

    fn rotate_y_unchecked(&self, y: &DVector<T>, beta: T) -> DVector<T> {
        let v = apply_blocks_transpose(&self.y_frame, y);
        let v = self.z(beta).apply(&v);
        apply_blocks(&self.y_frame, &v)
    }

    /// `(ḏy, ḏβ)` for `rotate_y`.
    pub fn rotate_y_backward(
        &self,
        y: &DVector<T>,
        beta: T,
        seed: &DVector<T>,
    ) -> Result<(DVector<T>, T), FluxError> {
        self.check_len("y", y)?;
        self.check_len("seed", seed)?;
        Self::check_angle("beta", beta)?;
        let z = self.z(beta);
        let seed_frame = apply_blocks_transpose(&self.y_frame, seed);
        let y_frame = apply_blocks_transpose(&self.y_frame, y);
        let d_beta = seed_frame.dot(&z.apply_derivative(&y_frame));
        let dy = apply_blocks(&self.y_frame, &z.apply_transpose(&seed_frame));
        Ok((dy, d_beta))
    }

    // --- inclination / obliquity -------------------------------------------------------------

    /// `D_z(obl) · D_x(π/2 − inc) · y`.
    pub fn rotate_xy(&self, y: &DVector<T>, inc: T, obl: T) -> Result<DVector<T>, FluxError> {
        self.check_len("y", y)?;
        Self::check_tilt(inc, obl)?;
        let v = apply_blocks_transpose(&self.x_frame, y);
        let v = self.z(Self::alpha(inc)).apply(&v);
        let v = apply_blocks(&self.x_frame, &v);
        Ok(self.z(obl).apply(&v))
    }

    /// `(D_z(obl) · D_x(π/2 − inc))ᵀ · y`, the literal transpose of [`Rotation::rotate_xy`].
    pub fn rotate_xy_transpose(
        &self,
        y: &DVector<T>,
        inc: T,
        obl: T,
    ) -> Result<DVector<T>, FluxError> {
        self.check_len("y", y)?;
        Self::check_tilt(inc, obl)?;
        let v = self.z(obl).apply_transpose(y);
        let v = apply_blocks_transpose(&self.x_frame, &v);
        let v = self.z(Self::alpha(inc)).apply_transpose(&v);
        Ok(apply_blocks(&self.x_frame, &v))
    }

    /// Vector-Jacobian product of [`Rotation::rotate_xy`].
    pub fn rotate_xy_backward(
        &self,
        y: &DVector<T>,
        inc: T,
        obl: T,
        seed: &DVector<T>,
    ) -> Result<XyGradient<T>, FluxError> {
        self.check_len("y", y)?;
        self.check_len("seed", seed)?;
        Self::check_tilt(inc, obl)?;
        let z_alpha = self.z(Self::alpha(inc));
        let z_obl = self.z(obl);

        // forward intermediates
        let u = apply_blocks_transpose(&self.x_frame, y);
        let tilted = apply_blocks(&self.x_frame, &z_alpha.apply(&u));

        let d_obl = seed.dot(&z_obl.apply_derivative(&tilted));

        let back = apply_blocks_transpose(&self.x_frame, &z_obl.apply_transpose(seed));
        // dα/dinc = −1
        let d_inc = -back.dot(&z_alpha.apply_derivative(&u));
        let dy = apply_blocks(&self.x_frame, &z_alpha.apply_transpose(&back));

        Ok(XyGradient {
            y: dy,
            inc: d_inc,
            obl: d_obl,
        })
    }

    /// Vector-Jacobian product of [`Rotation::rotate_xy_transpose`].
    pub fn rotate_xy_transpose_backward(
        &self,
        y: &DVector<T>,
        inc: T,
        obl: T,
        seed: &DVector<T>,
    ) -> Result<XyGradient<T>, FluxError> {
        self.check_len("y", y)?;
        self.check_len("seed", seed)?;
        Self::check_tilt(inc, obl)?;
        let z_alpha = self.z(Self::alpha(inc));
        let z_obl = self.z(obl);

        let d_obl = {
            let w = apply_blocks_transpose(&self.x_frame, &z_obl.apply_transpose_derivative(y));
            let w = apply_blocks(&self.x_frame, &z_alpha.apply_transpose(&w));
            seed.dot(&w)
        };

        let inner = apply_blocks_transpose(&self.x_frame, &z_obl.apply_transpose(y));
        let seed_frame = apply_blocks_transpose(&self.x_frame, seed);
        let d_inc = -seed_frame.dot(&z_alpha.apply_transpose_derivative(&inner));

        // the adjoint of the transpose is the forward operator
        let v = z_alpha.apply(&seed_frame);
        let dy = z_obl.apply(&apply_blocks(&self.x_frame, &v));

        Ok(XyGradient {
            y: dy,
            inc: d_inc,
            obl: d_obl,
        })
    }

    // --- axis / angle ------------------------------------------------------------------------

    /// Polar angles `(ϑ, φ)` of a non-zero axis.
    fn axis_angles(axis: &Vector3<T>) -> Result<(T, T), FluxError> {
        for (name, v) in [("axis.x", axis[0]), ("axis.y", axis[1]), ("axis.z", axis[2])] {
            if !v.is_finite() {
                return Err(FluxError::domain(name, v.to_f64(), "(-inf, inf), finite"));
            }
        }
        let rho = (axis[0] * axis[0] + axis[1] * axis[1]).sqrt();
        let norm = (rho * rho + axis[2] * axis[2]).sqrt();
        if norm == T::zero() {
            return Err(FluxError::domain("axis", 0.0, "non-zero vectors"));
        }
        Ok((rho.atan2(axis[2]), axis[1].atan2(axis[0])))
    }

    /// `D_y(−ϑ) · D_z(−φ) · y`: bring `axis` onto `ẑ`.
    fn to_axis_frame(&self, y: &DVector<T>, theta: T, phi: T) -> DVector<T> {
        let v = self.z(-phi).apply(y);
        self.rotate_y_unchecked(&v, -theta)
    }

    fn from_axis_frame(&self, y: &DVector<T>, theta: T, phi: T) -> DVector<T> {
        let v = self.rotate_y_unchecked(y, theta);
        self.z(phi).apply(&v)
    }

    /// Rotation by `angle` about `axis` (right-handed, need not be normalized).
    pub fn rotate(
        &self,
        y: &DVector<T>,
        axis: &Vector3<T>,
        angle: T,
    ) -> Result<DVector<T>, FluxError> {
        self.check_len("y", y)?;
        Self::check_angle("angle", angle)?;
        let (theta, phi) = Self::axis_angles(axis)?;
        let v = self.to_axis_frame(y, theta, phi);
        let v = self.z(angle).apply(&v);
        Ok(self.from_axis_frame(&v, theta, phi))
    }

    /// `(ḏy, ḏangle)` for [`Rotation::rotate`].
    pub fn rotate_backward(
        &self,
        y: &DVector<T>,
        axis: &Vector3<T>,
        angle: T,
        seed: &DVector<T>,
    ) -> Result<(DVector<T>, T), FluxError> {
        self.check_len("y", y)?;
        self.check_len("seed", seed)?;
        Self::check_angle("angle", angle)?;
        let (theta, phi) = Self::axis_angles(axis)?;
        let z = self.z(angle);

        let y_frame = self.to_axis_frame(y, theta, phi);
        let seed_frame = self.to_axis_frame(seed, theta, phi);
        let d_angle = seed_frame.dot(&z.apply_derivative(&y_frame));
        let dy = self.from_axis_frame(&z.apply_transpose(&seed_frame), theta, phi);
        Ok((dy, d_angle))
    }
}

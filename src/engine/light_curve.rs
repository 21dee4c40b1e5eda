//! # Light curves
//!
//! Batch evaluation of a rotating map over a time series of occultor positions.
//!
//! Each sample carries the spin phase `theta` of the body and the occultor geometry
//! `(xo, yo, zo, ro)`. The map `y` is given in the body frame, with the rotation axis along `ŷ`;
//! for every sample it is spun by `theta` about that axis, tilted into the sky frame by
//! [`rotate_xy`](crate::rotation::Rotation::rotate_xy) and integrated:
//!
//! ```text
//! F_k = flux( rotate_xy( D_y(theta_k) · y, inc, obl ), xo_k, yo_k, ro_k )
//! ```
//!
//! Spinning before tilting is the same as spinning about the sky-projected axis after tilting.
//!
//! Samples are independent. When [`EngineParams::parallel`](crate::params::EngineParams) is set
//! they are evaluated on the rayon thread pool; outputs are always returned in sample order and
//! gradient sums are accumulated sequentially in that order, so results do not depend on the
//! thread schedule.

use log::warn;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::engine::{FluxEngine, Occultor};
use crate::flux_errors::{ensure_finite, FluxError};
use crate::scalar::Real;

/// One time sample of a light curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample<T: Real> {
    /// Spin phase about the body's rotation axis.
    pub theta: T,
    pub xo: T,
    pub yo: T,
    /// Negative when the occultor is behind the body.
    pub zo: T,
    /// Occultor radius.
    pub ro: T,
}

impl<T: Real> Sample<T> {
    pub fn new(theta: T, xo: T, yo: T, zo: T, ro: T) -> Self {
        Sample {
            theta,
            xo,
            yo,
            zo,
            ro,
        }
    }

    /// Zip per-sample arrays into samples.
    ///
    /// Return
    /// ----------
    /// * [`FluxError::ShapeMismatch`] if a slice does not share the length of `theta`.
    pub fn from_arrays(
        theta: &[T],
        xo: &[T],
        yo: &[T],
        zo: &[T],
        ro: &[T],
    ) -> Result<Vec<Sample<T>>, FluxError> {
        let n = theta.len();
        for (what, len) in [
            ("xo", xo.len()),
            ("yo", yo.len()),
            ("zo", zo.len()),
            ("ro", ro.len()),
        ] {
            if len != n {
                return Err(FluxError::shape(what, n, len));
            }
        }
        Ok((0..n)
            .map(|k| Sample::new(theta[k], xo[k], yo[k], zo[k], ro[k]))
            .collect())
    }

    fn occultor(&self) -> Occultor<T> {
        Occultor::new(self.xo, self.yo, self.ro).with_zo(self.zo)
    }

    fn is_finite(&self) -> bool {
        [self.theta, self.xo, self.yo, self.zo, self.ro]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Gradient of `Σ_k seed_k · F_k` for a light curve.
///
/// Shared inputs (`y`, `inc`, `obl`) receive the sum over samples, per-sample inputs keep one
/// entry per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct LightCurveGradient<T: Real> {
    pub y: DVector<T>,
    pub inc: T,
    pub obl: T,
    pub theta: Vec<T>,
    pub xo: Vec<T>,
    pub yo: Vec<T>,
    pub ro: Vec<T>,
}

/// Gradient contribution of a single sample.
struct SampleGradient<T: Real> {
    y: DVector<T>,
    inc: T,
    obl: T,
    ro: T,
    theta: T,
    xo: T,
    yo: T,
}

impl<T: Real> FluxEngine<T> {
    /// Body-frame map seen on the sky at spin phase `theta`.
    pub fn sky_map(
        &self,
        y: &DVector<T>,
        inc: T,
        obl: T,
        theta: T,
    ) -> Result<DVector<T>, FluxError> {
        ensure_finite("theta", theta.to_f64())?;
        let spun = self.rotation().rotate_y(y, theta)?;
        self.rotation().rotate_xy(&spun, inc, obl)
    }

    /// Run `f` over the samples, in parallel if configured, keeping sample order.
    fn map_samples<R, F>(&self, samples: &[Sample<T>], f: F) -> Result<Vec<R>, FluxError>
    where
        R: Send,
        F: Fn(usize, &Sample<T>) -> Result<R, FluxError> + Send + Sync,
    {
        let bad: Vec<usize> = samples
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_finite())
            .map(|(k, _)| k)
            .collect();
        if let Some(first) = bad.first() {
            warn!(
                "light curve batch contains {} non-finite sample(s), first at index {first}",
                bad.len()
            );
        }

        if self.params().parallel {
            samples
                .par_iter()
                .enumerate()
                .map(|(k, s)| f(k, s))
                .collect()
        } else {
            samples.iter().enumerate().map(|(k, s)| f(k, s)).collect()
        }
    }

    /// Flux of the rotating map at every sample.
    ///
    /// Arguments
    /// -----------------
    /// * `y`: body-frame coefficient vector, rotation axis along `ŷ`.
    /// * `inc`, `obl`: inclination of the rotation axis from the line of sight and its
    ///   obliquity in the sky plane.
    /// * `samples`: spin phases and occultor geometries.
    ///
    /// Return
    /// ----------
    /// * One flux per sample, in sample order. The first failing sample's error otherwise.
    pub fn light_curve(
        &self,
        y: &DVector<T>,
        inc: T,
        obl: T,
        samples: &[Sample<T>],
    ) -> Result<Vec<T>, FluxError> {
        self.rotation().check_len("y", y)?;
        self.map_samples(samples, |_, s| {
            let sky = self.sky_map(y, inc, obl, s.theta)?;
            self.occultation_flux(&sky, &s.occultor())
        })
    }

    fn sample_gradient(
        &self,
        y: &DVector<T>,
        inc: T,
        obl: T,
        s: &Sample<T>,
        seed: T,
    ) -> Result<SampleGradient<T>, FluxError> {
        ensure_finite("theta", s.theta.to_f64())?;
        let spun = self.rotation().rotate_y(y, s.theta)?;
        let sky = self.rotation().rotate_xy(&spun, inc, obl)?;
        let flux = self.occultation_flux_backward(&sky, &s.occultor(), seed)?;
        let tilt = self.rotation().rotate_xy_backward(&spun, inc, obl, &flux.y)?;
        let (dy, d_theta) = self.rotation().rotate_y_backward(y, s.theta, &tilt.y)?;
        Ok(SampleGradient {
            y: dy,
            inc: tilt.inc,
            obl: tilt.obl,
            ro: flux.ro,
            theta: d_theta,
            xo: flux.xo,
            yo: flux.yo,
        })
    }

    /// Vector-Jacobian product of [`FluxEngine::light_curve`].
    ///
    /// `seed` holds one weight per sample (`1` everywhere for plain derivatives of the summed
    /// flux).
    pub fn light_curve_gradient(
        &self,
        y: &DVector<T>,
        inc: T,
        obl: T,
        samples: &[Sample<T>],
        seed: &[T],
    ) -> Result<LightCurveGradient<T>, FluxError> {
        self.rotation().check_len("y", y)?;
        if seed.len() != samples.len() {
            return Err(FluxError::shape("seed", samples.len(), seed.len()));
        }
        let parts = self.map_samples(samples, |k, s| {
            self.sample_gradient(y, inc, obl, s, seed[k])
        })?;

        let mut grad = LightCurveGradient {
            y: DVector::zeros(y.len()),
            inc: T::zero(),
            obl: T::zero(),
            theta: Vec::with_capacity(parts.len()),
            xo: Vec::with_capacity(parts.len()),
            yo: Vec::with_capacity(parts.len()),
            ro: Vec::with_capacity(parts.len()),
        };
        for part in parts {
            grad.y += part.y;
            grad.inc += part.inc;
            grad.obl += part.obl;
            grad.theta.push(part.theta);
            grad.xo.push(part.xo);
            grad.yo.push(part.yo);
            grad.ro.push(part.ro);
        }
        Ok(grad)
    }

    /// Matrix `M` with `M · y = light_curve(y, …)`, one row per sample.
    ///
    /// The flux is linear in the coefficients, so row `k` is `∂F_k/∂y` and does not depend on
    /// the map.
    pub fn design_matrix(
        &self,
        inc: T,
        obl: T,
        samples: &[Sample<T>],
    ) -> Result<DMatrix<T>, FluxError> {
        let n = self.n_coeffs();
        let zero = DVector::<T>::zeros(n);
        let rows = self.map_samples(samples, |_, s| {
            self.sample_gradient(&zero, inc, obl, s, T::one())
                .map(|g| g.y)
        })?;
        Ok(DMatrix::from_fn(rows.len(), n, |k, j| rows[k][j]))
    }
}

//! # Surface maps
//!
//! [`Map`] bundles a coefficient vector with the engine of its degree and a rotation axis, for
//! callers that think in terms of "a body with a surface" rather than raw vectors.
//!
//! A fresh or [reset](Map::reset) map is uniform (`Y_00 = 1`, everything else zero) and rotates
//! about `ŷ`. Rotating a map replaces its coefficients in place by the rotated ones.
//!
//! ```rust, no_run
//! use std::f64::consts::FRAC_PI_2;
//! use ylmflux::map::Map;
//!
//! let mut map = Map::<f64>::new(2).unwrap();
//! map.set_coeff(1, 0, 0.5).unwrap();
//! map.rotate(FRAC_PI_2).unwrap();
//!
//! let center = map.evaluate(0.0, 0.0).unwrap();
//! let dimmed = map.flux(0.1, 0.2, 0.3).unwrap();
//! ```

use std::sync::Arc;

use nalgebra::{DVector, Vector3};

use crate::constants::{lm_index, lmax_from_len};
use crate::engine::FluxEngine;
use crate::flux_errors::FluxError;
use crate::scalar::Real;

/// A spherical-harmonic surface map with its rotation axis.
#[derive(Debug, Clone)]
pub struct Map<T: Real> {
    engine: Arc<FluxEngine<T>>,
    y: DVector<T>,
    axis: Vector3<T>,
}

impl<T: Real> Map<T> {
    /// Uniform map of degree `lmax` with its own default engine.
    pub fn new(lmax: usize) -> Result<Self, FluxError> {
        Ok(Self::with_engine(Arc::new(FluxEngine::with_lmax(lmax)?)))
    }

    /// Map holding `y`, with the degree read off its length `(lmax + 1)²`.
    pub fn from_coeffs(y: DVector<T>) -> Result<Self, FluxError> {
        let lmax = lmax_from_len(y.len()).ok_or(FluxError::domain(
            "y.len",
            y.len() as f64,
            "perfect squares (lmax + 1)²",
        ))?;
        let mut map = Self::new(lmax)?;
        map.y = y;
        Ok(map)
    }

    /// Uniform map sharing an existing engine.
    pub fn with_engine(engine: Arc<FluxEngine<T>>) -> Self {
        let n = engine.n_coeffs();
        let mut map = Map {
            engine,
            y: DVector::zeros(n),
            axis: Vector3::y(),
        };
        map.reset();
        map
    }

    pub fn engine(&self) -> &FluxEngine<T> {
        &self.engine
    }

    pub fn lmax(&self) -> usize {
        self.engine.lmax()
    }

    pub fn coeffs(&self) -> &DVector<T> {
        &self.y
    }

    pub fn axis(&self) -> &Vector3<T> {
        &self.axis
    }

    /// Back to a uniform map rotating about `ŷ`.
    pub fn reset(&mut self) {
        self.y.fill(T::zero());
        self.y[0] = T::one();
        self.axis = Vector3::y();
    }

    fn index(&self, l: i64, m: i64) -> Result<usize, FluxError> {
        let lmax = self.lmax();
        if l < 0 || l as usize > lmax || m.abs() > l {
            return Err(FluxError::IndexOutOfRange { l, m, lmax });
        }
        Ok(lm_index(l as usize, m))
    }

    pub fn set_coeff(&mut self, l: i64, m: i64, value: T) -> Result<(), FluxError> {
        let idx = self.index(l, m)?;
        self.y[idx] = value;
        Ok(())
    }

    pub fn get_coeff(&self, l: i64, m: i64) -> Result<T, FluxError> {
        Ok(self.y[self.index(l, m)?])
    }

    /// Replace the whole coefficient vector.
    pub fn set_coeffs(&mut self, y: DVector<T>) -> Result<(), FluxError> {
        self.engine.rotation().check_len("y", &y)?;
        self.y = y;
        Ok(())
    }

    /// Set the rotation axis; it is stored normalized.
    pub fn set_axis(&mut self, axis: Vector3<T>) -> Result<(), FluxError> {
        for (name, v) in [("axis.x", axis[0]), ("axis.y", axis[1]), ("axis.z", axis[2])] {
            if !v.is_finite() {
                return Err(FluxError::domain(name, v.to_f64(), "(-inf, inf), finite"));
            }
        }
        let norm = (axis[0] * axis[0] + axis[1] * axis[1] + axis[2] * axis[2]).sqrt();
        if norm == T::zero() {
            return Err(FluxError::domain("axis", 0.0, "non-zero vectors"));
        }
        self.axis = axis / norm;
        Ok(())
    }

    /// Rotate the map by `angle` (radians) about its axis.
    pub fn rotate(&mut self, angle: T) -> Result<(), FluxError> {
        self.y = self.engine.rotate(&self.y, &self.axis, angle)?;
        Ok(())
    }

    /// Intensity at the sky point `(x, y)`; NaN off the disk.
    pub fn evaluate(&self, x: T, y: T) -> Result<T, FluxError> {
        self.engine.intensity(&self.y, x, y)
    }

    /// Visible flux behind an occultor of radius `ro` at `(xo, yo)`.
    pub fn flux(&self, xo: T, yo: T, ro: T) -> Result<T, FluxError> {
        self.engine.flux(&self.y, xo, yo, ro)
    }
}

//! # Multi-precision shadow path
//!
//! The whole engine is generic over [`Real`], so instantiating it on [`DoubleDouble`] re-runs
//! the identical algorithms (basis matrices, rotation recursion, elliptic integrals, occultation
//! integrals) with a ≈ 106-bit significand. The result is a reference against which the `f64`
//! engine is measured.
//!
//! The shadow engine is a validation oracle: it is one to two orders of magnitude slower than
//! the `f64` path and its results are never differentiated.
//!
//! Inputs are the `f64` values handed to the standard engine, embedded exactly, so the
//! deviation measures the rounding of the `f64` evaluation and nothing else.
//!
//! ```rust, no_run
//! use nalgebra::DVector;
//! use ylmflux::multiprecision::ShadowValidator;
//! use ylmflux::params::EngineParams;
//!
//! let params = EngineParams::builder().lmax(3).build().unwrap();
//! let validator = ShadowValidator::new(params).unwrap();
//! let y = DVector::from_element(16, 0.25);
//! let dev = validator.compare_flux(&y, 0.3, 0.4, 0.2).unwrap();
//! assert!(dev.relative < 1e-10);
//! ```

use itertools::Itertools;
use nalgebra::DVector;

use crate::constants::Radian;
use crate::engine::FluxEngine;
use crate::flux_errors::FluxError;
use crate::params::EngineParams;
use crate::scalar::{DoubleDouble, Real};

/// The flux engine evaluated in double-double precision.
pub type ShadowEngine = FluxEngine<DoubleDouble>;

/// Exact embedding of an `f64` coefficient vector.
pub fn to_shadow(y: &DVector<f64>) -> DVector<DoubleDouble> {
    y.map(DoubleDouble::from)
}

/// Nearest-`f64` rounding of a shadow vector.
pub fn from_shadow(y: &DVector<DoubleDouble>) -> DVector<f64> {
    y.map(|v| v.to_f64())
}

/// Deviation of an `f64` result from its shadow reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deviation {
    /// `f64` result (for vectors, the entry with the largest difference).
    pub value: f64,
    /// Shadow result rounded to `f64`.
    pub reference: f64,
    /// `|value − reference| / |reference|`, or the absolute deviation when the reference is 0.
    pub relative: f64,
}

/// Relative deviation of `value` from a shadow scalar.
pub fn relative_deviation(value: f64, reference: DoubleDouble) -> Deviation {
    let diff = (DoubleDouble::from(value) - reference).abs().to_f64();
    let scale = reference.abs().to_f64();
    Deviation {
        value,
        reference: reference.to_f64(),
        relative: if scale > 0.0 { diff / scale } else { diff },
    }
}

/// Max-norm relative deviation of a vector from its shadow reference.
///
/// The difference is scaled by the largest reference entry, so entries that vanish in exact
/// arithmetic do not blow up the measure.
pub fn vector_deviation(
    value: &DVector<f64>,
    reference: &DVector<DoubleDouble>,
) -> Result<Deviation, FluxError> {
    if value.len() != reference.len() {
        return Err(FluxError::shape("reference", value.len(), reference.len()));
    }
    if value.is_empty() {
        return Ok(Deviation {
            value: 0.0,
            reference: 0.0,
            relative: 0.0,
        });
    }
    let mut worst = 0usize;
    let mut worst_diff = 0.0f64;
    let mut scale = 0.0f64;
    for (i, (v, r)) in value.iter().zip_eq(reference.iter()).enumerate() {
        let diff = (DoubleDouble::from(*v) - *r).abs().to_f64();
        if diff > worst_diff || i == 0 {
            worst = i;
            worst_diff = diff;
        }
        scale = scale.max(r.abs().to_f64());
    }
    Ok(Deviation {
        value: value[worst],
        reference: reference[worst].to_f64(),
        relative: if scale > 0.0 {
            worst_diff / scale
        } else {
            worst_diff
        },
    })
}

/// An `f64` engine paired with its shadow.
#[derive(Debug, Clone)]
pub struct ShadowValidator {
    engine: FluxEngine<f64>,
    shadow: ShadowEngine,
}

impl ShadowValidator {
    pub fn new(params: EngineParams) -> Result<Self, FluxError> {
        Ok(ShadowValidator {
            engine: FluxEngine::new(params.clone())?,
            shadow: ShadowEngine::new(params)?,
        })
    }

    pub fn engine(&self) -> &FluxEngine<f64> {
        &self.engine
    }

    pub fn shadow(&self) -> &ShadowEngine {
        &self.shadow
    }

    pub fn compare_flux(
        &self,
        y: &DVector<f64>,
        xo: f64,
        yo: f64,
        ro: f64,
    ) -> Result<Deviation, FluxError> {
        let value = self.engine.flux(y, xo, yo, ro)?;
        let reference = self.shadow.flux(
            &to_shadow(y),
            DoubleDouble::from(xo),
            DoubleDouble::from(yo),
            DoubleDouble::from(ro),
        )?;
        Ok(relative_deviation(value, reference))
    }

    pub fn compare_solution_vector(&self, b: f64, r: f64) -> Result<Deviation, FluxError> {
        let value = self.engine.solution_vector(b, r)?;
        let reference = self
            .shadow
            .solution_vector(DoubleDouble::from(b), DoubleDouble::from(r))?;
        vector_deviation(&value, &reference)
    }

    pub fn compare_rotate_xy(
        &self,
        y: &DVector<f64>,
        inc: Radian,
        obl: Radian,
    ) -> Result<Deviation, FluxError> {
        let value = self.engine.rotate_xy(y, inc, obl)?;
        let reference = self.shadow.rotate_xy(
            &to_shadow(y),
            DoubleDouble::from(inc),
            DoubleDouble::from(obl),
        )?;
        vector_deviation(&value, &reference)
    }

    pub fn compare_rotate_xy_transpose(
        &self,
        y: &DVector<f64>,
        inc: Radian,
        obl: Radian,
    ) -> Result<Deviation, FluxError> {
        let value = self.engine.rotate_xy_transpose(y, inc, obl)?;
        let reference = self.shadow.rotate_xy_transpose(
            &to_shadow(y),
            DoubleDouble::from(inc),
            DoubleDouble::from(obl),
        )?;
        vector_deviation(&value, &reference)
    }
}

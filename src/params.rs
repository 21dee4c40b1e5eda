//! # Engine parameters
//!
//! This module defines the [`EngineParams`] configuration struct and its builder, which fix the
//! spherical-harmonic degree of a [`FluxEngine`](crate::engine::FluxEngine) and tune the
//! numerical machinery behind it.
//!
//! ## Purpose
//!
//! An engine precomputes every degree-dependent table once (basis-change matrices, fixed
//! rotation blocks, binomial tables). [`EngineParams`] collects the knobs that shape those
//! tables and the per-call numerics:
//!
//! - the maximum degree `lmax` (coefficient vectors have `(lmax + 1)²` entries),
//! - the iteration cap of the complete elliptic integrals,
//! - the switch-over between the power series and the upward recursion of the elliptic
//!   family used by the occultation integrals,
//! - the impact parameter below which gradients use the centered-occultor limit,
//! - whether batch evaluation runs on the rayon thread pool.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use ylmflux::params::EngineParams;
//!
//! let params = EngineParams::builder()
//!     .lmax(6)
//!     .series_cutoff(0.3)
//!     .build()
//!     .unwrap();
//!
//! println!("{params:#}");
//! ```
//!
//! ## See also
//!
//! * [`crate::engine::FluxEngine::new`] – builds an engine from these parameters.
//! * [`crate::constants`] – default values.

use std::cmp::Ordering::{Equal, Greater};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    CENTERED_CUTOFF, ELLIP_MAX_ITER, MAX_LMAX, SERIES_CUTOFF, SERIES_MAX_TERMS,
};
use crate::flux_errors::FluxError;
use crate::occultation::arcs::SolverSettings;

/// Configuration of a flux engine.
///
/// Defaults
/// -----------------
/// * `lmax = 2`
/// * `ellip_max_iter = 200`
/// * `series_cutoff = 0.5`
/// * `series_max_terms = 2000`
/// * `centered_cutoff = 1e-8`
/// * `parallel = true`
///
/// Notes & Validation
/// -----------------
/// * `lmax ≤ 50`. The closed-form occultation terms lose digits to binomial cancellation as the
///   degree grows; beyond `lmax ≈ 20` in double precision the shadow path is the only reliable
///   reference.
/// * `0 ≤ series_cutoff < 1`. The series is always used below a degree-dependent floor that keeps
///   the upward recursion stable, so lowering the cutoff never makes results worse than that.
/// * `ellip_max_iter ≥ 1`, `series_max_terms ≥ 1`, `centered_cutoff ≥ 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineParams {
    /// Maximum spherical-harmonic degree.
    pub lmax: usize,
    /// Iteration cap of the Bulirsch `cel` loop.
    pub ellip_max_iter: usize,
    /// Elliptic parameter below which `T_v`, `U_v` are summed as power series.
    pub series_cutoff: f64,
    /// Term cap of those series.
    pub series_max_terms: usize,
    /// Impact parameter below which the occultor counts as centered for gradients.
    pub centered_cutoff: f64,
    /// Evaluate batches on the rayon thread pool.
    pub parallel: bool,
}

impl EngineParams {
    /// Equivalent to [`EngineParams::default()`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Fluent, validating builder.
    ///
    /// ```rust,no_run
    /// use ylmflux::params::EngineParams;
    ///
    /// let params = EngineParams::builder().lmax(3).parallel(false).build().unwrap();
    /// assert_eq!(params.n_coeffs(), 16);
    /// ```
    pub fn builder() -> EngineParamsBuilder {
        EngineParamsBuilder::new()
    }

    /// Length of the coefficient vectors, `(lmax + 1)²`.
    pub fn n_coeffs(&self) -> usize {
        crate::constants::n_coeffs(self.lmax)
    }

    pub(crate) fn solver_settings(&self) -> SolverSettings {
        SolverSettings {
            ellip_max_iter: self.ellip_max_iter,
            series_cutoff: self.series_cutoff,
            series_max_terms: self.series_max_terms,
        }
    }
}

impl Default for EngineParams {
    fn default() -> Self {
        EngineParams {
            lmax: 2,
            ellip_max_iter: ELLIP_MAX_ITER,
            series_cutoff: SERIES_CUTOFF,
            series_max_terms: SERIES_MAX_TERMS,
            centered_cutoff: CENTERED_CUTOFF,
            parallel: true,
        }
    }
}

/// Builder for [`EngineParams`], with validation.
#[derive(Debug, Clone)]
pub struct EngineParamsBuilder {
    params: EngineParams,
}

impl Default for EngineParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: EngineParams::default(),
        }
    }

    pub fn lmax(mut self, v: usize) -> Self {
        self.params.lmax = v;
        self
    }
    pub fn ellip_max_iter(mut self, v: usize) -> Self {
        self.params.ellip_max_iter = v;
        self
    }
    pub fn series_cutoff(mut self, v: f64) -> Self {
        self.params.series_cutoff = v;
        self
    }
    pub fn series_max_terms(mut self, v: usize) -> Self {
        self.params.series_max_terms = v;
        self
    }
    pub fn centered_cutoff(mut self, v: f64) -> Self {
        self.params.centered_cutoff = v;
        self
    }
    pub fn parallel(mut self, v: bool) -> Self {
        self.params.parallel = v;
        self
    }

    /// Finalize the builder.
    ///
    /// Return
    /// ----------
    /// * `Ok(EngineParams)` if every rule of [`EngineParams::validate`] holds.
    /// * `Err(FluxError::InvalidParameter)` naming the first violated rule otherwise.
    pub fn build(self) -> Result<EngineParams, FluxError> {
        self.params.validate()?;
        Ok(self.params)
    }
}

impl EngineParams {
    /// Return true iff x >= 0.0 and comparable (i.e., not NaN).
    #[inline]
    fn ge0(x: f64) -> bool {
        matches!(x.partial_cmp(&0.0), Some(Greater) | Some(Equal))
    }

    /// Check the parameter set.
    ///
    /// Validation rules
    /// -----------------
    /// * `lmax ≤ MAX_LMAX`.
    /// * `ellip_max_iter ≥ 1`, `series_max_terms ≥ 1`.
    /// * `0 ≤ series_cutoff < 1`.
    /// * `centered_cutoff ≥ 0` and finite.
    pub fn validate(&self) -> Result<(), FluxError> {
        if self.lmax > MAX_LMAX {
            return Err(FluxError::InvalidParameter(format!(
                "lmax must be <= {MAX_LMAX}, got {}",
                self.lmax
            )));
        }
        if self.ellip_max_iter == 0 {
            return Err(FluxError::InvalidParameter(
                "ellip_max_iter must be >= 1".into(),
            ));
        }
        if self.series_max_terms == 0 {
            return Err(FluxError::InvalidParameter(
                "series_max_terms must be >= 1".into(),
            ));
        }
        if !Self::ge0(self.series_cutoff) || self.series_cutoff >= 1.0 {
            return Err(FluxError::InvalidParameter(
                "series_cutoff must lie in [0, 1)".into(),
            ));
        }
        if !Self::ge0(self.centered_cutoff) || !self.centered_cutoff.is_finite() {
            return Err(FluxError::InvalidParameter(
                "centered_cutoff must be finite and >= 0".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for EngineParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 36;
            writeln!(f, "Flux Engine Parameters")?;
            writeln!(f, "----------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = if s.len() < PARAM_COL {
                        " ".repeat(PARAM_COL - s.len())
                    } else {
                        " ".to_string()
                    };
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            writeln!(f, "[Degree]")?;
            line!("lmax             = {}", self.lmax, "Maximum harmonic degree")?;
            line!(
                "n_coeffs         = {}",
                self.n_coeffs(),
                "Coefficient vector length"
            )?;

            writeln!(f, "\n[Elliptic integrals]")?;
            line!(
                "ellip_max_iter   = {}",
                self.ellip_max_iter,
                "Iteration cap of cel"
            )?;
            line!(
                "series_cutoff    = {:.3}",
                self.series_cutoff,
                "Series below this parameter"
            )?;
            line!(
                "series_max_terms = {}",
                self.series_max_terms,
                "Term cap of the series"
            )?;

            writeln!(f, "\n[Geometry / batches]")?;
            line!(
                "centered_cutoff  = {:.1e}",
                self.centered_cutoff,
                "Centered-occultor gradient branch"
            )?;
            line!(
                "parallel         = {}",
                self.parallel,
                "Batch evaluation on rayon"
            )?;

            Ok(())
        } else {
            write!(
                f,
                "EngineParams(lmax={}, ellip_max_iter={}, series_cutoff={:.2}, series_max_terms={}, centered_cutoff={:.1e}, parallel={})",
                self.lmax,
                self.ellip_max_iter,
                self.series_cutoff,
                self.series_max_terms,
                self.centered_cutoff,
                self.parallel,
            )
        }
    }
}

#[cfg(test)]
mod params_test {
    use super::*;

    #[test]
    fn test_defaults_build() {
        let p = EngineParams::builder().build().unwrap();
        assert_eq!(p, EngineParams::default());
        assert_eq!(p.n_coeffs(), 9);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            EngineParams::builder().lmax(51).build(),
            Err(FluxError::InvalidParameter(_))
        ));
        assert!(EngineParams::builder().lmax(50).build().is_ok());
        assert!(EngineParams::builder().series_cutoff(1.0).build().is_err());
        assert!(EngineParams::builder().series_cutoff(f64::NAN).build().is_err());
        assert!(EngineParams::builder().centered_cutoff(-1e-9).build().is_err());
        assert!(EngineParams::builder().ellip_max_iter(0).build().is_err());
        assert!(EngineParams::builder().series_max_terms(0).build().is_err());

        let literal = EngineParams {
            lmax: 60,
            ..EngineParams::default()
        };
        assert!(literal.validate().is_err());
    }

    #[test]
    fn test_display() {
        let p = EngineParams::builder().lmax(4).build().unwrap();
        let short = format!("{p}");
        assert!(short.starts_with("EngineParams(lmax=4"));
        let long = format!("{p:#}");
        assert!(long.contains("lmax             = 4"));
        assert!(long.contains("n_coeffs         = 25"));
        assert!(long.contains("# Batch evaluation on rayon"));
    }
}

//! # Flux engine
//!
//! This module defines [`FluxEngine`], the façade that owns every degree-dependent table of the
//! crate and exposes the rotation, occultation and flux operations on top of them:
//!
//! 1. **Basis change** ([`Basis`]): `A1`, `A2`, `A = A2·A1` and the unocculted row `rᵀA1`.
//! 2. **Rotation tables** ([`Rotation`]): the fixed frame changes used by every rotation.
//! 3. **Occultation solver** ([`OccultationSolver`]): binomial tables and the numerical settings
//!    of the elliptic integrals.
//!
//! All tables are built once in [`FluxEngine::new`]. Afterwards the engine is immutable, every
//! call allocates its own buffers, and the engine can be shared across threads (`Send + Sync`).
//!
//! ## Occultation flux
//!
//! For an occultor of radius `ro` centered at `(xo, yo)` in the sky plane, `b = √(xo² + yo²)` and
//! the map is turned about the line of sight by `ψ = atan2(xo, yo)` so that the occultor lies on
//! the `+y` axis:
//!
//! ```text
//! F = sᵀ(b, ro) · A · D_z(ψ) · y
//! ```
//!
//! An occultor behind the body (`zo < 0`) hides nothing and the unocculted flux `rᵀA1 · y` is
//! returned.
//!
//! ## Typical usage
//!
//! ```rust, no_run
//! use nalgebra::DVector;
//! use ylmflux::engine::FluxEngine;
//!
//! let engine = FluxEngine::<f64>::with_lmax(2).unwrap();
//! let mut y = DVector::zeros(engine.n_coeffs());
//! y[0] = 1.0;
//! y[6] = 0.3;
//!
//! let full = engine.unocculted_flux(&y).unwrap();
//! let transit = engine.flux(&y, 0.2, 0.1, 0.1).unwrap();
//! assert!(transit < full);
//! ```
//!
//! ## See also
//! ------------
//! * [`light_curve`] – batch evaluation over time samples.
//! * [`crate::ops`] – the same operations behind a shape-checked forward/backward interface.
//! * [`crate::multiprecision`] – the engine instantiated on a double-double scalar.

pub mod light_curve;

use log::debug;
use nalgebra::{DVector, Vector3};

use crate::basis::{poly_basis, poly_basis_gradient, Basis};
use crate::flux_errors::FluxError;
use crate::occultation::{OccultationSolver, Regime};
use crate::params::EngineParams;
use crate::rotation::{Rotation, XyGradient, ZRotation};
use crate::scalar::Real;

/// Sky-plane position and radius of an occulting body, in units of the occulted body's radius.
///
/// `zo` only matters through its sign: a negative `zo` places the occultor behind the body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Occultor<T: Real> {
    pub xo: T,
    pub yo: T,
    pub zo: T,
    pub ro: T,
}

impl<T: Real> Occultor<T> {
    /// An occultor in front of the body (`zo = 1`).
    pub fn new(xo: T, yo: T, ro: T) -> Self {
        Occultor {
            xo,
            yo,
            zo: T::one(),
            ro,
        }
    }

    pub fn with_zo(mut self, zo: T) -> Self {
        self.zo = zo;
        self
    }

    /// Sky-plane separation `b = √(xo² + yo²)`.
    pub fn impact_parameter(&self) -> T {
        (self.xo * self.xo + self.yo * self.yo).sqrt()
    }

    pub fn is_behind(&self) -> bool {
        self.zo < T::zero()
    }
}

/// Gradient of the occultation flux with respect to its inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct FluxGradient<T: Real> {
    pub y: DVector<T>,
    pub xo: T,
    pub yo: T,
    pub ro: T,
}

/// Rotations, occultation integrals and fluxes of degree-`L` maps.
#[derive(Debug, Clone)]
pub struct FluxEngine<T: Real> {
    params: EngineParams,
    basis: Basis<T>,
    rotation: Rotation<T>,
    solver: OccultationSolver<T>,
}

impl<T: Real> FluxEngine<T> {
    /// Build an engine and precompute its tables.
    ///
    /// Arguments
    /// -----------------
    /// * `params`: degree and numerical settings, see [`EngineParams`].
    ///
    /// Return
    /// ----------
    /// * The engine, or [`FluxError::InvalidParameter`] if `params` does not validate, or
    ///   [`FluxError::NumericInstability`] if the Green's basis matrix cannot be inverted.
    pub fn new(params: EngineParams) -> Result<Self, FluxError> {
        params.validate()?;
        let lmax = params.lmax;
        let basis = Basis::new(lmax)?;
        let rotation = Rotation::new(lmax);
        let solver = OccultationSolver::new(lmax, params.solver_settings());
        debug!(
            "flux engine ready: lmax = {lmax}, {n} coefficients, {n}x{n} basis matrices",
            n = params.n_coeffs()
        );
        Ok(FluxEngine {
            params,
            basis,
            rotation,
            solver,
        })
    }

    /// Engine of degree `lmax` with default settings.
    pub fn with_lmax(lmax: usize) -> Result<Self, FluxError> {
        Self::new(EngineParams::builder().lmax(lmax).build()?)
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    pub fn lmax(&self) -> usize {
        self.params.lmax
    }

    /// Length of the coefficient vectors, `(lmax + 1)²`.
    pub fn n_coeffs(&self) -> usize {
        self.params.n_coeffs()
    }

    pub fn basis(&self) -> &Basis<T> {
        &self.basis
    }

    pub fn rotation(&self) -> &Rotation<T> {
        &self.rotation
    }

    pub fn solver(&self) -> &OccultationSolver<T> {
        &self.solver
    }

    // --- rotations ---------------------------------------------------------------------------

    pub fn rotate_z(&self, y: &DVector<T>, theta: T) -> Result<DVector<T>, FluxError> {
        self.rotation.rotate_z(y, theta)
    }

    pub fn rotate_z_backward(
        &self,
        y: &DVector<T>,
        theta: T,
        seed: &DVector<T>,
    ) -> Result<(DVector<T>, T), FluxError> {
        self.rotation.rotate_z_backward(y, theta, seed)
    }

    /// See [`Rotation::rotate_xy`].
    pub fn rotate_xy(&self, y: &DVector<T>, inc: T, obl: T) -> Result<DVector<T>, FluxError> {
        self.rotation.rotate_xy(y, inc, obl)
    }

    pub fn rotate_xy_backward(
        &self,
        y: &DVector<T>,
        inc: T,
        obl: T,
        seed: &DVector<T>,
    ) -> Result<XyGradient<T>, FluxError> {
        self.rotation.rotate_xy_backward(y, inc, obl, seed)
    }

    /// See [`Rotation::rotate_xy_transpose`].
    pub fn rotate_xy_transpose(
        &self,
        y: &DVector<T>,
        inc: T,
        obl: T,
    ) -> Result<DVector<T>, FluxError> {
        self.rotation.rotate_xy_transpose(y, inc, obl)
    }

    pub fn rotate_xy_transpose_backward(
        &self,
        y: &DVector<T>,
        inc: T,
        obl: T,
        seed: &DVector<T>,
    ) -> Result<XyGradient<T>, FluxError> {
        self.rotation.rotate_xy_transpose_backward(y, inc, obl, seed)
    }

    /// See [`Rotation::rotate`].
    pub fn rotate(
        &self,
        y: &DVector<T>,
        axis: &Vector3<T>,
        angle: T,
    ) -> Result<DVector<T>, FluxError> {
        self.rotation.rotate(y, axis, angle)
    }

    pub fn rotate_backward(
        &self,
        y: &DVector<T>,
        axis: &Vector3<T>,
        angle: T,
        seed: &DVector<T>,
    ) -> Result<(DVector<T>, T), FluxError> {
        self.rotation.rotate_backward(y, axis, angle, seed)
    }

    // --- occultation -------------------------------------------------------------------------

    /// `sᵀ(b, r)`, see [`OccultationSolver::solve`].
    pub fn solution_vector(&self, b: T, r: T) -> Result<DVector<T>, FluxError> {
        self.solver.solve(b, r)
    }

    /// `(ḏb, ḏr)` for a seed on `sᵀ(b, r)`.
    pub fn solution_vector_backward(
        &self,
        b: T,
        r: T,
        seed: &DVector<T>,
    ) -> Result<(T, T), FluxError> {
        self.solver.backward(b, r, seed)
    }

    fn check_occultor(occ: &Occultor<T>) -> Result<(), FluxError> {
        for (name, v) in [("xo", occ.xo), ("yo", occ.yo), ("zo", occ.zo)] {
            if !v.is_finite() {
                return Err(FluxError::domain(name, v.to_f64(), "(-inf, inf), finite"));
            }
        }
        if !occ.ro.is_finite() || occ.ro < T::zero() {
            return Err(FluxError::domain("ro", occ.ro.to_f64(), "[0, inf), finite"));
        }
        Ok(())
    }

    /// Angle about the line of sight that carries the occultor onto `+y`.
    fn occultor_angle(occ: &Occultor<T>) -> T {
        if occ.xo == T::zero() && occ.yo == T::zero() {
            T::zero()
        } else {
            occ.xo.atan2(occ.yo)
        }
    }

    fn finite(what: &str, value: T) -> Result<T, FluxError> {
        if value.is_finite() {
            Ok(value)
        } else {
            Err(FluxError::NumericInstability(format!(
                "{what} evaluated to {value}"
            )))
        }
    }

    /// Disk-integrated flux of the map with no occultor, `rᵀA1 · y`.
    pub fn unocculted_flux(&self, y: &DVector<T>) -> Result<T, FluxError> {
        self.rotation.check_len("y", y)?;
        Self::finite("unocculted flux", self.basis.r_t_a1().dot(y))
    }

    /// Flux of the map `y` (already in the sky frame) behind an occultor at `(xo, yo)`.
    ///
    /// Arguments
    /// -----------------
    /// * `y`: coefficient vector of length `(lmax + 1)²`.
    /// * `xo`, `yo`: sky-plane position of the occultor center.
    /// * `ro`: occultor radius, `ro ≥ 0`.
    ///
    /// Return
    /// ----------
    /// * The visible flux, or a [`FluxError`] for a wrong vector length, a non-finite position
    ///   or a negative radius.
    pub fn flux(&self, y: &DVector<T>, xo: T, yo: T, ro: T) -> Result<T, FluxError> {
        self.occultation_flux(y, &Occultor::new(xo, yo, ro))
    }

    /// [`FluxEngine::flux`] for an occultor that may sit behind the body.
    pub fn occultation_flux(&self, y: &DVector<T>, occ: &Occultor<T>) -> Result<T, FluxError> {
        self.rotation.check_len("y", y)?;
        Self::check_occultor(occ)?;
        if occ.is_behind() {
            return self.unocculted_flux(y);
        }

        let b = occ.impact_parameter();
        let value = match Regime::classify(b, occ.ro) {
            Regime::Unocculted => self.basis.r_t_a1().dot(y),
            Regime::Complete => T::zero(),
            Regime::Inside | Regime::Partial => {
                let s = self.solver.solve(b, occ.ro)?;
                let rotated = ZRotation::new(Self::occultor_angle(occ), self.lmax()).apply(y);
                s.dot(&(self.basis.a() * rotated))
            }
        };
        Self::finite("occultation flux", value)
    }

    pub fn flux_backward(
        &self,
        y: &DVector<T>,
        xo: T,
        yo: T,
        ro: T,
        seed: T,
    ) -> Result<FluxGradient<T>, FluxError> {
        self.occultation_flux_backward(y, &Occultor::new(xo, yo, ro), seed)
    }

    /// Vector-Jacobian product of [`FluxEngine::occultation_flux`].
    ///
    /// With `ψ = atan2(xo, yo)` the chain rule gives
    /// `ḏxo = ∂F/∂b · xo/b + ∂F/∂ψ · yo/b²` and `ḏyo = ∂F/∂b · yo/b − ∂F/∂ψ · xo/b²`.
    /// Below `centered_cutoff` the occultor is treated as centered and the directional limits
    /// `∂sᵀ/∂b · A · D_z(π/2) · y` (along `x`) and `∂sᵀ/∂b · A · y` (along `y`) are used instead.
    pub fn occultation_flux_backward(
        &self,
        y: &DVector<T>,
        occ: &Occultor<T>,
        seed: T,
    ) -> Result<FluxGradient<T>, FluxError> {
        self.rotation.check_len("y", y)?;
        Self::check_occultor(occ)?;
        let n = self.n_coeffs();
        let b = occ.impact_parameter();
        let regime = if occ.is_behind() {
            Regime::Unocculted
        } else {
            Regime::classify(b, occ.ro)
        };

        let grad = match regime {
            Regime::Unocculted => FluxGradient {
                y: self.basis.r_t_a1() * seed,
                xo: T::zero(),
                yo: T::zero(),
                ro: T::zero(),
            },
            Regime::Complete => FluxGradient {
                y: DVector::zeros(n),
                xo: T::zero(),
                yo: T::zero(),
                ro: T::zero(),
            },
            Regime::Inside | Regime::Partial => {
                let sol = self.solver.solve_with_gradient(b, occ.ro)?;
                let a = self.basis.a();
                let z = ZRotation::new(Self::occultor_angle(occ), self.lmax());
                let a_rotated = a * z.apply(y);
                let s_a = a.tr_mul(&sol.s);

                let (d_xo, d_yo) = if b < T::from_f64(self.params.centered_cutoff) {
                    let quarter = ZRotation::new(T::frac_pi_2(), self.lmax()).apply(y);
                    (
                        sol.ds_db.dot(&(a * quarter)),
                        sol.ds_db.dot(&(a * y)),
                    )
                } else {
                    let d_b = sol.ds_db.dot(&a_rotated);
                    let d_psi = s_a.dot(&z.apply_derivative(y));
                    let b2 = b * b;
                    (
                        d_b * occ.xo / b + d_psi * occ.yo / b2,
                        d_b * occ.yo / b - d_psi * occ.xo / b2,
                    )
                };

                FluxGradient {
                    y: z.apply_transpose(&s_a) * seed,
                    xo: d_xo * seed,
                    yo: d_yo * seed,
                    ro: sol.ds_dr.dot(&a_rotated) * seed,
                }
            }
        };

        for (name, v) in [("xo", grad.xo), ("yo", grad.yo), ("ro", grad.ro)] {
            Self::finite(name, v)?;
        }
        if grad.y.iter().any(|v| !v.is_finite()) {
            return Err(FluxError::NumericInstability(
                "flux gradient with respect to y is not finite".into(),
            ));
        }
        Ok(grad)
    }

    // --- surface intensity -------------------------------------------------------------------

    fn check_point(x: T, y: T) -> Result<(), FluxError> {
        for (name, v) in [("x", x), ("y", y)] {
            if !v.is_finite() {
                return Err(FluxError::domain(name, v.to_f64(), "(-inf, inf), finite"));
            }
        }
        Ok(())
    }

    /// Specific intensity of the map at the sky point `(x, y)`; NaN off the disk.
    pub fn intensity(&self, coeffs: &DVector<T>, x: T, y: T) -> Result<T, FluxError> {
        self.rotation.check_len("y", coeffs)?;
        Self::check_point(x, y)?;
        let poly = self.basis.a1() * coeffs;
        Ok(poly_basis(self.lmax(), x, y).dot(&poly))
    }

    /// Intensity at `(x, y)` with its partial derivatives `(I, ∂I/∂x, ∂I/∂y)`.
    pub fn intensity_gradient(
        &self,
        coeffs: &DVector<T>,
        x: T,
        y: T,
    ) -> Result<(T, T, T), FluxError> {
        self.rotation.check_len("y", coeffs)?;
        Self::check_point(x, y)?;
        let poly = self.basis.a1() * coeffs;
        let (value, dx, dy) = poly_basis_gradient(self.lmax(), x, y);
        Ok((value.dot(&poly), dx.dot(&poly), dy.dot(&poly)))
    }
}

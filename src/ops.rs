//! # Differentiable operations
//!
//! A uniform forward/backward interface over the engine's differentiable operations, for hosts
//! that assemble them into larger computation graphs.
//!
//! Every operation implements [`Op`]:
//!
//! * [`Op::infer_shape`] checks the shapes of the inputs and returns the shape of the output
//!   without touching any number,
//! * [`Op::forward`] evaluates the operation,
//! * [`Op::backward`] takes a seed shaped like the output and returns one gradient per input
//!   (the vector-Jacobian product).
//!
//! | op                    | inputs                       | output       |
//! |-----------------------|------------------------------|--------------|
//! | [`RotateXy`]          | `y`, `inc`, `obl`            | `Vector(N)`  |
//! | [`RotateXyTranspose`] | `y`, `inc`, `obl`            | `Vector(N)`  |
//! | [`RotateZ`]           | `y`, `theta`                 | `Vector(N)`  |
//! | [`RotateAxis`]        | `y`, `axis`, `angle`         | `Vector(N)`  |
//! | [`SolutionVector`]    | `b`, `r`                     | `Vector(N)`  |
//! | [`OccultationFlux`]   | `y`, `xo`, `yo`, `ro` (`zo`) | `Scalar`     |
//!
//! `N = (lmax + 1)²` for the engine the op borrows. The axis of [`RotateAxis`] is a constant of
//! the op's inputs and receives no gradient.
//!
//! ```rust, no_run
//! use nalgebra::DVector;
//! use ylmflux::engine::FluxEngine;
//! use ylmflux::ops::{Op, RotateXy, Shape, XyInputs};
//!
//! let engine = FluxEngine::<f64>::with_lmax(2).unwrap();
//! let op = RotateXy::new(&engine);
//! assert_eq!(
//!     op.infer_shape(&[Shape::Vector(9), Shape::Scalar, Shape::Scalar]).unwrap(),
//!     Shape::Vector(9)
//! );
//!
//! let inputs = XyInputs { y: DVector::from_element(9, 0.1), inc: 1.2, obl: 0.3 };
//! let out = op.forward(&inputs).unwrap();
//! let grad = op.backward(&inputs, &out).unwrap();
//! ```

use itertools::Itertools;
use nalgebra::{DVector, Vector3};

use crate::engine::{FluxEngine, FluxGradient, Occultor};
use crate::flux_errors::FluxError;
use crate::rotation::XyGradient;
use crate::scalar::Real;

/// Shape of an operation input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Scalar,
    Vector(usize),
}

impl Shape {
    pub fn of<T: Real>(v: &DVector<T>) -> Shape {
        Shape::Vector(v.len())
    }

    /// Number of elements.
    pub fn size(&self) -> usize {
        match self {
            Shape::Scalar => 1,
            Shape::Vector(n) => *n,
        }
    }
}

/// A differentiable operation.
pub trait Op<T: Real> {
    type Inputs;
    type Output;
    type Gradients;

    /// Output shape for the given input shapes.
    ///
    /// Return
    /// ----------
    /// * [`FluxError::ShapeMismatch`] naming the first input whose shape is wrong, or `"inputs"`
    ///   when the number of inputs is wrong.
    fn infer_shape(&self, inputs: &[Shape]) -> Result<Shape, FluxError>;

    fn forward(&self, inputs: &Self::Inputs) -> Result<Self::Output, FluxError>;

    /// Gradients of `⟨seed, forward(inputs)⟩` with respect to every input.
    fn backward(
        &self,
        inputs: &Self::Inputs,
        seed: &Self::Output,
    ) -> Result<Self::Gradients, FluxError>;
}

fn match_shapes(found: &[Shape], expected: &[(&'static str, Shape)]) -> Result<(), FluxError> {
    if found.len() != expected.len() {
        return Err(FluxError::shape("inputs", expected.len(), found.len()));
    }
    for (shape, (what, want)) in found.iter().zip_eq(expected) {
        if shape != want {
            return Err(FluxError::shape(what, want.size(), shape.size()));
        }
    }
    Ok(())
}

/// Inputs of [`RotateXy`] and [`RotateXyTranspose`].
#[derive(Debug, Clone, PartialEq)]
pub struct XyInputs<T: Real> {
    pub y: DVector<T>,
    pub inc: T,
    pub obl: T,
}

fn xy_shape(n: usize, inputs: &[Shape]) -> Result<Shape, FluxError> {
    match_shapes(
        inputs,
        &[
            ("y", Shape::Vector(n)),
            ("inc", Shape::Scalar),
            ("obl", Shape::Scalar),
        ],
    )?;
    Ok(Shape::Vector(n))
}

/// `D_z(obl) · D_x(π/2 − inc) · y`.
#[derive(Debug, Clone, Copy)]
pub struct RotateXy<'a, T: Real> {
    engine: &'a FluxEngine<T>,
}

impl<'a, T: Real> RotateXy<'a, T> {
    pub fn new(engine: &'a FluxEngine<T>) -> Self {
        RotateXy { engine }
    }
}

impl<T: Real> Op<T> for RotateXy<'_, T> {
    type Inputs = XyInputs<T>;
    type Output = DVector<T>;
    type Gradients = XyGradient<T>;

    fn infer_shape(&self, inputs: &[Shape]) -> Result<Shape, FluxError> {
        xy_shape(self.engine.n_coeffs(), inputs)
    }

    fn forward(&self, inputs: &XyInputs<T>) -> Result<DVector<T>, FluxError> {
        self.engine.rotate_xy(&inputs.y, inputs.inc, inputs.obl)
    }

    fn backward(
        &self,
        inputs: &XyInputs<T>,
        seed: &DVector<T>,
    ) -> Result<XyGradient<T>, FluxError> {
        self.engine
            .rotate_xy_backward(&inputs.y, inputs.inc, inputs.obl, seed)
    }
}

/// `(D_z(obl) · D_x(π/2 − inc))ᵀ · y`.
#[derive(Debug, Clone, Copy)]
pub struct RotateXyTranspose<'a, T: Real> {
    engine: &'a FluxEngine<T>,
}

impl<'a, T: Real> RotateXyTranspose<'a, T> {
    pub fn new(engine: &'a FluxEngine<T>) -> Self {
        RotateXyTranspose { engine }
    }
}

impl<T: Real> Op<T> for RotateXyTranspose<'_, T> {
    type Inputs = XyInputs<T>;
    type Output = DVector<T>;
    type Gradients = XyGradient<T>;

    fn infer_shape(&self, inputs: &[Shape]) -> Result<Shape, FluxError> {
        xy_shape(self.engine.n_coeffs(), inputs)
    }

    fn forward(&self, inputs: &XyInputs<T>) -> Result<DVector<T>, FluxError> {
        self.engine
            .rotate_xy_transpose(&inputs.y, inputs.inc, inputs.obl)
    }

    fn backward(
        &self,
        inputs: &XyInputs<T>,
        seed: &DVector<T>,
    ) -> Result<XyGradient<T>, FluxError> {
        self.engine
            .rotate_xy_transpose_backward(&inputs.y, inputs.inc, inputs.obl, seed)
    }
}

/// `D_z(theta) · y`, inputs `(y, theta)`.
#[derive(Debug, Clone, Copy)]
pub struct RotateZ<'a, T: Real> {
    engine: &'a FluxEngine<T>,
}

impl<'a, T: Real> RotateZ<'a, T> {
    pub fn new(engine: &'a FluxEngine<T>) -> Self {
        RotateZ { engine }
    }
}

impl<T: Real> Op<T> for RotateZ<'_, T> {
    type Inputs = (DVector<T>, T);
    type Output = DVector<T>;
    type Gradients = (DVector<T>, T);

    fn infer_shape(&self, inputs: &[Shape]) -> Result<Shape, FluxError> {
        let n = self.engine.n_coeffs();
        match_shapes(inputs, &[("y", Shape::Vector(n)), ("theta", Shape::Scalar)])?;
        Ok(Shape::Vector(n))
    }

    fn forward(&self, (y, theta): &(DVector<T>, T)) -> Result<DVector<T>, FluxError> {
        self.engine.rotate_z(y, *theta)
    }

    fn backward(
        &self,
        (y, theta): &(DVector<T>, T),
        seed: &DVector<T>,
    ) -> Result<(DVector<T>, T), FluxError> {
        self.engine.rotate_z_backward(y, *theta, seed)
    }
}

/// Inputs of [`RotateAxis`].
#[derive(Debug, Clone, PartialEq)]
pub struct AxisInputs<T: Real> {
    pub y: DVector<T>,
    pub axis: Vector3<T>,
    pub angle: T,
}

/// Rotation by `angle` about `axis`; gradients `(ḏy, ḏangle)`.
#[derive(Debug, Clone, Copy)]
pub struct RotateAxis<'a, T: Real> {
    engine: &'a FluxEngine<T>,
}

impl<'a, T: Real> RotateAxis<'a, T> {
    pub fn new(engine: &'a FluxEngine<T>) -> Self {
        RotateAxis { engine }
    }
}

impl<T: Real> Op<T> for RotateAxis<'_, T> {
    type Inputs = AxisInputs<T>;
    type Output = DVector<T>;
    type Gradients = (DVector<T>, T);

    fn infer_shape(&self, inputs: &[Shape]) -> Result<Shape, FluxError> {
        let n = self.engine.n_coeffs();
        match_shapes(
            inputs,
            &[
                ("y", Shape::Vector(n)),
                ("axis", Shape::Vector(3)),
                ("angle", Shape::Scalar),
            ],
        )?;
        Ok(Shape::Vector(n))
    }

    fn forward(&self, inputs: &AxisInputs<T>) -> Result<DVector<T>, FluxError> {
        self.engine.rotate(&inputs.y, &inputs.axis, inputs.angle)
    }

    fn backward(
        &self,
        inputs: &AxisInputs<T>,
        seed: &DVector<T>,
    ) -> Result<(DVector<T>, T), FluxError> {
        self.engine
            .rotate_backward(&inputs.y, &inputs.axis, inputs.angle, seed)
    }
}

/// `sᵀ(b, r)`, inputs `(b, r)`.
#[derive(Debug, Clone, Copy)]
pub struct SolutionVector<'a, T: Real> {
    engine: &'a FluxEngine<T>,
}

impl<'a, T: Real> SolutionVector<'a, T> {
    pub fn new(engine: &'a FluxEngine<T>) -> Self {
        SolutionVector { engine }
    }
}

impl<T: Real> Op<T> for SolutionVector<'_, T> {
    type Inputs = (T, T);
    type Output = DVector<T>;
    type Gradients = (T, T);

    fn infer_shape(&self, inputs: &[Shape]) -> Result<Shape, FluxError> {
        match_shapes(inputs, &[("b", Shape::Scalar), ("r", Shape::Scalar)])?;
        Ok(Shape::Vector(self.engine.n_coeffs()))
    }

    fn forward(&self, &(b, r): &(T, T)) -> Result<DVector<T>, FluxError> {
        self.engine.solution_vector(b, r)
    }

    fn backward(&self, &(b, r): &(T, T), seed: &DVector<T>) -> Result<(T, T), FluxError> {
        self.engine.solution_vector_backward(b, r, seed)
    }
}

/// Inputs of [`OccultationFlux`].
#[derive(Debug, Clone, PartialEq)]
pub struct FluxInputs<T: Real> {
    pub y: DVector<T>,
    pub occultor: Occultor<T>,
}

/// Visible flux of a sky-frame map behind an occultor.
///
/// Shapes are `(y, xo, yo, ro)`, optionally followed by `zo`.
#[derive(Debug, Clone, Copy)]
pub struct OccultationFlux<'a, T: Real> {
    engine: &'a FluxEngine<T>,
}

impl<'a, T: Real> OccultationFlux<'a, T> {
    pub fn new(engine: &'a FluxEngine<T>) -> Self {
        OccultationFlux { engine }
    }
}

impl<T: Real> Op<T> for OccultationFlux<'_, T> {
    type Inputs = FluxInputs<T>;
    type Output = T;
    type Gradients = FluxGradient<T>;

    fn infer_shape(&self, inputs: &[Shape]) -> Result<Shape, FluxError> {
        let mut expected = vec![
            ("y", Shape::Vector(self.engine.n_coeffs())),
            ("xo", Shape::Scalar),
            ("yo", Shape::Scalar),
            ("ro", Shape::Scalar),
        ];
        if inputs.len() == 5 {
            expected.push(("zo", Shape::Scalar));
        }
        match_shapes(inputs, &expected)?;
        Ok(Shape::Scalar)
    }

    fn forward(&self, inputs: &FluxInputs<T>) -> Result<T, FluxError> {
        self.engine.occultation_flux(&inputs.y, &inputs.occultor)
    }

    fn backward(&self, inputs: &FluxInputs<T>, seed: &T) -> Result<FluxGradient<T>, FluxError> {
        self.engine
            .occultation_flux_backward(&inputs.y, &inputs.occultor, *seed)
    }
}

#[cfg(test)]
mod ops_test {
    use super::*;
    use approx::assert_relative_eq;

    fn engine() -> FluxEngine<f64> {
        FluxEngine::with_lmax(2).unwrap()
    }

    fn y() -> DVector<f64> {
        DVector::from_fn(9, |i, _| 0.5 - 0.07 * i as f64)
    }

    #[test]
    fn test_infer_shape() {
        let e = engine();
        let v9 = Shape::Vector(9);
        let s = Shape::Scalar;

        assert_eq!(RotateXy::new(&e).infer_shape(&[v9, s, s]).unwrap(), v9);
        assert_eq!(RotateXyTranspose::new(&e).infer_shape(&[v9, s, s]).unwrap(), v9);
        assert_eq!(RotateZ::new(&e).infer_shape(&[v9, s]).unwrap(), v9);
        assert_eq!(
            RotateAxis::new(&e)
                .infer_shape(&[v9, Shape::Vector(3), s])
                .unwrap(),
            v9
        );
        assert_eq!(SolutionVector::new(&e).infer_shape(&[s, s]).unwrap(), v9);
        assert_eq!(OccultationFlux::new(&e).infer_shape(&[v9, s, s, s]).unwrap(), s);
        assert_eq!(OccultationFlux::new(&e).infer_shape(&[v9, s, s, s, s]).unwrap(), s);

        assert_eq!(
            RotateXy::new(&e).infer_shape(&[Shape::Vector(4), s, s]),
            Err(FluxError::ShapeMismatch {
                what: "y",
                expected: 9,
                found: 4
            })
        );
        assert_eq!(
            RotateZ::new(&e).infer_shape(&[v9]),
            Err(FluxError::ShapeMismatch {
                what: "inputs",
                expected: 2,
                found: 1
            })
        );
        assert!(matches!(
            RotateAxis::new(&e).infer_shape(&[v9, s, s]),
            Err(FluxError::ShapeMismatch { what: "axis", .. })
        ));
    }

    #[test]
    fn test_seed_shape_mismatch() {
        let e = engine();
        let inputs = XyInputs {
            y: y(),
            inc: 0.4,
            obl: 0.1,
        };
        let short = DVector::zeros(4);
        assert!(matches!(
            RotateXy::new(&e).backward(&inputs, &short),
            Err(FluxError::ShapeMismatch { what: "seed", .. })
        ));
        assert!(matches!(
            RotateXyTranspose::new(&e).backward(&inputs, &short),
            Err(FluxError::ShapeMismatch { what: "seed", .. })
        ));
        assert!(matches!(
            SolutionVector::new(&e).backward(&(0.3, 0.1), &short),
            Err(FluxError::ShapeMismatch { what: "seed", .. })
        ));
    }

    #[test]
    fn test_forward_matches_engine() {
        let e = engine();
        let occultor = Occultor::new(0.3, -0.2, 0.15);
        let op = OccultationFlux::new(&e);
        let inputs = FluxInputs { y: y(), occultor };
        assert_eq!(
            op.forward(&inputs).unwrap(),
            e.flux(&y(), 0.3, -0.2, 0.15).unwrap()
        );
        let g = op.backward(&inputs, &1.0).unwrap();
        assert_eq!(g, e.flux_backward(&y(), 0.3, -0.2, 0.15, 1.0).unwrap());
    }

    #[test]
    fn test_rotate_z_backward_is_adjoint() {
        let e = engine();
        let op = RotateZ::new(&e);
        let inputs = (y(), 0.8);
        let seed = DVector::from_fn(9, |i, _| (i as f64 * 0.3).cos());
        let out = op.forward(&inputs).unwrap();
        let (dy, _) = op.backward(&inputs, &seed).unwrap();
        assert_relative_eq!(seed.dot(&out), dy.dot(&inputs.0), max_relative = 1e-13);
    }
}

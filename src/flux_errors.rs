use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum FluxError {
    #[error("Domain error: {param} = {value} is outside the valid range {range}")]
    DomainError {
        param: &'static str,
        value: f64,
        range: &'static str,
    },

    #[error("Shape mismatch for {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Numerical instability: {0}")]
    NumericInstability(String),

    #[error("Spherical harmonic index (l = {l}, m = {m}) out of range for lmax = {lmax}")]
    IndexOutOfRange { l: i64, m: i64, lmax: usize },

    #[error("Invalid engine parameter: {0}")]
    InvalidParameter(String),
}

impl FluxError {
    /// Shorthand for [`FluxError::DomainError`].
    pub(crate) fn domain(param: &'static str, value: f64, range: &'static str) -> Self {
        FluxError::DomainError { param, value, range }
    }

    /// Shorthand for [`FluxError::ShapeMismatch`].
    pub(crate) fn shape(what: &'static str, expected: usize, found: usize) -> Self {
        FluxError::ShapeMismatch {
            what,
            expected,
            found,
        }
    }
}

/// Reject NaN and infinities for a named input.
pub(crate) fn ensure_finite(param: &'static str, value: f64) -> Result<f64, FluxError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FluxError::domain(param, value, "(-inf, inf), finite"))
    }
}

impl PartialEq for FluxError {
    fn eq(&self, other: &Self) -> bool {
        use FluxError::*;
        match (self, other) {
            (
                DomainError {
                    param: pa,
                    value: va,
                    range: ra,
                },
                DomainError {
                    param: pb,
                    value: vb,
                    range: rb,
                },
            ) => pa == pb && ra == rb && (va == vb || (va.is_nan() && vb.is_nan())),
            (
                ShapeMismatch {
                    what: wa,
                    expected: ea,
                    found: fa,
                },
                ShapeMismatch {
                    what: wb,
                    expected: eb,
                    found: fb,
                },
            ) => wa == wb && ea == eb && fa == fb,
            (NumericInstability(a), NumericInstability(b)) => a == b,
            (
                IndexOutOfRange {
                    l: la,
                    m: ma,
                    lmax: xa,
                },
                IndexOutOfRange {
                    l: lb,
                    m: mb,
                    lmax: xb,
                },
            ) => la == lb && ma == mb && xa == xb,
            (InvalidParameter(a), InvalidParameter(b)) => a == b,
            _ => false,
        }
    }
}

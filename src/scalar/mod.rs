//! # Scalar abstraction
//!
//! Every numerical routine of the crate (special functions, elliptic integrals, basis
//! matrices, rotations, occultation integrals) is written once, generic over [`Real`].
//! Two implementations are provided:
//!
//! * `f64` – the default execution path,
//! * [`DoubleDouble`] – an unevaluated sum of two `f64` (≈ 32 significant digits) used by the
//!   [multi-precision shadow path](crate::multiprecision) to validate the `f64` results.
//!
//! The trait is deliberately small: field operations, a square root, the three trigonometric
//! functions the geometry needs, and exact conversions from integers and `f64`.
//! Integer-valued constants must be built with [`Real::from_i64`] (exact) and rational ones as
//! quotients of those, so that the shadow path never inherits a rounded `f64` literal.

pub mod double_double;

use std::fmt::{Debug, Display};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use num_traits::{One, Zero};

pub use double_double::DoubleDouble;

pub trait Real:
    nalgebra::Scalar
    + Copy
    + Debug
    + Display
    + PartialOrd
    + Zero
    + One
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
    + Sum
    + Send
    + Sync
{
    /// Exact embedding of a double.
    fn from_f64(x: f64) -> Self;

    /// Nearest double.
    fn to_f64(self) -> f64;

    /// Machine epsilon of the representation.
    fn epsilon() -> Self;

    /// Smallest positive normal value.
    fn min_positive() -> Self;

    fn pi() -> Self;

    fn sqrt(self) -> Self;

    fn sin(self) -> Self;

    fn cos(self) -> Self;

    /// Four-quadrant arctangent of `self / other`.
    fn atan2(self, other: Self) -> Self;

    fn is_finite(self) -> bool;

    fn is_nan(self) -> bool;

    fn sin_cos(self) -> (Self, Self) {
        (self.sin(), self.cos())
    }

    fn abs(self) -> Self {
        if self < Self::zero() {
            -self
        } else {
            self
        }
    }

    fn from_i64(n: i64) -> Self {
        // |n| < 2^53 is exact in a single double, larger values are split.
        let hi = (n >> 26) << 26;
        let lo = n - hi;
        Self::from_f64(hi as f64) + Self::from_f64(lo as f64)
    }

    fn from_usize(n: usize) -> Self {
        Self::from_i64(n as i64)
    }

    /// `num / den` evaluated in the target precision.
    fn ratio(num: i64, den: i64) -> Self {
        Self::from_i64(num) / Self::from_i64(den)
    }

    fn half() -> Self {
        Self::ratio(1, 2)
    }

    fn two() -> Self {
        Self::from_i64(2)
    }

    fn frac_pi_2() -> Self {
        Self::pi() / Self::two()
    }

    fn powi(self, n: u32) -> Self {
        let mut base = self;
        let mut exp = n;
        let mut acc = Self::one();
        while exp > 0 {
            if exp & 1 == 1 {
                acc *= base;
            }
            base *= base;
            exp >>= 1;
        }
        acc
    }

    fn max(self, other: Self) -> Self {
        if self < other {
            other
        } else {
            self
        }
    }

    fn min(self, other: Self) -> Self {
        if other < self {
            other
        } else {
            self
        }
    }

    /// `+1`, `-1` or `0`.
    fn signum_or_zero(self) -> Self {
        if self > Self::zero() {
            Self::one()
        } else if self < Self::zero() {
            -Self::one()
        } else {
            Self::zero()
        }
    }
}

impl Real for f64 {
    #[inline]
    fn from_f64(x: f64) -> Self {
        x
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn epsilon() -> Self {
        f64::EPSILON
    }

    #[inline]
    fn min_positive() -> Self {
        f64::MIN_POSITIVE
    }

    #[inline]
    fn pi() -> Self {
        std::f64::consts::PI
    }

    #[inline]
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    #[inline]
    fn sin(self) -> Self {
        f64::sin(self)
    }

    #[inline]
    fn cos(self) -> Self {
        f64::cos(self)
    }

    #[inline]
    fn atan2(self, other: Self) -> Self {
        f64::atan2(self, other)
    }

    #[inline]
    fn is_finite(self) -> bool {
        f64::is_finite(self)
    }

    #[inline]
    fn is_nan(self) -> bool {
        f64::is_nan(self)
    }

    #[inline]
    fn sin_cos(self) -> (Self, Self) {
        f64::sin_cos(self)
    }

    #[inline]
    fn abs(self) -> Self {
        f64::abs(self)
    }

    #[inline]
    fn from_i64(n: i64) -> Self {
        n as f64
    }

    #[inline]
    fn powi(self, n: u32) -> Self {
        f64::powi(self, n as i32)
    }
}

#[cfg(test)]
mod scalar_test {
    use super::*;
    use approx::assert_relative_eq;

    fn generic_hypot<T: Real>(a: T, b: T) -> T {
        (a * a + b * b).sqrt()
    }

    #[test]
    fn test_f64_helpers() {
        assert_eq!(<f64 as Real>::ratio(3, 4), 0.75);
        assert_eq!(<f64 as Real>::powi(2.0, 10), 1024.0);
        assert_eq!(Real::signum_or_zero(-3.0_f64), -1.0);
        assert_eq!(Real::signum_or_zero(0.0_f64), 0.0);
        assert_eq!(Real::max(1.0_f64, 2.0), 2.0);
        assert_relative_eq!(generic_hypot(3.0_f64, 4.0), 5.0);
    }

    #[test]
    fn test_large_integers_are_exact() {
        let n: i64 = (1 << 60) + 12345;
        let x = DoubleDouble::from_i64(n);
        assert_eq!(x - DoubleDouble::from_i64(1 << 60), DoubleDouble::from_i64(12345));
    }
}

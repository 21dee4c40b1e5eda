//! Double-double arithmetic.
//!
//! A [`DoubleDouble`] is the unevaluated sum `hi + lo` of two doubles with `|lo| ≤ ulp(hi)/2`,
//! giving a 106-bit significand (≈ 32 decimal digits) with the exponent range of `f64`.
//! Arithmetic relies on the classic error-free transformations (`two_sum`, `two_prod` through a
//! fused multiply-add); the transcendental functions reduce their argument in double-double
//! precision and either sum a Taylor series or refine an `f64` estimate by one Newton step.
//!
//! The type exists for validation only: it is slower than `f64` by one to two orders of
//! magnitude and is never differentiated.

use std::cmp::Ordering;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use num_traits::{One, Zero};

use super::Real;

/// π to double-double precision.
const PI_DD: DoubleDouble = DoubleDouble {
    hi: 3.141_592_653_589_793_116e0,
    lo: 1.224_646_799_147_353_207e-16,
};

/// π/2 to double-double precision.
const FRAC_PI_2_DD: DoubleDouble = DoubleDouble {
    hi: 1.570_796_326_794_896_558e0,
    lo: 6.123_233_995_736_766_036e-17,
};

/// 2^-104
const DD_EPSILON: f64 = 4.930_380_657_631_324e-32;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DoubleDouble {
    hi: f64,
    lo: f64,
}

#[inline]
fn two_sum(a: f64, b: f64) -> (f64, f64) {
    let s = a + b;
    let bb = s - a;
    let err = (a - (s - bb)) + (b - bb);
    (s, err)
}

#[inline]
fn quick_two_sum(a: f64, b: f64) -> (f64, f64) {
    let s = a + b;
    let err = b - (s - a);
    (s, err)
}

#[inline]
fn two_prod(a: f64, b: f64) -> (f64, f64) {
    let p = a * b;
    let err = a.mul_add(b, -p);
    (p, err)
}

impl DoubleDouble {
    /// Build from a head and a tail, renormalizing the pair.
    pub fn new(hi: f64, lo: f64) -> Self {
        let (hi, lo) = two_sum(hi, lo);
        DoubleDouble { hi, lo }
    }

    #[inline]
    pub fn hi(&self) -> f64 {
        self.hi
    }

    #[inline]
    pub fn lo(&self) -> f64 {
        self.lo
    }

    #[inline]
    fn from_parts_fast(hi: f64, lo: f64) -> Self {
        let (hi, lo) = quick_two_sum(hi, lo);
        DoubleDouble { hi, lo }
    }

    fn mul_f64(self, b: f64) -> Self {
        let (p1, mut p2) = two_prod(self.hi, b);
        p2 += self.lo * b;
        Self::from_parts_fast(p1, p2)
    }

    fn square(self) -> Self {
        let (p1, mut p2) = two_prod(self.hi, self.hi);
        p2 += 2.0 * self.hi * self.lo;
        Self::from_parts_fast(p1, p2)
    }

    /// Round to the nearest integer (ties away from zero), returned as a double.
    fn round_hi(self) -> f64 {
        let r = self.hi.round();
        if r == self.hi {
            // hi is integral, the tail decides
            let t = self.lo.round();
            r + t
        } else if (r - self.hi).abs() == 0.5 && self.lo != 0.0 {
            if self.lo > 0.0 {
                self.hi.ceil()
            } else {
                self.hi.floor()
            }
        } else {
            r
        }
    }

    /// Taylor series of `sin` and `cos` for `|t| ≤ π/4`.
    fn sin_cos_reduced(t: Self) -> (Self, Self) {
        let t2 = t.square();
        let threshold = DD_EPSILON * 0.5;

        let mut sin = t;
        let mut term = t;
        let mut n = 1_i64;
        loop {
            term = -(term * t2) / DoubleDouble::from_i64((n + 1) * (n + 2));
            n += 2;
            sin += term;
            if term.hi.abs() <= threshold * sin.hi.abs().max(f64::MIN_POSITIVE) || n > 60 {
                break;
            }
        }

        let mut cos = DoubleDouble::one();
        let mut term = DoubleDouble::one();
        let mut n = 0_i64;
        loop {
            term = -(term * t2) / DoubleDouble::from_i64((n + 1) * (n + 2));
            n += 2;
            cos += term;
            if term.hi.abs() <= threshold * cos.hi.abs() || n > 60 {
                break;
            }
        }
        (sin, cos)
    }
}

impl From<f64> for DoubleDouble {
    fn from(x: f64) -> Self {
        DoubleDouble { hi: x, lo: 0.0 }
    }
}

impl fmt::Display for DoubleDouble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lo == 0.0 {
            write!(f, "{:e}", self.hi)
        } else {
            write!(f, "{:e} {:+e}", self.hi, self.lo)
        }
    }
}

impl PartialOrd for DoubleDouble {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.hi.partial_cmp(&other.hi) {
            Some(Ordering::Equal) => self.lo.partial_cmp(&other.lo),
            ord => ord,
        }
    }
}

impl Add for DoubleDouble {
    type Output = DoubleDouble;

    fn add(self, b: DoubleDouble) -> DoubleDouble {
        let (s1, s2) = two_sum(self.hi, b.hi);
        let (t1, t2) = two_sum(self.lo, b.lo);
        let (s1, s2) = quick_two_sum(s1, s2 + t1);
        DoubleDouble::from_parts_fast(s1, s2 + t2)
    }
}

impl Sub for DoubleDouble {
    type Output = DoubleDouble;

    fn sub(self, b: DoubleDouble) -> DoubleDouble {
        self + (-b)
    }
}

impl Mul for DoubleDouble {
    type Output = DoubleDouble;

    fn mul(self, b: DoubleDouble) -> DoubleDouble {
        let (p1, mut p2) = two_prod(self.hi, b.hi);
        p2 += self.hi * b.lo + self.lo * b.hi;
        DoubleDouble::from_parts_fast(p1, p2)
    }
}

impl Div for DoubleDouble {
    type Output = DoubleDouble;

    fn div(self, b: DoubleDouble) -> DoubleDouble {
        let q1 = self.hi / b.hi;
        if !q1.is_finite() {
            return DoubleDouble::from(q1);
        }
        let r = self - b.mul_f64(q1);
        let q2 = r.hi / b.hi;
        let r = r - b.mul_f64(q2);
        let q3 = r.hi / b.hi;
        DoubleDouble::from_parts_fast(q1, q2) + DoubleDouble::from(q3)
    }
}

impl Neg for DoubleDouble {
    type Output = DoubleDouble;

    fn neg(self) -> DoubleDouble {
        DoubleDouble {
            hi: -self.hi,
            lo: -self.lo,
        }
    }
}

impl AddAssign for DoubleDouble {
    fn add_assign(&mut self, rhs: DoubleDouble) {
        *self = *self + rhs;
    }
}

impl SubAssign for DoubleDouble {
    fn sub_assign(&mut self, rhs: DoubleDouble) {
        *self = *self - rhs;
    }
}

impl MulAssign for DoubleDouble {
    fn mul_assign(&mut self, rhs: DoubleDouble) {
        *self = *self * rhs;
    }
}

impl DivAssign for DoubleDouble {
    fn div_assign(&mut self, rhs: DoubleDouble) {
        *self = *self / rhs;
    }
}

impl Sum for DoubleDouble {
    fn sum<I: Iterator<Item = DoubleDouble>>(iter: I) -> DoubleDouble {
        iter.fold(DoubleDouble::zero(), |acc, x| acc + x)
    }
}

impl Zero for DoubleDouble {
    fn zero() -> Self {
        DoubleDouble { hi: 0.0, lo: 0.0 }
    }

    fn is_zero(&self) -> bool {
        self.hi == 0.0
    }
}

impl One for DoubleDouble {
    fn one() -> Self {
        DoubleDouble { hi: 1.0, lo: 0.0 }
    }
}

impl Real for DoubleDouble {
    fn from_f64(x: f64) -> Self {
        DoubleDouble::from(x)
    }

    fn to_f64(self) -> f64 {
        self.hi + self.lo
    }

    fn epsilon() -> Self {
        DoubleDouble::from(DD_EPSILON)
    }

    fn min_positive() -> Self {
        // keep the tail representable
        DoubleDouble::from(f64::MIN_POSITIVE * 2f64.powi(53))
    }

    fn pi() -> Self {
        PI_DD
    }

    fn frac_pi_2() -> Self {
        FRAC_PI_2_DD
    }

    fn sqrt(self) -> Self {
        if self.hi == 0.0 {
            return DoubleDouble::zero();
        }
        if self.hi < 0.0 {
            return DoubleDouble::from(f64::NAN);
        }
        if !self.hi.is_finite() {
            return self;
        }
        let x = 1.0 / self.hi.sqrt();
        let ax = self.hi * x;
        let (s, e) = two_prod(ax, ax);
        let residual = (self - DoubleDouble::from_parts_fast(s, e)).hi;
        let (hi, lo) = two_sum(ax, residual * (x * 0.5));
        DoubleDouble { hi, lo }
    }

    fn sin(self) -> Self {
        self.sin_cos().0
    }

    fn cos(self) -> Self {
        self.sin_cos().1
    }

    fn sin_cos(self) -> (Self, Self) {
        if !self.hi.is_finite() {
            let nan = DoubleDouble::from(f64::NAN);
            return (nan, nan);
        }
        if self.hi == 0.0 {
            return (DoubleDouble::zero(), DoubleDouble::one());
        }
        let k = (self / FRAC_PI_2_DD).round_hi();
        let t = self - FRAC_PI_2_DD.mul_f64(k);
        let (s, c) = DoubleDouble::sin_cos_reduced(t);
        match (k.rem_euclid(4.0)) as i64 {
            0 => (s, c),
            1 => (c, -s),
            2 => (-s, -c),
            _ => (-c, s),
        }
    }

    fn atan2(self, other: Self) -> Self {
        let (y, x) = (self, other);
        if x.hi == 0.0 && y.hi == 0.0 {
            return if x.hi.is_sign_negative() {
                if y.hi.is_sign_negative() {
                    -PI_DD
                } else {
                    PI_DD
                }
            } else {
                DoubleDouble::from(y.hi)
            };
        }
        if x.hi == 0.0 {
            return if y.hi > 0.0 { FRAC_PI_2_DD } else { -FRAC_PI_2_DD };
        }
        if y.hi == 0.0 {
            return if x.hi > 0.0 {
                DoubleDouble::zero()
            } else {
                PI_DD
            };
        }
        let r = (x.square() + y.square()).sqrt();
        let xx = x / r;
        let yy = y / r;
        let mut z = DoubleDouble::from(y.hi.atan2(x.hi));
        let (sin_z, cos_z) = z.sin_cos();
        if xx.hi.abs() > yy.hi.abs() {
            z += (yy - sin_z) / cos_z;
        } else {
            z -= (xx - cos_z) / sin_z;
        }
        z
    }

    fn is_finite(self) -> bool {
        self.hi.is_finite() && self.lo.is_finite()
    }

    fn is_nan(self) -> bool {
        self.hi.is_nan() || self.lo.is_nan()
    }

    fn abs(self) -> Self {
        if self.hi < 0.0 || (self.hi == 0.0 && self.lo < 0.0) {
            -self
        } else {
            self
        }
    }
}

//! Real-harmonic rotation matrices by the Ivanic–Ruedenberg recursion.
//!
//! For a Cartesian rotation `R`, the block `D^l` acting on the `2l + 1` coefficients of degree
//! `l` is built from `D^{l−1}` and `D^1`, where `D^1` is `R` with rows and columns reordered as
//! `(y, z, x)` to match the `m = −1, 0, 1` layout. The recursion only involves square roots of
//! integer ratios, so fixed frame changes with integer entries are reproduced to the working
//! precision of the scalar type.

use nalgebra::{DMatrix, Matrix3};

use crate::scalar::Real;
use crate::special::{invsqrt_int_t, sqrt_int_t};

/// `(y, z, x)` position of each Cartesian axis.
const YZX: [usize; 3] = [1, 2, 0];

struct Recursion<'a, T: Real> {
    l: i64,
    r1: &'a DMatrix<T>,
    prev: &'a DMatrix<T>,
}

impl<T: Real> Recursion<'_, T> {
    #[inline]
    fn r1(&self, i: i64, j: i64) -> T {
        self.r1[((i + 1) as usize, (j + 1) as usize)]
    }

    #[inline]
    fn prev(&self, a: i64, b: i64) -> T {
        let lp = self.l - 1;
        self.prev[((a + lp) as usize, (b + lp) as usize)]
    }

    fn p(&self, i: i64, a: i64, b: i64) -> T {
        let l = self.l;
        if b.abs() < l {
            self.r1(i, 0) * self.prev(a, b)
        } else if b == l {
            self.r1(i, 1) * self.prev(a, l - 1) - self.r1(i, -1) * self.prev(a, -l + 1)
        } else {
            self.r1(i, 1) * self.prev(a, -l + 1) + self.r1(i, -1) * self.prev(a, l - 1)
        }
    }

    fn u(&self, m: i64, mp: i64) -> T {
        self.p(0, m, mp)
    }

    fn v(&self, m: i64, mp: i64) -> T {
        if m == 0 {
            self.p(1, 1, mp) + self.p(-1, -1, mp)
        } else if m > 0 {
            if m == 1 {
                T::two().sqrt() * self.p(1, 0, mp)
            } else {
                self.p(1, m - 1, mp) - self.p(-1, -m + 1, mp)
            }
        } else if m == -1 {
            T::two().sqrt() * self.p(-1, 0, mp)
        } else {
            self.p(1, m + 1, mp) + self.p(-1, -m - 1, mp)
        }
    }

    fn w(&self, m: i64, mp: i64) -> T {
        if m > 0 {
            self.p(1, m + 1, mp) + self.p(-1, -m - 1, mp)
        } else {
            self.p(1, m - 1, mp) - self.p(-1, -m + 1, mp)
        }
    }

    fn element(&self, m: i64, mp: i64) -> T {
        let l = self.l;
        let am = m.abs();
        let d = if mp.abs() < l {
            (l + mp) * (l - mp)
        } else {
            2 * l * (2 * l - 1)
        } as usize;
        let inv_d = invsqrt_int_t::<T>(d);

        let mut value = T::zero();

        let u2 = ((l + m) * (l - m)) as usize;
        if u2 != 0 {
            value += sqrt_int_t::<T>(u2) * inv_d * self.u(m, mp);
        }

        let delta0 = usize::from(m == 0);
        let v2 = (1 + delta0) * ((l + am - 1) * (l + am)) as usize;
        if v2 != 0 {
            let sign = if m == 0 { -T::one() } else { T::one() };
            value += T::half() * sign * sqrt_int_t::<T>(v2) * inv_d * self.v(m, mp);
        }

        if m != 0 {
            let w2 = ((l - am - 1) * (l - am)) as usize;
            if w2 != 0 {
                value -= T::half() * sqrt_int_t::<T>(w2) * inv_d * self.w(m, mp);
            }
        }
        value
    }
}

/// Blocks `D^0 … D^{lmax}` of the harmonic representation of the rotation `r`.
pub(crate) fn wigner_blocks<T: Real>(r: &Matrix3<T>, lmax: usize) -> Vec<DMatrix<T>> {
    let mut blocks = Vec::with_capacity(lmax + 1);
    blocks.push(DMatrix::<T>::identity(1, 1));
    if lmax == 0 {
        return blocks;
    }

    let r1 = DMatrix::<T>::from_fn(3, 3, |i, j| r[(YZX[i], YZX[j])]);
    blocks.push(r1.clone());

    for l in 2..=lmax {
        let size = 2 * l + 1;
        let rec = Recursion {
            l: l as i64,
            r1: &r1,
            prev: &blocks[l - 1],
        };
        let li = l as i64;
        let block = DMatrix::<T>::from_fn(size, size, |i, j| {
            rec.element(i as i64 - li, j as i64 - li)
        });
        blocks.push(block);
    }
    blocks
}

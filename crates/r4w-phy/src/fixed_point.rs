//! Fixed-Point Lane Arithmetic
//!
//! Saturating 16-bit primitives used by every LLR computation, in scalar
//! form and as 16-lane vector operations on [`I16x16`], plus the wide
//! [`Q`] format the demapper accumulates in.
//!
//! The [`Q`] wrapper carries the number of fractional bits in its type, so
//! a multiply states its input and output formats explicitly:
//!
//! ```rust
//! use r4w_phy::fixed_point::{Q13, Q15};
//!
//! let u = Q13::from_f64(1.0);          // 8192
//! let d = Q15::from_raw(23170);        // 1/sqrt(2)
//! let ud: Q13 = u.mul(d);              // Q13 x Q15 -> Q13
//! assert_eq!(ud.raw(), 5793);
//! ```
//!
//! ## Rounding
//!
//! All narrowing steps round half towards +inf (add half an LSB, then
//! arithmetic shift) and saturate to the destination width. Overflow is
//! never an error.

use crate::types::{Lanes, LANES};
use std::ops::Index;

/// Rounded high half of a Q15 product: `sat16((a*b + 2^14) >> 15)`.
#[inline(always)]
pub fn rounded_mul_high(a: i16, b: i16) -> i16 {
    let p = (a as i32 * b as i32 + (1 << 14)) >> 15;
    saturate_i16(p as i64)
}

/// Clamp to `[low, high]`. Never panics; if `low > high` the result is `high`.
#[inline(always)]
pub fn clamp_to_range(x: i16, low: i16, high: i16) -> i16 {
    x.max(low).min(high)
}

/// `when_greater` where `cmp_a > cmp_b`, else `when_not_greater`.
#[inline(always)]
pub fn select_high_or_low(cmp_a: i16, cmp_b: i16, when_greater: i16, when_not_greater: i16) -> i16 {
    if cmp_a > cmp_b {
        when_greater
    } else {
        when_not_greater
    }
}

/// `|magnitude|` carrying the sign of `reference` (zero counts as positive).
#[inline(always)]
pub fn copy_sign(reference: i16, magnitude: i16) -> i16 {
    let m = magnitude.saturating_abs();
    if reference < 0 {
        -m
    } else {
        m
    }
}

/// `|magnitude|` carrying the opposite sign of `reference`.
#[inline(always)]
pub fn copy_inverted_sign(reference: i16, magnitude: i16) -> i16 {
    let m = magnitude.saturating_abs();
    if reference < 0 {
        m
    } else {
        -m
    }
}

#[inline(always)]
pub(crate) fn saturate_i16(x: i64) -> i16 {
    x.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

/// Arithmetic right shift with round-half-up.
#[inline(always)]
pub(crate) fn round_shift(x: i64, shift: u32) -> i64 {
    if shift == 0 {
        x
    } else {
        (x + (1i64 << (shift - 1))) >> shift
    }
}

/// Sixteen signed 16-bit lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct I16x16(pub Lanes<i16>);

impl I16x16 {
    pub const ZERO: Self = I16x16([0; LANES]);

    #[inline]
    pub fn splat(v: i16) -> Self {
        I16x16([v; LANES])
    }

    #[inline]
    pub fn from_fn(f: impl FnMut(usize) -> i16) -> Self {
        I16x16(std::array::from_fn(f))
    }

    #[inline]
    pub fn lanes(&self) -> &Lanes<i16> {
        &self.0
    }

    #[inline]
    pub fn map(self, mut f: impl FnMut(i16) -> i16) -> Self {
        I16x16::from_fn(|i| f(self.0[i]))
    }

    #[inline]
    pub fn zip_map(self, other: Self, mut f: impl FnMut(i16, i16) -> i16) -> Self {
        I16x16::from_fn(|i| f(self.0[i], other.0[i]))
    }

    #[inline]
    pub fn rounded_mul_high(self, other: Self) -> Self {
        self.zip_map(other, rounded_mul_high)
    }

    /// Multiply every lane by the same Q15 constant.
    #[inline]
    pub fn rounded_mul_high_const(self, k: i16) -> Self {
        self.map(|x| rounded_mul_high(x, k))
    }

    #[inline]
    pub fn saturating_add(self, other: Self) -> Self {
        self.zip_map(other, i16::saturating_add)
    }

    #[inline]
    pub fn saturating_sub(self, other: Self) -> Self {
        self.zip_map(other, i16::saturating_sub)
    }

    #[inline]
    pub fn saturating_abs(self) -> Self {
        self.map(i16::saturating_abs)
    }

    /// Multiply by a small integer, saturating.
    #[inline]
    pub fn saturating_mul_int(self, k: i16) -> Self {
        self.map(|x| x.saturating_mul(k))
    }

    #[inline]
    pub fn clamp_to_range(self, low: i16, high: i16) -> Self {
        self.map(|x| clamp_to_range(x, low, high))
    }

    /// Per-lane select: `when_greater[i]` where `cmp_a[i] > cmp_b[i]`.
    #[inline]
    pub fn select_high_or_low(
        cmp_a: Self,
        cmp_b: Self,
        when_greater: Self,
        when_not_greater: Self,
    ) -> Self {
        I16x16::from_fn(|i| {
            select_high_or_low(cmp_a.0[i], cmp_b.0[i], when_greater.0[i], when_not_greater.0[i])
        })
    }

    #[inline]
    pub fn copy_sign(reference: Self, magnitude: Self) -> Self {
        reference.zip_map(magnitude, copy_sign)
    }

    #[inline]
    pub fn copy_inverted_sign(reference: Self, magnitude: Self) -> Self {
        reference.zip_map(magnitude, copy_inverted_sign)
    }

    /// Gather: lane `i` of the result is lane `indices[i]` of `self`.
    #[inline]
    pub fn permute(self, indices: &Lanes<u8>) -> Self {
        I16x16::from_fn(|i| self.0[indices[i] as usize & (LANES - 1)])
    }
}

impl Index<usize> for I16x16 {
    type Output = i16;

    #[inline]
    fn index(&self, lane: usize) -> &i16 {
        &self.0[lane]
    }
}

impl From<Lanes<i16>> for I16x16 {
    fn from(lanes: Lanes<i16>) -> Self {
        I16x16(lanes)
    }
}

/// Signed fixed-point value with `F` fractional bits, held in an `i32`.
///
/// The wide storage lets intermediate sums run past 16 bits; narrowing back
/// to `i16` is always explicit via [`Q::saturate_i16`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Q<const F: u32>(i32);

/// Q2.13: symbols, beta, thresholds and piecewise metrics.
pub type Q13 = Q<13>;
/// Q0.15: constellation reciprocals.
pub type Q15 = Q<15>;

impl<const F: u32> Q<F> {
    pub const FRAC_BITS: u32 = F;
    pub const ZERO: Self = Q(0);

    #[inline]
    pub const fn from_raw(raw: i32) -> Self {
        Q(raw)
    }

    #[inline]
    pub const fn raw(self) -> i32 {
        self.0
    }

    #[inline]
    pub fn from_i16(raw: i16) -> Self {
        Q(raw as i32)
    }

    /// Round a real value into this format (saturating at the `i32` range).
    pub fn from_f64(x: f64) -> Self {
        Q((x * (1u64 << F) as f64).round() as i32)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / (1u64 << F) as f64
    }

    #[inline]
    pub fn saturate_i16(self) -> i16 {
        saturate_i16(self.0 as i64)
    }

    /// Rounded product in output format `O`; requires `F + G >= O`.
    #[inline]
    pub fn mul<const G: u32, const O: u32>(self, rhs: Q<G>) -> Q<O> {
        debug_assert!(F + G >= O, "product format Q{} cannot widen to Q{}", F + G, O);
        let p = self.0 as i64 * rhs.0 as i64;
        Q(round_shift(p, F + G - O).clamp(i32::MIN as i64, i32::MAX as i64) as i32)
    }

    /// Multiply by a raw `i16` with `factor_frac` fractional bits and narrow
    /// to `i16` with `out_frac` fractional bits. Requires `F + factor_frac >= out_frac`.
    #[inline]
    pub fn mul_to_i16(self, factor: i16, factor_frac: u32, out_frac: u32) -> i16 {
        debug_assert!(F + factor_frac >= out_frac);
        let p = self.0 as i64 * factor as i64;
        saturate_i16(round_shift(p, F + factor_frac - out_frac))
    }

    #[inline]
    pub fn saturating_add(self, other: Self) -> Self {
        Q(self.0.saturating_add(other.0))
    }

    #[inline]
    pub fn saturating_abs(self) -> Self {
        Q(self.0.saturating_abs())
    }

    #[inline]
    pub fn saturating_mul_int(self, k: i32) -> Self {
        Q(self.0.saturating_mul(k))
    }
}

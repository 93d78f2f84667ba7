//! Fixed-point numbers and the integer primitives the detector is built on.
//!
//! [`Fixed<N>`] is a 16-bit value with `N` fractional bits. Moving between
//! formats always goes through [`Fixed::convert`] or
//! [`Fixed::convert_rounded`], so every rescale is visible in the code.
//! Arithmetic wraps at 16 bits, matching the reference integer behavior the
//! model constants were tuned against.

use std::fmt;
use std::ops::{Add, Sub};

/// A signed 16-bit fixed-point value with `FRAC` fractional bits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Fixed<const FRAC: u32>(i16);

/// Log-energy features.
pub type Q4 = Fixed<4>;
/// Model means and standard deviations.
pub type Q7 = Fixed<7>;

impl<const FRAC: u32> Fixed<FRAC> {
    pub const FRACTIONAL_BITS: u32 = FRAC;

    pub const fn from_raw(raw: i16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i16 {
        self.0
    }

    pub fn to_f32(self) -> f32 {
        f32::from(self.0) / (1u32 << FRAC) as f32
    }

    /// Re-express in `TO` fractional bits.
    ///
    /// Dropped bits are truncated toward negative infinity; gained bits are
    /// shifted in as zeros and the result wraps at 16 bits.
    pub fn convert<const TO: u32>(self) -> Fixed<TO> {
        let raw = i32::from(self.0);
        let shifted = if TO >= FRAC {
            raw << (TO - FRAC)
        } else {
            raw >> (FRAC - TO)
        };
        Fixed(shifted as i16)
    }

    /// Like [`convert`](Self::convert), but rounds half up when dropping bits.
    pub fn convert_rounded<const TO: u32>(self) -> Fixed<TO> {
        if TO >= FRAC {
            return self.convert();
        }
        let shift = FRAC - TO;
        let raw = i32::from(self.0) + (1 << (shift - 1));
        Fixed((raw >> shift) as i16)
    }
}

impl<const FRAC: u32> Add for Fixed<FRAC> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(rhs.0))
    }
}

impl<const FRAC: u32> Sub for Fixed<FRAC> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.wrapping_sub(rhs.0))
    }
}

impl<const FRAC: u32> fmt::Debug for Fixed<FRAC> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}({} = {})", FRAC, self.0, self.to_f32())
    }
}

// ── Integer primitives ──────────────────────────────────────────────────────

/// Left shifts needed to normalize `a` as a signed 32-bit value. Zero for 0.
pub(crate) fn norm_w32(a: i32) -> i16 {
    if a == 0 {
        return 0;
    }
    let magnitude = if a < 0 { !a } else { a };
    magnitude.leading_zeros() as i16 - 1
}

/// Left shifts needed to normalize `a` as an unsigned 32-bit value. Zero for 0.
pub(crate) fn norm_u32(a: u32) -> i16 {
    if a == 0 {
        0
    } else {
        a.leading_zeros() as i16
    }
}

pub(crate) fn size_in_bits(n: u32) -> i16 {
    32 - n.leading_zeros() as i16
}

/// 32-by-16 bit division, saturating to `i32::MAX` on a zero divisor.
pub(crate) fn div_w32_w16(num: i32, den: i16) -> i32 {
    if den == 0 {
        i32::MAX
    } else {
        num.wrapping_div(i32::from(den))
    }
}

/// Right shift that keeps the sum of `len` squares of `samples` within 31 bits.
///
/// Magnitudes are taken in 16 bits, so `i16::MIN` wraps to itself and never
/// becomes the maximum.
fn scaling_square(samples: &[i16], len: usize) -> i32 {
    let nbits = i32::from(size_in_bits(len as u32));
    let smax = samples
        .iter()
        .map(|&s| s.wrapping_abs())
        .fold(-1i16, i16::max);
    let t = i32::from(norm_w32(i32::from(smax) * i32::from(smax)));
    if t > nbits {
        0
    } else {
        nbits - t
    }
}

/// Scaled energy of a vector: `(sum of squares >> scale, scale)`.
pub(crate) fn energy(samples: &[i16]) -> (i32, i32) {
    let scaling = scaling_square(samples, samples.len());
    let sum = samples.iter().fold(0i32, |acc, &s| {
        acc.wrapping_add((i32::from(s) * i32::from(s)) >> scaling)
    });
    (sum, scaling)
}

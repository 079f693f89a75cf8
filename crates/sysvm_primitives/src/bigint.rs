//! Big-integer helpers for the call-data wire form.
//!
//! Arguments and return values carry integers as minimal big-endian bytes:
//! zero is the empty string and leading zero bytes are ignored on input.

use primitive_types::{U256, U512};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BigIntError {
    #[error("integer does not fit in {0} bits")]
    Overflow(u32),
}

fn strip_leading_zeros(b: &[u8]) -> &[u8] {
    let first = b.iter().position(|&x| x != 0).unwrap_or(b.len());
    &b[first..]
}

/// Parse minimal (or zero-padded) big-endian bytes into a `U256`.
pub fn u256_from_be(b: &[u8]) -> Result<U256, BigIntError> {
    let b = strip_leading_zeros(b);
    if b.len() > 32 {
        return Err(BigIntError::Overflow(256));
    }
    Ok(U256::from_big_endian(b))
}

/// Minimal big-endian encoding; zero encodes as the empty vector.
#[must_use]
pub fn u256_to_be(v: &U256) -> Vec<u8> {
    let mut buf = [0u8; 32];
    v.to_big_endian(&mut buf);
    strip_leading_zeros(&buf).to_vec()
}

pub fn u64_from_be(b: &[u8]) -> Result<u64, BigIntError> {
    let b = strip_leading_zeros(b);
    if b.len() > 8 {
        return Err(BigIntError::Overflow(64));
    }
    Ok(b.iter().fold(0u64, |acc, &x| (acc << 8) | u64::from(x)))
}

#[must_use]
pub fn u64_to_be(v: u64) -> Vec<u8> {
    strip_leading_zeros(&v.to_be_bytes()).to_vec()
}

/// Nearest `f64` to `v`, folding limbs from the most significant one.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn to_f64(v: &U256) -> f64 {
    const LIMB: f64 = 18_446_744_073_709_551_616.0;
    v.0.iter().rev().fold(0.0, |acc, &limb| acc.mul_add(LIMB, limb as f64))
}

/// `floor(value * percentage)` computed exactly.
///
/// The `f64` is split into its integer mantissa and binary exponent so the
/// product is a 512-bit integer shift; every node truncates the same bits.
/// Non-finite or non-positive percentages yield zero, results above
/// `U256::MAX` saturate.
#[must_use]
pub fn percentage_of(value: &U256, percentage: f64) -> U256 {
    if !percentage.is_finite() || percentage <= 0.0 {
        return U256::zero();
    }
    let bits = percentage.to_bits();
    let raw_exp = i32::try_from((bits >> 52) & 0x7ff).unwrap_or(0);
    let frac = bits & ((1u64 << 52) - 1);
    let (mantissa, exp) = if raw_exp == 0 {
        (frac, -1074)
    } else {
        (frac | (1u64 << 52), raw_exp - 1075)
    };

    let product: U512 = value.full_mul(U256::from(mantissa));
    let shifted = if exp >= 0 {
        let shift = exp.unsigned_abs() as usize;
        if shift >= 256 || product.bits() + shift > 512 {
            return U256::MAX;
        }
        product << shift
    } else {
        let shift = exp.unsigned_abs() as usize;
        if shift >= 512 {
            return U256::zero();
        }
        product >> shift
    };
    U256::try_from(shifted).unwrap_or(U256::MAX)
}

/// Signed balance change on top of a committed `U256` balance.
///
/// Buffered deltas may be transiently negative; the account-commit layer
/// rejects a final negative balance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BalanceDelta {
    negative: bool,
    magnitude: U256,
}

impl BalanceDelta {
    #[must_use]
    pub fn zero() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn positive(magnitude: U256) -> Self {
        Self {
            negative: false,
            magnitude,
        }
    }

    #[must_use]
    pub fn negative(magnitude: U256) -> Self {
        Self {
            negative: !magnitude.is_zero(),
            magnitude,
        }
    }

    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.negative
    }

    #[must_use]
    pub const fn magnitude(&self) -> U256 {
        self.magnitude
    }

    pub fn add(&mut self, value: U256) {
        if self.negative {
            if value >= self.magnitude {
                *self = Self::positive(value - self.magnitude);
            } else {
                self.magnitude -= value;
            }
        } else {
            self.magnitude = self.magnitude.saturating_add(value);
        }
    }

    pub fn sub(&mut self, value: U256) {
        if self.negative {
            self.magnitude = self.magnitude.saturating_add(value);
        } else if value > self.magnitude {
            *self = Self::negative(value - self.magnitude);
        } else {
            self.magnitude -= value;
        }
    }

    /// `base + self`, clamped at zero.
    #[must_use]
    pub fn apply_to(&self, base: U256) -> U256 {
        if self.negative {
            base.saturating_sub(self.magnitude)
        } else {
            base.saturating_add(self.magnitude)
        }
    }
}

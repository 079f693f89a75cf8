#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

//! sysvm primitives shared by the execution context and the system contracts.
//!
//! - Minimal big-endian wire form for `U256` arguments and return values
//! - Exact `value * percentage` on 256-bit integers
//! - Signed balance deltas
//! - Field-by-field storage codec (fixed-width LE integers, LE32 length framing)
//! - Domain-tagged SHA3-256 used for deterministic shuffling

use sha3::{Digest, Sha3_256};

pub mod bigint;
pub mod codec;
pub mod constants;

pub use bigint::{
    percentage_of, to_f64, u256_from_be, u256_to_be, u64_from_be, u64_to_be, BalanceDelta,
    BigIntError,
};
pub use codec::{CodecError, Reader, Writer};
pub use primitive_types::U256;

/// 32-byte hash (SHA3-256 output).
pub type Hash256 = [u8; 32];

/// Convert an unsigned integer to fixed-width little-endian bytes.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn le_bytes<const W: usize>(mut x: u128) -> [u8; W] {
    let mut out = [0u8; W];
    for b in &mut out {
        *b = (x & 0xFF) as u8;
        x >>= 8;
    }
    out
}

/// Read a `u64` from the first 8 bytes of a little-endian byte slice.
#[must_use]
pub fn u64_from_le(b: &[u8]) -> u64 {
    b.iter()
        .take(8)
        .enumerate()
        .fold(0u64, |acc, (i, &x)| acc | (u64::from(x) << (8 * i)))
}

/// `H(tag, parts[])` = `SHA3_256`( UTF8(tag) || Σ ( LE(|p|,8) || p ) )
#[must_use]
pub fn h_tag(tag: &str, parts: &[&[u8]]) -> Hash256 {
    debug_assert!(
        tag.starts_with("sysvm."),
        "non-sysvm.* tag used in consensus hashing: {tag}"
    );
    let mut hasher = Sha3_256::new();
    hasher.update(tag.as_bytes());
    for p in parts {
        hasher.update(le_bytes::<8>(p.len() as u128));
        hasher.update(p);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

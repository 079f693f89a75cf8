//! Field-by-field storage codec.
//!
//! Integers are fixed-width little-endian, byte strings and lists carry an
//! LE32 length prefix, big integers are length-prefixed minimal big-endian
//! and booleans are a single `0`/`1` byte. Decoders reject short input,
//! trailing bytes and non-canonical booleans.

use crate::bigint::{u256_from_be, u256_to_be};
use primitive_types::U256;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("short")]
    Short,
    #[error("trailing")]
    Trailing,
    #[error("invalid bool byte {0}")]
    InvalidBool(u8),
    #[error("length {0} out of range")]
    Length(u64),
    #[error("big integer wider than 256 bits")]
    BigInt,
}

const fn read_exact<'a>(src: &mut &'a [u8], n: usize) -> Result<&'a [u8], CodecError> {
    if src.len() < n {
        return Err(CodecError::Short);
    }
    let (a, b) = src.split_at(n);
    *src = b;
    Ok(a)
}

#[derive(Default, Debug)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i64(&mut self, v: i64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.buf.push(u8::from(v));
        self
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.u32(v.len() as u32);
        self.buf.extend_from_slice(v);
        self
    }

    pub fn big(&mut self, v: &U256) -> &mut Self {
        self.bytes(&u256_to_be(v))
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn list(&mut self, items: &[Vec<u8>]) -> &mut Self {
        self.u32(items.len() as u32);
        for item in items {
            self.bytes(item);
        }
        self
    }

    #[must_use]
    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

#[derive(Debug)]
pub struct Reader<'a> {
    src: &'a [u8],
}

impl<'a> Reader<'a> {
    #[must_use]
    pub const fn new(src: &'a [u8]) -> Self {
        Self { src }
    }

    pub fn u32(&mut self) -> Result<u32, CodecError> {
        let b = read_exact(&mut self.src, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64(&mut self) -> Result<u64, CodecError> {
        let mut a = [0u8; 8];
        a.copy_from_slice(read_exact(&mut self.src, 8)?);
        Ok(u64::from_le_bytes(a))
    }

    pub fn i64(&mut self) -> Result<i64, CodecError> {
        let mut a = [0u8; 8];
        a.copy_from_slice(read_exact(&mut self.src, 8)?);
        Ok(i64::from_le_bytes(a))
    }

    pub fn bool(&mut self) -> Result<bool, CodecError> {
        match read_exact(&mut self.src, 1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(CodecError::InvalidBool(b)),
        }
    }

    pub fn bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.u32()?;
        let n = usize::try_from(len).map_err(|_| CodecError::Length(u64::from(len)))?;
        Ok(read_exact(&mut self.src, n)?.to_vec())
    }

    pub fn big(&mut self) -> Result<U256, CodecError> {
        let raw = self.bytes()?;
        u256_from_be(&raw).map_err(|_| CodecError::BigInt)
    }

    pub fn list(&mut self) -> Result<Vec<Vec<u8>>, CodecError> {
        let count = self.u32()?;
        // each item needs at least its 4-byte length prefix
        if u64::from(count) * 4 > self.src.len() as u64 {
            return Err(CodecError::Length(u64::from(count)));
        }
        (0..count).map(|_| self.bytes()).collect()
    }

    pub const fn finish(self) -> Result<(), CodecError> {
        if self.src.is_empty() {
            Ok(())
        } else {
            Err(CodecError::Trailing)
        }
    }
}

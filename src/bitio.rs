// In: src/bitio.rs

//! The bit-level channel consumed by every kernel in this crate.
//!
//! The codec core needs exactly two primitive operations: append `n` bits of a
//! value to a growing buffer, and read `n` bits back from a finished buffer.
//! No byte alignment is assumed between fields. The bit order is a wire-format
//! contract: **MSB-first** within each written value, and values are packed
//! front-to-back into `Msb0` byte storage.
//!
//! Backed by `bitvec`, which keeps the packing logic declarative and the
//! partially-filled tail byte well-defined.

use bitvec::prelude::*;

use crate::error::{LontarError, Result};

//==================================================================================
// 1. BitWriter
//==================================================================================

/// Append-only bit sink for the encode direction.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    bits: BitVec<u8, Msb0>,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bit(&mut self, bit: bool) {
        self.bits.push(bit);
    }

    /// Appends the low `width` bits of `value`, most significant bit first.
    pub fn write_bits(&mut self, value: u32, width: u32) {
        debug_assert!(width <= 32, "bit field wider than 32");
        for i in (0..width).rev() {
            self.bits.push((value >> i) & 1 == 1);
        }
    }

    /// Current bit cursor; callers use this to account overhead sizes.
    pub fn bit_len(&self) -> usize {
        self.bits.len()
    }

    /// Borrow the written bits for sequential re-reading.
    pub fn as_bits(&self) -> &BitSlice<u8, Msb0> {
        &self.bits
    }

    /// Finishes the stream, zero-padding the trailing partial byte.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut bits = self.bits;
        bits.set_uninitialized(false);
        bits.into_vec()
    }
}

//==================================================================================
// 2. BitReader
//==================================================================================

/// Sequential bit source for the decode direction. The whole buffer is assumed
/// to be in memory; running off its end is a `Truncated` format error, never a
/// blocking wait.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    bits: &'a BitSlice<u8, Msb0>,
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(bits: &'a BitSlice<u8, Msb0>) -> Self {
        Self { bits, pos: 0 }
    }

    pub fn from_bytes(bytes: &'a [u8]) -> Self {
        Self::new(bytes.view_bits::<Msb0>())
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        let bit = self
            .bits
            .get(self.pos)
            .map(|b| *b)
            .ok_or(LontarError::Truncated)?;
        self.pos += 1;
        Ok(bit)
    }

    /// Reads a `width`-bit value, most significant bit first.
    pub fn read_bits(&mut self, width: u32) -> Result<u32> {
        debug_assert!(width <= 32, "bit field wider than 32");
        let mut value = 0u32;
        for _ in 0..width {
            value = (value << 1) | self.read_bit()? as u32;
        }
        Ok(value)
    }

    pub fn bit_pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bits.len() - self.pos
    }
}

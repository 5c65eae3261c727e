//! Bit-precise read cursor over a single cell
//!
//! This module, along with its `error` submodule, provides the fundamental
//! definitions for reading the raw bit-level fragments that make up the
//! leaves of an arbitrarily complex user-defined type.
//!
//! For type-aware parsing, in other words, parsing user-defined types
//! directly rather than as an unstructured sequence of primitives,
//! see the [`Decode`](crate::conv::Decode) trait, which is a
//! high-level interface built almost entirely around [`CellParser`].
//!
//! # Model
//!
//!  * A `CellParser` is opened over an immutable [`Cell`] and holds two
//!    independent offsets: one into the data bits and one into the
//!    reference list.
//!  * Reads are sequential. A bit or a reference can only be consumed once,
//!    and only after everything before it has been consumed; the lookahead
//!    methods [`CellParser::peek_bits`] and [`CellParser::try_tag`] are the
//!    sole exceptions, and never advance the cursor on failure.
//!  * Following a reference yields a `&Cell` borrowed for the same lifetime
//!    as the parser itself; decoding its contents is done by opening a fresh
//!    `CellParser` over it.
//!  * A failed read leaves both offsets unchanged.

pub mod error;

pub use error::ParseResult;
use error::{ExhaustionError, TagError};

use num_bigint::{BigInt, BigUint};

use crate::cell::{BitStr, BitString, Cell};
use crate::conv::error::EncodeError;
use crate::error::WidthError;
use crate::tag::Tag;

/// Read cursor over the data bits and references of one [`Cell`]
#[derive(Clone, Debug)]
pub struct CellParser<'a> {
    cell: &'a Cell,
    bit_offset: usize,
    ref_offset: usize,
}

impl<'a> CellParser<'a> {
    #[must_use]
    pub fn new(cell: &'a Cell) -> Self {
        Self {
            cell,
            bit_offset: 0,
            ref_offset: 0,
        }
    }

    /// The cell this parser reads from
    #[must_use]
    pub fn cell(&self) -> &'a Cell {
        self.cell
    }

    #[must_use]
    #[inline]
    pub fn bit_offset(&self) -> usize {
        self.bit_offset
    }

    #[must_use]
    #[inline]
    pub fn ref_offset(&self) -> usize {
        self.ref_offset
    }

    #[must_use]
    #[inline]
    pub fn remaining_bits(&self) -> usize {
        self.cell.bit_len() - self.bit_offset
    }

    #[must_use]
    #[inline]
    pub fn remaining_refs(&self) -> usize {
        self.cell.refs().len() - self.ref_offset
    }

    /// Returns `true` when every bit and reference has been consumed
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining_bits() == 0 && self.remaining_refs() == 0
    }

    /// Rewinds both offsets to the start of the cell
    pub fn reset(&mut self) {
        self.bit_offset = 0;
        self.ref_offset = 0;
    }

    fn check_bits(&self, n: usize) -> ParseResult<()> {
        if n > self.remaining_bits() {
            Err(ExhaustionError::InsufficientBits {
                requested: n,
                remaining: self.remaining_bits(),
            }
            .into())
        } else {
            Ok(())
        }
    }

    /// Returns the next `n` bits without consuming them
    pub fn peek_bits(&self, n: usize) -> ParseResult<&'a BitStr> {
        self.check_bits(n)?;
        let start = self.bit_offset;
        Ok(&self.cell.data()[start..start + n])
    }

    pub fn read_bits(&mut self, n: usize) -> ParseResult<&'a BitStr> {
        let out = self.peek_bits(n)?;
        self.bit_offset += n;
        Ok(out)
    }

    pub fn skip_bits(&mut self, n: usize) -> ParseResult<()> {
        self.check_bits(n)?;
        self.bit_offset += n;
        Ok(())
    }

    pub fn read_bit(&mut self) -> ParseResult<bool> {
        Ok(self.read_bits(1)?[0])
    }

    /// Reads an unsigned big-endian integer of `n <= 64` bits
    pub fn read_uint(&mut self, n: usize) -> ParseResult<u64> {
        if n > 64 {
            return Err(WidthError::TooWide {
                limit: 64,
                actual: n,
            }
            .into());
        }
        let bits = self.read_bits(n)?;
        Ok(bits_to_u64(bits))
    }

    /// Reads a two's-complement big-endian integer of `n <= 64` bits
    pub fn read_int(&mut self, n: usize) -> ParseResult<i64> {
        let raw = self.read_uint(n)?;
        if n == 0 {
            return Ok(0);
        }
        let shift = 64 - n as u32;
        Ok(((raw << shift) as i64) >> shift)
    }

    /// Reads an unsigned big-endian integer of arbitrary width
    pub fn read_biguint(&mut self, n: usize) -> ParseResult<BigUint> {
        let bits = self.read_bits(n)?;
        Ok(bits_to_biguint(bits))
    }

    /// Reads a two's-complement big-endian integer of arbitrary width
    pub fn read_bigint(&mut self, n: usize) -> ParseResult<BigInt> {
        let bits = self.read_bits(n)?;
        let magnitude = bits_to_biguint(bits);
        if n > 0 && bits[0] {
            Ok(BigInt::from(magnitude) - (BigInt::from(1u8) << n))
        } else {
            Ok(BigInt::from(magnitude))
        }
    }

    /// Reads `n` whole bytes, which need not be byte-aligned in the cell
    pub fn read_bytes(&mut self, n: usize) -> ParseResult<Vec<u8>> {
        let bits = self.read_bits(n * 8)?;
        Ok(bits.chunks(8).map(|byte| bits_to_u64(byte) as u8).collect())
    }

    pub fn read_array<const N: usize>(&mut self) -> ParseResult<[u8; N]> {
        let bits = self.read_bits(N * 8)?;
        let mut out = [0u8; N];
        for (dst, byte) in out.iter_mut().zip(bits.chunks(8)) {
            *dst = bits_to_u64(byte) as u8;
        }
        Ok(out)
    }

    /// Reads a unary-coded natural: a run of one-bits closed by a zero-bit
    pub fn read_unary(&mut self) -> ParseResult<usize> {
        let mut n = 0;
        let start = self.bit_offset;
        loop {
            match self.read_bit() {
                Ok(true) => n += 1,
                Ok(false) => return Ok(n),
                Err(err) => {
                    self.bit_offset = start;
                    return Err(err);
                }
            }
        }
    }

    /// Consumes the next reference
    pub fn next_ref(&mut self) -> ParseResult<&'a Cell> {
        let out = self.ref_at(self.ref_offset)?;
        self.ref_offset += 1;
        Ok(out)
    }

    /// Borrows the reference at `index` without moving the reference offset
    pub fn ref_at(&self, index: usize) -> ParseResult<&'a Cell> {
        let cell: &'a Cell = self.cell;
        match cell.reference(index) {
            Some(r) => Ok(r.as_ref()),
            None => Err(ExhaustionError::InsufficientRefs {
                index,
                available: cell.refs().len(),
            }
            .into()),
        }
    }

    /// Consumes `tag` if the upcoming bits spell it out, leaving the cursor
    /// unchanged otherwise.
    ///
    /// Running out of bits counts as a mismatch rather than an error.
    pub fn try_tag(&mut self, tag: &Tag) -> ParseResult<bool> {
        let width = tag.len() as usize;
        if width > self.remaining_bits() {
            return Ok(false);
        }
        let bits = self.peek_bits(width)?;
        if bits_to_u64(bits) == tag.value() {
            self.bit_offset += width;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Consumes `tag`, failing with a [`TagError`] naming `for_type` if the
    /// upcoming bits differ.
    pub fn expect_tag(&mut self, tag: &Tag, for_type: &'static str) -> ParseResult<()> {
        let width = tag.len() as usize;
        let actual = bits_to_u64(self.peek_bits(width)?);
        if actual == tag.value() {
            self.bit_offset += width;
            Ok(())
        } else {
            Err(TagError::new(*tag, actual, for_type).into())
        }
    }

    /// Consumes everything left in the cell, returning it as a standalone cell.
    ///
    /// When nothing has been read yet this is the cell itself, exotic kind
    /// included.
    pub fn read_remainder(&mut self) -> ParseResult<Cell> {
        if self.bit_offset == 0 && self.ref_offset == 0 {
            self.bit_offset = self.cell.bit_len();
            self.ref_offset = self.cell.refs().len();
            return Ok(self.cell.clone());
        }
        let data: BitString = self.cell.data()[self.bit_offset..].to_bitvec();
        let refs = self.cell.refs()[self.ref_offset..].to_vec();
        let out = Cell::ordinary(data, refs).map_err(overflow_to_parse)?;
        self.bit_offset = self.cell.bit_len();
        self.ref_offset = self.cell.refs().len();
        Ok(out)
    }
}

fn overflow_to_parse(err: EncodeError) -> error::ParseError {
    error::ParseError::invalid(err.to_string())
}

pub(crate) fn bits_to_u64(bits: &BitStr) -> u64 {
    bits.iter()
        .by_vals()
        .fold(0u64, |acc, b| (acc << 1) | u64::from(b))
}

pub(crate) fn bits_to_biguint(bits: &BitStr) -> BigUint {
    let mut padded = BitString::repeat(false, (8 - bits.len() % 8) % 8);
    padded.extend_from_bitslice(bits);
    BigUint::from_bytes_be(&padded.into_vec())
}

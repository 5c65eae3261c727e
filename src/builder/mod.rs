//! Write cursor that assembles a single cell
//!
//! [`CellBuilder`] is the dual of [`CellParser`](crate::parse::CellParser):
//! it accumulates data bits and child references, refusing any write that
//! would take the cell past [`MAX_BITS`] bits or [`MAX_REFS`] references,
//! and turns into an immutable [`Cell`] once [`build`](CellBuilder::build)
//! is called.
//!
//! Unless otherwise indicated, every `store_*` method either writes its
//! whole input or leaves the builder untouched.

use std::sync::Arc;

use num_bigint::{BigInt, BigUint, Sign};

use crate::cell::{BitStr, BitString, Cell, CellKind, MAX_BITS, MAX_REFS};
use crate::conv::error::{EncodeError, EncodeResult, Resource};
use crate::tag::Tag;

#[derive(Clone, Debug)]
pub struct CellBuilder {
    kind: CellKind,
    data: BitString,
    refs: Vec<Arc<Cell>>,
}

impl Default for CellBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CellBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            kind: CellKind::Ordinary,
            data: BitString::new(),
            refs: Vec::new(),
        }
    }

    /// Starts an exotic cell of the given kind.
    ///
    /// The caller is responsible for writing the type byte first.
    #[must_use]
    pub fn exotic(kind: CellKind) -> Self {
        Self {
            kind,
            ..Self::new()
        }
    }

    #[must_use]
    #[inline]
    pub fn bit_len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    #[inline]
    pub fn ref_count(&self) -> usize {
        self.refs.len()
    }

    #[must_use]
    #[inline]
    pub fn remaining_bits(&self) -> usize {
        MAX_BITS - self.data.len()
    }

    #[must_use]
    #[inline]
    pub fn remaining_refs(&self) -> usize {
        MAX_REFS - self.refs.len()
    }

    fn reserve_bits(&self, n: usize) -> EncodeResult<()> {
        if n > self.remaining_bits() {
            Err(EncodeError::Overflow {
                resource: Resource::Bits,
                requested: n,
                available: self.remaining_bits(),
            })
        } else {
            Ok(())
        }
    }

    pub fn store_bit(&mut self, bit: bool) -> EncodeResult<()> {
        self.reserve_bits(1)?;
        self.data.push(bit);
        Ok(())
    }

    pub fn store_bits(&mut self, bits: &BitStr) -> EncodeResult<()> {
        self.reserve_bits(bits.len())?;
        self.data.extend_from_bitslice(bits);
        Ok(())
    }

    /// Stores the low `n <= 64` bits of `value` big-endian.
    ///
    /// Fails with [`EncodeError::ValueTooWide`] if `value` has any set bit
    /// at or above position `n`.
    pub fn store_uint(&mut self, value: u64, n: usize) -> EncodeResult<()> {
        debug_assert!(n <= 64, "store_uint called with width {n}");
        if n < 64 && value >> n != 0 {
            return Err(EncodeError::ValueTooWide { bits: n });
        }
        self.reserve_bits(n)?;
        for i in (0..n).rev() {
            self.data.push((value >> i) & 1 == 1);
        }
        Ok(())
    }

    /// Stores `value` as an `n <= 64` bit two's-complement integer
    pub fn store_int(&mut self, value: i64, n: usize) -> EncodeResult<()> {
        debug_assert!(n <= 64, "store_int called with width {n}");
        if n == 0 {
            return if value == 0 {
                Ok(())
            } else {
                Err(EncodeError::ValueTooWide { bits: 0 })
            };
        }
        if n < 64 {
            let bound = 1i64 << (n - 1);
            if value < -bound || value >= bound {
                return Err(EncodeError::ValueTooWide { bits: n });
            }
        }
        let raw = if n == 64 {
            value as u64
        } else {
            (value as u64) & ((1u64 << n) - 1)
        };
        self.store_uint(raw, n)
    }

    pub fn store_biguint(&mut self, value: &BigUint, n: usize) -> EncodeResult<()> {
        if value.bits() as usize > n {
            return Err(EncodeError::ValueTooWide { bits: n });
        }
        self.reserve_bits(n)?;
        let bytes = value.to_bytes_be();
        let bits = BitString::from_slice(&bytes);
        let pad = n - value.bits() as usize;
        let significant = &bits[bits.len() - value.bits() as usize..];
        for _ in 0..pad {
            self.data.push(false);
        }
        self.data.extend_from_bitslice(significant);
        Ok(())
    }

    pub fn store_bigint(&mut self, value: &BigInt, n: usize) -> EncodeResult<()> {
        if n == 0 {
            return if value.sign() == Sign::NoSign {
                Ok(())
            } else {
                Err(EncodeError::ValueTooWide { bits: 0 })
            };
        }
        let modulus = BigInt::from(1u8) << n;
        let half = BigInt::from(1u8) << (n - 1);
        let low = -half.clone();
        if *value < low || *value >= half {
            return Err(EncodeError::ValueTooWide { bits: n });
        }
        let raw = if value.sign() == Sign::Minus {
            value + &modulus
        } else {
            value.clone()
        };
        match raw.to_biguint() {
            Some(raw) => self.store_biguint(&raw, n),
            None => Err(EncodeError::ValueTooWide { bits: n }),
        }
    }

    pub fn store_bytes(&mut self, bytes: &[u8]) -> EncodeResult<()> {
        self.reserve_bits(bytes.len() * 8)?;
        self.data.extend_from_raw_slice(bytes);
        Ok(())
    }

    /// Stores a unary-coded natural: `n` one-bits closed by a zero-bit
    pub fn store_unary(&mut self, n: usize) -> EncodeResult<()> {
        self.reserve_bits(n + 1)?;
        for _ in 0..n {
            self.data.push(true);
        }
        self.data.push(false);
        Ok(())
    }

    pub fn store_tag(&mut self, tag: &Tag) -> EncodeResult<()> {
        self.store_uint(tag.value(), tag.len() as usize)
    }

    pub fn store_ref(&mut self, cell: impl Into<Arc<Cell>>) -> EncodeResult<()> {
        if self.remaining_refs() == 0 {
            return Err(EncodeError::Overflow {
                resource: Resource::Refs,
                requested: 1,
                available: 0,
            });
        }
        self.refs.push(cell.into());
        Ok(())
    }

    /// Appends the data bits and references of `cell` to this builder
    pub fn store_contents(&mut self, cell: &Cell) -> EncodeResult<()> {
        self.reserve_bits(cell.bit_len())?;
        if cell.refs().len() > self.remaining_refs() {
            return Err(EncodeError::Overflow {
                resource: Resource::Refs,
                requested: cell.refs().len(),
                available: self.remaining_refs(),
            });
        }
        self.data.extend_from_bitslice(cell.data());
        self.refs.extend(cell.refs().iter().cloned());
        Ok(())
    }

    /// Finalizes the builder into an immutable cell
    pub fn build(self) -> EncodeResult<Cell> {
        Cell::new(self.kind, self.data, self.refs)
    }
}

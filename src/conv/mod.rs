//! Core of the cell-conversion API
//!
//! This module contains definitions for the high-level transcoding traits
//! `Encode` and `Decode`, which are motivationally equivalent to the
//! `Serialize` and `Deserialize` traits defined in `serde`, specialized to
//! the bit-and-reference layout of TL-B cells.
//!
//! Every statically typed record in this crate, whether hand-written like
//! those in [`block`](crate::block) or generated by the schema compiler,
//! is ultimately a pair of `Encode` and `Decode` implementations. The free
//! functions [`marshal`], [`marshal_into`], [`unmarshal`] and
//! [`unmarshal_into`] are the entry points most callers need.
//!
//! Derive macros for `Encode` and `Decode` are provided in the sub-crates
//! `encode_derive` and `decode_derive`, which are only relevant within the
//! context of this library, and otherwise offer no standalone functionality.

use std::sync::Arc;

use crate::builder::CellBuilder;
use crate::cell::Cell;
use crate::parse::{CellParser, ParseResult};

pub mod error;

pub use error::{DecodeResult, EncodeResult};

/// Trait for types that can be written into a cell under construction
///
/// Implementing [`Encode`] can be as simple as providing a definition of the
/// required method [`write_to`](Encode::write_to). The natural definition is
/// structurally inductive on the fields of the type in question, in the
/// order the TL-B constructor declares them.
pub trait Encode {
    /// Appends the serialization of this value to `b`, placing any
    /// out-of-line components in freshly built child cells.
    ///
    /// # Errors
    ///
    /// Fails with [`EncodeError::Overflow`](error::EncodeError::Overflow) if
    /// the value does not fit in the space left in `b`, or with another
    /// [`EncodeError`](error::EncodeError) if the value itself is invalid for
    /// its declared type.
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()>;

    /// Serializes this value as the sole content of a new cell.
    ///
    /// This is what a by-reference field holding this value turns into.
    /// Types that already *are* a cell override it to return themselves.
    fn to_cell(&self) -> EncodeResult<Cell> {
        let mut b = CellBuilder::new();
        self.write_to(&mut b)?;
        b.build()
    }
}

/// Trait providing methods for reading values out of a cell tree
///
/// Implementations are defined by one required method, [`parse`](Decode::parse),
/// which attempts to consume the contextually appropriate number of bits and
/// references from a [`CellParser`], either returning a valid value of the
/// implementing type or an error if parsing failed, or yielded a value that
/// was determined to be invalid.
///
/// # Derive Macro
///
/// This crate provides a derive-macro `Decode` that handles both records
/// (`struct`) and sum types (`enum`, one TL-B constructor per variant).
///
/// # Example
///
/// A typical hand-written implementation of `Decode` is provided below:
///
/// ```
/// use tlb::{CellBuilder, CellParser, Decode, Encode, ParseResult};
///
/// #[derive(Debug, PartialEq)]
/// pub struct Flagged {
///     is_valid: bool,
///     id: u8,
/// }
///
/// impl Decode for Flagged {
///     fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
///         Ok(Self {
///             is_valid: bool::parse(p)?,
///             id: u8::parse(p)?,
///         })
///     }
/// }
///
/// let mut b = CellBuilder::new();
/// true.write_to(&mut b).unwrap();
/// 42u8.write_to(&mut b).unwrap();
/// let cell = b.build().unwrap();
/// assert_eq!(
///     Flagged::try_decode(&cell).unwrap(),
///     Flagged { is_valid: true, id: 42 }
/// );
/// ```
pub trait Decode: Sized {
    /// Attempt to consume and interpret a value of type `Self` from the
    /// current position of `p`.
    ///
    /// # Errors
    ///
    /// In most cases, the errors returned by this method will be propagated
    /// from calls made to [`CellParser`] methods in the implementation logic.
    fn parse(p: &mut CellParser<'_>) -> ParseResult<Self>;

    /// Attempt to decode a value of the `Self` type from the start of `cell`.
    ///
    /// # Errors
    ///
    /// Propagates any error returned by [`parse`](Decode::parse).
    ///
    /// In addition, if the feature-flag `check_complete_parse` is enabled,
    /// the root cell must be fully consumed, or a
    /// [`DecodeError::Incomplete`] is returned.
    fn try_decode(cell: &Cell) -> DecodeResult<Self> {
        let mut p = cell.parser();
        let ret = Self::parse(&mut p)?;
        cfg_if::cfg_if! {
            if #[cfg(feature = "check_complete_parse")] {
                if !p.is_exhausted() {
                    return Err(error::DecodeError::Incomplete {
                        bits: p.remaining_bits(),
                        refs: p.remaining_refs(),
                    });
                }
            }
        }
        Ok(ret)
    }

    /// Decodes a value of type `Self` from `cell`.
    ///
    /// # Panics
    ///
    /// This method will panic if the interior call to
    /// [`try_decode`](Decode::try_decode) returns an `Err(_)` value.
    fn decode(cell: &Cell) -> Self {
        Self::try_decode(cell).unwrap_or_else(|err| {
            panic!(
                "<{} as Decode>::decode encountered error: {}",
                std::any::type_name::<Self>(),
                err
            )
        })
    }
}

/// Serializes `value` as the content of a new root cell
pub fn marshal<T: Encode + ?Sized>(value: &T) -> EncodeResult<Cell> {
    value.to_cell()
}

/// Appends the serialization of `value` to an existing builder
pub fn marshal_into<T: Encode + ?Sized>(b: &mut CellBuilder, value: &T) -> EncodeResult<()> {
    value.write_to(b)
}

/// Decodes a value of type `T` from the start of `cell`
pub fn unmarshal<T: Decode>(cell: &Cell) -> DecodeResult<T> {
    T::try_decode(cell)
}

/// Decodes a value from the start of `cell` into `out`.
///
/// `out` is left untouched on failure.
pub fn unmarshal_into<T: Decode>(cell: &Cell, out: &mut T) -> DecodeResult<()> {
    *out = T::try_decode(cell)?;
    Ok(())
}

/// Decodes a value from the cell referenced next by `p`
pub fn parse_ref<T: Decode>(p: &mut CellParser<'_>) -> ParseResult<T> {
    let child = p.next_ref()?;
    T::parse(&mut child.parser())
}

/// Writes a value into a new child cell referenced from `b`
pub fn write_ref<T: Encode + ?Sized>(value: &T, b: &mut CellBuilder) -> EncodeResult<()> {
    b.store_ref(value.to_cell()?)
}

impl Decode for bool {
    fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
        p.read_bit()
    }
}

impl Encode for bool {
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
        b.store_bit(*self)
    }
}

macro_rules! impl_native_uint {
    ( $( $t:ty => $bits:expr ),+ $(,)? ) => {
        $(
            impl Decode for $t {
                fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
                    Ok(p.read_uint($bits)? as $t)
                }
            }

            impl Encode for $t {
                fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
                    b.store_uint(u64::from(*self), $bits)
                }
            }
        )+
    };
}

impl_native_uint!(u8 => 8, u16 => 16, u32 => 32, u64 => 64);

macro_rules! impl_native_int {
    ( $( $t:ty => $bits:expr ),+ $(,)? ) => {
        $(
            impl Decode for $t {
                fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
                    Ok(p.read_int($bits)? as $t)
                }
            }

            impl Encode for $t {
                fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
                    b.store_int(i64::from(*self), $bits)
                }
            }
        )+
    };
}

impl_native_int!(i8 => 8, i16 => 16, i32 => 32, i64 => 64);

/// `Maybe X`: a presence bit followed by the value when set
impl<T: Decode> Decode for Option<T> {
    fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
        if p.read_bit()? {
            Ok(Some(T::parse(p)?))
        } else {
            Ok(None)
        }
    }
}

impl<T: Encode> Encode for Option<T> {
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
        match self {
            Some(value) => {
                b.store_bit(true)?;
                value.write_to(b)
            }
            None => b.store_bit(false),
        }
    }
}

/// `True` / `Unit`: zero-width
impl Decode for () {
    fn parse(_: &mut CellParser<'_>) -> ParseResult<Self> {
        Ok(())
    }
}

impl Encode for () {
    fn write_to(&self, _: &mut CellBuilder) -> EncodeResult<()> {
        Ok(())
    }
}

impl<T: Decode> Decode for Box<T> {
    fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
        Ok(Box::new(T::parse(p)?))
    }
}

impl<T: Encode + ?Sized> Encode for Box<T> {
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
        self.as_ref().write_to(b)
    }

    fn to_cell(&self) -> EncodeResult<Cell> {
        self.as_ref().to_cell()
    }
}

/// `Cell` / `Any`: everything left in the current cell
impl Decode for Cell {
    fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
        p.read_remainder()
    }
}

impl Encode for Cell {
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
        b.store_contents(self)
    }

    fn to_cell(&self) -> EncodeResult<Cell> {
        Ok(self.clone())
    }
}

impl Decode for Arc<Cell> {
    fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
        Ok(Arc::new(p.read_remainder()?))
    }
}

impl Encode for Arc<Cell> {
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
        b.store_contents(self)
    }

    fn to_cell(&self) -> EncodeResult<Cell> {
        Ok(self.as_ref().clone())
    }
}

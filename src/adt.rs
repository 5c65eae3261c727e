//! Generic TL-B combinators: `Either`, `^X`, and `Either X ^X`

#[cfg(feature = "serde_impls")]
use serde::Serialize;

use crate::builder::CellBuilder;
use crate::conv::{parse_ref, write_ref, Decode, Encode, EncodeResult};
use crate::parse::{CellParser, ParseResult};

/// `Either X Y`: bit `0` then `X`, or bit `1` then `Y`
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde_impls", derive(Serialize))]
pub enum Either<L, R> {
    Left(L),
    Right(R),
}

impl<L: Decode, R: Decode> Decode for Either<L, R> {
    fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
        if p.read_bit()? {
            Ok(Either::Right(R::parse(p)?))
        } else {
            Ok(Either::Left(L::parse(p)?))
        }
    }
}

impl<L: Encode, R: Encode> Encode for Either<L, R> {
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
        match self {
            Either::Left(l) => {
                b.store_bit(false)?;
                l.write_to(b)
            }
            Either::Right(r) => {
                b.store_bit(true)?;
                r.write_to(b)
            }
        }
    }
}

/// `^X`: the value lives alone in the next referenced cell
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ref<T>(pub T);

impl<T> Ref<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> std::ops::Deref for Ref<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: Decode> Decode for Ref<T> {
    fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
        Ok(Ref(parse_ref(p)?))
    }
}

impl<T: Encode> Encode for Ref<T> {
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
        write_ref(&self.0, b)
    }
}

/// `Either X ^X`: the same value either inline or behind a reference
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EitherRef<T> {
    Inline(T),
    ByRef(T),
}

impl<T> EitherRef<T> {
    #[must_use]
    pub fn value(&self) -> &T {
        match self {
            EitherRef::Inline(v) | EitherRef::ByRef(v) => v,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            EitherRef::Inline(v) | EitherRef::ByRef(v) => v,
        }
    }

    #[must_use]
    pub fn is_ref(&self) -> bool {
        matches!(self, EitherRef::ByRef(_))
    }
}

impl<T: Decode> Decode for EitherRef<T> {
    fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
        if p.read_bit()? {
            Ok(EitherRef::ByRef(parse_ref(p)?))
        } else {
            Ok(EitherRef::Inline(T::parse(p)?))
        }
    }
}

impl<T: Encode> Encode for EitherRef<T> {
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
        match self {
            EitherRef::Inline(v) => {
                b.store_bit(false)?;
                v.write_to(b)
            }
            EitherRef::ByRef(v) => {
                b.store_bit(true)?;
                write_ref(v, b)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::conv::{marshal, unmarshal};

    #[test]
    fn either_selects_by_bit() {
        let cell = marshal(&Either::<u8, u16>::Right(0xbeef)).unwrap();
        assert_eq!(cell.bit_len(), 17);
        assert_eq!(
            unmarshal::<Either<u8, u16>>(&cell).unwrap(),
            Either::Right(0xbeef)
        );
    }

    #[test]
    fn either_ref_placement() {
        let inline = marshal(&EitherRef::Inline(7u32)).unwrap();
        assert_eq!((inline.bit_len(), inline.refs().len()), (33, 0));
        let by_ref = marshal(&EitherRef::ByRef(7u32)).unwrap();
        assert_eq!((by_ref.bit_len(), by_ref.refs().len()), (1, 1));
        let back = unmarshal::<EitherRef<u32>>(&by_ref).unwrap();
        assert!(back.is_ref());
        assert_eq!(*back.value(), 7);
    }
}

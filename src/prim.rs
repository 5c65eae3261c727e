//! Fixed- and variable-width primitive types
//!
//! The native integer types `u8`..`u64` and `i8`..`i64` cover the TL-B
//! built-ins `uint8`..`uint64` and `int8`..`int64`. The newtypes here cover
//! everything else:
//!
//!   * [`Uint<N>`] / [`Int<N>`] for `uintN` / `intN` and `(## N)` with
//!     arbitrary `N <= 64`
//!   * [`Bits<N>`] and [`Bits256`] for `bitsN`
//!   * [`VarUInteger<N>`] and [`Coins`] for length-prefixed naturals

use std::fmt::{Display, Formatter};
use std::ops::Add;
use std::str::FromStr;

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
#[cfg(feature = "serde_impls")]
use serde::Serialize;

use crate::builder::CellBuilder;
use crate::cell::{BitStr, BitString};
use crate::conv::error::{EncodeError, EncodeResult};
use crate::conv::{Decode, Encode};
use crate::error::{BoundsError, WidthError};
use crate::parse::error::InvalidEncoding;
use crate::parse::{CellParser, ParseResult};

/// Bit-width of `#<= max`: the smallest `k` with `max < 2^k`
#[must_use]
pub const fn width_upto(max: u64) -> usize {
    (64 - max.leading_zeros()) as usize
}

/// Bit-width of `#< bound`: the smallest `k` with `bound <= 2^k`
#[must_use]
pub const fn width_below(bound: u64) -> usize {
    if bound <= 1 {
        0
    } else {
        width_upto(bound - 1)
    }
}

/// Unsigned integer of `N <= 64` bits
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde_impls", derive(Serialize))]
pub struct Uint<const N: usize>(u64);

impl<const N: usize> Uint<N> {
    pub const MAX: u64 = if N >= 64 { u64::MAX } else { (1u64 << N) - 1 };

    pub fn new(value: u64) -> Result<Self, BoundsError<i128>> {
        BoundsError::restrict(i128::from(value), 0, i128::from(Self::MAX))?;
        Ok(Self(value))
    }

    #[must_use]
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl<const N: usize> TryFrom<u64> for Uint<N> {
    type Error = BoundsError<i128>;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl<const N: usize> Decode for Uint<N> {
    fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
        Ok(Self(p.read_uint(N)?))
    }
}

impl<const N: usize> Encode for Uint<N> {
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
        b.store_uint(self.0, N)
    }
}

/// Two's-complement integer of `N <= 64` bits
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde_impls", derive(Serialize))]
pub struct Int<const N: usize>(i64);

impl<const N: usize> Int<N> {
    pub const MIN: i64 = if N >= 64 { i64::MIN } else { -(1i64 << (N - 1)) };
    pub const MAX: i64 = if N >= 64 { i64::MAX } else { (1i64 << (N - 1)) - 1 };

    pub fn new(value: i64) -> Result<Self, BoundsError<i128>> {
        BoundsError::restrict(
            i128::from(value),
            i128::from(Self::MIN),
            i128::from(Self::MAX),
        )?;
        Ok(Self(value))
    }

    #[must_use]
    #[inline]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl<const N: usize> Decode for Int<N> {
    fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
        Ok(Self(p.read_int(N)?))
    }
}

impl<const N: usize> Encode for Int<N> {
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
        b.store_int(self.0, N)
    }
}

/// Bit-string of exactly `N` bits
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bits<const N: usize>(BitString);

impl<const N: usize> Bits<N> {
    pub fn new(bits: BitString) -> Result<Self, WidthError> {
        if bits.len() == N {
            Ok(Self(bits))
        } else {
            Err(WidthError::WrongWidth {
                exact: N,
                actual: bits.len(),
            })
        }
    }

    #[must_use]
    pub fn zero() -> Self {
        Self(BitString::repeat(false, N))
    }

    #[must_use]
    pub fn as_bits(&self) -> &BitStr {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> BitString {
        self.0
    }
}

impl<const N: usize> Default for Bits<N> {
    fn default() -> Self {
        Self::zero()
    }
}

impl<const N: usize> Decode for Bits<N> {
    fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
        Ok(Self(p.read_bits(N)?.to_bitvec()))
    }
}

impl<const N: usize> Encode for Bits<N> {
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
        b.store_bits(&self.0)
    }
}

/// 256-bit opaque value: hashes, account addresses, public keys
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde_impls", derive(Serialize))]
pub struct Bits256(pub [u8; 32]);

impl Bits256 {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for Bits256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Display for Bits256 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Bits256 {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out)?;
        Ok(Self(out))
    }
}

impl Decode for Bits256 {
    fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
        Ok(Self(p.read_array::<32>()?))
    }
}

impl Encode for Bits256 {
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
        b.store_bytes(&self.0)
    }
}

/// Reads the byte-length prefix of `VarUInteger n`: `len:(#< n)`
fn read_var_len(p: &mut CellParser<'_>, n: usize) -> ParseResult<usize> {
    let len = p.read_uint(width_below(n as u64))?;
    if len >= n as u64 {
        return Err(InvalidEncoding::ValueOutOfRange {
            value: len,
            max: n as u64 - 1,
        }
        .into());
    }
    Ok(len as usize)
}

/// Decodes `VarUInteger n` without wrapping it in a newtype
pub fn read_var_uint(p: &mut CellParser<'_>, n: usize) -> ParseResult<BigUint> {
    let len = read_var_len(p, n)?;
    Ok(BigUint::from_bytes_be(&p.read_bytes(len)?))
}

/// Encodes `VarUInteger n`, choosing the shortest byte-length
pub fn write_var_uint(b: &mut CellBuilder, n: usize, value: &BigUint) -> EncodeResult<()> {
    let bytes = if value.is_zero() {
        Vec::new()
    } else {
        value.to_bytes_be()
    };
    if bytes.len() >= n {
        return Err(EncodeError::ValueTooWide {
            bits: (n - 1) * 8,
        });
    }
    b.store_uint(bytes.len() as u64, width_below(n as u64))?;
    b.store_bytes(&bytes)
}

/// `VarUInteger n`: a byte count in `#< n`, then that many bytes
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde_impls", derive(Serialize))]
pub struct VarUInteger<const N: usize>(pub BigUint);

impl<const N: usize> Decode for VarUInteger<N> {
    fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
        Ok(Self(read_var_uint(p, N)?))
    }
}

impl<const N: usize> Encode for VarUInteger<N> {
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
        write_var_uint(b, N, &self.0)
    }
}

/// Native currency amount in nanotons: `VarUInteger 16`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde_impls", derive(Serialize))]
pub struct Coins(pub u128);

pub type Grams = Coins;

impl Coins {
    pub const ZERO: Coins = Coins(0);

    #[must_use]
    pub fn checked_add(self, other: Coins) -> Option<Coins> {
        self.0.checked_add(other.0).map(Coins)
    }
}

impl Add for Coins {
    type Output = Coins;

    fn add(self, rhs: Coins) -> Coins {
        Coins(self.0.saturating_add(rhs.0))
    }
}

impl From<u64> for Coins {
    fn from(value: u64) -> Self {
        Coins(u128::from(value))
    }
}

impl Display for Coins {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Decode for Coins {
    fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
        let value = read_var_uint(p, 16)?;
        // 15 bytes at most, always within u128
        Ok(Coins(value.to_u128().unwrap_or(u128::MAX)))
    }
}

impl Encode for Coins {
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
        write_var_uint(b, 16, &BigUint::from(self.0))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::conv::{marshal, unmarshal};
    use crate::parse::error::ParseError;

    #[test]
    fn widths() {
        assert_eq!(width_upto(60), 6);
        assert_eq!(width_upto(0), 0);
        assert_eq!(width_upto(256), 9);
        assert_eq!(width_below(16), 4);
        assert_eq!(width_below(32), 5);
        assert_eq!(width_below(1), 0);
        assert_eq!(width_below(7), 3);
    }

    #[test]
    fn narrow_ints() {
        assert!(Uint::<6>::new(64).is_err());
        assert_eq!(Uint::<6>::new(60).unwrap().get(), 60);
        assert!(Int::<4>::new(-9).is_err());
        let cell = marshal(&Int::<4>::new(-8).unwrap()).unwrap();
        assert_eq!(cell.bit_len(), 4);
        assert_eq!(unmarshal::<Int<4>>(&cell).unwrap().get(), -8);
    }

    #[test]
    fn coins_layout() {
        let cell = marshal(&Coins(0)).unwrap();
        assert_eq!(cell.bit_len(), 4);
        let cell = marshal(&Coins(1_000_000_000)).unwrap();
        // 4-bit length (4 bytes) then 32 bits
        assert_eq!(cell.bit_len(), 4 + 32);
        assert_eq!(cell.parser().read_uint(4).unwrap(), 4);
        assert_eq!(unmarshal::<Coins>(&cell).unwrap(), Coins(1_000_000_000));
        assert!(marshal(&Coins(1 << 120)).is_err());
    }

    #[test]
    fn var_uint_length_bound() {
        // VarUInteger 7 has a 3-bit length prefix; 7 is out of range
        let mut b = CellBuilder::new();
        b.store_uint(7, 3).unwrap();
        let cell = b.build().unwrap();
        assert_eq!(
            unmarshal::<VarUInteger<7>>(&cell),
            Err(ParseError::Encoding(InvalidEncoding::ValueOutOfRange {
                value: 7,
                max: 6
            })
            .into())
        );
    }

    #[test]
    fn bits256_hex() {
        let text = "587cc789eff1c84f46ec3797e45fc809a14ff5ae24f1e0c7a6a99cc9dc9061ff";
        let value: Bits256 = text.parse().unwrap();
        assert_eq!(value.to_string(), text);
        let cell = marshal(&value).unwrap();
        assert_eq!(unmarshal::<Bits256>(&cell).unwrap(), value);
    }
}

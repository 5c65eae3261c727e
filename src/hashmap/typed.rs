//! Statically typed dictionary containers
//!
//! Entries are kept in trie enumeration order, which for the unsigned key
//! types is ascending numeric order.

use std::ops::{Deref, DerefMut};

use crate::builder::CellBuilder;
use crate::cell::{BitStr, BitString};
use crate::conv::error::{EncodeError, EncodeResult};
use crate::conv::{Decode, Encode};
use crate::parse::{bits_to_u64, CellParser, ParseResult};
use crate::prim::{Bits, Bits256, Coins, Uint, VarUInteger};

/// Fixed-width key of a dictionary
pub trait HashKey: Sized {
    const KEY_BITS: usize;

    fn to_key(&self) -> BitString;

    fn from_key(bits: &BitStr) -> ParseResult<Self>;
}

fn uint_key(value: u64, n: usize) -> BitString {
    let mut out = BitString::with_capacity(n);
    for i in (0..n).rev() {
        out.push((value >> i) & 1 == 1);
    }
    out
}

macro_rules! impl_uint_key {
    ( $( $t:ty => $bits:expr ),+ $(,)? ) => {
        $(
            impl HashKey for $t {
                const KEY_BITS: usize = $bits;

                fn to_key(&self) -> BitString {
                    uint_key(u64::from(*self), $bits)
                }

                fn from_key(bits: &BitStr) -> ParseResult<Self> {
                    Ok(bits_to_u64(bits) as $t)
                }
            }
        )+
    };
}

impl_uint_key!(u8 => 8, u16 => 16, u32 => 32, u64 => 64);

/// Signed keys are ordered by their two's-complement bit pattern
macro_rules! impl_int_key {
    ( $( $t:ty => $u:ty, $bits:expr ),+ $(,)? ) => {
        $(
            impl HashKey for $t {
                const KEY_BITS: usize = $bits;

                fn to_key(&self) -> BitString {
                    uint_key(u64::from(*self as $u), $bits)
                }

                fn from_key(bits: &BitStr) -> ParseResult<Self> {
                    Ok(bits_to_u64(bits) as $u as $t)
                }
            }
        )+
    };
}

impl_int_key!(i8 => u8, 8, i16 => u16, 16, i32 => u32, 32, i64 => u64, 64);

impl<const N: usize> HashKey for Uint<N> {
    const KEY_BITS: usize = N;

    fn to_key(&self) -> BitString {
        uint_key(self.get(), N)
    }

    fn from_key(bits: &BitStr) -> ParseResult<Self> {
        Ok(Uint::new(bits_to_u64(bits))?)
    }
}

impl<const N: usize> HashKey for Bits<N> {
    const KEY_BITS: usize = N;

    fn to_key(&self) -> BitString {
        self.as_bits().to_bitvec()
    }

    fn from_key(bits: &BitStr) -> ParseResult<Self> {
        Ok(Bits::new(bits.to_bitvec())?)
    }
}

impl HashKey for Bits256 {
    const KEY_BITS: usize = 256;

    fn to_key(&self) -> BitString {
        BitString::from_slice(&self.0)
    }

    fn from_key(bits: &BitStr) -> ParseResult<Self> {
        let mut out = [0u8; 32];
        for (dst, byte) in out.iter_mut().zip(bits.chunks(8)) {
            *dst = bits_to_u64(byte) as u8;
        }
        Ok(Bits256(out))
    }
}

/// Extra-value type of an augmented dictionary
///
/// `combine` yields a fork's extra from its two children's; `Default`
/// supplies the extra of an empty `HashmapAugE`.
pub trait Augmentation: Clone + PartialEq + Default {
    fn combine(&self, other: &Self) -> Self;
}

impl Augmentation for Coins {
    fn combine(&self, other: &Self) -> Self {
        *self + *other
    }
}

impl<const N: usize> Augmentation for VarUInteger<N> {
    fn combine(&self, other: &Self) -> Self {
        VarUInteger(&self.0 + &other.0)
    }
}

/// Ordered key-value collection backing [`Hashmap`] and [`HashmapE`]
#[derive(Clone, Debug, PartialEq)]
pub struct Dict<K, V> {
    entries: Vec<(K, V)>,
}

impl<K, V> Default for Dict<K, V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<K: HashKey, V> Dict<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a dictionary from arbitrary-order entries; a later entry
    /// replaces an earlier one with the same key.
    pub fn from_entries(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        let mut out = Self::new();
        for (k, v) in entries {
            out.insert(k, v);
        }
        out
    }

    fn position(&self, key: &BitStr) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|(k, _)| super::cmp_bits(&k.to_key(), key))
    }

    /// Inserts an entry, returning the value it replaced
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.position(&key.to_key()) {
            Ok(ix) => Some(std::mem::replace(&mut self.entries[ix].1, value)),
            Err(ix) => {
                self.entries.insert(ix, (key, value));
                None
            }
        }
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.position(&key.to_key())
            .ok()
            .map(|ix| &self.entries[ix].1)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<(K, V)> {
        self.entries
    }

    fn from_decoded(raw: Vec<(BitString, V)>) -> ParseResult<Self> {
        let entries = raw
            .into_iter()
            .map(|(k, v)| Ok((K::from_key(&k)?, v)))
            .collect::<ParseResult<Vec<_>>>()?;
        Ok(Self { entries })
    }

    fn keyed(&self) -> Vec<(BitString, &V)> {
        self.entries.iter().map(|(k, v)| (k.to_key(), v)).collect()
    }
}

/// `Hashmap n X`: a non-empty dictionary stored inline
#[derive(Clone, Debug, PartialEq)]
pub struct Hashmap<K, V>(pub Dict<K, V>);

/// `HashmapE n X`: a possibly empty dictionary behind a presence bit
#[derive(Clone, Debug, PartialEq)]
pub struct HashmapE<K, V>(pub Dict<K, V>);

macro_rules! dict_wrapper {
    ( $( $name:ident ),+ ) => {
        $(
            impl<K, V> Default for $name<K, V> {
                fn default() -> Self {
                    Self(Dict::default())
                }
            }

            impl<K, V> Deref for $name<K, V> {
                type Target = Dict<K, V>;

                fn deref(&self) -> &Dict<K, V> {
                    &self.0
                }
            }

            impl<K, V> DerefMut for $name<K, V> {
                fn deref_mut(&mut self) -> &mut Dict<K, V> {
                    &mut self.0
                }
            }

            impl<K: HashKey, V> FromIterator<(K, V)> for $name<K, V> {
                fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
                    Self(Dict::from_entries(iter))
                }
            }
        )+
    };
}

dict_wrapper!(Hashmap, HashmapE);

impl<K: HashKey, V: Decode> Decode for Hashmap<K, V> {
    fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
        let raw = super::parse_edges(p, K::KEY_BITS, &mut |c| V::parse(c))?;
        Ok(Self(Dict::from_decoded(raw)?))
    }
}

impl<K: HashKey, V: Encode> Encode for Hashmap<K, V> {
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
        super::write_edges(b, &self.keyed(), K::KEY_BITS, &mut |b, v: &&V| v.write_to(b))
    }
}

impl<K: HashKey, V: Decode> Decode for HashmapE<K, V> {
    fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
        let raw = super::parse_hashmap_e(p, K::KEY_BITS, &mut |c| V::parse(c))?;
        Ok(Self(Dict::from_decoded(raw)?))
    }
}

impl<K: HashKey, V: Encode> Encode for HashmapE<K, V> {
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
        super::write_hashmap_e(b, &self.keyed(), K::KEY_BITS, &mut |b, v: &&V| v.write_to(b))
    }
}

/// Ordered key-value-extra collection backing the augmented dictionaries
#[derive(Clone, Debug, PartialEq)]
pub struct AugDict<K, V, X> {
    entries: Vec<(K, V, X)>,
}

impl<K, V, X> Default for AugDict<K, V, X> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<K: HashKey, V, X: Augmentation> AugDict<K, V, X> {
    /// Builds a dictionary from arbitrary-order entries; a later entry
    /// replaces an earlier one with the same key.
    pub fn from_entries(entries: impl IntoIterator<Item = (K, V, X)>) -> Self {
        let mut out = Self::default();
        for (k, v, x) in entries {
            out.insert(k, v, x);
        }
        out
    }

    fn position(&self, key: &BitStr) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|(k, _, _)| super::cmp_bits(&k.to_key(), key))
    }

    /// Inserts an entry, returning the value and extra it replaced
    pub fn insert(&mut self, key: K, value: V, extra: X) -> Option<(V, X)> {
        match self.position(&key.to_key()) {
            Ok(ix) => {
                let slot = &mut self.entries[ix];
                Some((
                    std::mem::replace(&mut slot.1, value),
                    std::mem::replace(&mut slot.2, extra),
                ))
            }
            Err(ix) => {
                self.entries.insert(ix, (key, value, extra));
                None
            }
        }
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<(&V, &X)> {
        self.position(&key.to_key())
            .ok()
            .map(|ix| (&self.entries[ix].1, &self.entries[ix].2))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V, &X)> {
        self.entries.iter().map(|(k, v, x)| (k, v, x))
    }

    /// Combination of every leaf extra, or the default for no entries
    #[must_use]
    pub fn total(&self) -> X {
        self.entries
            .iter()
            .map(|(_, _, x)| x.clone())
            .reduce(|a, b| a.combine(&b))
            .unwrap_or_default()
    }

    fn from_decoded(raw: Vec<(BitString, V, X)>) -> ParseResult<Self> {
        let entries = raw
            .into_iter()
            .map(|(k, v, x)| Ok((K::from_key(&k)?, v, x)))
            .collect::<ParseResult<Vec<_>>>()?;
        Ok(Self { entries })
    }

    fn keyed(&self) -> Vec<(BitString, &V, X)> {
        self.entries
            .iter()
            .map(|(k, v, x)| (k.to_key(), v, x.clone()))
            .collect()
    }
}

fn combine<X: Augmentation>(a: &X, b: &X) -> Option<X> {
    Some(a.combine(b))
}

/// `HashmapAug n X Y`: a non-empty augmented dictionary stored inline
#[derive(Clone, Debug, PartialEq)]
pub struct HashmapAug<K, V, X> {
    dict: AugDict<K, V, X>,
    extra: X,
}

/// `HashmapAugE n X Y`: a possibly empty augmented dictionary behind a
/// presence bit, followed by the extra of the whole dictionary
#[derive(Clone, Debug, PartialEq)]
pub struct HashmapAugE<K, V, X> {
    dict: AugDict<K, V, X>,
    extra: X,
}

macro_rules! aug_wrapper {
    ( $( $name:ident ),+ ) => {
        $(
            impl<K: HashKey, V, X: Augmentation> $name<K, V, X> {
                pub fn from_entries(entries: impl IntoIterator<Item = (K, V, X)>) -> Self {
                    let dict = AugDict::from_entries(entries);
                    let extra = dict.total();
                    Self { dict, extra }
                }

                /// Extra of the whole dictionary
                #[must_use]
                pub fn extra(&self) -> &X {
                    &self.extra
                }

                #[must_use]
                pub fn dict(&self) -> &AugDict<K, V, X> {
                    &self.dict
                }
            }

            impl<K, V, X: Default> Default for $name<K, V, X> {
                fn default() -> Self {
                    Self {
                        dict: AugDict::default(),
                        extra: X::default(),
                    }
                }
            }

            impl<K, V, X> Deref for $name<K, V, X> {
                type Target = AugDict<K, V, X>;

                fn deref(&self) -> &AugDict<K, V, X> {
                    &self.dict
                }
            }
        )+
    };
}

aug_wrapper!(HashmapAug, HashmapAugE);

impl<K: HashKey, V: Decode, X: Augmentation + Decode> Decode for HashmapAug<K, V, X> {
    fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
        let fold: super::Combine<'_, X> = &combine::<X>;
        let (raw, extra) = super::parse_aug_edges(
            p,
            K::KEY_BITS,
            &mut |c| V::parse(c),
            &mut |c| X::parse(c),
            Some(fold),
        )?;
        Ok(Self {
            dict: AugDict::from_decoded(raw)?,
            extra,
        })
    }
}

impl<K: HashKey, V: Encode, X: Augmentation + Encode> Encode for HashmapAug<K, V, X> {
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
        let fold: super::Combine<'_, X> = &combine::<X>;
        super::write_aug_edges(
            b,
            &self.dict.keyed(),
            K::KEY_BITS,
            &mut |b, v: &&V| v.write_to(b),
            &mut |b, x: &X| x.write_to(b),
            fold,
        )
        .map(|_| ())
    }
}

impl<K: HashKey, V: Decode, X: Augmentation + Decode> Decode for HashmapAugE<K, V, X> {
    fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
        let fold: super::Combine<'_, X> = &combine::<X>;
        let (raw, extra) = super::parse_hashmap_aug_e(
            p,
            K::KEY_BITS,
            &mut |c| V::parse(c),
            &mut |c| X::parse(c),
            Some(fold),
        )?;
        Ok(Self {
            dict: AugDict::from_decoded(raw)?,
            extra,
        })
    }
}

impl<K: HashKey, V: Encode, X: Augmentation + Encode> Encode for HashmapAugE<K, V, X> {
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
        let fold: super::Combine<'_, X> = &combine::<X>;
        let written = super::write_hashmap_aug_e(
            b,
            &self.dict.keyed(),
            K::KEY_BITS,
            &mut |b, v: &&V| v.write_to(b),
            &mut |b, x: &X| x.write_to(b),
            fold,
            &self.extra,
        )?;
        if !self.dict.is_empty() && written != self.extra {
            return Err(EncodeError::invariant(
                "stored dictionary extra differs from the combination of its entries",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::conv::{marshal, unmarshal};
    use crate::parse::error::{InvalidEncoding, ParseError};

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Total(u32);

    impl Augmentation for Total {
        fn combine(&self, other: &Self) -> Self {
            Total(self.0 + other.0)
        }
    }

    impl Decode for Total {
        fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
            Ok(Total(u32::parse(p)?))
        }
    }

    impl Encode for Total {
        fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
            self.0.write_to(b)
        }
    }

    #[test]
    fn dict_keeps_key_order() {
        let map: HashmapE<u32, u8> = [(300u32, 3u8), (7, 1), (42, 2), (7, 9)]
            .into_iter()
            .collect();
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![7, 42, 300]);
        assert_eq!(map.get(&7), Some(&9));
        let cell = marshal(&map).unwrap();
        let back: HashmapE<u32, u8> = unmarshal(&cell).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn empty_hashmap_rejected() {
        let empty: Hashmap<u8, u8> = Hashmap::default();
        assert!(matches!(
            marshal(&empty),
            Err(EncodeError::InvariantViolation(_))
        ));
        let empty_e: HashmapE<u8, u8> = HashmapE::default();
        assert_eq!(marshal(&empty_e).unwrap().bit_len(), 1);
    }

    #[test]
    fn signed_keys() {
        let map: HashmapE<i32, bool> = [(-1i32, true), (0, false)].into_iter().collect();
        let back: HashmapE<i32, bool> = unmarshal(&marshal(&map).unwrap()).unwrap();
        assert_eq!(back.get(&-1), Some(&true));
        assert_eq!(back.get(&0), Some(&false));
    }

    #[test]
    fn aug_round_trip() {
        let map = HashmapAugE::<u16, u8, Total>::from_entries([
            (10u16, 1u8, Total(100)),
            (3, 2, Total(30)),
            (999, 3, Total(5)),
        ]);
        assert_eq!(map.extra(), &Total(135));
        let cell = marshal(&map).unwrap();
        let back: HashmapAugE<u16, u8, Total> = unmarshal(&cell).unwrap();
        assert_eq!(back, map);
        assert_eq!(back.get(&3), Some((&2, &Total(30))));
    }

    #[test]
    fn coin_totals() {
        let map = HashmapAugE::<u8, (), Coins>::from_entries([
            (1u8, (), Coins(250)),
            (2, (), Coins(50)),
        ]);
        assert_eq!(map.extra(), &Coins(300));
        let back: HashmapAugE<u8, (), Coins> = unmarshal(&marshal(&map).unwrap()).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn aug_entries_kept_in_key_order() {
        let mut map = AugDict::<u16, u8, Coins>::from_entries([
            (700u16, 1u8, Coins(7)),
            (3, 2, Coins(3)),
            (700, 9, Coins(70)),
            (42, 4, Coins(42)),
        ]);
        assert_eq!(map.len(), 3);
        assert_eq!(map.iter().map(|(k, _, _)| *k).collect::<Vec<_>>(), [3, 42, 700]);
        assert_eq!(map.get(&700), Some((&9, &Coins(70))));
        assert_eq!(map.get(&5), None);
        assert_eq!(map.insert(3, 5, Coins(30)), Some((2, Coins(3))));
        assert_eq!(map.insert(1, 6, Coins(1)), None);
        assert_eq!(map.total(), Coins(143));
    }

    #[test]
    fn tampered_aggregate_rejected() {
        // two leaves under one fork whose stored extra is off by one
        let entries = vec![
            (uint_key(0, 8), 1u8, Total(1)),
            (uint_key(128, 8), 2u8, Total(2)),
        ];
        let mut b = CellBuilder::new();
        let wrong = |a: &Total, b: &Total| Some(Total(a.0 + b.0 + 1));
        super::super::write_hashmap_aug_e(
            &mut b,
            &entries,
            8,
            &mut |b, v: &u8| v.write_to(b),
            &mut |b, x: &Total| x.write_to(b),
            &wrong,
            &Total(0),
        )
        .unwrap();
        let cell = b.build().unwrap();
        assert_eq!(
            unmarshal::<HashmapAugE<u8, u8, Total>>(&cell),
            Err(ParseError::Encoding(InvalidEncoding::AggregateMismatch).into())
        );
    }
}

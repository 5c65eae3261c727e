//! Binary-trie dictionaries
//!
//! TL-B dictionaries (`Hashmap n X`, `HashmapE n X`, and their augmented
//! counterparts `HashmapAug n X Y`, `HashmapAugE n X Y`) are Patricia tries
//! over fixed-width `n`-bit keys, laid out as
//!
//! ```text
//! hm_edge#_ {n:#} {X:Type} {l:#} {m:#} label:(HmLabel ~l n)
//!           {n = (~m) + l} node:(HashmapNode m X) = Hashmap n X;
//! hmn_leaf#_ {X:Type} value:X = HashmapNode 0 X;
//! hmn_fork#_ {n:#} {X:Type} left:^(Hashmap n X)
//!            right:^(Hashmap n X) = HashmapNode (n + 1) X;
//!
//! hml_short$0 {m:#} {n:#} len:(Unary ~n) {n <= m} s:(n * Bit) = HmLabel ~n m;
//! hml_long$10 {m:#} n:(#<= m) s:(n * Bit) = HmLabel ~n m;
//! hml_same$11 {m:#} v:Bit n:(#<= m) = HmLabel ~n m;
//!
//! hme_empty$0 {n:#} {X:Type} = HashmapE n X;
//! hme_root$1 {n:#} {X:Type} root:^(Hashmap n X) = HashmapE n X;
//! ```
//!
//! The augmented forms store an extra value of type `Y` with every node:
//! before the value in a leaf, after both references in a fork, and after
//! the root (or in place of it) in `HashmapAugE`. A fork's extra is the
//! combination of its children's.
//!
//! This module holds the untyped engine, parameterized by closures that
//! read and write leaf values and extras, so that the statically typed
//! containers in [`typed`] and the [`dynamic`](crate::dynamic) engine share
//! one implementation. Keys are passed around as [`BitString`]s of exactly
//! `n` bits, in trie enumeration order (which is ascending unsigned order).

use tracing::trace;

use crate::builder::CellBuilder;
use crate::cell::{BitStr, BitString};
use crate::conv::error::{EncodeError, EncodeResult};
use crate::parse::error::InvalidEncoding;
use crate::parse::{CellParser, ParseResult};
use crate::prim::width_upto;

pub mod typed;

pub use typed::{AugDict, Augmentation, Dict, HashKey, Hashmap, HashmapAug, HashmapAugE, HashmapE};

/// Combination function for fork extras, `None` when the two extras
/// cannot be combined
pub type Combine<'c, X> = &'c dyn Fn(&X, &X) -> Option<X>;

/// Reads an edge label for a subtree with `max_len` key bits left
pub fn read_label(p: &mut CellParser<'_>, max_len: usize) -> ParseResult<BitString> {
    let width = width_upto(max_len as u64);
    let check = |len: usize| -> ParseResult<usize> {
        if len > max_len {
            Err(InvalidEncoding::LabelTooLong {
                label: len,
                remaining: max_len,
            }
            .into())
        } else {
            Ok(len)
        }
    };
    if !p.read_bit()? {
        let len = check(p.read_unary()?)?;
        Ok(p.read_bits(len)?.to_bitvec())
    } else if !p.read_bit()? {
        let len = check(p.read_uint(width)? as usize)?;
        Ok(p.read_bits(len)?.to_bitvec())
    } else {
        let bit = p.read_bit()?;
        let len = check(p.read_uint(width)? as usize)?;
        Ok(BitString::repeat(bit, len))
    }
}

/// Label layout chosen by [`write_label`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelForm {
    Short,
    Long,
    Same,
}

/// Picks the shortest layout for `label`; ties go to short, then long.
#[must_use]
pub fn label_form(label: &BitStr, max_len: usize) -> LabelForm {
    let width = width_upto(max_len as u64);
    let len = label.len();
    let mut form = LabelForm::Short;
    let mut cost = 2 * len + 2;
    if 2 + width + len < cost {
        form = LabelForm::Long;
        cost = 2 + width + len;
    }
    let uniform = label.all() || label.not_any();
    if uniform && 3 + width < cost {
        form = LabelForm::Same;
    }
    form
}

/// Writes an edge label for a subtree with `max_len` key bits left
pub fn write_label(b: &mut CellBuilder, label: &BitStr, max_len: usize) -> EncodeResult<()> {
    let width = width_upto(max_len as u64);
    let len = label.len();
    if len > max_len {
        return Err(EncodeError::invariant(format!(
            "label of {len} bits exceeds remaining key width {max_len}"
        )));
    }
    match label_form(label, max_len) {
        LabelForm::Short => {
            b.store_bit(false)?;
            b.store_unary(len)?;
            b.store_bits(label)
        }
        LabelForm::Long => {
            b.store_uint(0b10, 2)?;
            b.store_uint(len as u64, width)?;
            b.store_bits(label)
        }
        LabelForm::Same => {
            b.store_uint(0b11, 2)?;
            b.store_bit(len > 0 && label[0])?;
            b.store_uint(len as u64, width)
        }
    }
}

/// Reads every entry of the non-empty trie rooted at the cursor
pub fn parse_edges<'a, V, F>(
    p: &mut CellParser<'a>,
    key_len: usize,
    read_value: &mut F,
) -> ParseResult<Vec<(BitString, V)>>
where
    F: FnMut(&mut CellParser<'a>) -> ParseResult<V>,
{
    let mut out = Vec::new();
    let mut prefix = BitString::with_capacity(key_len);
    walk(p, key_len, &mut prefix, &mut out, read_value)?;
    Ok(out)
}

fn walk<'a, V, F>(
    p: &mut CellParser<'a>,
    remaining: usize,
    prefix: &mut BitString,
    out: &mut Vec<(BitString, V)>,
    read_value: &mut F,
) -> ParseResult<()>
where
    F: FnMut(&mut CellParser<'a>) -> ParseResult<V>,
{
    let label = read_label(p, remaining)?;
    let mark = prefix.len();
    prefix.extend_from_bitslice(&label);
    let rest = remaining - label.len();
    if rest == 0 {
        out.push((prefix.clone(), read_value(p)?));
    } else {
        let left = p.next_ref()?;
        let right = p.next_ref()?;
        prefix.push(false);
        walk(&mut left.parser(), rest - 1, prefix, out, read_value)?;
        prefix.pop();
        prefix.push(true);
        walk(&mut right.parser(), rest - 1, prefix, out, read_value)?;
        prefix.pop();
    }
    prefix.truncate(mark);
    Ok(())
}

/// Reads every entry and extra of the non-empty augmented trie rooted at
/// the cursor, returning the root's extra alongside.
///
/// When `combine` is given, every fork's stored extra is checked against the
/// combination of its children's.
pub fn parse_aug_edges<'a, V, X, FV, FX>(
    p: &mut CellParser<'a>,
    key_len: usize,
    read_value: &mut FV,
    read_extra: &mut FX,
    combine: Option<Combine<'_, X>>,
) -> ParseResult<(Vec<(BitString, V, X)>, X)>
where
    X: Clone + PartialEq,
    FV: FnMut(&mut CellParser<'a>) -> ParseResult<V>,
    FX: FnMut(&mut CellParser<'a>) -> ParseResult<X>,
{
    let mut out = Vec::new();
    let mut prefix = BitString::with_capacity(key_len);
    let mut reader = AugReader {
        read_value,
        read_extra,
        combine,
    };
    let extra = reader.walk(p, key_len, &mut prefix, &mut out)?;
    Ok((out, extra))
}

struct AugReader<'f, 'c, FV, FX, X> {
    read_value: &'f mut FV,
    read_extra: &'f mut FX,
    combine: Option<Combine<'c, X>>,
}

impl<'f, 'c, FV, FX, X> AugReader<'f, 'c, FV, FX, X>
where
    X: Clone + PartialEq,
{
    fn walk<'a, V>(
        &mut self,
        p: &mut CellParser<'a>,
        remaining: usize,
        prefix: &mut BitString,
        out: &mut Vec<(BitString, V, X)>,
    ) -> ParseResult<X>
    where
        FV: FnMut(&mut CellParser<'a>) -> ParseResult<V>,
        FX: FnMut(&mut CellParser<'a>) -> ParseResult<X>,
    {
        let label = read_label(p, remaining)?;
        let mark = prefix.len();
        prefix.extend_from_bitslice(&label);
        let rest = remaining - label.len();
        let extra = if rest == 0 {
            let extra = (self.read_extra)(p)?;
            let value = (self.read_value)(p)?;
            out.push((prefix.clone(), value, extra.clone()));
            extra
        } else {
            let left = p.next_ref()?;
            let right = p.next_ref()?;
            prefix.push(false);
            let left_extra = self.walk(&mut left.parser(), rest - 1, prefix, out)?;
            prefix.pop();
            prefix.push(true);
            let right_extra = self.walk(&mut right.parser(), rest - 1, prefix, out)?;
            prefix.pop();
            let extra = (self.read_extra)(p)?;
            if let Some(combine) = self.combine {
                if combine(&left_extra, &right_extra).as_ref() != Some(&extra) {
                    trace!(depth = prefix.len(), "fork aggregate mismatch");
                    return Err(InvalidEncoding::AggregateMismatch.into());
                }
            }
            extra
        };
        prefix.truncate(mark);
        Ok(extra)
    }
}

/// Counts the leaves of the non-empty trie rooted at the cursor without
/// decoding any value
pub fn count_leaves(p: &mut CellParser<'_>, key_len: usize) -> ParseResult<usize> {
    let label = read_label(p, key_len)?;
    let rest = key_len - label.len();
    if rest == 0 {
        return Ok(1);
    }
    let left = p.next_ref()?;
    let right = p.next_ref()?;
    Ok(count_leaves(&mut left.parser(), rest - 1)? + count_leaves(&mut right.parser(), rest - 1)?)
}

/// Counts the entries of a `HashmapE` at the cursor
pub fn count_hashmap_e(p: &mut CellParser<'_>, key_len: usize) -> ParseResult<usize> {
    if p.read_bit()? {
        let root = p.next_ref()?;
        count_leaves(&mut root.parser(), key_len)
    } else {
        Ok(0)
    }
}

fn check_keys<'k>(
    keys: impl Iterator<Item = &'k BitString>,
    key_len: usize,
) -> EncodeResult<()> {
    let mut prev: Option<&BitString> = None;
    for key in keys {
        if key.len() != key_len {
            return Err(EncodeError::invariant(format!(
                "dictionary key of {} bits in a {key_len}-bit dictionary",
                key.len()
            )));
        }
        if let Some(prev) = prev {
            if cmp_bits(prev, key) != std::cmp::Ordering::Less {
                return Err(EncodeError::invariant(
                    "dictionary keys must be distinct and in ascending order",
                ));
            }
        }
        prev = Some(key);
    }
    Ok(())
}

/// Lexicographic comparison of two bit-strings
#[must_use]
pub fn cmp_bits(a: &BitStr, b: &BitStr) -> std::cmp::Ordering {
    a.iter().by_vals().cmp(b.iter().by_vals())
}

fn common_prefix(a: &BitStr, b: &BitStr) -> usize {
    a.iter()
        .by_vals()
        .zip(b.iter().by_vals())
        .take_while(|(x, y)| x == y)
        .count()
}

/// Writes the non-empty trie holding `entries`, which must be sorted by key
/// with no duplicates.
pub fn write_edges<V, F>(
    b: &mut CellBuilder,
    entries: &[(BitString, V)],
    key_len: usize,
    write_value: &mut F,
) -> EncodeResult<()>
where
    F: FnMut(&mut CellBuilder, &V) -> EncodeResult<()>,
{
    if entries.is_empty() {
        return Err(EncodeError::invariant("Hashmap must hold at least one entry"));
    }
    check_keys(entries.iter().map(|(k, _)| k), key_len)?;
    build_edge(b, entries, 0, key_len, write_value)
}

fn build_edge<V, F>(
    b: &mut CellBuilder,
    entries: &[(BitString, V)],
    depth: usize,
    key_len: usize,
    write_value: &mut F,
) -> EncodeResult<()>
where
    F: FnMut(&mut CellBuilder, &V) -> EncodeResult<()>,
{
    let remaining = key_len - depth;
    let first = &entries[0].0;
    if entries.len() == 1 {
        write_label(b, &first[depth..], remaining)?;
        return write_value(b, &entries[0].1);
    }
    let last = &entries[entries.len() - 1].0;
    let shared = common_prefix(&first[depth..], &last[depth..]);
    write_label(b, &first[depth..depth + shared], remaining)?;
    let pivot = depth + shared;
    let split = entries.partition_point(|(k, _)| !k[pivot]);
    let mut left = CellBuilder::new();
    build_edge(&mut left, &entries[..split], pivot + 1, key_len, write_value)?;
    let mut right = CellBuilder::new();
    build_edge(&mut right, &entries[split..], pivot + 1, key_len, write_value)?;
    b.store_ref(left.build()?)?;
    b.store_ref(right.build()?)
}

/// Writes the non-empty augmented trie holding `entries`, computing fork
/// extras with `combine`, and returns the root extra.
pub fn write_aug_edges<V, X, FV, FX>(
    b: &mut CellBuilder,
    entries: &[(BitString, V, X)],
    key_len: usize,
    write_value: &mut FV,
    write_extra: &mut FX,
    combine: Combine<'_, X>,
) -> EncodeResult<X>
where
    X: Clone,
    FV: FnMut(&mut CellBuilder, &V) -> EncodeResult<()>,
    FX: FnMut(&mut CellBuilder, &X) -> EncodeResult<()>,
{
    if entries.is_empty() {
        return Err(EncodeError::invariant(
            "HashmapAug must hold at least one entry",
        ));
    }
    check_keys(entries.iter().map(|(k, _, _)| k), key_len)?;
    let mut writer = AugWriter {
        write_value,
        write_extra,
        combine,
    };
    writer.build(b, entries, 0, key_len)
}

struct AugWriter<'f, 'c, FV, FX, X> {
    write_value: &'f mut FV,
    write_extra: &'f mut FX,
    combine: Combine<'c, X>,
}

impl<'f, 'c, FV, FX, X: Clone> AugWriter<'f, 'c, FV, FX, X> {
    fn build<V>(
        &mut self,
        b: &mut CellBuilder,
        entries: &[(BitString, V, X)],
        depth: usize,
        key_len: usize,
    ) -> EncodeResult<X>
    where
        FV: FnMut(&mut CellBuilder, &V) -> EncodeResult<()>,
        FX: FnMut(&mut CellBuilder, &X) -> EncodeResult<()>,
    {
        let remaining = key_len - depth;
        let first = &entries[0].0;
        if entries.len() == 1 {
            let (_, value, extra) = &entries[0];
            write_label(b, &first[depth..], remaining)?;
            (self.write_extra)(b, extra)?;
            (self.write_value)(b, value)?;
            return Ok(extra.clone());
        }
        let last = &entries[entries.len() - 1].0;
        let shared = common_prefix(&first[depth..], &last[depth..]);
        write_label(b, &first[depth..depth + shared], remaining)?;
        let pivot = depth + shared;
        let split = entries.partition_point(|(k, _, _)| !k[pivot]);
        let mut left = CellBuilder::new();
        let left_extra = self.build(&mut left, &entries[..split], pivot + 1, key_len)?;
        let mut right = CellBuilder::new();
        let right_extra = self.build(&mut right, &entries[split..], pivot + 1, key_len)?;
        b.store_ref(left.build()?)?;
        b.store_ref(right.build()?)?;
        let extra = (self.combine)(&left_extra, &right_extra)
            .ok_or_else(|| EncodeError::invariant("fork extras do not combine"))?;
        (self.write_extra)(b, &extra)?;
        Ok(extra)
    }
}

/// Reads a `HashmapE n X` at the cursor
pub fn parse_hashmap_e<'a, V, F>(
    p: &mut CellParser<'a>,
    key_len: usize,
    read_value: &mut F,
) -> ParseResult<Vec<(BitString, V)>>
where
    F: FnMut(&mut CellParser<'a>) -> ParseResult<V>,
{
    if p.read_bit()? {
        let root = p.next_ref()?;
        parse_edges(&mut root.parser(), key_len, read_value)
    } else {
        Ok(Vec::new())
    }
}

/// Writes a `HashmapE n X` holding `entries`
pub fn write_hashmap_e<V, F>(
    b: &mut CellBuilder,
    entries: &[(BitString, V)],
    key_len: usize,
    write_value: &mut F,
) -> EncodeResult<()>
where
    F: FnMut(&mut CellBuilder, &V) -> EncodeResult<()>,
{
    if entries.is_empty() {
        return b.store_bit(false);
    }
    let mut root = CellBuilder::new();
    write_edges(&mut root, entries, key_len, write_value)?;
    b.store_bit(true)?;
    b.store_ref(root.build()?)
}

/// Reads a `HashmapAugE n X Y` at the cursor, returning its entries and the
/// extra stored for the whole dictionary.
///
/// When `combine` is given, fork extras are verified and the stored root
/// extra must equal the root node's.
pub fn parse_hashmap_aug_e<'a, V, X, FV, FX>(
    p: &mut CellParser<'a>,
    key_len: usize,
    read_value: &mut FV,
    read_extra: &mut FX,
    combine: Option<Combine<'_, X>>,
) -> ParseResult<(Vec<(BitString, V, X)>, X)>
where
    X: Clone + PartialEq,
    FV: FnMut(&mut CellParser<'a>) -> ParseResult<V>,
    FX: FnMut(&mut CellParser<'a>) -> ParseResult<X>,
{
    if p.read_bit()? {
        let root = p.next_ref()?;
        let (entries, root_extra) =
            parse_aug_edges(&mut root.parser(), key_len, read_value, read_extra, combine)?;
        let extra = read_extra(p)?;
        if combine.is_some() && extra != root_extra {
            return Err(InvalidEncoding::AggregateMismatch.into());
        }
        Ok((entries, extra))
    } else {
        Ok((Vec::new(), read_extra(p)?))
    }
}

/// Writes a `HashmapAugE n X Y` holding `entries`, with `empty_extra` as the
/// dictionary extra when there are none. Returns the extra written.
pub fn write_hashmap_aug_e<V, X, FV, FX>(
    b: &mut CellBuilder,
    entries: &[(BitString, V, X)],
    key_len: usize,
    write_value: &mut FV,
    write_extra: &mut FX,
    combine: Combine<'_, X>,
    empty_extra: &X,
) -> EncodeResult<X>
where
    X: Clone,
    FV: FnMut(&mut CellBuilder, &V) -> EncodeResult<()>,
    FX: FnMut(&mut CellBuilder, &X) -> EncodeResult<()>,
{
    if entries.is_empty() {
        b.store_bit(false)?;
        write_extra(b, empty_extra)?;
        return Ok(empty_extra.clone());
    }
    let mut root = CellBuilder::new();
    let extra = write_aug_edges(&mut root, entries, key_len, write_value, write_extra, combine)?;
    b.store_bit(true)?;
    b.store_ref(root.build()?)?;
    write_extra(b, &extra)?;
    Ok(extra)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cell::Cell;
    use crate::parse::error::ParseError;

    fn key(v: u64, n: usize) -> BitString {
        let mut out = BitString::with_capacity(n);
        for i in (0..n).rev() {
            out.push((v >> i) & 1 == 1);
        }
        out
    }

    fn label_cell(label: &BitStr, max_len: usize) -> Cell {
        let mut b = CellBuilder::new();
        write_label(&mut b, label, max_len).unwrap();
        b.build().unwrap()
    }

    #[test]
    fn label_forms() {
        // empty label: short wins at 2 bits
        assert_eq!(label_form(&BitString::new(), 8), LabelForm::Short);
        // 1 bit: short 4 bits, long 2+4+1 = 7
        assert_eq!(label_form(&key(1, 1), 8), LabelForm::Short);
        // 8 mixed bits of 8: short 18, long 2+4+8 = 14
        let mixed = key(0b1011_0010, 8);
        assert_eq!(label_form(&mixed, 8), LabelForm::Long);
        // 8 equal bits: same 3+4 = 7
        assert_eq!(label_form(&key(0xff, 8), 8), LabelForm::Same);
        // tie between short and long (len 2, width 2): short wins
        assert_eq!(label_form(&key(0b10, 2), 3), LabelForm::Short);
    }

    #[test]
    fn labels_read_back() {
        for (label, max_len) in [
            (key(0, 0), 0),
            (key(0b1, 1), 32),
            (key(0b1011_0010, 8), 8),
            (key(0, 17), 32),
            (key(0x3ff, 10), 16),
        ] {
            let cell = label_cell(&label, max_len);
            let mut p = cell.parser();
            assert_eq!(read_label(&mut p, max_len).unwrap(), label);
            assert_eq!(p.remaining_bits(), 0);
        }
    }

    #[test]
    fn overlong_label_rejected() {
        // short label of 3 bits in a 2-bit slot
        let mut b = CellBuilder::new();
        b.store_bit(false).unwrap();
        b.store_unary(3).unwrap();
        b.store_uint(0, 3).unwrap();
        let cell = b.build().unwrap();
        assert_eq!(
            read_label(&mut cell.parser(), 2),
            Err(ParseError::Encoding(InvalidEncoding::LabelTooLong {
                label: 3,
                remaining: 2
            }))
        );
    }

    fn sample_entries() -> Vec<(BitString, u16)> {
        [1u64, 5, 6, 200, 201]
            .iter()
            .map(|&k| (key(k, 8), k as u16 * 3))
            .collect()
    }

    #[test]
    fn plain_round_trip_and_count() {
        let entries = sample_entries();
        let mut b = CellBuilder::new();
        write_hashmap_e(&mut b, &entries, 8, &mut |b, v: &u16| b.store_uint(u64::from(*v), 16))
            .unwrap();
        let cell = b.build().unwrap();
        let back = parse_hashmap_e(&mut cell.parser(), 8, &mut |p| {
            p.read_uint(16).map(|v| v as u16)
        })
        .unwrap();
        assert_eq!(back, entries);
        assert_eq!(count_hashmap_e(&mut cell.parser(), 8).unwrap(), 5);
    }

    #[test]
    fn empty_and_unsorted() {
        let mut b = CellBuilder::new();
        write_hashmap_e::<u8, _>(&mut b, &[], 8, &mut |_, _| Ok(())).unwrap();
        let cell = b.build().unwrap();
        assert_eq!(cell.bit_len(), 1);
        assert_eq!(count_hashmap_e(&mut cell.parser(), 8).unwrap(), 0);

        let mut entries = sample_entries();
        entries.swap(0, 1);
        let mut b = CellBuilder::new();
        assert!(matches!(
            write_hashmap_e(&mut b, &entries, 8, &mut |b, v: &u16| b
                .store_uint(u64::from(*v), 16)),
            Err(EncodeError::InvariantViolation(_))
        ));
    }

    fn sum(a: &u64, b: &u64) -> Option<u64> {
        a.checked_add(*b)
    }

    #[test]
    fn aug_extras_verified() {
        let entries: Vec<(BitString, u8, u64)> = [3u64, 9, 12]
            .iter()
            .map(|&k| (key(k, 4), k as u8, k * 10))
            .collect();
        let mut b = CellBuilder::new();
        let extra = write_hashmap_aug_e(
            &mut b,
            &entries,
            4,
            &mut |b, v: &u8| b.store_uint(u64::from(*v), 8),
            &mut |b, x: &u64| b.store_uint(*x, 16),
            &sum,
            &0,
        )
        .unwrap();
        assert_eq!(extra, 240);
        let cell = b.build().unwrap();
        let (back, stored) = parse_hashmap_aug_e(
            &mut cell.parser(),
            4,
            &mut |p| p.read_uint(8).map(|v| v as u8),
            &mut |p| p.read_uint(16),
            Some(&sum),
        )
        .unwrap();
        assert_eq!(back, entries);
        assert_eq!(stored, 240);

        // a combiner that disagrees with what was written
        let product = |a: &u64, b: &u64| Some(a * b);
        let err = parse_hashmap_aug_e(
            &mut cell.parser(),
            4,
            &mut |p| p.read_uint(8).map(|v| v as u8),
            &mut |p| p.read_uint(16),
            Some(&product),
        );
        assert_eq!(
            err,
            Err(ParseError::Encoding(InvalidEncoding::AggregateMismatch))
        );
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn any_key_set_round_trips(keys in proptest::collection::btree_set(any::<u16>(), 1..40)) {
                let entries: Vec<(BitString, u16)> =
                    keys.iter().map(|&k| (key(u64::from(k), 16), k)).collect();
                let mut b = CellBuilder::new();
                write_hashmap_e(&mut b, &entries, 16, &mut |b, v: &u16| b.store_uint(u64::from(*v), 16)).unwrap();
                let cell = b.build().unwrap();
                let back = parse_hashmap_e(&mut cell.parser(), 16, &mut |p| p.read_uint(16).map(|v| v as u16)).unwrap();
                prop_assert_eq!(back, entries);
                prop_assert_eq!(count_hashmap_e(&mut cell.parser(), 16).unwrap(), keys.len());
            }

            #[test]
            fn aug_root_is_total(keys in proptest::collection::btree_set(any::<u8>(), 1..30)) {
                let entries: Vec<(BitString, (), u64)> =
                    keys.iter().map(|&k| (key(u64::from(k), 8), (), u64::from(k))).collect();
                let mut b = CellBuilder::new();
                let extra = write_aug_edges(
                    &mut b, &entries, 8,
                    &mut |_, _: &()| Ok(()),
                    &mut |b, x: &u64| b.store_uint(*x, 32),
                    &sum,
                ).unwrap();
                prop_assert_eq!(extra, keys.iter().map(|&k| u64::from(k)).sum::<u64>());
                let cell = b.build().unwrap();
                let (_, root) = parse_aug_edges(
                    &mut cell.parser(), 8,
                    &mut |_| Ok(()),
                    &mut |p| p.read_uint(32),
                    Some(&sum),
                ).unwrap();
                prop_assert_eq!(root, extra);
            }
        }
    }
}

//! Directive interpreter
//!
//! A [`Registry`] holds compiled [`TypeDefinition`]s and walks them against
//! a [`CellParser`] or [`CellBuilder`], producing and consuming [`Value`]s.
//! It is the dynamically dispatched counterpart of the derived
//! [`Decode`](crate::conv::Decode) and [`Encode`](crate::conv::Encode)
//! implementations, and follows the same layout rules:
//!
//!   * a record's tag is checked before any field, and a mismatch consumes
//!     no reference
//!   * sum-type variants are tried in declaration order by lookahead
//!   * by-reference fields are read from, and written to, the next child
//!
//! Types whose layout depends on earlier field values are registered as
//! [`CustomCodec`]s, which receive the raw cursor and the registry itself so
//! that nested standard types still go through the interpreter.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

use tracing::{debug, trace};

use crate::builder::CellBuilder;
use crate::cell::Cell;
use crate::conv::error::{DecodeResult, EncodeError, EncodeResult};
use crate::directive::{Directive, Placement, RefSlot, TypeDefinition, TypeKind, WireType};
use crate::hashmap;
use crate::parse::error::{InvalidEncoding, ParseError, TagError};
use crate::parse::{bits_to_u64, CellParser, ParseResult};
use crate::prim::{read_var_uint, write_var_uint};
use crate::tag::Tag;

pub mod value;

pub use value::{SumValue, Value};

/// Hand-written layout for a type the directive model cannot express
pub trait CustomCodec: Send + Sync {
    fn decode(&self, p: &mut CellParser<'_>, registry: &Registry) -> ParseResult<Value>;

    fn encode(&self, b: &mut CellBuilder, value: &Value, registry: &Registry) -> EncodeResult<()>;
}

/// Fork-extra combination for augmented dictionaries with a given extra type
pub trait Aggregator: Send + Sync {
    /// Returns `None` when the two extras do not have the shape this
    /// aggregator expects
    fn combine(&self, left: &Value, right: &Value) -> Option<Value>;
}

type Combiner<'s> = Box<dyn Fn(&Value, &Value) -> Option<Value> + 's>;

fn sum_uint(left: &Value, right: &Value) -> Option<Value> {
    match (left, right) {
        (Value::Uint(a), Value::Uint(b)) => Some(Value::Uint(a + b)),
        _ => {
            trace!(?left, ?right, "unsigned extras expected");
            None
        }
    }
}

fn unit_extras(left: &Value, right: &Value) -> Option<Value> {
    matches!((left, right), (Value::Unit, Value::Unit)).then_some(Value::Unit)
}

#[derive(Default)]
pub struct Registry {
    types: HashMap<String, TypeDefinition>,
    customs: HashMap<String, Box<dyn CustomCodec>>,
    aggregators: HashMap<WireType, Box<dyn Aggregator>>,
}

impl Debug for Registry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.types.keys().collect();
        types.sort();
        let mut customs: Vec<_> = self.customs.keys().collect();
        customs.sort();
        f.debug_struct("Registry")
            .field("types", &types)
            .field("customs", &customs)
            .field("aggregators", &self.aggregators.len())
            .finish()
    }
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_schema(defs: impl IntoIterator<Item = TypeDefinition>) -> Self {
        let mut out = Self::new();
        for def in defs {
            out.insert(def);
        }
        debug!(types = out.types.len(), "built type registry");
        out
    }

    /// Adds or replaces a definition
    pub fn insert(&mut self, def: TypeDefinition) {
        self.types.insert(def.name.clone(), def);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    /// Installs `codec` for `name`, replacing any compiled definition
    pub fn register_custom(&mut self, name: impl Into<String>, codec: impl CustomCodec + 'static) {
        let name = name.into();
        self.types.insert(name.clone(), TypeDefinition::custom(name.clone()));
        self.customs.insert(name, Box::new(codec));
    }

    /// Installs the fork-extra combination for augmented dictionaries whose
    /// extra has type `extra`.
    ///
    /// Unsigned integer extras are summed and `Unit` extras are trivially
    /// combined without registration.
    pub fn register_aggregator(&mut self, extra: WireType, aggregator: impl Aggregator + 'static) {
        self.aggregators.insert(extra, Box::new(aggregator));
    }

    fn combiner(&self, extra: &WireType) -> Option<Combiner<'_>> {
        if let Some(agg) = self.aggregators.get(extra) {
            return Some(Box::new(move |a: &Value, b: &Value| agg.combine(a, b)));
        }
        match extra {
            WireType::Uint(_) | WireType::VarUInteger(_) | WireType::BoundedUint { .. } => {
                Some(Box::new(sum_uint))
            }
            WireType::Unit => Some(Box::new(unit_extras)),
            _ => None,
        }
    }

    /// Decodes a value of the named type from the root of `cell`
    pub fn unmarshal(&self, name: &str, cell: &Cell) -> DecodeResult<Value> {
        let mut p = cell.parser();
        let ret = self.decode(&mut p, name)?;
        cfg_if::cfg_if! {
            if #[cfg(feature = "check_complete_parse")] {
                if !p.is_exhausted() {
                    return Err(crate::conv::error::DecodeError::Incomplete {
                        bits: p.remaining_bits(),
                        refs: p.remaining_refs(),
                    });
                }
            }
        }
        Ok(ret)
    }

    /// Encodes `value` as the named type into a new root cell
    pub fn marshal(&self, name: &str, value: &Value) -> EncodeResult<Cell> {
        let mut b = CellBuilder::new();
        self.encode(&mut b, name, value)?;
        b.build()
    }

    pub fn decode(&self, p: &mut CellParser<'_>, name: &str) -> ParseResult<Value> {
        let def = self
            .types
            .get(name)
            .ok_or_else(|| InvalidEncoding::UnknownType(name.to_owned()))?;
        self.decode_definition(p, def)
    }

    pub fn decode_definition(
        &self,
        p: &mut CellParser<'_>,
        def: &TypeDefinition,
    ) -> ParseResult<Value> {
        match &def.kind {
            TypeKind::Record(record) => {
                if let Some(tag) = &record.tag {
                    check_tag(p, tag, &def.name)?;
                }
                Ok(Value::Record(self.decode_fields(p, &record.directives)?))
            }
            TypeKind::SumType(variants) => {
                for v in variants {
                    if p.try_tag(&v.tag)? {
                        trace!(ty = %def.name, variant = %v.name, "selected variant");
                        let fields = self.decode_fields(p, &v.record.directives)?;
                        return Ok(Value::Sum(SumValue::new(v.name.clone(), fields)));
                    }
                }
                Err(ParseError::no_matching_variant(def.name.clone()))
            }
            TypeKind::Custom => match self.customs.get(&def.name) {
                Some(codec) => codec.decode(p, self),
                None => Err(InvalidEncoding::UnknownType(def.name.clone()).into()),
            },
        }
    }

    fn decode_fields(
        &self,
        p: &mut CellParser<'_>,
        directives: &[Directive],
    ) -> ParseResult<Vec<(String, Value)>> {
        let mut out = Vec::with_capacity(directives.len());
        for d in directives {
            trace!(field = %d.name, wire = %d.wire, "decoding field");
            let value = match d.placement {
                Placement::Inline => self.decode_wire(p, &d.wire)?,
                Placement::ByRef(RefSlot::Next) => {
                    let child = p.next_ref()?;
                    self.decode_wire(&mut child.parser(), &d.wire)?
                }
                Placement::ByRef(RefSlot::Index(i)) => {
                    let child = p.ref_at(i)?;
                    self.decode_wire(&mut child.parser(), &d.wire)?
                }
            };
            out.push((d.name.clone(), value));
        }
        Ok(out)
    }

    /// Decodes a single wire type at the cursor
    pub fn decode_wire(&self, p: &mut CellParser<'_>, wire: &WireType) -> ParseResult<Value> {
        Ok(match wire {
            WireType::Bool => Value::Bool(p.read_bit()?),
            WireType::Uint(n) => Value::Uint(p.read_biguint(*n)?),
            WireType::Int(n) => Value::Int(p.read_bigint(*n)?),
            WireType::Bits(n) => Value::Bits(p.read_bits(*n)?.to_bitvec()),
            WireType::BoundedUint { bits, max } => {
                let value = p.read_uint(*bits)?;
                if value > *max {
                    return Err(InvalidEncoding::ValueOutOfRange { value, max: *max }.into());
                }
                Value::uint(value)
            }
            WireType::VarUInteger(n) => Value::Uint(read_var_uint(p, *n)?),
            WireType::Unit => Value::Unit,
            WireType::Any => Value::Cell(p.read_remainder()?),
            WireType::Named(name) => self.decode(p, name)?,
            WireType::Ref(inner) => {
                let child = p.next_ref()?;
                self.decode_wire(&mut child.parser(), inner)?
            }
            WireType::Maybe(inner) => {
                if p.read_bit()? {
                    Value::Maybe(Some(Box::new(self.decode_wire(p, inner)?)))
                } else {
                    Value::Maybe(None)
                }
            }
            WireType::Either(left, right) => {
                if p.read_bit()? {
                    Value::Either(crate::adt::Either::Right(Box::new(self.decode_wire(p, right)?)))
                } else {
                    Value::Either(crate::adt::Either::Left(Box::new(self.decode_wire(p, left)?)))
                }
            }
            WireType::EitherRef(inner) => {
                let by_ref = p.read_bit()?;
                let value = if by_ref {
                    let child = p.next_ref()?;
                    self.decode_wire(&mut child.parser(), inner)?
                } else {
                    self.decode_wire(p, inner)?
                };
                Value::EitherRef {
                    by_ref,
                    value: Box::new(value),
                }
            }
            WireType::Hashmap { key_bits, value } => Value::Map(hashmap::parse_edges(
                p,
                *key_bits,
                &mut |c| self.decode_wire(c, value),
            )?),
            WireType::HashmapE { key_bits, value } => Value::Map(hashmap::parse_hashmap_e(
                p,
                *key_bits,
                &mut |c| self.decode_wire(c, value),
            )?),
            WireType::HashmapAugE {
                key_bits,
                value,
                extra,
            } => {
                let combiner = self.combiner(extra);
                let (entries, root) = hashmap::parse_hashmap_aug_e(
                    p,
                    *key_bits,
                    &mut |c| self.decode_wire(c, value),
                    &mut |c| self.decode_wire(c, extra),
                    combiner.as_deref(),
                )?;
                Value::AugMap {
                    entries,
                    extra: Box::new(root),
                }
            }
        })
    }

    pub fn encode(&self, b: &mut CellBuilder, name: &str, value: &Value) -> EncodeResult<()> {
        let def = self
            .types
            .get(name)
            .ok_or_else(|| EncodeError::UnknownType(name.to_owned()))?;
        self.encode_definition(b, def, value)
    }

    pub fn encode_definition(
        &self,
        b: &mut CellBuilder,
        def: &TypeDefinition,
        value: &Value,
    ) -> EncodeResult<()> {
        match (&def.kind, value) {
            (TypeKind::Record(record), Value::Record(fields)) => {
                if let Some(tag) = &record.tag {
                    b.store_tag(tag)?;
                }
                self.encode_fields(b, &record.directives, fields)
            }
            (TypeKind::SumType(variants), Value::Sum(sum)) => {
                let fields = match sum.slots.as_slice() {
                    [(slot, fields)] if *slot == sum.discriminator => fields,
                    [(slot, _)] => {
                        return Err(EncodeError::invariant(format!(
                            "`{}` value names variant `{}` but populates `{}`",
                            def.name, sum.discriminator, slot
                        )))
                    }
                    slots => {
                        return Err(EncodeError::invariant(format!(
                            "`{}` value populates {} variants instead of one",
                            def.name,
                            slots.len()
                        )))
                    }
                };
                let variant = variants
                    .iter()
                    .find(|v| v.name == sum.discriminator)
                    .ok_or_else(|| {
                        EncodeError::invariant(format!(
                            "`{}` has no variant `{}`",
                            def.name, sum.discriminator
                        ))
                    })?;
                b.store_tag(&variant.tag)?;
                self.encode_fields(b, &variant.record.directives, fields)
            }
            (TypeKind::Custom, value) => match self.customs.get(&def.name) {
                Some(codec) => codec.encode(b, value, self),
                None => Err(EncodeError::UnknownType(def.name.clone())),
            },
            (_, value) => Err(EncodeError::TypeMismatch {
                expected: def.name.clone(),
                found: value.shape().to_owned(),
            }),
        }
    }

    fn encode_fields(
        &self,
        b: &mut CellBuilder,
        directives: &[Directive],
        fields: &[(String, Value)],
    ) -> EncodeResult<()> {
        for d in directives {
            let value = fields
                .iter()
                .find(|(name, _)| *name == d.name)
                .map(|(_, v)| v)
                .ok_or_else(|| EncodeError::invariant(format!("missing field `{}`", d.name)))?;
            trace!(field = %d.name, wire = %d.wire, "encoding field");
            match d.placement {
                Placement::Inline => self.encode_wire(b, &d.wire, value)?,
                Placement::ByRef(slot) => {
                    if let RefSlot::Index(i) = slot {
                        if i != b.ref_count() {
                            return Err(EncodeError::invariant(format!(
                                "field `{}` must occupy reference {}, next free is {}",
                                d.name,
                                i,
                                b.ref_count()
                            )));
                        }
                    }
                    b.store_ref(self.encode_child(&d.wire, value)?)?;
                }
            }
        }
        Ok(())
    }

    /// Builds the child cell holding `value`; a raw cell is linked as is
    fn encode_child(&self, wire: &WireType, value: &Value) -> EncodeResult<Cell> {
        if let (WireType::Any, Value::Cell(cell)) = (wire, value) {
            return Ok(cell.clone());
        }
        let mut child = CellBuilder::new();
        self.encode_wire(&mut child, wire, value)?;
        child.build()
    }

    /// Encodes a single wire type at the builder
    pub fn encode_wire(&self, b: &mut CellBuilder, wire: &WireType, value: &Value) -> EncodeResult<()> {
        match (wire, value) {
            (WireType::Bool, Value::Bool(x)) => b.store_bit(*x),
            (WireType::Uint(n), Value::Uint(v)) => b.store_biguint(v, *n),
            (WireType::Int(n), Value::Int(v)) => b.store_bigint(v, *n),
            (WireType::Bits(n), Value::Bits(bits)) => {
                if bits.len() != *n {
                    return Err(EncodeError::invariant(format!(
                        "expected {} bits, found {}",
                        n,
                        bits.len()
                    )));
                }
                b.store_bits(bits)
            }
            (WireType::BoundedUint { bits, max }, Value::Uint(v)) => {
                let raw = v.to_u64_digits();
                let small = match raw.as_slice() {
                    [] => 0,
                    [x] => *x,
                    _ => u64::MAX,
                };
                if small > *max {
                    return Err(EncodeError::invariant(format!("{} exceeds bound {}", v, max)));
                }
                b.store_uint(small, *bits)
            }
            (WireType::VarUInteger(n), Value::Uint(v)) => write_var_uint(b, *n, v),
            (WireType::Unit, Value::Unit) => Ok(()),
            (WireType::Any, Value::Cell(cell)) => b.store_contents(cell),
            (WireType::Named(name), value) => self.encode(b, name, value),
            (WireType::Ref(inner), value) => b.store_ref(self.encode_child(inner, value)?),
            (WireType::Maybe(inner), Value::Maybe(opt)) => match opt {
                Some(v) => {
                    b.store_bit(true)?;
                    self.encode_wire(b, inner, v)
                }
                None => b.store_bit(false),
            },
            (WireType::Either(left, right), Value::Either(e)) => match e {
                crate::adt::Either::Left(v) => {
                    b.store_bit(false)?;
                    self.encode_wire(b, left, v)
                }
                crate::adt::Either::Right(v) => {
                    b.store_bit(true)?;
                    self.encode_wire(b, right, v)
                }
            },
            (WireType::EitherRef(inner), Value::EitherRef { by_ref, value }) => {
                b.store_bit(*by_ref)?;
                if *by_ref {
                    b.store_ref(self.encode_child(inner, value)?)
                } else {
                    self.encode_wire(b, inner, value)
                }
            }
            (WireType::Hashmap { key_bits, value }, Value::Map(entries)) => {
                hashmap::write_edges(b, entries, *key_bits, &mut |b, v: &Value| {
                    self.encode_wire(b, value, v)
                })
            }
            (WireType::HashmapE { key_bits, value }, Value::Map(entries)) => {
                hashmap::write_hashmap_e(b, entries, *key_bits, &mut |b, v: &Value| {
                    self.encode_wire(b, value, v)
                })
            }
            (
                WireType::HashmapAugE {
                    key_bits,
                    value,
                    extra,
                },
                Value::AugMap {
                    entries,
                    extra: stored,
                },
            ) => {
                let combiner = self.combiner(extra).ok_or_else(|| {
                    EncodeError::invariant(format!("no aggregator registered for extra `{}`", extra))
                })?;
                let written = hashmap::write_hashmap_aug_e(
                    b,
                    entries,
                    *key_bits,
                    &mut |b, v: &Value| self.encode_wire(b, value, v),
                    &mut |b, x: &Value| self.encode_wire(b, extra, x),
                    &*combiner,
                    stored,
                )?;
                if written != **stored {
                    return Err(EncodeError::invariant(
                        "stored dictionary extra differs from the combination of its entries",
                    ));
                }
                Ok(())
            }
            (wire, value) => Err(EncodeError::TypeMismatch {
                expected: wire.to_string(),
                found: value.shape().to_owned(),
            }),
        }
    }
}

fn check_tag(p: &mut CellParser<'_>, tag: &Tag, for_type: &str) -> ParseResult<()> {
    if p.try_tag(tag)? {
        return Ok(());
    }
    let actual = bits_to_u64(p.peek_bits(tag.len() as usize)?);
    Err(TagError::new(*tag, actual, for_type.to_owned()).into())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cell::BitString;
    use crate::conv::error::DecodeError;
    use crate::parse::error::{ExhaustionError, TokenError};
    use crate::schema::{compile_str, CompileOptions};
    use num_bigint::BigUint;

    fn registry(text: &str) -> Registry {
        Registry::from_schema(compile_str(text, &CompileOptions::default()).unwrap())
    }

    fn key(v: u64, n: usize) -> BitString {
        (0..n).rev().map(|i| (v >> i) & 1 == 1).collect()
    }

    const SHARDS: &str = "\
        shard_ident$00 shard_pfx_bits:(#<= 60) workchain_id:int32 \
            shard_prefix:uint64 = ShardIdent;\n\
        fsm_none$0 = FutureSplitMerge;\n\
        fsm_split$10 split_utime:uint32 interval:uint32 = FutureSplitMerge;\n\
        fsm_merge$11 merge_utime:uint32 interval:uint32 = FutureSplitMerge;\n\
        descr#b shard:ShardIdent fsm:FutureSplitMerge note:^Cell \
            weights:(HashmapE 8 uint16) = Descr;";

    fn descr_value(fsm: Value) -> Value {
        let note = {
            let mut b = CellBuilder::new();
            b.store_uint(0xabcd, 16).unwrap();
            b.build().unwrap()
        };
        Value::record([
            (
                "shard",
                Value::record([
                    ("shard_pfx_bits", Value::uint(2)),
                    ("workchain_id", Value::int(-1)),
                    ("shard_prefix", Value::uint(0x8000_0000_0000_0000)),
                ]),
            ),
            ("fsm", fsm),
            ("note", Value::Cell(note)),
            (
                "weights",
                Value::Map(vec![
                    (key(1, 8), Value::uint(10)),
                    (key(200, 8), Value::uint(20)),
                ]),
            ),
        ])
    }

    #[test]
    fn record_and_sum_round_trip() {
        let reg = registry(SHARDS);
        let fsm = Value::Sum(SumValue::new(
            "fsm_merge",
            vec![
                ("merge_utime".into(), Value::uint(1_700_000_000)),
                ("interval".into(), Value::uint(60)),
            ],
        ));
        let value = descr_value(fsm);
        let cell = reg.marshal("Descr", &value).unwrap();
        assert_eq!(cell.refs().len(), 2);
        let mut p = cell.parser();
        assert_eq!(p.read_uint(4).unwrap(), 0xb);
        let back = reg.unmarshal("Descr", &cell).unwrap();
        assert_eq!(back, value);
        assert_eq!(
            back.field("fsm").and_then(|f| f.field("interval")),
            Some(&Value::uint(60))
        );
    }

    #[test]
    fn tag_mismatch_consumes_no_reference() {
        let reg = registry(SHARDS);
        let mut b = CellBuilder::new();
        b.store_uint(0xc, 4).unwrap();
        b.store_ref(Cell::empty()).unwrap();
        let cell = b.build().unwrap();
        let mut p = cell.parser();
        let err = reg.decode(&mut p, "Descr").unwrap_err();
        assert!(matches!(err, ParseError::Token(TokenError::TagMismatch(ref e)) if e.actual() == 0xc));
        assert_eq!(p.ref_offset(), 0);
        assert_eq!(p.bit_offset(), 0);
    }

    #[test]
    fn no_matching_variant() {
        let reg = registry("a$00 = A; b$01 = A;");
        let mut b = CellBuilder::new();
        b.store_uint(0b11, 2).unwrap();
        let cell = b.build().unwrap();
        assert_eq!(
            reg.unmarshal("A", &cell),
            Err(DecodeError::Parse(ParseError::no_matching_variant("A")))
        );
    }

    #[test]
    fn variant_exclusivity() {
        let reg = registry(SHARDS);
        let split = (
            "fsm_split".to_owned(),
            vec![
                ("split_utime".to_owned(), Value::uint(1)),
                ("interval".to_owned(), Value::uint(2)),
            ],
        );
        let two = Value::Sum(SumValue {
            discriminator: "fsm_split".into(),
            slots: vec![split.clone(), ("fsm_none".into(), vec![])],
        });
        let zero = Value::Sum(SumValue {
            discriminator: "fsm_split".into(),
            slots: vec![],
        });
        let misnamed = Value::Sum(SumValue {
            discriminator: "fsm_none".into(),
            slots: vec![split],
        });
        for bad in [two, zero, misnamed] {
            let mut b = CellBuilder::new();
            assert!(matches!(
                reg.encode(&mut b, "FutureSplitMerge", &bad),
                Err(EncodeError::InvariantViolation(_))
            ));
            assert_eq!(b.bit_len(), 0);
        }
    }

    #[test]
    fn missing_reference_and_truncation() {
        let reg = registry("r$1 x:uint8 y:^uint8 = R;");
        let mut b = CellBuilder::new();
        b.store_uint(1, 1).unwrap();
        b.store_uint(7, 8).unwrap();
        let cell = b.build().unwrap();
        assert!(matches!(
            reg.unmarshal("R", &cell),
            Err(DecodeError::Parse(ParseError::Exhausted(
                ExhaustionError::InsufficientRefs { .. }
            )))
        ));
        let mut b = CellBuilder::new();
        b.store_uint(1, 1).unwrap();
        b.store_uint(7, 4).unwrap();
        let cell = b.build().unwrap();
        assert!(matches!(
            reg.unmarshal("R", &cell),
            Err(DecodeError::Parse(ParseError::Exhausted(
                ExhaustionError::InsufficientBits { .. }
            )))
        ));
    }

    #[test]
    fn overflow_is_reported() {
        let reg = registry("big$_ a:bits256 b:bits256 c:bits256 d:bits256 = Big;");
        let bits = Value::Bits(BitString::repeat(true, 256));
        let value = Value::record(["a", "b", "c", "d"].map(|k| (k, bits.clone())));
        assert!(matches!(
            reg.marshal("Big", &value),
            Err(EncodeError::Overflow { .. })
        ));
    }

    struct Addr8;

    impl CustomCodec for Addr8 {
        fn decode(&self, p: &mut CellParser<'_>, registry: &Registry) -> ParseResult<Value> {
            let len = p.read_uint(2)?;
            let mut parts = vec![("len".to_owned(), Value::uint(len))];
            for i in 0..len {
                parts.push((format!("b{}", i), registry.decode_wire(p, &WireType::Uint(8))?));
            }
            Ok(Value::Record(parts))
        }

        fn encode(&self, b: &mut CellBuilder, value: &Value, registry: &Registry) -> EncodeResult<()> {
            let Value::Record(parts) = value else {
                return Err(EncodeError::TypeMismatch {
                    expected: "Addr8".into(),
                    found: value.shape().into(),
                });
            };
            b.store_uint(parts.len() as u64 - 1, 2)?;
            for (_, v) in &parts[1..] {
                registry.encode_wire(b, &WireType::Uint(8), v)?;
            }
            Ok(())
        }
    }

    #[test]
    fn custom_codec_nested_in_compiled_record() {
        let defs = compile_str(
            "msg$1 src:Addr8 body:(Maybe ^uint32) = Msg;",
            &CompileOptions::default().with_known_types(["Addr8"]),
        )
        .unwrap();
        let mut reg = Registry::from_schema(defs);
        reg.register_custom("Addr8", Addr8);
        let value = Value::record([
            (
                "src",
                Value::record([("len", Value::uint(2)), ("b0", Value::uint(7)), ("b1", Value::uint(9))]),
            ),
            ("body", Value::Maybe(Some(Box::new(Value::uint(5))))),
        ]);
        let cell = reg.marshal("Msg", &value).unwrap();
        assert_eq!(cell.bit_len(), 1 + 2 + 16 + 1);
        assert_eq!(reg.unmarshal("Msg", &cell).unwrap(), value);
    }

    #[test]
    fn augmented_map_with_default_sum() {
        let reg = registry("book$_ accounts:(HashmapAugE 16 uint8 Coins) = Book;");
        let entries = vec![
            (key(3, 16), Value::uint(1), Value::uint(100)),
            (key(40, 16), Value::uint(2), Value::uint(250)),
            (key(41, 16), Value::uint(3), Value::uint(5)),
        ];
        let value = Value::record([(
            "accounts",
            Value::AugMap {
                entries: entries.clone(),
                extra: Box::new(Value::uint(355)),
            },
        )]);
        let cell = reg.marshal("Book", &value).unwrap();
        let back = reg.unmarshal("Book", &cell).unwrap();
        assert_eq!(back, value);

        let wrong = Value::record([(
            "accounts",
            Value::AugMap {
                entries,
                extra: Box::new(Value::uint(1)),
            },
        )]);
        assert!(matches!(
            reg.marshal("Book", &wrong),
            Err(EncodeError::InvariantViolation(_))
        ));
    }

    struct MaxAgg;

    impl Aggregator for MaxAgg {
        fn combine(&self, left: &Value, right: &Value) -> Option<Value> {
            match (left, right) {
                (Value::Int(a), Value::Int(b)) => Some(Value::Int(a.max(b).clone())),
                _ => None,
            }
        }
    }

    #[test]
    fn registered_aggregator_is_verified() {
        let mut reg = registry("m$_ x:(HashmapAugE 8 Bool int16) = M;");
        let value = Value::record([(
            "x",
            Value::AugMap {
                entries: vec![
                    (key(0, 8), Value::Bool(true), Value::int(-4)),
                    (key(255, 8), Value::Bool(false), Value::int(9)),
                ],
                extra: Box::new(Value::int(9)),
            },
        )]);
        assert!(matches!(
            reg.marshal("M", &value),
            Err(EncodeError::InvariantViolation(_))
        ));
        reg.register_aggregator(WireType::Int(16), MaxAgg);
        let cell = reg.marshal("M", &value).unwrap();
        assert_eq!(reg.unmarshal("M", &cell).unwrap(), value);
    }

    #[test]
    fn aggregator_rejects_extras_of_other_shape() {
        let schema = "m$_ x:(HashmapAugE 8 Bool uint16) = M;";
        let summed = registry(schema);
        let value = Value::record([(
            "x",
            Value::AugMap {
                entries: vec![
                    (key(1, 8), Value::Bool(true), Value::uint(4)),
                    (key(200, 8), Value::Bool(false), Value::uint(9)),
                ],
                extra: Box::new(Value::uint(13)),
            },
        )]);
        let cell = summed.marshal("M", &value).unwrap();

        // signed maximum over unsigned extras has nothing to combine
        let mut mismatched = registry(schema);
        mismatched.register_aggregator(WireType::Uint(16), MaxAgg);
        assert!(matches!(
            mismatched.marshal("M", &value),
            Err(EncodeError::InvariantViolation(_))
        ));
        assert_eq!(
            mismatched.unmarshal("M", &cell),
            Err(DecodeError::Parse(ParseError::Encoding(
                InvalidEncoding::AggregateMismatch
            )))
        );
        assert_eq!(sum_uint(&Value::uint(1), &Value::int(1)), None);
        assert_eq!(unit_extras(&Value::Unit, &Value::Bool(true)), None);
    }

    #[test]
    fn reset_allows_second_interpretation() {
        let reg = registry("wide$_ a:uint16 = Wide; narrow$_ hi:uint8 lo:uint8 = Narrow;");
        let cell = reg
            .marshal("Wide", &Value::record([("a", Value::uint(0x1234))]))
            .unwrap();
        let mut p = cell.parser();
        let wide = reg.decode(&mut p, "Wide").unwrap();
        assert_eq!(wide.field("a").and_then(Value::as_u64), Some(0x1234));
        p.reset();
        let narrow = reg.decode(&mut p, "Narrow").unwrap();
        assert_eq!(narrow.field("hi"), Some(&Value::Uint(BigUint::from(0x12u8))));
        assert_eq!(narrow.field("lo").and_then(Value::as_u64), Some(0x34));
    }

    #[test]
    fn unknown_names() {
        let reg = Registry::new();
        assert_eq!(
            reg.unmarshal("Nope", &Cell::empty()),
            Err(DecodeError::Parse(
                InvalidEncoding::UnknownType("Nope".into()).into()
            ))
        );
        assert_eq!(
            reg.marshal("Nope", &Value::Unit),
            Err(EncodeError::UnknownType("Nope".into()))
        );
    }
}

//! Schema-shaped values produced and consumed by the dynamic engine

use num_bigint::{BigInt, BigUint};
use num_traits::ToPrimitive;
#[cfg(feature = "serde_impls")]
use serde::Serialize;

use crate::adt::Either;
use crate::cell::{BitString, Cell};

#[cfg(feature = "serde_impls")]
fn serialize_cell<S: serde::Serializer>(cell: &Cell, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&crate::cell::boc::serialize_base64(cell, Default::default()))
}

/// A decoded value of any compiled type
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde_impls", derive(Serialize))]
pub enum Value {
    Unit,
    Bool(bool),
    Uint(BigUint),
    Int(BigInt),
    Bits(BitString),
    Cell(#[cfg_attr(feature = "serde_impls", serde(serialize_with = "serialize_cell"))] Cell),
    Maybe(Option<Box<Value>>),
    Either(Either<Box<Value>, Box<Value>>),
    EitherRef { by_ref: bool, value: Box<Value> },
    /// Named fields in wire order
    Record(Vec<(String, Value)>),
    Sum(SumValue),
    /// Entries in ascending key order
    Map(Vec<(BitString, Value)>),
    AugMap {
        entries: Vec<(BitString, Value, Value)>,
        extra: Box<Value>,
    },
}

/// Value of a sum type: the discriminating constructor name plus the
/// populated variant slots
///
/// A well-formed value has exactly one slot, named by `discriminator`.
/// Decoding always produces one; encoding rejects anything else.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde_impls", derive(Serialize))]
pub struct SumValue {
    pub discriminator: String,
    pub slots: Vec<(String, Vec<(String, Value)>)>,
}

impl SumValue {
    #[must_use]
    pub fn new(variant: impl Into<String>, fields: Vec<(String, Value)>) -> Self {
        let variant = variant.into();
        Self {
            discriminator: variant.clone(),
            slots: vec![(variant, fields)],
        }
    }

    /// Fields of the populated slot, if it is the one the discriminator names
    #[must_use]
    pub fn payload(&self) -> Option<&[(String, Value)]> {
        match self.slots.as_slice() {
            [(name, fields)] if *name == self.discriminator => Some(fields),
            _ => None,
        }
    }
}

impl Value {
    #[must_use]
    pub fn uint(v: u64) -> Self {
        Value::Uint(BigUint::from(v))
    }

    #[must_use]
    pub fn int(v: i64) -> Self {
        Value::Int(BigInt::from(v))
    }

    /// Builds a record value from `(name, value)` pairs
    pub fn record<S: Into<String>>(fields: impl IntoIterator<Item = (S, Value)>) -> Self {
        Value::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Looks up a field of a record, or of the populated slot of a sum
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        let fields = match self {
            Value::Record(fields) => fields.as_slice(),
            Value::Sum(sum) => sum.payload()?,
            _ => return None,
        };
        fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint(v) => v.to_u64(),
            Value::Int(v) => v.to_u64(),
            Value::Bool(b) => Some(u64::from(*b)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_biguint(&self) -> Option<&BigUint> {
        match self {
            Value::Uint(v) => Some(v),
            _ => None,
        }
    }

    /// Name of the value's shape, used in type-mismatch errors
    #[must_use]
    pub fn shape(&self) -> &'static str {
        match self {
            Value::Unit => "Unit",
            Value::Bool(_) => "Bool",
            Value::Uint(_) => "Uint",
            Value::Int(_) => "Int",
            Value::Bits(_) => "Bits",
            Value::Cell(_) => "Cell",
            Value::Maybe(_) => "Maybe",
            Value::Either(_) => "Either",
            Value::EitherRef { .. } => "EitherRef",
            Value::Record(_) => "Record",
            Value::Sum(_) => "Sum",
            Value::Map(_) => "Map",
            Value::AugMap { .. } => "AugMap",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::uint(v)
    }
}

impl From<Cell> for Value {
    fn from(cell: Cell) -> Self {
        Value::Cell(cell)
    }
}

//! Compiled serialization directives
//!
//! A [`TypeDefinition`] is the language-agnostic description of how one TL-B
//! type is laid out in a cell tree. The schema compiler produces them, the
//! [`dynamic`](crate::dynamic) engine interprets them, and the Rust emitter
//! renders them as derive-annotated declarations.
//!
//! Directive order within a [`Record`] is wire order.

use std::fmt::{Display, Formatter};

#[cfg(feature = "serde_impls")]
use serde::Serialize;

use crate::tag::Tag;

/// Wire-level shape of a single field
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde_impls", derive(Serialize))]
pub enum WireType {
    Bool,
    /// `uintN` / `## N`
    Uint(usize),
    /// `intN`
    Int(usize),
    /// `bitsN`
    Bits(usize),
    /// `#<= max` (or `#< max+1`): unsigned in the width needed for `max`
    BoundedUint { bits: usize, max: u64 },
    /// `VarUInteger n`
    VarUInteger(usize),
    /// `Unit` and other zero-width types
    Unit,
    /// `Cell` / `Any`: whatever remains of the current cell
    Any,
    /// Reference to another definition by its result-type name
    Named(String),
    /// `^T` as a type argument rather than a field placement
    Ref(Box<WireType>),
    /// `Maybe T`
    Maybe(Box<WireType>),
    /// `Either L R`
    Either(Box<WireType>, Box<WireType>),
    /// `Either T ^T`
    EitherRef(Box<WireType>),
    /// `Hashmap n V`
    Hashmap { key_bits: usize, value: Box<WireType> },
    /// `HashmapE n V`
    HashmapE { key_bits: usize, value: Box<WireType> },
    /// `HashmapAugE n V X`
    HashmapAugE {
        key_bits: usize,
        value: Box<WireType>,
        extra: Box<WireType>,
    },
}

impl WireType {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        WireType::Named(name.into())
    }

    /// Number of bits this type always occupies, if it is fixed
    #[must_use]
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            WireType::Bool => Some(1),
            WireType::Uint(n) | WireType::Int(n) | WireType::Bits(n) => Some(*n),
            WireType::BoundedUint { bits, .. } => Some(*bits),
            WireType::Unit => Some(0),
            _ => None,
        }
    }
}

impl Display for WireType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WireType::Bool => write!(f, "Bool"),
            WireType::Uint(n) => write!(f, "uint{}", n),
            WireType::Int(n) => write!(f, "int{}", n),
            WireType::Bits(n) => write!(f, "bits{}", n),
            WireType::BoundedUint { max, .. } => write!(f, "(#<= {})", max),
            WireType::VarUInteger(n) => write!(f, "(VarUInteger {})", n),
            WireType::Unit => write!(f, "Unit"),
            WireType::Any => write!(f, "Cell"),
            WireType::Named(name) => write!(f, "{}", name),
            WireType::Ref(inner) => write!(f, "^{}", inner),
            WireType::Maybe(inner) => write!(f, "(Maybe {})", inner),
            WireType::Either(l, r) => write!(f, "(Either {} {})", l, r),
            WireType::EitherRef(inner) => write!(f, "(Either {} ^{})", inner, inner),
            WireType::Hashmap { key_bits, value } => {
                write!(f, "(Hashmap {} {})", key_bits, value)
            }
            WireType::HashmapE { key_bits, value } => {
                write!(f, "(HashmapE {} {})", key_bits, value)
            }
            WireType::HashmapAugE {
                key_bits,
                value,
                extra,
            } => write!(f, "(HashmapAugE {} {} {})", key_bits, value, extra),
        }
    }
}

/// Which child reference a by-reference field occupies
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde_impls", derive(Serialize))]
pub enum RefSlot {
    /// The next child not yet consumed by this record
    Next,
    /// A fixed child index
    Index(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde_impls", derive(Serialize))]
pub enum Placement {
    Inline,
    ByRef(RefSlot),
}

/// One field of a record, in wire order
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde_impls", derive(Serialize))]
pub struct Directive {
    pub ordinal: usize,
    pub name: String,
    pub placement: Placement,
    pub wire: WireType,
}

impl Directive {
    #[must_use]
    pub fn inline(ordinal: usize, name: impl Into<String>, wire: WireType) -> Self {
        Self {
            ordinal,
            name: name.into(),
            placement: Placement::Inline,
            wire,
        }
    }

    #[must_use]
    pub fn by_ref(ordinal: usize, name: impl Into<String>, wire: WireType) -> Self {
        Self {
            ordinal,
            name: name.into(),
            placement: Placement::ByRef(RefSlot::Next),
            wire,
        }
    }
}

/// Optional tag followed by an ordered directive list
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde_impls", derive(Serialize))]
pub struct Record {
    pub tag: Option<Tag>,
    pub directives: Vec<Directive>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde_impls", derive(Serialize))]
pub struct Variant {
    pub name: String,
    pub tag: Tag,
    pub record: Record,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde_impls", derive(Serialize))]
pub enum TypeKind {
    Record(Record),
    /// Variants in declaration order; no tag is a prefix of another
    SumType(Vec<Variant>),
    /// Decoded and encoded by a registered [`CustomCodec`](crate::dynamic::CustomCodec)
    Custom,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde_impls", derive(Serialize))]
pub struct TypeDefinition {
    pub name: String,
    pub kind: TypeKind,
}

impl TypeDefinition {
    #[must_use]
    pub fn record(name: impl Into<String>, tag: Option<Tag>, directives: Vec<Directive>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Record(Record { tag, directives }),
        }
    }

    #[must_use]
    pub fn custom(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Custom,
        }
    }

    /// Names of every other definition this one refers to
    #[must_use]
    pub fn references(&self) -> Vec<&str> {
        fn visit<'a>(wire: &'a WireType, out: &mut Vec<&'a str>) {
            match wire {
                WireType::Named(name) => out.push(name),
                WireType::Ref(inner) | WireType::Maybe(inner) | WireType::EitherRef(inner) => {
                    visit(inner, out)
                }
                WireType::Either(l, r) => {
                    visit(l, out);
                    visit(r, out);
                }
                WireType::Hashmap { value, .. } | WireType::HashmapE { value, .. } => {
                    visit(value, out)
                }
                WireType::HashmapAugE { value, extra, .. } => {
                    visit(value, out);
                    visit(extra, out);
                }
                _ => {}
            }
        }

        let mut out = Vec::new();
        let records: Vec<&Record> = match &self.kind {
            TypeKind::Record(r) => vec![r],
            TypeKind::SumType(vs) => vs.iter().map(|v| &v.record).collect(),
            TypeKind::Custom => Vec::new(),
        };
        for d in records.into_iter().flat_map(|r| r.directives.iter()) {
            visit(&d.wire, &mut out);
        }
        out
    }
}

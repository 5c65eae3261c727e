use std::fmt::{Display, Formatter};

use crate::cell::boc::BocError;
use crate::parse::error::ParseError;

/// Error type returned by the top-level decoding entry points
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum DecodeError {
    /// Failure while reading the cell tree
    Parse(ParseError),
    /// Failure while unpacking a bag-of-cells container
    Boc(BocError),
    /// Decoding succeeded but left unread content in the root cell
    Incomplete { bits: usize, refs: usize },
}

impl From<std::convert::Infallible> for DecodeError {
    fn from(_void: std::convert::Infallible) -> Self {
        match _void {}
    }
}

impl From<ParseError> for DecodeError {
    fn from(err: ParseError) -> Self {
        Self::Parse(err)
    }
}

impl From<BocError> for DecodeError {
    fn from(err: BocError) -> Self {
        Self::Boc(err)
    }
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Parse(err) => write!(f, "parser encountered error: {}", err),
            DecodeError::Boc(err) => write!(f, "bag-of-cells error: {}", err),
            DecodeError::Incomplete { bits, refs } => write!(
                f,
                "cell had left-over content after decoding: {} bits, {} references",
                bits, refs
            ),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Parse(err) => Some(err),
            DecodeError::Boc(err) => Some(err),
            DecodeError::Incomplete { .. } => None,
        }
    }
}

pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Cell capacity that an encoding ran out of
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    Bits,
    Refs,
}

impl Display for Resource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Bits => write!(f, "bits"),
            Resource::Refs => write!(f, "references"),
        }
    }
}

/// Error type returned when a value cannot be written into cells
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum EncodeError {
    /// Writing would exceed the capacity of the current cell
    Overflow {
        resource: Resource,
        requested: usize,
        available: usize,
    },
    /// Value does not fit in the bit-width its type declares
    ValueTooWide { bits: usize },
    /// Value violates a structural rule of its type, such as a sum value
    /// with more than one populated variant
    InvariantViolation(String),
    /// Dynamic value whose shape does not match the type it is encoded as
    TypeMismatch { expected: String, found: String },
    /// Named type absent from the registry in use
    UnknownType(String),
}

impl EncodeError {
    pub fn invariant(reason: impl Into<String>) -> Self {
        Self::InvariantViolation(reason.into())
    }
}

impl Display for EncodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::Overflow {
                resource,
                requested,
                available,
            } => write!(
                f,
                "cell overflow: {requested} {resource} requested, {available} available"
            ),
            EncodeError::ValueTooWide { bits } => {
                write!(f, "value does not fit in {bits} bits")
            }
            EncodeError::InvariantViolation(reason) => {
                write!(f, "invariant violated: {reason}")
            }
            EncodeError::TypeMismatch { expected, found } => {
                write!(f, "expected value of type {expected}, found {found}")
            }
            EncodeError::UnknownType(name) => write!(f, "unknown type `{name}`"),
        }
    }
}

impl std::error::Error for EncodeError {}

pub type EncodeResult<T> = std::result::Result<T, EncodeError>;

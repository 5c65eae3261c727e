//! Error types used to report failure in low-level parsing
//!
//! This module contains a hierarchy of types representing specific
//! classes of error that may arise as a result of calls to
//! [`CellParser`](crate::parse::CellParser) methods, or to the
//! [`Decode`](crate::conv::Decode) implementations built on top of them.
//!
//! # Layout
//!
//! This module defines the primary type `ParseError` and the alias
//! `ParseResult<T>`; it additionally defines various type-level refinements of
//! `ParseError`, grouped according to similar provenance or nature.

use std::borrow::Cow;
use std::error::Error;
use std::fmt::{Display, Formatter, Result};

use crate::cell::CellKind;
use crate::error::{BoundsError, WidthError};
use crate::tag::Tag;

/// Enumeration type over all errors that may be encountered while reading
/// a value out of a cell tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Error class encountered when a read would go past the data or the
    /// references of the current cell.
    Exhausted(ExhaustionError),
    /// Error class encountered when the bits at the cursor do not spell out
    /// a constructor the current type expects.
    Token(TokenError),
    /// Error class encountered when the cell contents are well-formed at the
    /// bit level but violate a structural rule of the encoding.
    Encoding(InvalidEncoding),
    /// Error class encountered when low-level parsing is successful but
    /// the resultant raw value cannot be converted into a legal value of
    /// a post-parse type
    External(ExternalError),
}

impl ParseError {
    /// Shorthand for the `Encoding(InvalidEncoding::Custom(..))` case, used by
    /// hand-written decoders that enforce their own layout rules.
    pub fn invalid(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::Encoding(InvalidEncoding::Custom(reason.into()))
    }

    /// Shorthand for the `Token(TokenError::NoMatchingVariant { .. })` case
    pub fn no_matching_variant(for_type: impl Into<Cow<'static, str>>) -> Self {
        Self::Token(TokenError::NoMatchingVariant {
            for_type: for_type.into(),
        })
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            ParseError::Exhausted(err) => Display::fmt(err, f),
            ParseError::Token(err) => Display::fmt(err, f),
            ParseError::Encoding(err) => Display::fmt(err, f),
            ParseError::External(err) => Display::fmt(err, f),
        }
    }
}

impl Error for ParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ParseError::Exhausted(err) => Some(err),
            ParseError::Token(err) => Some(err),
            ParseError::Encoding(err) => Some(err),
            ParseError::External(err) => Some(err),
        }
    }
}

/// Type alias for Result with an error type of [`ParseError`]
///
/// Every `CellParser` read and every `Decode::parse` call returns
/// a `ParseResult<T>` for some `T`.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Errors related to running out of cell content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustionError {
    /// Read of `requested` bits attempted with only `remaining` unread
    InsufficientBits { requested: usize, remaining: usize },
    /// Reference at `index` requested from a cell holding only `available`
    InsufficientRefs { index: usize, available: usize },
}

impl From<ExhaustionError> for ParseError {
    fn from(err: ExhaustionError) -> Self {
        Self::Exhausted(err)
    }
}

impl Display for ExhaustionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match *self {
            ExhaustionError::InsufficientBits {
                requested,
                remaining,
            } => write!(
                f,
                "cannot read {requested} bits: only {remaining} bits remain in cell"
            ),
            ExhaustionError::InsufficientRefs { index, available } => write!(
                f,
                "cannot follow reference #{index}: cell holds {available} references"
            ),
        }
    }
}

/// Errors arising from unexpected constructor tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// A record's mandatory tag did not match
    TagMismatch(TagError),
    /// None of a sum type's variant tags matched
    NoMatchingVariant { for_type: Cow<'static, str> },
}

impl From<TokenError> for ParseError {
    fn from(err: TokenError) -> Self {
        Self::Token(err)
    }
}

impl Display for TokenError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            TokenError::TagMismatch(err) => write!(f, "invalid tag: {err}"),
            TokenError::NoMatchingVariant { for_type } => {
                write!(f, "no constructor of `{for_type}` matches the input")
            }
        }
    }
}

impl Error for TokenError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TokenError::TagMismatch(err) => Some(err),
            TokenError::NoMatchingVariant { .. } => None,
        }
    }
}

/// Error representing an unexpected constructor tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagError {
    expected: Tag,
    actual: u64,
    for_type: Cow<'static, str>,
}

impl TagError {
    /// Constructs a `TagError` from the tag a type requires, the value of
    /// the equally wide bit-string actually read, and the type-name.
    pub fn new(expected: Tag, actual: u64, for_type: impl Into<Cow<'static, str>>) -> Self {
        Self {
            expected,
            actual,
            for_type: for_type.into(),
        }
    }

    #[must_use]
    pub fn expected(&self) -> Tag {
        self.expected
    }

    #[must_use]
    pub fn actual(&self) -> u64 {
        self.actual
    }

    #[must_use]
    pub fn for_type(&self) -> &str {
        &self.for_type
    }
}

impl From<TagError> for ParseError {
    fn from(err: TagError) -> Self {
        Self::Token(TokenError::TagMismatch(err))
    }
}

impl Display for TagError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let found = Tag::new(self.actual, self.expected.len());
        write!(
            f,
            "expected {} for `{}`, found {}",
            self.expected, self.for_type, found
        )
    }
}

/// Structural violations of the cell encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidEncoding {
    /// Trie edge label longer than the key bits left to consume
    LabelTooLong { label: usize, remaining: usize },
    /// Stored fork aggregate differs from the combination of its children
    AggregateMismatch,
    /// Bounded integer or length prefix outside its permitted range
    ValueOutOfRange { value: u64, max: u64 },
    /// Cell of the wrong kind where a specific exotic cell was required
    UnexpectedCellKind { expected: CellKind, actual: CellKind },
    /// Named type absent from the registry in use
    UnknownType(String),
    /// Any other layout rule enforced by a hand-written decoder
    Custom(Cow<'static, str>),
}

impl From<InvalidEncoding> for ParseError {
    fn from(err: InvalidEncoding) -> Self {
        Self::Encoding(err)
    }
}

impl Display for InvalidEncoding {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            InvalidEncoding::LabelTooLong { label, remaining } => write!(
                f,
                "trie label of {label} bits exceeds the {remaining} key bits remaining"
            ),
            InvalidEncoding::AggregateMismatch => {
                write!(f, "stored trie aggregate does not match its children")
            }
            InvalidEncoding::ValueOutOfRange { value, max } => {
                write!(f, "value {value} exceeds permitted maximum {max}")
            }
            InvalidEncoding::UnexpectedCellKind { expected, actual } => {
                write!(f, "expected {expected:?} cell, found {actual:?} cell")
            }
            InvalidEncoding::UnknownType(name) => write!(f, "unknown type `{name}`"),
            InvalidEncoding::Custom(reason) => write!(f, "invalid encoding: {reason}"),
        }
    }
}

/// Errors raised when a successfully read raw value cannot be converted into
/// a legal value of its target type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalError {
    IntRangeViolation(BoundsError<i128>),
    WidthViolation(WidthError),
}

impl<T> From<T> for ParseError
where
    ExternalError: From<T>,
{
    fn from(err: T) -> Self {
        ParseError::External(ExternalError::from(err))
    }
}

impl From<BoundsError<i128>> for ExternalError {
    fn from(err: BoundsError<i128>) -> Self {
        Self::IntRangeViolation(err)
    }
}

impl From<WidthError> for ExternalError {
    fn from(err: WidthError) -> Self {
        Self::WidthViolation(err)
    }
}

impl Display for ExternalError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            ExternalError::IntRangeViolation(x) => write!(f, "{}", x),
            ExternalError::WidthViolation(x) => write!(f, "{}", x),
        }
    }
}

macro_rules! mk_error {
    ( $( $et:ty ),+ $(,)? ) => {
        $( impl Error for $et {} )+
    };
}

mk_error! {
    ExhaustionError,
    TagError,
    InvalidEncoding,
    ExternalError,
}

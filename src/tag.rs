//! Constructor tags
//!
//! A [`Tag`] is the fixed-width bit pattern that prefixes the serialization
//! of a TL-B constructor. Schema sources write them in one of two notations,
//! both of which are accepted by [`Tag::from_str`]:
//!
//!   * `#9bc7a987` - hexadecimal, four bits per digit. A trailing `_` marks a
//!     *completion tag*: trailing zero bits and the final one bit are dropped,
//!     so `#4_` is the single bit `0` and `#a_` the pattern `10`.
//!   * `$0101` - binary, one bit per digit.
//!
//! The markers `#_` and `$_` denote a constructor with no tag at all, and are
//! represented by `None` wherever an optional tag is expected.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[cfg(feature = "serde_impls")]
use serde::Serialize;

/// Widest tag that can be represented, in bits
pub const MAX_TAG_BITS: u32 = 64;

/// Fixed-width discriminator of at most [`MAX_TAG_BITS`] bits
///
/// The value is stored right-aligned, so a 4-bit tag `$1010` has
/// `value() == 0b1010`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde_impls", derive(Serialize))]
pub struct Tag {
    value: u64,
    len: u32,
}

impl Tag {
    /// Constructs a tag of `len` bits holding `value`.
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds [`MAX_TAG_BITS`] or `value` does not fit in
    /// `len` bits. Derived codecs only ever call this with literals validated
    /// at macro-expansion time.
    #[must_use]
    pub const fn new(value: u64, len: u32) -> Self {
        assert!(len <= MAX_TAG_BITS, "tag wider than 64 bits");
        assert!(
            len == 64 || value >> len == 0,
            "tag value does not fit in its declared width"
        );
        Self { value, len }
    }

    #[must_use]
    #[inline]
    pub const fn value(&self) -> u64 {
        self.value
    }

    /// Width of the tag in bits
    #[must_use]
    #[inline]
    pub const fn len(&self) -> u32 {
        self.len
    }

    #[must_use]
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if `self` is a bitwise prefix of `other`.
    ///
    /// Every tag is a prefix of itself.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Tag) -> bool {
        if self.len > other.len {
            return false;
        }
        let shift = other.len - self.len;
        let head = if shift >= 64 { 0 } else { other.value >> shift };
        head == self.value
    }

    /// Const counterpart of [`Tag::from_str`] for literals embedded in
    /// derived codecs.
    ///
    /// # Panics
    ///
    /// Panics on any literal that [`Tag::from_str`] would reject. In a
    /// `const` item this surfaces as a compile-time error.
    #[must_use]
    pub const fn from_literal(s: &str) -> Self {
        let bytes = s.as_bytes();
        assert!(bytes.len() >= 2, "tag literal has no digits");
        let hex = match bytes[0] {
            b'#' => true,
            b'$' => false,
            _ => panic!("tag literal must start with `#` or `$`"),
        };
        let completion = bytes[bytes.len() - 1] == b'_';
        let end = if completion {
            bytes.len() - 1
        } else {
            bytes.len()
        };
        let mut value: u64 = 0;
        let mut len: u32 = 0;
        let mut i = 1;
        while i < end {
            let c = bytes[i];
            if hex {
                let nibble = match c {
                    b'0'..=b'9' => c - b'0',
                    b'a'..=b'f' => c - b'a' + 10,
                    b'A'..=b'F' => c - b'A' + 10,
                    _ => panic!("invalid hexadecimal digit in tag literal"),
                };
                assert!(len + 4 <= MAX_TAG_BITS, "tag literal wider than 64 bits");
                value = (value << 4) | nibble as u64;
                len += 4;
            } else {
                let bit = match c {
                    b'0' => 0,
                    b'1' => 1,
                    _ => panic!("invalid binary digit in tag literal"),
                };
                assert!(len < MAX_TAG_BITS, "tag literal wider than 64 bits");
                value = (value << 1) | bit;
                len += 1;
            }
            i += 1;
        }
        if completion {
            while len > 0 && value & 1 == 0 {
                value >>= 1;
                len -= 1;
            }
            assert!(len > 0, "completion tag has no terminating one-bit");
            value >>= 1;
            len -= 1;
        }
        Self { value, len }
    }

    /// Parses an optional tag, mapping the no-tag markers `#_` / `$_` to `None`
    pub fn parse_optional(s: &str) -> Result<Option<Tag>, TagParseError> {
        match s {
            "#_" | "$_" => Ok(None),
            _ => s.parse().map(Some),
        }
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.len % 4 == 0 && self.len > 0 {
            write!(f, "#{:0width$x}", self.value, width = (self.len / 4) as usize)
        } else {
            write!(f, "$")?;
            for i in (0..self.len).rev() {
                write!(f, "{}", (self.value >> i) & 1)?;
            }
            Ok(())
        }
    }
}

/// Error returned when a tag literal cannot be interpreted
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagParseError {
    /// Literal did not start with `#` or `$`
    MissingSigil(String),
    /// Literal contained a character that is not a digit of its notation
    InvalidDigit { literal: String, digit: char },
    /// Literal encodes more than [`MAX_TAG_BITS`] bits
    TooWide { literal: String, bits: usize },
    /// Completion tag with no terminating one-bit
    EmptyCompletion(String),
}

impl Display for TagParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TagParseError::MissingSigil(lit) => {
                write!(f, "tag literal `{lit}` must start with `#` or `$`")
            }
            TagParseError::InvalidDigit { literal, digit } => {
                write!(f, "invalid digit `{digit}` in tag literal `{literal}`")
            }
            TagParseError::TooWide { literal, bits } => {
                write!(
                    f,
                    "tag literal `{literal}` is {bits} bits wide (limit is {MAX_TAG_BITS})"
                )
            }
            TagParseError::EmptyCompletion(lit) => {
                write!(f, "completion tag `{lit}` has no terminating one-bit")
            }
        }
    }
}

impl std::error::Error for TagParseError {}

impl FromStr for Tag {
    type Err = TagParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sigil, body) = match s.char_indices().nth(1) {
            Some((ix, _)) => s.split_at(ix),
            None => return Err(TagParseError::MissingSigil(s.to_owned())),
        };
        let (digits, completion) = match body.strip_suffix('_') {
            Some(stripped) => (stripped, true),
            None => (body, false),
        };
        let mut bits: Vec<bool> = Vec::with_capacity(digits.len() * 4);
        match sigil {
            "#" => {
                for digit in digits.chars() {
                    let nibble = digit.to_digit(16).ok_or(TagParseError::InvalidDigit {
                        literal: s.to_owned(),
                        digit,
                    })?;
                    bits.extend((0..4).rev().map(|i| (nibble >> i) & 1 == 1));
                }
            }
            "$" => {
                for digit in digits.chars() {
                    match digit {
                        '0' => bits.push(false),
                        '1' => bits.push(true),
                        _ => {
                            return Err(TagParseError::InvalidDigit {
                                literal: s.to_owned(),
                                digit,
                            })
                        }
                    }
                }
            }
            _ => return Err(TagParseError::MissingSigil(s.to_owned())),
        }
        if completion {
            while let Some(false) = bits.last() {
                bits.pop();
            }
            if bits.pop().is_none() {
                return Err(TagParseError::EmptyCompletion(s.to_owned()));
            }
        }
        if bits.len() > MAX_TAG_BITS as usize {
            return Err(TagParseError::TooWide {
                literal: s.to_owned(),
                bits: bits.len(),
            });
        }
        let value = bits.iter().fold(0u64, |acc, &b| (acc << 1) | u64::from(b));
        Ok(Tag {
            value,
            len: bits.len() as u32,
        })
    }
}

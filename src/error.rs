//! General error types
//!
//! This module contains error types for constraint violations that are not
//! tied to a particular stage of processing: the bit-width of a fixed-size
//! bit-string and the numeric range of a narrow integer newtype. They are
//! raised by the fallible constructors in [`prim`](crate::prim) and are
//! lifted into [`ParseError`](crate::parse::error::ParseError) and
//! [`EncodeError`](crate::conv::error::EncodeError) as needed.

use std::error::Error;
use std::fmt::{Debug, Display};

/// Enumerated error type for values whose bit-width does not match the
/// width their type demands.
#[derive(Clone, PartialEq, PartialOrd, Eq, Ord, Debug)]
pub enum WidthError {
    /// Restriction on maximum bit-width exceeded
    TooWide { limit: usize, actual: usize },
    /// Requirement of precise bit-width not satisfied
    WrongWidth { exact: usize, actual: usize },
}

impl Display for WidthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WidthError::TooWide { limit, actual } => {
                write!(f, "{actual}-bit value exceeded limit of {limit} bits")
            }
            WidthError::WrongWidth { exact, actual } => {
                write!(f, "{actual}-bit value violated requirement of {exact} bits")
            }
        }
    }
}

impl Error for WidthError {}

/// Error type representing a numeric value that falls outside of the
/// closed range `[min, max]` implied by its type.
///
/// `Ext` is a numeric type wide enough to hold the value and both bounds
/// without loss of ordering.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BoundsError<Ext: Debug> {
    Underflow { min: Ext, val: Ext },
    Overflow { max: Ext, val: Ext },
}

impl<Ext: Debug + PartialOrd + Copy> BoundsError<Ext> {
    /// Checks that `val` falls into the range `[min, max]`, returning `Ok(val)`
    /// if it does.
    pub fn restrict(val: Ext, min: Ext, max: Ext) -> Result<Ext, Self> {
        if val < min {
            Err(Self::Underflow { min, val })
        } else if val > max {
            Err(Self::Overflow { max, val })
        } else {
            Ok(val)
        }
    }
}

impl<Ext: Debug + Display> Display for BoundsError<Ext> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundsError::Underflow { min, val } => {
                write!(f, "provided value {} less than minimum bound {}", val, min)
            }
            BoundsError::Overflow { max, val } => {
                write!(f, "provided value {} greater than maximum bound {}", val, max)
            }
        }
    }
}

impl<Ext: Display + Debug> Error for BoundsError<Ext> {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn restrict_u64() {
        assert_eq!(BoundsError::restrict(5u64, 0, 60), Ok(5));
        assert_eq!(
            BoundsError::restrict(61u64, 0, 60),
            Err(BoundsError::Overflow { max: 60, val: 61 })
        );
        assert_eq!(
            BoundsError::restrict(-9i64, -8, 7),
            Err(BoundsError::Underflow { min: -8, val: -9 })
        );
    }
}

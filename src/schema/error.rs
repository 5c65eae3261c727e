use std::fmt::{Display, Formatter};

use crate::tag::{Tag, TagParseError};

/// Errors raised while reading or compiling a TL-B schema
///
/// Compilation is all-or-nothing: any of these aborts it without producing
/// a partial set of definitions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaError {
    /// Malformed schema text
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
    /// Malformed constructor tag
    InvalidTag { constructor: String, err: TagParseError },
    /// A type name with no declaration, built-in or known-type entry
    UnresolvedType { name: String, context: String },
    /// A generic applied to the wrong number of arguments
    WrongArity {
        name: String,
        expected: usize,
        found: usize,
    },
    /// A declaration whose result type takes parameters
    ParameterizedCombinator { result: String, constructor: String },
    /// A sum-type member with no tag to dispatch on
    MissingDiscriminator { result: String, constructor: String },
    /// Two members of one sum type whose tags are not mutually distinguishable
    AmbiguousTags {
        result: String,
        first: (String, Tag),
        second: (String, Tag),
    },
    /// A generic whose width argument is not a numeric literal
    MissingNumericParameter { name: String, position: usize },
    /// A construct that parses but cannot be compiled into directives
    Unsupported { construct: String, context: String },
    /// The same constructor name declared twice for one result type
    DuplicateConstructor { result: String, constructor: String },
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaError::Syntax {
                line,
                column,
                message,
            } => write!(f, "syntax error at {}:{}: {}", line, column, message),
            SchemaError::InvalidTag { constructor, err } => {
                write!(f, "constructor `{}` has an invalid tag: {}", constructor, err)
            }
            SchemaError::UnresolvedType { name, context } => {
                write!(f, "unresolved type `{}` in {}", name, context)
            }
            SchemaError::WrongArity {
                name,
                expected,
                found,
            } => write!(
                f,
                "`{}` takes {} argument(s) but was given {}",
                name, expected, found
            ),
            SchemaError::ParameterizedCombinator {
                result,
                constructor,
            } => write!(
                f,
                "combinators with parameters are not supported: `{}` (constructor `{}`)",
                result, constructor
            ),
            SchemaError::MissingDiscriminator {
                result,
                constructor,
            } => write!(
                f,
                "constructor `{}` of sum type `{}` has no tag",
                constructor, result
            ),
            SchemaError::AmbiguousTags {
                result,
                first,
                second,
            } => write!(
                f,
                "tags of `{}` ({}) and `{}` ({}) in `{}` are ambiguous",
                first.0, first.1, second.0, second.1, result
            ),
            SchemaError::MissingNumericParameter { name, position } => write!(
                f,
                "argument {} of `{}` must be a numeric literal",
                position, name
            ),
            SchemaError::Unsupported { construct, context } => {
                write!(f, "unsupported {} in {}", construct, context)
            }
            SchemaError::DuplicateConstructor {
                result,
                constructor,
            } => write!(
                f,
                "constructor `{}` declared more than once for `{}`",
                constructor, result
            ),
        }
    }
}

impl std::error::Error for SchemaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchemaError::InvalidTag { err, .. } => Some(err),
            _ => None,
        }
    }
}

pub type SchemaResult<T> = Result<T, SchemaError>;

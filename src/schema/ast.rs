//! Syntax tree of TL-B combinator declarations

use std::fmt::{Display, Formatter};

use crate::tag::Tag;

/// One production `constructor#tag fields... = Result params...;`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CombinatorDeclaration {
    pub constructor: String,
    /// `None` both when the tag is absent and for `#_` / `$_`
    pub tag: Option<Tag>,
    pub fields: Vec<FieldDefinition>,
    pub result: String,
    /// Arguments applied to the result type, e.g. `n X` in `= Hashmap n X`
    pub result_params: Vec<TypeExpression>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldDefinition {
    /// `label:Type`, with `_` for an anonymous inline field
    Named { name: String, expr: TypeExpression },
    /// `^Type` with no label
    CellRef(TypeExpression),
    /// `{...}`: implicit parameter or constraint, raw text
    Implicit(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeExpression {
    /// Type name or built-in, including `#`
    Named(String),
    Number(u64),
    /// `^T`
    CellRef(Box<TypeExpression>),
    /// `(Name args...)` or `Name<args, ...>`
    Apply {
        name: String,
        args: Vec<TypeExpression>,
    },
    /// `flag?T`
    Conditional {
        flag: String,
        then: Box<TypeExpression>,
    },
    /// `[ fields... ]`
    Anonymous(Vec<FieldDefinition>),
    /// Anything involving `~`, `+`, `*` or comparison, kept as raw text
    Arithmetic(String),
}

impl Display for TypeExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeExpression::Named(name) => write!(f, "{}", name),
            TypeExpression::Number(n) => write!(f, "{}", n),
            TypeExpression::CellRef(inner) => write!(f, "^{}", inner),
            TypeExpression::Apply { name, args } => {
                write!(f, "({}", name)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ")")
            }
            TypeExpression::Conditional { flag, then } => write!(f, "{}?{}", flag, then),
            TypeExpression::Anonymous(_) => write!(f, "[...]"),
            TypeExpression::Arithmetic(text) => write!(f, "{}", text),
        }
    }
}

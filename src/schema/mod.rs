//! TL-B schema compiler
//!
//! Turns combinator declarations such as
//!
//! ```text
//! shard_ident$00 shard_pfx_bits:(#<= 60) workchain_id:int32
//!   shard_prefix:uint64 = ShardIdent;
//! ```
//!
//! into [`TypeDefinition`]s, which the [`dynamic`](crate::dynamic) engine
//! interprets directly and [`emit::rust_module`] renders as Rust source for
//! the derive macros.
//!
//! Only parameterless combinators are compiled. Declarations whose result
//! type takes parameters (the dictionary and label machinery itself, for
//! instance) are rejected, since those types are provided natively.

pub mod ast;
pub mod compile;
pub mod emit;
pub mod error;
pub mod parser;

pub use ast::{CombinatorDeclaration, FieldDefinition, TypeExpression};
pub use compile::{compile, CompileOptions};
pub use emit::{rust_module, EmitOptions};
pub use error::{SchemaError, SchemaResult};
pub use parser::parse_schema;

use crate::directive::TypeDefinition;

/// Parses and compiles `text` in one step
pub fn compile_str(text: &str, options: &CompileOptions) -> SchemaResult<Vec<TypeDefinition>> {
    compile(&parse_schema(text)?, options)
}

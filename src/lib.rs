//! Data model, schema compiler and cell codec for TL-B typed records
//!
//! # Overview
//!
//! TON stores every piece of on-chain data as a tree of *cells*: at most
//! 1023 bits of payload plus at most four references to child cells. The
//! layout of each record over such a tree is declared in TL-B, a language of
//! tagged combinators, and this library is the machinery for getting typed
//! values in and out of cells according to those declarations.
//!
//! It works at two levels that share one set of layout rules:
//!
//!   * statically, through the [`Encode`] and [`Decode`] traits and their
//!     derive macros, which turn `#[tlb(tag = "...")]` and `#[tlb(by_ref)]`
//!     annotations into straight-line codecs. The protocol records in
//!     [`block`] are written this way, and so is the output of the schema
//!     compiler.
//!   * dynamically, through the [`schema`] compiler, which turns TL-B
//!     declarations into [`directive`] tables, and the [`dynamic`] engine,
//!     which interprets those tables against a cell cursor without any code
//!     generation.
//!
//! Binary-trie dictionaries, with and without per-subtree aggregates, are
//! provided by [`hashmap`]; the cell primitive and its bag-of-cells
//! container live in [`cell`].
//!
//! # Entry points
//!
//! ```
//! use tlb::prelude::*;
//!
//! #[derive(Debug, PartialEq, Decode, Encode)]
//! #[tlb(tag = "#c4")]
//! struct Capabilities {
//!     version: u32,
//!     capabilities: u64,
//! }
//!
//! let value = Capabilities { version: 4, capabilities: 0x2e };
//! let cell = marshal(&value).unwrap();
//! assert_eq!(cell.bit_len(), 8 + 32 + 64);
//! assert_eq!(unmarshal::<Capabilities>(&cell).unwrap(), value);
//! ```

extern crate self as tlb;

extern crate decode_derive;
extern crate encode_derive;

pub mod adt;
pub mod block;
pub mod builder;
pub mod cell;
pub mod code;
pub mod conv;
pub mod directive;
pub mod dynamic;
pub mod error;
pub mod hashmap;
pub mod parse;
pub mod prelude;
pub mod prim;
pub mod schema;
pub mod tag;

pub use crate::builder::CellBuilder;
pub use crate::cell::Cell;
pub use crate::conv::{Decode, DecodeResult, Encode, EncodeResult};
pub use crate::parse::{error::ParseError, CellParser, ParseResult};

pub use ::decode_derive::Decode;
pub use ::encode_derive::Encode;
pub use ::lazy_static::lazy_static;

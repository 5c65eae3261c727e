//! Everything a generated or hand-written record module needs in scope
//!
//! Output of the schema compiler starts with `use tlb::prelude::*;` and
//! refers to nothing else.

pub use crate::adt::{Either, EitherRef, Ref};
pub use crate::builder::CellBuilder;
pub use crate::cell::{BitString, Cell};
pub use crate::conv::{marshal, marshal_into, unmarshal, unmarshal_into, DecodeResult, EncodeResult};
pub use crate::hashmap::{Augmentation, HashKey, Hashmap, HashmapAug, HashmapAugE, HashmapE};
pub use crate::parse::{CellParser, ParseResult};
pub use crate::prim::{Bits, Bits256, Coins, Grams, Int, Uint, VarUInteger};
pub use crate::{Decode, Encode};

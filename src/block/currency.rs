//! Currency amounts and the per-block value flow

use crate::builder::CellBuilder;
use crate::conv::EncodeResult;
use crate::hashmap::{Augmentation, HashmapE};
use crate::parse::error::ParseError;
use crate::parse::{CellParser, ParseResult};
use crate::prim::{Coins, VarUInteger};
use crate::tag::Tag;
use crate::{Decode, Encode};

/// `extra_currencies$_ dict:(HashmapE 32 (VarUInteger 32))`
pub type ExtraCurrencyCollection = HashmapE<u32, VarUInteger<32>>;

/// `currencies$_ grams:Grams other:ExtraCurrencyCollection`
#[derive(Clone, Debug, Default, PartialEq, Decode, Encode)]
pub struct CurrencyCollection {
    pub grams: Coins,
    pub other: ExtraCurrencyCollection,
}

impl CurrencyCollection {
    #[must_use]
    pub fn from_grams(grams: impl Into<Coins>) -> Self {
        Self {
            grams: grams.into(),
            other: ExtraCurrencyCollection::default(),
        }
    }
}

impl Augmentation for CurrencyCollection {
    fn combine(&self, other: &Self) -> Self {
        let mut extra = self.other.clone();
        for (id, amount) in other.other.iter() {
            let sum = match extra.get(id) {
                Some(mine) => VarUInteger(&mine.0 + &amount.0),
                None => amount.clone(),
            };
            extra.insert(*id, sum);
        }
        Self {
            grams: self.grams + other.grams,
            other: extra,
        }
    }
}

pub const VALUE_FLOW_TAG: Tag = Tag::new(0xb8e4_8dfb, 32);
pub const VALUE_FLOW_V2_TAG: Tag = Tag::new(0x3ebf_98b7, 32);

/// Funds moved by a block.
///
/// Two layouts exist, told apart by their tag. The extended one adds
/// `burned` right after `fees_collected`; everything else is shared:
///
/// ```text
/// value_flow#b8e48dfb ^[ from_prev_blk to_next_blk imported exported ]
///   fees_collected ^[ fees_imported recovered created minted ] = ValueFlow;
/// value_flow_v2#3ebf98b7 ^[ from_prev_blk to_next_blk imported exported ]
///   fees_collected burned ^[ fees_imported recovered created minted ] = ValueFlow;
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueFlow {
    pub from_prev_blk: CurrencyCollection,
    pub to_next_blk: CurrencyCollection,
    pub imported: CurrencyCollection,
    pub exported: CurrencyCollection,
    pub fees_collected: CurrencyCollection,
    /// Set exactly when the value uses the extended layout
    pub burned: Option<CurrencyCollection>,
    pub fees_imported: CurrencyCollection,
    pub recovered: CurrencyCollection,
    pub created: CurrencyCollection,
    pub minted: CurrencyCollection,
}

impl ValueFlow {
    /// Tag this value is written with
    #[must_use]
    pub fn tag(&self) -> Tag {
        if self.burned.is_some() {
            VALUE_FLOW_V2_TAG
        } else {
            VALUE_FLOW_TAG
        }
    }
}

impl Decode for ValueFlow {
    fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
        let extended = if p.try_tag(&VALUE_FLOW_TAG)? {
            false
        } else if p.try_tag(&VALUE_FLOW_V2_TAG)? {
            true
        } else {
            return Err(ParseError::no_matching_variant("ValueFlow"));
        };
        let mut inbound = p.next_ref()?.parser();
        let from_prev_blk = CurrencyCollection::parse(&mut inbound)?;
        let to_next_blk = CurrencyCollection::parse(&mut inbound)?;
        let imported = CurrencyCollection::parse(&mut inbound)?;
        let exported = CurrencyCollection::parse(&mut inbound)?;
        let fees_collected = CurrencyCollection::parse(p)?;
        let burned = if extended {
            Some(CurrencyCollection::parse(p)?)
        } else {
            None
        };
        let mut created_group = p.next_ref()?.parser();
        Ok(Self {
            from_prev_blk,
            to_next_blk,
            imported,
            exported,
            fees_collected,
            burned,
            fees_imported: CurrencyCollection::parse(&mut created_group)?,
            recovered: CurrencyCollection::parse(&mut created_group)?,
            created: CurrencyCollection::parse(&mut created_group)?,
            minted: CurrencyCollection::parse(&mut created_group)?,
        })
    }
}

impl Encode for ValueFlow {
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
        let mut inbound = CellBuilder::new();
        self.from_prev_blk.write_to(&mut inbound)?;
        self.to_next_blk.write_to(&mut inbound)?;
        self.imported.write_to(&mut inbound)?;
        self.exported.write_to(&mut inbound)?;
        let mut created_group = CellBuilder::new();
        self.fees_imported.write_to(&mut created_group)?;
        self.recovered.write_to(&mut created_group)?;
        self.created.write_to(&mut created_group)?;
        self.minted.write_to(&mut created_group)?;

        b.store_tag(&self.tag())?;
        b.store_ref(inbound.build()?)?;
        self.fees_collected.write_to(b)?;
        if let Some(burned) = &self.burned {
            burned.write_to(b)?;
        }
        b.store_ref(created_group.build()?)
    }
}

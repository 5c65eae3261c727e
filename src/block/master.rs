//! Masterchain block extras and shard descriptions

use crate::builder::CellBuilder;
use crate::cell::Cell;
use crate::conv::error::EncodeError;
use crate::conv::{parse_ref, write_ref, EncodeResult};
use crate::hashmap::{Augmentation, Hashmap, HashmapAugE, HashmapE};
use crate::parse::{CellParser, ParseResult};
use crate::prim::{Bits, Bits256, Uint};
use crate::tag::Tag;
use crate::{Decode, Encode};

use super::currency::CurrencyCollection;
use super::proof::CryptoSignaturePair;
use crate::adt::Ref;

/// Binary tree of values, one leaf per shard of a workchain
///
/// ```text
/// bt_leaf$0 {X:Type} leaf:X = BinTree X;
/// bt_fork$1 {X:Type} left:^(BinTree X) right:^(BinTree X) = BinTree X;
/// ```
#[derive(Clone, Debug, PartialEq, Decode, Encode)]
pub enum BinTree<T> {
    #[tlb(tag = "$0")]
    Leaf(T),
    #[tlb(tag = "$1")]
    Fork(#[tlb(by_ref)] Box<BinTree<T>>, #[tlb(by_ref)] Box<BinTree<T>>),
}

impl<T> BinTree<T> {
    /// Leaves from left to right
    #[must_use]
    pub fn leaves(&self) -> Vec<&T> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                BinTree::Leaf(leaf) => out.push(leaf),
                BinTree::Fork(left, right) => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
        out
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Decode, Encode)]
pub enum FutureSplitMerge {
    #[default]
    #[tlb(tag = "$0")]
    None,
    #[tlb(tag = "$10")]
    Split { split_utime: u32, interval: u32 },
    #[tlb(tag = "$11")]
    Merge { merge_utime: u32, interval: u32 },
}

/// Fields common to both shard description layouts
#[derive(Clone, Debug, Default, PartialEq, Decode, Encode)]
pub struct ShardDescrInfo {
    pub seq_no: u32,
    pub reg_mc_seqno: u32,
    pub start_lt: u64,
    pub end_lt: u64,
    pub root_hash: Bits256,
    pub file_hash: Bits256,
    pub before_split: bool,
    pub before_merge: bool,
    pub want_split: bool,
    pub want_merge: bool,
    pub nx_cc_updated: bool,
    pub flags: Uint<3>,
    pub next_catchain_seqno: u32,
    pub next_validator_shard: u64,
    pub min_ref_mc_seqno: u32,
    pub gen_utime: u32,
    pub split_merge_at: FutureSplitMerge,
}

#[derive(Clone, Debug, Default, PartialEq, Decode, Encode)]
pub struct ShardFunds {
    pub fees_collected: CurrencyCollection,
    pub funds_created: CurrencyCollection,
}

/// Latest known state of one shard.
///
/// The older layout keeps the funds inline; the newer one moves them to a
/// child cell to free room in the root.
#[derive(Clone, Debug, PartialEq, Decode, Encode)]
pub enum ShardDescr {
    #[tlb(tag = "#b")]
    Inline {
        info: ShardDescrInfo,
        funds: ShardFunds,
    },
    #[tlb(tag = "#a")]
    Referenced {
        info: ShardDescrInfo,
        #[tlb(by_ref)]
        funds: ShardFunds,
    },
}

impl ShardDescr {
    #[must_use]
    pub fn info(&self) -> &ShardDescrInfo {
        match self {
            ShardDescr::Inline { info, .. } | ShardDescr::Referenced { info, .. } => info,
        }
    }

    #[must_use]
    pub fn funds(&self) -> &ShardFunds {
        match self {
            ShardDescr::Inline { funds, .. } | ShardDescr::Referenced { funds, .. } => funds,
        }
    }
}

/// `shard_fee_created$_ fees:CurrencyCollection create:CurrencyCollection`
#[derive(Clone, Debug, Default, PartialEq, Decode, Encode)]
pub struct ShardFeeCreated {
    pub fees: CurrencyCollection,
    pub create: CurrencyCollection,
}

impl Augmentation for ShardFeeCreated {
    fn combine(&self, other: &Self) -> Self {
        Self {
            fees: self.fees.combine(&other.fees),
            create: self.create.combine(&other.create),
        }
    }
}

/// Latest shard descriptions by workchain
pub type ShardHashes = HashmapE<u32, Ref<BinTree<ShardDescr>>>;

/// Fees by 96-bit (workchain, shard) key
pub type ShardFees = HashmapAugE<Bits<96>, ShardFeeCreated, ShardFeeCreated>;

/// `_ config_addr:bits256 config:^(Hashmap 32 ^Cell) = ConfigParams`
#[derive(Clone, Debug, PartialEq, Decode, Encode)]
pub struct ConfigParams {
    pub config_addr: Bits256,
    #[tlb(by_ref)]
    pub config: Hashmap<u32, Ref<Cell>>,
}

impl ConfigParams {
    /// Cell of configuration parameter `id`, if set
    #[must_use]
    pub fn param(&self, id: u32) -> Option<&Cell> {
        self.config.get(&id).map(|r| &r.0)
    }
}

/// The child group of [`McBlockExtra`]
#[derive(Clone, Debug, Default, PartialEq, Decode, Encode)]
pub struct McExtraOther {
    pub prev_blk_signatures: HashmapE<u16, CryptoSignaturePair>,
    pub recover_create_msg: Option<Ref<Cell>>,
    pub mint_msg: Option<Ref<Cell>>,
}

pub const MC_BLOCK_EXTRA_TAG: Tag = Tag::new(0xcca5, 16);

/// Masterchain-only part of a block
///
/// ```text
/// masterchain_block_extra#cca5 key_block:(## 1)
///   shard_hashes:ShardHashes shard_fees:ShardFees
///   ^[ prev_blk_signatures:(HashmapE 16 CryptoSignaturePair)
///      recover_create_msg:(Maybe ^InMsg) mint_msg:(Maybe ^InMsg) ]
///   config:key_block?ConfigParams = McBlockExtra;
/// ```
///
/// Some producers omit the child group. It is read only when the root still
/// has a reference to spare beyond the one `config` needs.
#[derive(Clone, Debug, PartialEq)]
pub struct McBlockExtra {
    pub key_block: bool,
    pub shard_hashes: ShardHashes,
    pub shard_fees: ShardFees,
    pub other: Option<McExtraOther>,
    /// Present iff `key_block`
    pub config: Option<ConfigParams>,
}

impl Decode for McBlockExtra {
    fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
        p.expect_tag(&MC_BLOCK_EXTRA_TAG, "McBlockExtra")?;
        let key_block = p.read_bit()?;
        let shard_hashes = ShardHashes::parse(p)?;
        let shard_fees = ShardFees::parse(p)?;
        let reserved = usize::from(key_block);
        let other = if p.remaining_refs() > reserved {
            Some(parse_ref(p)?)
        } else {
            None
        };
        let config = if key_block {
            Some(ConfigParams::parse(p)?)
        } else {
            None
        };
        Ok(Self {
            key_block,
            shard_hashes,
            shard_fees,
            other,
            config,
        })
    }
}

impl Encode for McBlockExtra {
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
        if self.key_block != self.config.is_some() {
            return Err(EncodeError::invariant(
                "McBlockExtra carries config exactly when key_block is set",
            ));
        }
        b.store_tag(&MC_BLOCK_EXTRA_TAG)?;
        b.store_bit(self.key_block)?;
        self.shard_hashes.write_to(b)?;
        self.shard_fees.write_to(b)?;
        if let Some(other) = &self.other {
            write_ref(other, b)?;
        }
        if let Some(config) = &self.config {
            config.write_to(b)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block::proof::CryptoSignature;
    use crate::cell::BitString;
    use crate::conv::{marshal, unmarshal};

    fn descr(seq_no: u32, referenced: bool) -> ShardDescr {
        let info = ShardDescrInfo {
            seq_no,
            end_lt: 100,
            flags: Uint::new(0).unwrap(),
            split_merge_at: FutureSplitMerge::Split {
                split_utime: 1_700_000_000,
                interval: 30,
            },
            ..ShardDescrInfo::default()
        };
        let funds = ShardFunds {
            fees_collected: CurrencyCollection::from_grams(5u64),
            funds_created: CurrencyCollection::from_grams(1_000_000_000u64),
        };
        if referenced {
            ShardDescr::Referenced { info, funds }
        } else {
            ShardDescr::Inline { info, funds }
        }
    }

    fn fee_key(workchain: u32, shard: u64) -> Bits<96> {
        let mut bits = BitString::with_capacity(96);
        for i in (0..32).rev() {
            bits.push((workchain >> i) & 1 == 1);
        }
        for i in (0..64).rev() {
            bits.push((shard >> i) & 1 == 1);
        }
        Bits::new(bits).unwrap()
    }

    fn shards() -> ShardHashes {
        let tree = BinTree::Fork(
            Box::new(BinTree::Leaf(descr(11, false))),
            Box::new(BinTree::Leaf(descr(12, true))),
        );
        [(0u32, Ref(tree))].into_iter().collect()
    }

    fn fees() -> ShardFees {
        let fee = |g: u64| ShardFeeCreated {
            fees: CurrencyCollection::from_grams(g),
            create: CurrencyCollection::from_grams(2 * g),
        };
        ShardFees::from_entries([
            (fee_key(0, 0x4000_0000_0000_0000), fee(3), fee(3)),
            (fee_key(0, 0xc000_0000_0000_0000), fee(4), fee(4)),
        ])
    }

    #[test]
    fn bin_tree_leaf_order() {
        let tree = BinTree::Fork(
            Box::new(BinTree::Fork(
                Box::new(BinTree::Leaf(1u8)),
                Box::new(BinTree::Leaf(2u8)),
            )),
            Box::new(BinTree::Leaf(3u8)),
        );
        assert_eq!(tree.leaves(), vec![&1, &2, &3]);
        let cell = marshal(&tree).unwrap();
        assert_eq!(cell.bit_len(), 1);
        assert_eq!(unmarshal::<BinTree<u8>>(&cell).unwrap(), tree);
    }

    #[test]
    fn shard_descr_layouts() {
        let inline = marshal(&descr(1, false)).unwrap();
        assert_eq!(inline.parser().read_uint(4).unwrap(), 0xb);
        assert!(inline.refs().is_empty());
        let referenced = marshal(&descr(1, true)).unwrap();
        assert_eq!(referenced.parser().read_uint(4).unwrap(), 0xa);
        assert_eq!(referenced.refs().len(), 1);
        let back: ShardDescr = unmarshal(&referenced).unwrap();
        assert_eq!(back.funds(), descr(1, false).funds());
        assert_eq!(back.info().seq_no, 1);
    }

    #[test]
    fn key_block_with_config_and_signatures() {
        let mut config: Hashmap<u32, Ref<Cell>> = Hashmap::default();
        config.insert(34u32, Ref(marshal(&0x1234u16).unwrap()));
        let sig = CryptoSignaturePair {
            node_id_short: Bits256([1; 32]),
            sign: CryptoSignature::Ed25519 {
                r: Bits256([2; 32]),
                s: Bits256([3; 32]),
            },
        };
        let extra = McBlockExtra {
            key_block: true,
            shard_hashes: shards(),
            shard_fees: fees(),
            other: Some(McExtraOther {
                prev_blk_signatures: [(0u16, sig)].into_iter().collect(),
                recover_create_msg: None,
                mint_msg: Some(Ref(Cell::empty())),
            }),
            config: Some(ConfigParams {
                config_addr: Bits256([5; 32]),
                config,
            }),
        };
        assert_eq!(extra.shard_fees.extra().fees.grams.0, 7);
        let cell = marshal(&extra).unwrap();
        // shard_hashes, shard_fees, other, config
        assert_eq!(cell.refs().len(), 4);
        let back: McBlockExtra = unmarshal(&cell).unwrap();
        assert_eq!(back, extra);
        let cfg = back.config.as_ref().unwrap();
        assert_eq!(
            unmarshal::<u16>(cfg.param(34).unwrap()).unwrap(),
            0x1234
        );
        assert!(cfg.param(35).is_none());
        let tree = &back.shard_hashes.get(&0).unwrap().0;
        let seqnos: Vec<u32> = tree.leaves().iter().map(|d| d.info().seq_no).collect();
        assert_eq!(seqnos, vec![11, 12]);
    }

    #[test]
    fn ordinary_block_without_child_group() {
        let extra = McBlockExtra {
            key_block: false,
            shard_hashes: ShardHashes::default(),
            shard_fees: ShardFees::default(),
            other: None,
            config: None,
        };
        let cell = marshal(&extra).unwrap();
        // tag, key_block, two empty-dictionary bits, then two zero collections
        assert_eq!(cell.bit_len(), 16 + 1 + 1 + 1 + 5 + 5);
        assert_eq!(unmarshal::<McBlockExtra>(&cell).unwrap(), extra);

        let bad = McBlockExtra {
            key_block: true,
            ..extra
        };
        assert!(matches!(
            marshal(&bad),
            Err(EncodeError::InvariantViolation(_))
        ));
    }
}

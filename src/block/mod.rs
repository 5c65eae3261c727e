//! Protocol block records
//!
//! Typed counterparts of the block-level combinators of the TON block
//! schema. Most records derive their codecs; the few whose layout depends on
//! earlier field values ([`BlockInfo`], [`ValueFlow`], [`McBlockExtra`])
//! implement [`Decode`] and [`Encode`] by hand.
//!
//! Message descriptors and full transactions are left as raw cells or only
//! partially decoded, which is enough to navigate a block and count or order
//! its transactions.

use crate::adt::Ref;
use crate::cell::Cell;
use crate::hashmap::{count_hashmap_e, HashmapAug, HashmapAugE};
use crate::parse::ParseResult;
use crate::prim::{Bits256, Uint};
use crate::{Decode, Encode};

pub mod currency;
pub mod info;
pub mod master;
pub mod proof;
pub mod shard;

pub use currency::{CurrencyCollection, ExtraCurrencyCollection, ValueFlow};
pub use info::{
    BlkMasterInfo, BlkPrevInfo, BlockIdExt, BlockInfo, ExtBlkRef, GlobalVersion, ShardIdent,
};
pub use master::{
    BinTree, ConfigParams, FutureSplitMerge, McBlockExtra, McExtraOther, ShardDescr,
    ShardDescrInfo, ShardFeeCreated, ShardFees, ShardFunds, ShardHashes,
};
pub use proof::{
    BlockProof, BlockSignatures, BlockSignaturesPure, CryptoSignature, CryptoSignaturePair,
    CryptoSignatureSimple, ValidatorBaseInfo,
};
pub use shard::{InvalidShardId, ShardId};

/// `update_hashes#72 {X:Type} old_hash:bits256 new_hash:bits256 = HASH_UPDATE X`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Decode, Encode)]
#[tlb(tag = "#72")]
pub struct HashUpdate {
    pub old_hash: Bits256,
    pub new_hash: Bits256,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Decode, Encode)]
pub enum AccountStatus {
    #[tlb(tag = "$00")]
    Uninit,
    #[tlb(tag = "$01")]
    Frozen,
    #[tlb(tag = "$10")]
    Active,
    #[tlb(tag = "$11")]
    Nonexist,
}

/// Leading fields of a transaction.
///
/// ```text
/// transaction$0111 account_addr:bits256 lt:uint64
///   prev_trans_hash:bits256 prev_trans_lt:uint64 now:uint32
///   outmsg_cnt:uint15 orig_status:AccountStatus end_status:AccountStatus
///   ^[ in_msg:(Maybe ^(Message Any)) out_msgs:(HashmapE 15 ^(Message Any)) ]
///   total_fees:CurrencyCollection state_update:^(HASH_UPDATE Account)
///   description:^TransactionDescr = Transaction;
/// ```
///
/// Everything from the message group on is kept undecoded in `rest`, so a
/// header re-encodes to the original cell.
#[derive(Clone, Debug, PartialEq, Decode, Encode)]
#[tlb(tag = "$0111")]
pub struct TransactionHeader {
    pub account_addr: Bits256,
    pub lt: u64,
    pub prev_trans_hash: Bits256,
    pub prev_trans_lt: u64,
    pub now: u32,
    pub outmsg_cnt: Uint<15>,
    pub orig_status: AccountStatus,
    pub end_status: AccountStatus,
    pub rest: Cell,
}

/// `acc_trans#5 account_addr:bits256
///   transactions:(HashmapAug 64 ^Transaction CurrencyCollection)
///   state_update:^(HASH_UPDATE Account) = AccountBlock`
#[derive(Clone, Debug, PartialEq, Decode, Encode)]
#[tlb(tag = "#5")]
pub struct AccountBlock {
    pub account_addr: Bits256,
    pub transactions: HashmapAug<u64, Ref<TransactionHeader>, CurrencyCollection>,
    #[tlb(by_ref)]
    pub state_update: HashUpdate,
}

pub type ShardAccountBlocks = HashmapAugE<Bits256, AccountBlock, CurrencyCollection>;

/// ```text
/// block_extra#4a33f6fd in_msg_descr:^InMsgDescr out_msg_descr:^OutMsgDescr
///   account_blocks:^ShardAccountBlocks rand_seed:bits256 created_by:bits256
///   custom:(Maybe ^McBlockExtra) = BlockExtra;
/// ```
#[derive(Clone, Debug, PartialEq, Decode, Encode)]
#[tlb(tag = "#4a33f6fd")]
pub struct BlockExtra {
    #[tlb(by_ref)]
    pub in_msg_descr: Cell,
    #[tlb(by_ref)]
    pub out_msg_descr: Cell,
    #[tlb(by_ref)]
    pub account_blocks: ShardAccountBlocks,
    pub rand_seed: Bits256,
    pub created_by: Bits256,
    pub custom: Option<Ref<McBlockExtra>>,
}

/// Both message descriptors are `HashmapAugE 256 _ _`
const MSG_DESCR_KEY_BITS: usize = 256;

impl BlockExtra {
    /// Number of inbound message descriptions, counted without decoding them
    pub fn in_msg_descr_len(&self) -> ParseResult<usize> {
        count_hashmap_e(&mut self.in_msg_descr.parser(), MSG_DESCR_KEY_BITS)
    }

    /// Number of outbound message descriptions, counted without decoding them
    pub fn out_msg_descr_len(&self) -> ParseResult<usize> {
        count_hashmap_e(&mut self.out_msg_descr.parser(), MSG_DESCR_KEY_BITS)
    }
}

/// ```text
/// block#11ef55aa global_id:int32 info:^BlockInfo value_flow:^ValueFlow
///   state_update:^(MERKLE_UPDATE ShardState) extra:^BlockExtra = Block;
/// ```
#[derive(Clone, Debug, PartialEq, Decode, Encode)]
#[tlb(tag = "#11ef55aa")]
pub struct Block {
    pub global_id: i32,
    #[tlb(by_ref)]
    pub info: BlockInfo,
    #[tlb(by_ref)]
    pub value_flow: ValueFlow,
    #[tlb(by_ref)]
    pub state_update: Cell,
    #[tlb(by_ref)]
    pub extra: BlockExtra,
}

impl Block {
    /// Number of transactions across all account blocks
    #[must_use]
    pub fn transactions_quantity(&self) -> usize {
        self.extra
            .account_blocks
            .iter()
            .map(|(_, block, _)| block.transactions.len())
            .sum()
    }

    /// Every transaction of the block, ordered by logical time
    #[must_use]
    pub fn all_transactions(&self) -> Vec<&TransactionHeader> {
        let mut out: Vec<&TransactionHeader> = self
            .extra
            .account_blocks
            .iter()
            .flat_map(|(_, block, _)| block.transactions.iter().map(|(_, tx, _)| &tx.0))
            .collect();
        out.sort_by_key(|tx| tx.lt);
        out
    }
}

/// A block decoded only as far as its header.
///
/// The value flow, state update and extra stay behind as the unread
/// references of `rest`.
#[derive(Clone, Debug, PartialEq, Decode, Encode)]
#[tlb(tag = "#11ef55aa")]
pub struct BlockHeader {
    pub global_id: i32,
    #[tlb(by_ref)]
    pub info: BlockInfo,
    pub rest: Cell,
}

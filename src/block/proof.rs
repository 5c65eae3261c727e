//! Block proofs and validator signatures

use crate::adt::Ref;
use crate::cell::Cell;
use crate::hashmap::HashmapE;
use crate::prim::Bits256;
use crate::{Decode, Encode};

use super::info::BlockIdExt;

/// `ed25519_signature#5 R:bits256 s:bits256 = CryptoSignatureSimple`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Decode, Encode)]
#[tlb(tag = "#5")]
pub struct CryptoSignatureSimple {
    pub r: Bits256,
    pub s: Bits256,
}

#[derive(Clone, Debug, PartialEq, Eq, Decode, Encode)]
pub enum CryptoSignature {
    #[tlb(tag = "#5")]
    Ed25519 { r: Bits256, s: Bits256 },
    #[tlb(tag = "#f")]
    Chained {
        #[tlb(by_ref)]
        signed_cert: Cell,
        temp_key_signature: CryptoSignatureSimple,
    },
}

/// `sig_pair$_ node_id_short:bits256 sign:CryptoSignature`
#[derive(Clone, Debug, PartialEq, Eq, Decode, Encode)]
pub struct CryptoSignaturePair {
    pub node_id_short: Bits256,
    pub sign: CryptoSignature,
}

/// `validator_base_info$_ validator_list_hash_short:uint32 catchain_seqno:uint32`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Decode, Encode)]
pub struct ValidatorBaseInfo {
    pub validator_list_hash_short: u32,
    pub catchain_seqno: u32,
}

/// `block_signatures_pure#_ sig_count:uint32 sig_weight:uint64
///   signatures:(HashmapE 16 CryptoSignaturePair)`
#[derive(Clone, Debug, Default, PartialEq, Decode, Encode)]
pub struct BlockSignaturesPure {
    pub sig_count: u32,
    pub sig_weight: u64,
    pub signatures: HashmapE<u16, CryptoSignaturePair>,
}

#[derive(Clone, Debug, Default, PartialEq, Decode, Encode)]
#[tlb(tag = "#11")]
pub struct BlockSignatures {
    pub validator_info: ValidatorBaseInfo,
    pub pure_signatures: BlockSignaturesPure,
}

/// `block_proof#c3 proof_for:BlockIdExt root:^Cell
///   signatures:(Maybe ^BlockSignatures) = BlockProof`
#[derive(Clone, Debug, PartialEq, Decode, Encode)]
#[tlb(tag = "#c3")]
pub struct BlockProof {
    pub proof_for: BlockIdExt,
    #[tlb(by_ref)]
    pub root: Cell,
    pub signatures: Option<Ref<BlockSignatures>>,
}

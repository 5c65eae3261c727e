//! Block header records
//!
//! ```text
//! block_info#9bc7a987 version:uint32
//!   not_master:(## 1) after_merge:(## 1) before_split:(## 1)
//!   after_split:(## 1) want_split:Bool want_merge:Bool
//!   key_block:Bool vert_seqno_incr:(## 1)
//!   flags:(## 8) { flags <= 1 }
//!   seq_no:# vert_seq_no:# { vert_seq_no >= vert_seqno_incr }
//!   shard:ShardIdent gen_utime:uint32
//!   start_lt:uint64 end_lt:uint64
//!   gen_validator_list_hash_short:uint32
//!   gen_catchain_seqno:uint32
//!   min_ref_mc_seqno:uint32
//!   prev_key_block_seqno:uint32
//!   gen_software:flags.0?GlobalVersion
//!   master_ref:not_master?^BlkMasterInfo
//!   prev_ref:^(BlkPrevInfo after_merge)
//!   prev_vert_ref:vert_seqno_incr?^(BlkPrevInfo 0)
//!   = BlockInfo;
//! ```

use crate::builder::CellBuilder;
use crate::conv::error::EncodeError;
use crate::conv::{parse_ref, write_ref, EncodeResult};
use crate::parse::error::{InvalidEncoding, ParseError};
use crate::parse::{CellParser, ParseResult};
use crate::prim::Bits256;
use crate::tag::Tag;
use crate::{Decode, Encode};

/// `shard_ident$00 shard_pfx_bits:(#<= 60) workchain_id:int32 shard_prefix:uint64`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ShardIdent {
    pub shard_pfx_bits: u8,
    pub workchain_id: i32,
    pub shard_prefix: u64,
}

const SHARD_IDENT_TAG: Tag = Tag::from_literal("$00");
pub const MAX_SHARD_PFX_BITS: u64 = 60;

impl Decode for ShardIdent {
    fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
        p.expect_tag(&SHARD_IDENT_TAG, "ShardIdent")?;
        let shard_pfx_bits = p.read_uint(6)?;
        if shard_pfx_bits > MAX_SHARD_PFX_BITS {
            return Err(InvalidEncoding::ValueOutOfRange {
                value: shard_pfx_bits,
                max: MAX_SHARD_PFX_BITS,
            }
            .into());
        }
        Ok(Self {
            shard_pfx_bits: shard_pfx_bits as u8,
            workchain_id: i32::parse(p)?,
            shard_prefix: u64::parse(p)?,
        })
    }
}

impl Encode for ShardIdent {
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
        if u64::from(self.shard_pfx_bits) > MAX_SHARD_PFX_BITS {
            return Err(EncodeError::invariant(format!(
                "shard prefix of {} bits exceeds {}",
                self.shard_pfx_bits, MAX_SHARD_PFX_BITS
            )));
        }
        b.store_tag(&SHARD_IDENT_TAG)?;
        b.store_uint(u64::from(self.shard_pfx_bits), 6)?;
        self.workchain_id.write_to(b)?;
        self.shard_prefix.write_to(b)
    }
}

/// `capabilities#c4 version:uint32 capabilities:uint64 = GlobalVersion`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Decode, Encode)]
#[tlb(tag = "#c4")]
pub struct GlobalVersion {
    pub version: u32,
    pub capabilities: u64,
}

/// `ext_blk_ref$_ end_lt:uint64 seq_no:uint32 root_hash:bits256 file_hash:bits256`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Decode, Encode)]
pub struct ExtBlkRef {
    pub end_lt: u64,
    pub seq_no: u32,
    pub root_hash: Bits256,
    pub file_hash: Bits256,
}

/// `master_info$_ master:ExtBlkRef = BlkMasterInfo`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Decode, Encode)]
pub struct BlkMasterInfo {
    pub master: ExtBlkRef,
}

/// `block_id_ext$_ shard_id:ShardIdent seq_no:uint32 root_hash:bits256 file_hash:bits256`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Decode, Encode)]
pub struct BlockIdExt {
    pub shard_id: ShardIdent,
    pub seq_no: u32,
    pub root_hash: Bits256,
    pub file_hash: Bits256,
}

/// Previous block(s) of a block.
///
/// ```text
/// prev_blk_info$_ prev:ExtBlkRef = BlkPrevInfo 0;
/// prev_blks_info$_ prev1:^ExtBlkRef prev2:^ExtBlkRef = BlkPrevInfo 1;
/// ```
///
/// Neither constructor carries a tag; which one is present is decided by the
/// `after_merge` flag of the enclosing [`BlockInfo`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlkPrevInfo {
    Single(ExtBlkRef),
    Merged { prev1: ExtBlkRef, prev2: ExtBlkRef },
}

impl Default for BlkPrevInfo {
    fn default() -> Self {
        BlkPrevInfo::Single(ExtBlkRef::default())
    }
}

impl BlkPrevInfo {
    /// Reads `BlkPrevInfo after_merge`
    pub fn parse_with(p: &mut CellParser<'_>, after_merge: bool) -> ParseResult<Self> {
        if after_merge {
            Ok(BlkPrevInfo::Merged {
                prev1: parse_ref(p)?,
                prev2: parse_ref(p)?,
            })
        } else {
            Ok(BlkPrevInfo::Single(ExtBlkRef::parse(p)?))
        }
    }

    #[must_use]
    pub fn is_merged(&self) -> bool {
        matches!(self, BlkPrevInfo::Merged { .. })
    }
}

impl Encode for BlkPrevInfo {
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
        match self {
            BlkPrevInfo::Single(prev) => prev.write_to(b),
            BlkPrevInfo::Merged { prev1, prev2 } => {
                write_ref(prev1, b)?;
                write_ref(prev2, b)
            }
        }
    }
}

pub const BLOCK_INFO_TAG: Tag = Tag::new(0x9bc7_a987, 32);

/// Block header proper.
///
/// The trailing optional fields are present exactly when the flag they
/// depend on is set; [`Encode`] refuses values where they disagree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockInfo {
    pub version: u32,
    pub not_master: bool,
    pub after_merge: bool,
    pub before_split: bool,
    pub after_split: bool,
    pub want_split: bool,
    pub want_merge: bool,
    pub key_block: bool,
    pub vert_seqno_incr: bool,
    pub flags: u8,
    pub seq_no: u32,
    pub vert_seq_no: u32,
    pub shard: ShardIdent,
    pub gen_utime: u32,
    pub start_lt: u64,
    pub end_lt: u64,
    pub gen_validator_list_hash_short: u32,
    pub gen_catchain_seqno: u32,
    pub min_ref_mc_seqno: u32,
    pub prev_key_block_seqno: u32,
    /// Present iff bit 0 of `flags` is set
    pub gen_software: Option<GlobalVersion>,
    /// Present iff `not_master`
    pub master_ref: Option<BlkMasterInfo>,
    /// Two references iff `after_merge`
    pub prev_ref: BlkPrevInfo,
    /// `BlkPrevInfo 0`, present iff `vert_seqno_incr`
    pub prev_vert_ref: Option<ExtBlkRef>,
}

impl BlockInfo {
    /// Prior sequence number, `seq_no - 1`
    #[must_use]
    pub fn prev_seq_no(&self) -> u32 {
        self.seq_no.saturating_sub(1)
    }

    fn check_flags(&self) -> EncodeResult<()> {
        let mismatch = |what: &str| {
            Err(EncodeError::invariant(format!(
                "BlockInfo flag and field disagree: {}",
                what
            )))
        };
        if self.flags > 1 {
            return mismatch("flags must be at most 1");
        }
        if (self.flags & 1 == 1) != self.gen_software.is_some() {
            return mismatch("flags.0 / gen_software");
        }
        if self.not_master != self.master_ref.is_some() {
            return mismatch("not_master / master_ref");
        }
        if self.after_merge != self.prev_ref.is_merged() {
            return mismatch("after_merge / prev_ref");
        }
        if self.vert_seqno_incr != self.prev_vert_ref.is_some() {
            return mismatch("vert_seqno_incr / prev_vert_ref");
        }
        if self.vert_seq_no < u32::from(self.vert_seqno_incr) {
            return mismatch("vert_seq_no below vert_seqno_incr");
        }
        Ok(())
    }
}

impl Decode for BlockInfo {
    fn parse(p: &mut CellParser<'_>) -> ParseResult<Self> {
        p.expect_tag(&BLOCK_INFO_TAG, "BlockInfo")?;
        let version = u32::parse(p)?;
        let not_master = p.read_bit()?;
        let after_merge = p.read_bit()?;
        let before_split = p.read_bit()?;
        let after_split = p.read_bit()?;
        let want_split = p.read_bit()?;
        let want_merge = p.read_bit()?;
        let key_block = p.read_bit()?;
        let vert_seqno_incr = p.read_bit()?;
        let flags = u8::parse(p)?;
        if flags > 1 {
            return Err(InvalidEncoding::ValueOutOfRange {
                value: u64::from(flags),
                max: 1,
            }
            .into());
        }
        let seq_no = u32::parse(p)?;
        let vert_seq_no = u32::parse(p)?;
        if vert_seq_no < u32::from(vert_seqno_incr) {
            return Err(ParseError::invalid("vert_seq_no below vert_seqno_incr"));
        }
        let shard = ShardIdent::parse(p)?;
        let gen_utime = u32::parse(p)?;
        let start_lt = u64::parse(p)?;
        let end_lt = u64::parse(p)?;
        let gen_validator_list_hash_short = u32::parse(p)?;
        let gen_catchain_seqno = u32::parse(p)?;
        let min_ref_mc_seqno = u32::parse(p)?;
        let prev_key_block_seqno = u32::parse(p)?;
        let gen_software = if flags & 1 == 1 {
            Some(GlobalVersion::parse(p)?)
        } else {
            None
        };
        let master_ref = if not_master {
            Some(parse_ref(p)?)
        } else {
            None
        };
        let prev_ref = BlkPrevInfo::parse_with(&mut p.next_ref()?.parser(), after_merge)?;
        let prev_vert_ref = if vert_seqno_incr {
            Some(parse_ref(p)?)
        } else {
            None
        };
        Ok(Self {
            version,
            not_master,
            after_merge,
            before_split,
            after_split,
            want_split,
            want_merge,
            key_block,
            vert_seqno_incr,
            flags,
            seq_no,
            vert_seq_no,
            shard,
            gen_utime,
            start_lt,
            end_lt,
            gen_validator_list_hash_short,
            gen_catchain_seqno,
            min_ref_mc_seqno,
            prev_key_block_seqno,
            gen_software,
            master_ref,
            prev_ref,
            prev_vert_ref,
        })
    }
}

impl Encode for BlockInfo {
    fn write_to(&self, b: &mut CellBuilder) -> EncodeResult<()> {
        self.check_flags()?;
        b.store_tag(&BLOCK_INFO_TAG)?;
        self.version.write_to(b)?;
        for bit in [
            self.not_master,
            self.after_merge,
            self.before_split,
            self.after_split,
            self.want_split,
            self.want_merge,
            self.key_block,
            self.vert_seqno_incr,
        ] {
            b.store_bit(bit)?;
        }
        self.flags.write_to(b)?;
        self.seq_no.write_to(b)?;
        self.vert_seq_no.write_to(b)?;
        self.shard.write_to(b)?;
        self.gen_utime.write_to(b)?;
        self.start_lt.write_to(b)?;
        self.end_lt.write_to(b)?;
        self.gen_validator_list_hash_short.write_to(b)?;
        self.gen_catchain_seqno.write_to(b)?;
        self.min_ref_mc_seqno.write_to(b)?;
        self.prev_key_block_seqno.write_to(b)?;
        if let Some(gs) = &self.gen_software {
            gs.write_to(b)?;
        }
        if let Some(master) = &self.master_ref {
            write_ref(master, b)?;
        }
        write_ref(&self.prev_ref, b)?;
        if let Some(vert) = &self.prev_vert_ref {
            write_ref(vert, b)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::conv::error::DecodeError;
    use crate::conv::{marshal, unmarshal};

    fn blk_ref(seq_no: u32) -> ExtBlkRef {
        ExtBlkRef {
            end_lt: u64::from(seq_no) * 1_000_000,
            seq_no,
            root_hash: Bits256([seq_no as u8; 32]),
            file_hash: Bits256([!(seq_no as u8); 32]),
        }
    }

    fn basechain_info() -> BlockInfo {
        BlockInfo {
            version: 0,
            not_master: true,
            after_merge: true,
            vert_seqno_incr: true,
            flags: 1,
            seq_no: 41_000_000,
            vert_seq_no: 1,
            shard: ShardIdent {
                shard_pfx_bits: 2,
                workchain_id: 0,
                shard_prefix: 0x4000_0000_0000_0000,
            },
            gen_utime: 1_700_000_000,
            start_lt: 45_000_000_000_000,
            end_lt: 45_000_000_000_004,
            gen_software: Some(GlobalVersion {
                version: 4,
                capabilities: 0x2e,
            }),
            master_ref: Some(BlkMasterInfo {
                master: blk_ref(35_000_000),
            }),
            prev_ref: BlkPrevInfo::Merged {
                prev1: blk_ref(40_999_999),
                prev2: blk_ref(40_999_998),
            },
            prev_vert_ref: Some(blk_ref(7)),
            ..BlockInfo::default()
        }
    }

    #[test]
    fn flag_dependent_fields_round_trip() {
        let info = basechain_info();
        let cell = marshal(&info).unwrap();
        // master_ref, prev_ref, prev_vert_ref
        assert_eq!(cell.refs().len(), 3);
        // after_merge: prev_ref holds two references and no bits
        assert_eq!(cell.refs()[1].refs().len(), 2);
        assert_eq!(cell.refs()[1].bit_len(), 0);
        let back: BlockInfo = unmarshal(&cell).unwrap();
        assert_eq!(back, info);
        assert_eq!(back.prev_seq_no(), 40_999_999);
    }

    #[test]
    fn masterchain_info_minimal() {
        let info = BlockInfo {
            shard: ShardIdent {
                shard_pfx_bits: 0,
                workchain_id: -1,
                shard_prefix: 0,
            },
            prev_ref: BlkPrevInfo::Single(blk_ref(9)),
            seq_no: 10,
            ..BlockInfo::default()
        };
        let cell = marshal(&info).unwrap();
        assert_eq!(cell.refs().len(), 1);
        assert_eq!(cell.refs()[0].refs().len(), 0);
        assert_eq!(unmarshal::<BlockInfo>(&cell).unwrap(), info);
    }

    #[test]
    fn inconsistent_flags_refused() {
        let mut info = basechain_info();
        info.gen_software = None;
        assert!(matches!(
            marshal(&info),
            Err(EncodeError::InvariantViolation(_))
        ));
        let mut info = basechain_info();
        info.prev_ref = BlkPrevInfo::Single(blk_ref(1));
        assert!(matches!(
            marshal(&info),
            Err(EncodeError::InvariantViolation(_))
        ));
    }

    #[test]
    fn wrong_tag_rejected() {
        let cell = marshal(&0xc4u8).unwrap();
        assert!(matches!(
            unmarshal::<BlockInfo>(&cell),
            Err(DecodeError::Parse(ParseError::Exhausted(_)))
        ));
        let mut b = CellBuilder::new();
        b.store_uint(0x9bc7_a986, 32).unwrap();
        let cell = b.build().unwrap();
        assert!(matches!(
            unmarshal::<BlockInfo>(&cell),
            Err(DecodeError::Parse(ParseError::Token(_)))
        ));
    }

    #[test]
    fn shard_prefix_bound() {
        let mut b = CellBuilder::new();
        b.store_uint(0, 2).unwrap();
        b.store_uint(61, 6).unwrap();
        b.store_int(0, 32).unwrap();
        b.store_uint(0, 64).unwrap();
        let cell = b.build().unwrap();
        assert!(matches!(
            unmarshal::<ShardIdent>(&cell),
            Err(DecodeError::Parse(ParseError::Encoding(
                InvalidEncoding::ValueOutOfRange { value: 61, max: 60 }
            )))
        ));
    }
}

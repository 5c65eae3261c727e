//! Shard identifiers in their packed 64-bit form
//!
//! A shard of a workchain is a binary prefix of account addresses. Packed,
//! the prefix bits come first, followed by a single marker `1` bit and zero
//! padding, so `0x8000_0000_0000_0000` is the whole workchain and
//! `0x6000_0000_0000_0000` is the shard of addresses starting with `01`.

use std::error::Error;
use std::fmt::{Display, Formatter};

use super::info::ShardIdent;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvalidShardId(pub i64);

impl Display for InvalidShardId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "shard id {:#018x} has no marker bit within the first 61 bits",
            self.0
        )
    }
}

impl Error for InvalidShardId {}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardId(u64);

impl ShardId {
    /// The shard covering a whole workchain
    pub const FULL: ShardId = ShardId(1 << 63);

    /// Interprets the signed packed form used by node APIs
    pub fn parse(raw: i64) -> Result<Self, InvalidShardId> {
        let bits = raw as u64;
        if bits == 0 || bits.trailing_zeros() < 63 - super::info::MAX_SHARD_PFX_BITS as u32 {
            return Err(InvalidShardId(raw));
        }
        Ok(ShardId(bits))
    }

    #[must_use]
    pub fn raw(self) -> i64 {
        self.0 as i64
    }

    /// Number of significant prefix bits
    #[must_use]
    pub fn prefix_bits(self) -> u8 {
        (63 - self.0.trailing_zeros()) as u8
    }

    /// Prefix bits without the marker, left-aligned
    #[must_use]
    pub fn prefix(self) -> u64 {
        self.0 & (self.0 - 1)
    }

    fn mask(self) -> u64 {
        !((self.0 & self.0.wrapping_neg()) - 1) << 1
    }

    /// Whether an account whose address starts with `address_prefix` lives
    /// in this shard
    #[must_use]
    pub fn contains(self, address_prefix: u64) -> bool {
        (address_prefix ^ self.0) & self.mask() == 0
    }

    /// The two halves this shard splits into
    #[must_use]
    pub fn children(self) -> Option<(ShardId, ShardId)> {
        if u64::from(self.prefix_bits()) >= super::info::MAX_SHARD_PFX_BITS {
            return None;
        }
        let low = self.0 & self.0.wrapping_neg();
        let half = low >> 1;
        Some((ShardId(self.0 - half), ShardId(self.0 + half)))
    }

    #[must_use]
    pub fn ident(self, workchain_id: i32) -> ShardIdent {
        ShardIdent {
            shard_pfx_bits: self.prefix_bits(),
            workchain_id,
            shard_prefix: self.prefix(),
        }
    }
}

impl From<ShardIdent> for ShardId {
    fn from(ident: ShardIdent) -> Self {
        let pfx_bits = u64::from(ident.shard_pfx_bits).min(super::info::MAX_SHARD_PFX_BITS);
        let marker = 1u64 << (63 - pfx_bits);
        let mask = !(marker | (marker - 1));
        ShardId((ident.shard_prefix & mask) | marker)
    }
}

impl Display for ShardId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

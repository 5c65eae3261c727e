//! Cells
//!
//! A [`Cell`] is the node type of the tree (strictly, DAG) format that every
//! TL-B value serializes into. Each cell holds at most [`MAX_BITS`] bits of
//! data and at most [`MAX_REFS`] references to child cells. Cells are
//! immutable once built: use a [`CellBuilder`](crate::builder::CellBuilder)
//! to construct them and a [`CellParser`](crate::parse::CellParser) to read
//! them back.
//!
//! Children are shared through [`Arc`], so a decoded bag-of-cells keeps a
//! single allocation for every distinct subtree regardless of how many
//! parents refer to it.
//!
//! # Hashing
//!
//! Every cell has a *representation hash*: the SHA-256 digest of
//!
//!   1. the two descriptor bytes `d1 = refs + 8 * exotic + 32 * level_mask`
//!      and `d2 = floor(bits / 8) + ceil(bits / 8)`,
//!   2. the data bits, padded to a byte boundary with a single one-bit
//!      followed by zero-bits when the length is not a multiple of eight,
//!   3. the depth of every child as a big-endian `u16`,
//!   4. the representation hash of every child.
//!
//! Cells below a pruned branch carry a nonzero level mask and one hash per
//! significant level. The hash at level `i` uses the level mask truncated to
//! its lowest `i` bits in `d1` and the children's level-`i` hashes and
//! depths; every level past the lowest hashes the previous level's hash in
//! place of the data. A pruned branch stores its lower hashes and depths in
//! its data, and a Merkle cell reads its children one level up. The
//! representation hash is the hash at the highest level, so the level-0
//! hash of a pruned tree equals the representation hash of the full one.
//!
//! Hashes and depths are computed lazily and cached per cell.

use std::fmt::{Debug, Formatter};
use std::sync::{Arc, OnceLock};

use bitvec::prelude::*;
use sha2::{Digest, Sha256};

use crate::conv::error::{EncodeError, EncodeResult, Resource};
use crate::parse::CellParser;

pub mod boc;

/// Owned bit-string, most significant bit first
pub type BitString = BitVec<u8, Msb0>;

/// Borrowed bit-string, most significant bit first
pub type BitStr = BitSlice<u8, Msb0>;

/// Maximum number of data bits in a single cell
pub const MAX_BITS: usize = 1023;

/// Maximum number of references held by a single cell
pub const MAX_REFS: usize = 4;

cfg_if::cfg_if! {
    if #[cfg(feature = "arrayvec_refs")] {
        /// Inline storage for the references of a cell
        pub type Refs = arrayvec::ArrayVec<Arc<Cell>, MAX_REFS>;
    } else {
        /// Heap storage for the references of a cell
        pub type Refs = Vec<Arc<Cell>>;
    }
}

/// Classification of a cell by the interpretation of its contents
///
/// Exotic cells carry their kind as the first byte of their data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CellKind {
    Ordinary,
    PrunedBranch,
    Library,
    MerkleProof,
    MerkleUpdate,
}

impl CellKind {
    /// Interprets the leading data byte of an exotic cell
    #[must_use]
    pub fn from_exotic_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::PrunedBranch),
            2 => Some(Self::Library),
            3 => Some(Self::MerkleProof),
            4 => Some(Self::MerkleUpdate),
            _ => None,
        }
    }

    /// Leading data byte of cells of this kind, if exotic
    #[must_use]
    pub fn exotic_tag(self) -> Option<u8> {
        match self {
            Self::Ordinary => None,
            Self::PrunedBranch => Some(1),
            Self::Library => Some(2),
            Self::MerkleProof => Some(3),
            Self::MerkleUpdate => Some(4),
        }
    }

    #[must_use]
    #[inline]
    pub fn is_exotic(self) -> bool {
        self != Self::Ordinary
    }
}

/// Highest level a cell can have
pub const MAX_LEVEL: u8 = 3;

#[derive(Clone, Copy)]
struct Meta {
    hashes: [[u8; 32]; MAX_LEVEL as usize + 1],
    depths: [u16; MAX_LEVEL as usize + 1],
    /// Number of significant levels, the zeroth included
    count: usize,
}

/// Immutable node of a cell tree
#[derive(Clone)]
pub struct Cell {
    kind: CellKind,
    data: BitString,
    refs: Refs,
    meta: OnceLock<Meta>,
}

impl Cell {
    /// Constructs a cell, checking the bit and reference limits and, for
    /// exotic kinds, that the data starts with the matching type byte.
    pub fn new(kind: CellKind, mut data: BitString, refs: Vec<Arc<Cell>>) -> EncodeResult<Self> {
        if data.len() > MAX_BITS {
            return Err(EncodeError::Overflow {
                resource: Resource::Bits,
                requested: data.len(),
                available: MAX_BITS,
            });
        }
        if refs.len() > MAX_REFS {
            return Err(EncodeError::Overflow {
                resource: Resource::Refs,
                requested: refs.len(),
                available: MAX_REFS,
            });
        }
        if let Some(tag) = kind.exotic_tag() {
            let lead = (data.len() >= 8).then(|| read_byte(&data[..8]));
            if lead != Some(tag) {
                return Err(EncodeError::InvariantViolation(format!(
                    "{kind:?} cell data must start with type byte {tag}"
                )));
            }
        }
        if kind == CellKind::PrunedBranch {
            check_pruned_branch(&data, &refs)?;
        }
        // slices taken mid-byte keep their head offset
        data.force_align();
        Ok(Self {
            kind,
            data,
            refs: refs.into_iter().collect(),
            meta: OnceLock::new(),
        })
    }

    /// Constructs an ordinary cell
    pub fn ordinary(data: BitString, refs: Vec<Arc<Cell>>) -> EncodeResult<Self> {
        Self::new(CellKind::Ordinary, data, refs)
    }

    /// Returns the ordinary cell with no data and no references
    #[must_use]
    pub fn empty() -> Self {
        Self {
            kind: CellKind::Ordinary,
            data: BitString::new(),
            refs: Refs::new(),
            meta: OnceLock::new(),
        }
    }

    #[must_use]
    #[inline]
    pub fn kind(&self) -> CellKind {
        self.kind
    }

    #[must_use]
    #[inline]
    pub fn is_exotic(&self) -> bool {
        self.kind.is_exotic()
    }

    #[must_use]
    #[inline]
    pub fn data(&self) -> &BitStr {
        &self.data
    }

    /// Number of data bits
    #[must_use]
    #[inline]
    pub fn bit_len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    #[inline]
    pub fn refs(&self) -> &[Arc<Cell>] {
        &self.refs
    }

    #[must_use]
    pub fn reference(&self, index: usize) -> Option<&Arc<Cell>> {
        self.refs.get(index)
    }

    /// Opens a read cursor positioned at the start of this cell
    #[must_use]
    pub fn parser(&self) -> CellParser<'_> {
        CellParser::new(self)
    }

    /// Level mask of the cell, derived from its kind and its children
    #[must_use]
    pub fn level_mask(&self) -> u8 {
        match self.kind {
            CellKind::Ordinary => self.children_mask(),
            CellKind::PrunedBranch => {
                if self.data.len() >= 16 {
                    read_byte(&self.data[8..16])
                } else {
                    0
                }
            }
            CellKind::Library => 0,
            CellKind::MerkleProof | CellKind::MerkleUpdate => self.children_mask() >> 1,
        }
    }

    fn children_mask(&self) -> u8 {
        self.refs.iter().fold(0, |acc, r| acc | r.level_mask())
    }

    /// Highest significant level, zero for cells with no pruned branch below
    #[must_use]
    pub fn level(&self) -> u8 {
        (8 - self.level_mask().leading_zeros()) as u8
    }

    /// First descriptor byte
    #[must_use]
    pub fn d1(&self) -> u8 {
        self.descriptor(self.level_mask())
    }

    fn descriptor(&self, level_mask: u8) -> u8 {
        self.refs.len() as u8 + 8 * u8::from(self.is_exotic()) + 32 * level_mask
    }

    /// Second descriptor byte
    #[must_use]
    pub fn d2(&self) -> u8 {
        let bits = self.data.len();
        (bits / 8 + (bits + 7) / 8) as u8
    }

    /// Data bytes, padded with a completion tag when the bit length is not
    /// a multiple of eight
    #[must_use]
    pub fn padded_data(&self) -> Vec<u8> {
        let mut out: Vec<u8> = self
            .data
            .chunks(8)
            .map(|chunk| read_byte(chunk) << (8 - chunk.len()))
            .collect();
        let tail = self.data.len() % 8;
        if tail != 0 {
            if let Some(last) = out.last_mut() {
                *last |= 0x80 >> tail;
            }
        }
        out
    }

    fn meta(&self) -> &Meta {
        self.meta.get_or_init(|| {
            let mask = self.level_mask();
            let count = mask.count_ones() as usize + 1;
            let mut meta = Meta {
                hashes: [[0; 32]; MAX_LEVEL as usize + 1],
                depths: [0; MAX_LEVEL as usize + 1],
                count,
            };
            // a pruned branch only computes its top hash
            let first = if self.kind == CellKind::PrunedBranch {
                for i in 0..count - 1 {
                    let hash_at = 16 + 256 * i;
                    let depth_at = 16 + 256 * (count - 1) + 16 * i;
                    for (j, byte) in meta.hashes[i].iter_mut().enumerate() {
                        *byte = read_byte(&self.data[hash_at + 8 * j..hash_at + 8 * j + 8]);
                    }
                    meta.depths[i] = u16::from_be_bytes([
                        read_byte(&self.data[depth_at..depth_at + 8]),
                        read_byte(&self.data[depth_at + 8..depth_at + 16]),
                    ]);
                }
                count - 1
            } else {
                0
            };
            let child_offset = u8::from(matches!(
                self.kind,
                CellKind::MerkleProof | CellKind::MerkleUpdate
            ));

            let mut index = 0;
            for level in 0..=self.level() {
                if level > 0 && mask & (1 << (level - 1)) == 0 {
                    continue;
                }
                if index < first {
                    index += 1;
                    continue;
                }
                let mut hasher = Sha256::new();
                hasher.update([self.descriptor(mask & ((1 << level) - 1)), self.d2()]);
                if index == first {
                    hasher.update(self.padded_data());
                } else {
                    hasher.update(meta.hashes[index - 1]);
                }
                let mut depth = 0u16;
                for r in self.refs.iter() {
                    let child_depth = r.depth_at(level + child_offset);
                    hasher.update(child_depth.to_be_bytes());
                    depth = depth.max(child_depth.saturating_add(1));
                }
                for r in self.refs.iter() {
                    hasher.update(r.hash_at(level + child_offset));
                }
                meta.hashes[index] = hasher.finalize().into();
                meta.depths[index] = depth;
                index += 1;
            }
            meta
        })
    }

    fn level_index(&self, level: u8) -> usize {
        let below = (1u8 << level.min(MAX_LEVEL)) - 1;
        (self.level_mask() & below).count_ones() as usize
    }

    /// Representation hash
    #[must_use]
    pub fn hash(&self) -> [u8; 32] {
        let meta = self.meta();
        meta.hashes[meta.count - 1]
    }

    /// Hash of the cell at `level`; levels past [`Cell::level`] give the
    /// representation hash
    #[must_use]
    pub fn hash_at(&self, level: u8) -> [u8; 32] {
        self.meta().hashes[self.level_index(level)]
    }

    /// Length of the longest reference chain below this cell
    #[must_use]
    pub fn depth(&self) -> u16 {
        let meta = self.meta();
        meta.depths[meta.count - 1]
    }

    #[must_use]
    pub fn depth_at(&self, level: u8) -> u16 {
        self.meta().depths[self.level_index(level)]
    }

    /// For a library cell, the hash of the code cell it stands in for
    #[must_use]
    pub fn library_hash(&self) -> Option<[u8; 32]> {
        if self.kind != CellKind::Library || self.data.len() != 8 + 256 {
            return None;
        }
        let mut out = [0u8; 32];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = read_byte(&self.data[8 + 8 * i..16 + 8 * i]);
        }
        Some(out)
    }
}

/// Pruned branch data is the type byte, the level mask, then one hash and
/// one depth for every level below the branch
fn check_pruned_branch(data: &BitStr, refs: &[Arc<Cell>]) -> EncodeResult<()> {
    let mask = if data.len() >= 16 {
        read_byte(&data[8..16])
    } else {
        0
    };
    if mask == 0 || mask > 7 {
        return Err(EncodeError::InvariantViolation(format!(
            "pruned branch level mask {mask} outside 1..=7"
        )));
    }
    let expected = 16 + mask.count_ones() as usize * (256 + 16);
    if data.len() != expected || !refs.is_empty() {
        return Err(EncodeError::InvariantViolation(format!(
            "pruned branch with mask {mask} needs {expected} bits and no references"
        )));
    }
    Ok(())
}

fn read_byte(bits: &BitStr) -> u8 {
    bits.iter().by_vals().fold(0u8, |acc, b| (acc << 1) | u8::from(b))
}

impl Default for Cell {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.hash() == other.hash()
    }
}

impl Eq for Cell {}

impl Debug for Cell {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("kind", &self.kind)
            .field("bits", &self.data.len())
            .field("data", &hex::encode(self.padded_data()))
            .field("refs", &self.refs)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn bits(bytes: &[u8], len: usize) -> BitString {
        let mut out = BitString::from_slice(bytes);
        out.truncate(len);
        out
    }

    #[test]
    fn descriptors() {
        let cell = Cell::ordinary(bits(&[0xab, 0xc0], 12), vec![]).unwrap();
        assert_eq!(cell.d1(), 0);
        assert_eq!(cell.d2(), 3);
        assert_eq!(cell.padded_data(), vec![0xab, 0xc8]);
    }

    #[test]
    fn empty_cell_hash() {
        // well-known hash of the empty ordinary cell
        assert_eq!(
            hex::encode(Cell::empty().hash()),
            "96a296d224f285c67bee93c30f8a309157f0daa35dc5b87e410b78630a09cfc7"
        );
    }

    #[test]
    fn depth_follows_longest_chain() {
        let leaf = Arc::new(Cell::empty());
        let mid = Arc::new(Cell::ordinary(BitString::new(), vec![leaf.clone()]).unwrap());
        let root = Cell::ordinary(BitString::new(), vec![leaf, mid]).unwrap();
        assert_eq!(root.depth(), 2);
    }

    #[test]
    fn limits() {
        assert!(matches!(
            Cell::ordinary(BitString::repeat(false, MAX_BITS + 1), vec![]),
            Err(EncodeError::Overflow {
                resource: Resource::Bits,
                ..
            })
        ));
        let refs = vec![Arc::new(Cell::empty()); MAX_REFS + 1];
        assert!(matches!(
            Cell::ordinary(BitString::new(), refs),
            Err(EncodeError::Overflow {
                resource: Resource::Refs,
                ..
            })
        ));
    }

    #[test]
    fn library_cell() {
        let mut data = bits(&[2], 8);
        data.extend_from_bitslice(BitString::from_slice(&[0x11; 32]).as_bitslice());
        let lib = Cell::new(CellKind::Library, data, vec![]).unwrap();
        assert_eq!(lib.library_hash(), Some([0x11; 32]));
        assert_eq!(lib.level_mask(), 0);
        assert!(Cell::new(CellKind::Library, bits(&[3], 8), vec![]).is_err());
    }

    #[test]
    fn pruned_tree_keeps_level_zero_hash() {
        let leaf = Arc::new(Cell::ordinary(bits(&[0xde, 0xad], 16), vec![]).unwrap());
        let full = Cell::ordinary(bits(&[0x5a], 8), vec![leaf.clone()]).unwrap();

        let mut data = bits(&[1, 1], 16);
        data.extend_from_bitslice(BitString::from_slice(&leaf.hash()).as_bitslice());
        data.extend_from_bitslice(BitString::from_slice(&leaf.depth().to_be_bytes()).as_bitslice());
        let pruned = Arc::new(Cell::new(CellKind::PrunedBranch, data, vec![]).unwrap());
        assert_eq!(pruned.level(), 1);
        assert_eq!(pruned.hash_at(0), leaf.hash());
        assert_ne!(pruned.hash(), leaf.hash());

        let partial = Cell::ordinary(bits(&[0x5a], 8), vec![pruned]).unwrap();
        assert_eq!(partial.level_mask(), 1);
        assert_eq!(partial.d1(), 1 + 32);
        assert_eq!(partial.hash_at(0), full.hash());
        assert_eq!(partial.depth_at(0), full.depth());
        assert_ne!(partial.hash(), full.hash());
        assert_eq!(partial.hash_at(MAX_LEVEL), partial.hash());

        // a Merkle proof over the partial tree is back at level 0
        let mut proof_data = bits(&[3], 8);
        proof_data.extend_from_bitslice(BitString::from_slice(&full.hash()).as_bitslice());
        proof_data
            .extend_from_bitslice(BitString::from_slice(&full.depth().to_be_bytes()).as_bitslice());
        let proof =
            Cell::new(CellKind::MerkleProof, proof_data, vec![Arc::new(partial)]).unwrap();
        assert_eq!(proof.level(), 0);
        assert_eq!(proof.hash_at(0), proof.hash());
    }

    #[test]
    fn pruned_branch_layout_checked() {
        let short = bits(&[1, 1, 0xab], 24);
        assert!(Cell::new(CellKind::PrunedBranch, short, vec![]).is_err());
        let no_levels = bits(&[1, 0], 16);
        assert!(Cell::new(CellKind::PrunedBranch, no_levels, vec![]).is_err());
    }

    #[test]
    fn unaligned_bits_pad_like_fresh_ones() {
        // $101 followed by 0x4d, then the first three bits dropped
        let source = bits(&[0b1010_1001, 0b1010_0000], 11);
        let tail = Cell::ordinary(source[3..].to_bitvec(), vec![]).unwrap();
        let fresh = Cell::ordinary(bits(&[0x4d], 8), vec![]).unwrap();
        assert_eq!(tail.padded_data(), vec![0x4d]);
        assert_eq!(tail.hash(), fresh.hash());

        let odd = Cell::ordinary(source[1..].to_bitvec(), vec![]).unwrap();
        assert_eq!(odd.padded_data(), vec![0b0101_0011, 0b0110_0000]);
    }
}

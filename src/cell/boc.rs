//! Bag-of-cells container
//!
//! A bag-of-cells (BOC) is the flat byte serialization of one or more cell
//! trees. Shared subtrees are stored once. Its layout is
//!
//! ```text
//! magic            u32   b5ee9c72 (generic), 68ff65f3 or acc3a728 (legacy)
//! flags            u8    has_idx:1 has_crc32c:1 has_cache_bits:1 _:2 size:3
//! offset_bytes     u8
//! cells            size bytes
//! roots            size bytes
//! absent           size bytes
//! tot_cells_size   offset_bytes bytes
//! root_list        roots * size bytes        (generic magic only)
//! index            cells * offset_bytes      (if has_idx)
//! cell_data        tot_cells_size bytes
//! crc32c           u32, little-endian        (if has_crc32c)
//! ```
//!
//! Each serialized cell is its two descriptor bytes, its padded data, and
//! `size`-byte indices of its children. Children always sit at higher
//! indices than their parents.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use base64::Engine as _;

use super::{BitString, Cell, CellKind, MAX_REFS};

pub const BOC_GENERIC_MAGIC: u32 = 0xb5ee_9c72;
pub const BOC_INDEXED_MAGIC: u32 = 0x68ff_65f3;
pub const BOC_INDEXED_CRC32C_MAGIC: u32 = 0xacc3_a728;

/// Errors raised while unpacking a bag-of-cells
#[derive(Clone, Debug, PartialEq)]
pub enum BocError {
    UnknownMagic(u32),
    /// Input ended before the section named here was complete
    Truncated(&'static str),
    /// Header field outside the range the format permits
    InvalidHeader(&'static str),
    /// Serialized cell that cannot be reconstructed
    InvalidCell { index: usize, reason: String },
    /// Child index not strictly greater than its parent's index
    BackReference { index: usize, target: usize },
    CrcMismatch { stored: u32, computed: u32 },
    Base64(base64::DecodeError),
    Hex(hex::FromHexError),
}

impl Display for BocError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BocError::UnknownMagic(magic) => write!(f, "unknown BOC magic {magic:#010x}"),
            BocError::Truncated(section) => write!(f, "BOC truncated in {section}"),
            BocError::InvalidHeader(field) => write!(f, "invalid BOC header field: {field}"),
            BocError::InvalidCell { index, reason } => {
                write!(f, "invalid cell #{index} in BOC: {reason}")
            }
            BocError::BackReference { index, target } => write!(
                f,
                "cell #{index} refers to cell #{target}, which does not follow it"
            ),
            BocError::CrcMismatch { stored, computed } => write!(
                f,
                "BOC checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"
            ),
            BocError::Base64(err) => write!(f, "invalid base64: {err}"),
            BocError::Hex(err) => write!(f, "invalid hex: {err}"),
        }
    }
}

impl std::error::Error for BocError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BocError::Base64(err) => Some(err),
            BocError::Hex(err) => Some(err),
            _ => None,
        }
    }
}

impl From<base64::DecodeError> for BocError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64(err)
    }
}

impl From<hex::FromHexError> for BocError {
    fn from(err: hex::FromHexError) -> Self {
        Self::Hex(err)
    }
}

pub type BocResult<T> = Result<T, BocError>;

/// Sequential reader over the raw container bytes
struct ByteCursor<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    fn take(&mut self, n: usize, section: &'static str) -> BocResult<&'a [u8]> {
        let end = self
            .offset
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(BocError::Truncated(section))?;
        let out = &self.buf[self.offset..end];
        self.offset = end;
        Ok(out)
    }

    fn u8(&mut self, section: &'static str) -> BocResult<u8> {
        Ok(self.take(1, section)?[0])
    }

    fn uint(&mut self, width: usize, section: &'static str) -> BocResult<usize> {
        let bytes = self.take(width, section)?;
        Ok(bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize))
    }
}

struct RawCell<'a> {
    d1: u8,
    data: &'a [u8],
    bits: usize,
    refs: Vec<usize>,
}

/// Parses a bag-of-cells, returning its roots in order
pub fn deserialize(bytes: &[u8]) -> BocResult<Vec<Arc<Cell>>> {
    let mut cur = ByteCursor::new(bytes);
    let magic = u32::from_be_bytes(
        cur.take(4, "magic")?
            .try_into()
            .map_err(|_| BocError::Truncated("magic"))?,
    );
    let flags = cur.u8("header")?;
    let (has_idx, has_crc32c) = match magic {
        BOC_GENERIC_MAGIC => (flags & 0x80 != 0, flags & 0x40 != 0),
        BOC_INDEXED_MAGIC => (true, false),
        BOC_INDEXED_CRC32C_MAGIC => (true, true),
        other => return Err(BocError::UnknownMagic(other)),
    };
    let size = (flags & 0x07) as usize;
    if size == 0 || size > 4 {
        return Err(BocError::InvalidHeader("reference size"));
    }
    let offset_bytes = cur.u8("header")? as usize;
    if offset_bytes == 0 || offset_bytes > 8 {
        return Err(BocError::InvalidHeader("offset size"));
    }
    let cell_count = cur.uint(size, "header")?;
    let root_count = cur.uint(size, "header")?;
    let absent = cur.uint(size, "header")?;
    let data_size = cur.uint(offset_bytes, "header")?;
    if root_count == 0 || root_count > cell_count {
        return Err(BocError::InvalidHeader("root count"));
    }
    if absent > 0 {
        return Err(BocError::InvalidHeader("absent cells"));
    }
    // every cell takes at least its two descriptor bytes
    if cell_count > data_size / 2 {
        return Err(BocError::InvalidHeader("cell count"));
    }

    let roots: Vec<usize> = if magic == BOC_GENERIC_MAGIC {
        (0..root_count)
            .map(|_| cur.uint(size, "root list"))
            .collect::<BocResult<_>>()?
    } else {
        if root_count != 1 {
            return Err(BocError::InvalidHeader("root count"));
        }
        vec![0]
    };
    if roots.iter().any(|&r| r >= cell_count) {
        return Err(BocError::InvalidHeader("root index"));
    }
    if has_idx {
        let index_size = cell_count
            .checked_mul(offset_bytes)
            .ok_or(BocError::InvalidHeader("cell count"))?;
        cur.take(index_size, "index")?;
    }

    let data_start = cur.offset;
    let cell_data = cur.take(data_size, "cell data")?;

    if has_crc32c {
        let stored = u32::from_le_bytes(
            cur.take(4, "checksum")?
                .try_into()
                .map_err(|_| BocError::Truncated("checksum"))?,
        );
        let computed = crc32c::crc32c(&bytes[..data_start + data_size]);
        if stored != computed {
            return Err(BocError::CrcMismatch { stored, computed });
        }
    }

    let mut raw = Vec::with_capacity(cell_count);
    let mut data_cur = ByteCursor::new(cell_data);
    for index in 0..cell_count {
        raw.push(read_raw_cell(&mut data_cur, index, size, cell_count)?);
    }

    let mut built: Vec<Option<Arc<Cell>>> = vec![None; cell_count];
    for index in (0..cell_count).rev() {
        let cell = build_cell(&raw[index], index, &built)?;
        built[index] = Some(Arc::new(cell));
    }

    roots
        .into_iter()
        .map(|r| {
            built[r].clone().ok_or(BocError::InvalidCell {
                index: r,
                reason: "root was never built".into(),
            })
        })
        .collect()
}

fn read_raw_cell<'a>(
    cur: &mut ByteCursor<'a>,
    index: usize,
    size: usize,
    cell_count: usize,
) -> BocResult<RawCell<'a>> {
    let d1 = cur.u8("cell descriptor")?;
    let d2 = cur.u8("cell descriptor")?;
    let ref_count = (d1 & 0x07) as usize;
    if ref_count > MAX_REFS {
        return Err(BocError::InvalidCell {
            index,
            reason: format!("{ref_count} references"),
        });
    }
    if d1 & 0x10 != 0 {
        // stored hashes and depths, one pair per significant level
        let levels = ((d1 >> 5).count_ones() + 1) as usize;
        cur.take(levels * (32 + 2), "cell hashes")?;
    }
    let byte_len = (d2 as usize + 1) / 2;
    let data = cur.take(byte_len, "cell data")?;
    let bits = if d2 % 2 == 1 {
        let last = data.last().copied().unwrap_or(0);
        if last == 0 {
            return Err(BocError::InvalidCell {
                index,
                reason: "missing completion bit".into(),
            });
        }
        byte_len * 8 - last.trailing_zeros() as usize - 1
    } else {
        byte_len * 8
    };
    let mut refs = Vec::with_capacity(ref_count);
    for _ in 0..ref_count {
        let target = cur.uint(size, "cell references")?;
        if target <= index || target >= cell_count {
            return Err(BocError::BackReference { index, target });
        }
        refs.push(target);
    }
    Ok(RawCell {
        d1,
        data,
        bits,
        refs,
    })
}

fn build_cell(raw: &RawCell<'_>, index: usize, built: &[Option<Arc<Cell>>]) -> BocResult<Cell> {
    let mut data = BitString::from_slice(raw.data);
    data.truncate(raw.bits);
    let kind = if raw.d1 & 0x08 != 0 {
        raw.data
            .first()
            .and_then(|&tag| CellKind::from_exotic_tag(tag))
            .ok_or(BocError::InvalidCell {
                index,
                reason: "unknown exotic cell type".into(),
            })?
    } else {
        CellKind::Ordinary
    };
    let refs = raw
        .refs
        .iter()
        .map(|&r| {
            built[r].clone().ok_or(BocError::BackReference {
                index,
                target: r,
            })
        })
        .collect::<BocResult<Vec<_>>>()?;
    Cell::new(kind, data, refs).map_err(|err| BocError::InvalidCell {
        index,
        reason: err.to_string(),
    })
}

/// Parses a bag-of-cells holding exactly one root
pub fn deserialize_root(bytes: &[u8]) -> BocResult<Arc<Cell>> {
    let mut roots = deserialize(bytes)?;
    if roots.len() != 1 {
        return Err(BocError::InvalidHeader("root count"));
    }
    roots.pop().ok_or(BocError::InvalidHeader("root count"))
}

pub fn deserialize_base64(text: &str) -> BocResult<Arc<Cell>> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(text.trim())?;
    deserialize_root(&bytes)
}

pub fn deserialize_hex(text: &str) -> BocResult<Arc<Cell>> {
    let bytes = hex::decode(text.trim())?;
    deserialize_root(&bytes)
}

/// Layout choices for [`serialize`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BocOptions {
    pub has_idx: bool,
    pub has_crc32c: bool,
}

impl BocOptions {
    /// Layout most commonly found in the wild: no index, with checksum
    #[must_use]
    pub fn with_crc() -> Self {
        Self {
            has_idx: false,
            has_crc32c: true,
        }
    }
}

/// Subtree weight above which a child is laid out apart from its parent
const MAX_CELL_WEIGHT: u32 = 64;

/// Cells of the trees in the order TON nodes emit them
///
/// Every cell is weighted by the size of its subtree, capped per parent at
/// [`MAX_CELL_WEIGHT`]. Cells whose subtree outweighs that cap are marked
/// special: the light parts of the tree are laid out first and the special
/// subtrees after them, so a serialized bag is byte-identical to the one a
/// node would produce for the same roots.
struct Ordering<'a> {
    cells: Vec<&'a Cell>,
    refs: Vec<Vec<usize>>,
    roots: Vec<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    Fresh,
    Previsited,
    Visited,
    Placed,
}

struct Node<'a> {
    cell: &'a Cell,
    refs: Vec<usize>,
    /// Zero marks a special cell
    weight: u32,
    slot: Slot,
}

#[derive(Default)]
struct Layout<'a> {
    nodes: Vec<Node<'a>>,
    by_hash: HashMap<[u8; 32], usize>,
    placed: Vec<usize>,
}

impl<'a> Layout<'a> {
    /// Children first, so every parent has a higher id than its children
    fn import(&mut self, cell: &'a Cell) -> usize {
        let hash = cell.hash();
        if let Some(&id) = self.by_hash.get(&hash) {
            return id;
        }
        let refs: Vec<usize> = cell.refs().iter().map(|child| self.import(child)).collect();
        let weight = refs
            .iter()
            .map(|&r| self.nodes[r].weight)
            .sum::<u32>()
            .saturating_add(1)
            .min(255);
        let id = self.nodes.len();
        self.nodes.push(Node {
            cell,
            refs,
            weight,
            slot: Slot::Fresh,
        });
        self.by_hash.insert(hash, id);
        id
    }

    fn limit_weights(&mut self) {
        for id in (0..self.nodes.len()).rev() {
            let refs = self.nodes[id].refs.clone();
            let count = refs.len() as u32;
            let mut budget = MAX_CELL_WEIGHT - 1;
            let mut heavy = Vec::new();
            for (j, &r) in refs.iter().enumerate() {
                let weight = self.nodes[r].weight;
                if weight <= (MAX_CELL_WEIGHT - 1 + j as u32) / count {
                    budget = budget.saturating_sub(weight);
                } else {
                    heavy.push(r);
                }
            }
            let heavy_count = heavy.len() as u32;
            for r in heavy {
                let limit = budget / heavy_count;
                budget += 1;
                let child = &mut self.nodes[r];
                child.weight = child.weight.min(limit);
            }
        }
        for id in 0..self.nodes.len() {
            let sum = 1 + self.nodes[id]
                .refs
                .iter()
                .map(|&r| self.nodes[r].weight)
                .sum::<u32>();
            let node = &mut self.nodes[id];
            node.weight = if sum <= node.weight { sum } else { 0 };
        }
    }

    fn previsit(&mut self, id: usize) {
        if self.nodes[id].slot != Slot::Fresh {
            return;
        }
        for j in (0..self.nodes[id].refs.len()).rev() {
            let child = self.nodes[id].refs[j];
            if self.nodes[child].weight == 0 {
                self.visit(child);
            } else {
                self.previsit(child);
            }
        }
        self.nodes[id].slot = Slot::Previsited;
    }

    fn visit(&mut self, id: usize) {
        if matches!(self.nodes[id].slot, Slot::Visited | Slot::Placed) {
            return;
        }
        if self.nodes[id].weight == 0 {
            self.previsit(id);
        }
        let refs = self.nodes[id].refs.clone();
        for &child in refs.iter().rev() {
            self.visit(child);
        }
        for &child in refs.iter().rev() {
            self.place(child);
        }
        self.nodes[id].slot = Slot::Visited;
    }

    fn place(&mut self, id: usize) {
        if self.nodes[id].slot != Slot::Placed {
            self.nodes[id].slot = Slot::Placed;
            self.placed.push(id);
        }
    }
}

impl<'a> Ordering<'a> {
    fn of(roots: &[&'a Cell]) -> Self {
        let mut layout = Layout::default();
        let root_ids: Vec<usize> = roots.iter().map(|&root| layout.import(root)).collect();
        layout.limit_weights();
        for &id in &root_ids {
            layout.previsit(id);
            layout.visit(id);
        }
        for &id in &root_ids {
            layout.place(id);
        }

        // placement runs leaves first; the bag lists cells the other way round
        let total = layout.placed.len();
        let mut position = vec![0; layout.nodes.len()];
        for (placed, &id) in layout.placed.iter().enumerate() {
            position[id] = total - 1 - placed;
        }
        let mut cells = Vec::with_capacity(total);
        let mut refs = Vec::with_capacity(total);
        for &id in layout.placed.iter().rev() {
            let node = &layout.nodes[id];
            cells.push(node.cell);
            refs.push(node.refs.iter().map(|&r| position[r]).collect());
        }
        let roots = root_ids.iter().map(|&id| position[id]).collect();
        Self { cells, refs, roots }
    }
}

fn width_of(n: usize) -> usize {
    let mut width = 1;
    while width < 8 && n >> (8 * width) != 0 {
        width += 1;
    }
    width
}

fn push_uint(out: &mut Vec<u8>, value: usize, width: usize) {
    for i in (0..width).rev() {
        out.push((value >> (8 * i)) as u8);
    }
}

/// Serializes the trees rooted at `roots` into a single bag-of-cells
#[must_use]
pub fn serialize_roots(roots: &[&Cell], opts: BocOptions) -> Vec<u8> {
    let order = Ordering::of(roots);
    let size = width_of(order.cells.len());

    let mut cell_data = Vec::new();
    let mut ends = Vec::with_capacity(order.cells.len());
    for (cell, refs) in order.cells.iter().zip(&order.refs) {
        cell_data.push(cell.d1());
        cell_data.push(cell.d2());
        cell_data.extend(cell.padded_data());
        for &target in refs {
            push_uint(&mut cell_data, target, size);
        }
        ends.push(cell_data.len());
    }
    let offset_bytes = width_of(cell_data.len());

    let mut out = Vec::with_capacity(cell_data.len() + 32);
    out.extend(BOC_GENERIC_MAGIC.to_be_bytes());
    out.push(
        (u8::from(opts.has_idx) << 7) | (u8::from(opts.has_crc32c) << 6) | size as u8,
    );
    out.push(offset_bytes as u8);
    push_uint(&mut out, order.cells.len(), size);
    push_uint(&mut out, roots.len(), size);
    push_uint(&mut out, 0, size);
    push_uint(&mut out, cell_data.len(), offset_bytes);
    for &target in &order.roots {
        push_uint(&mut out, target, size);
    }
    if opts.has_idx {
        for end in ends {
            push_uint(&mut out, end, offset_bytes);
        }
    }
    out.extend(cell_data);
    if opts.has_crc32c {
        let crc = crc32c::crc32c(&out);
        out.extend(crc.to_le_bytes());
    }
    out
}

#[must_use]
pub fn serialize(root: &Cell, opts: BocOptions) -> Vec<u8> {
    serialize_roots(&[root], opts)
}

#[must_use]
pub fn serialize_base64(root: &Cell, opts: BocOptions) -> String {
    base64::engine::general_purpose::STANDARD.encode(serialize(root, opts))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::builder::CellBuilder;

    fn tree() -> Cell {
        let mut leaf = CellBuilder::new();
        leaf.store_uint(0b101, 3).unwrap();
        let leaf = Arc::new(leaf.build().unwrap());
        let mut mid = CellBuilder::new();
        mid.store_bytes(b"mid").unwrap();
        mid.store_ref(leaf.clone()).unwrap();
        let mid = mid.build().unwrap();
        let mut root = CellBuilder::new();
        root.store_uint(0xcafe, 16).unwrap();
        root.store_ref(mid).unwrap();
        root.store_ref(leaf).unwrap();
        root.build().unwrap()
    }

    #[test]
    fn round_trip_all_layouts() {
        let root = tree();
        for (has_idx, has_crc32c) in [(false, false), (true, false), (false, true), (true, true)] {
            let opts = BocOptions {
                has_idx,
                has_crc32c,
            };
            let bytes = serialize(&root, opts);
            let back = deserialize_root(&bytes).unwrap();
            assert_eq!(back.hash(), root.hash());
            assert_eq!(serialize(&back, opts), bytes);
        }
    }

    #[test]
    fn shared_subtree_stored_once() {
        let bytes = serialize(&tree(), BocOptions::default());
        // header: magic, flags, offset size, then the cell count
        assert_eq!(bytes[6], 3);
    }

    #[test]
    fn corrupted_checksum() {
        let mut bytes = serialize(&tree(), BocOptions::with_crc());
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(
            deserialize_root(&bytes),
            Err(BocError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn rejects_unknown_magic_and_truncation() {
        assert_eq!(
            deserialize(&[0xde, 0xad, 0xbe, 0xef, 0x01]),
            Err(BocError::UnknownMagic(0xdeadbeef))
        );
        let bytes = serialize(&tree(), BocOptions::default());
        assert!(matches!(
            deserialize(&bytes[..bytes.len() - 2]),
            Err(BocError::Truncated(_))
        ));
    }

    #[test]
    fn library_cell_fixture() {
        let text = "te6ccgEBAQEAIwAIQgJYfMeJ7/HIT0bsN5fkX8gJoU/1riTx4MemqZzJ3JBh/w==";
        let lib = deserialize_base64(text).unwrap();
        assert_eq!(serialize_base64(&lib, BocOptions::default()), text);
        assert_eq!(lib.kind(), CellKind::Library);
        assert_eq!(
            hex::encode_upper(lib.library_hash().unwrap()),
            "587CC789EFF1C84F46EC3797E45FC809A14FF5AE24F1E0C7A6A99CC9DC9061FF"
        );
    }

    #[test]
    fn cell_count_bounded_by_data_size() {
        // four-byte counts claiming 2^32 - 1 cells in an empty data section
        let bytes = [
            0xb5, 0xee, 0x9c, 0x72, 0x04, 0x01, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x01,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        assert_eq!(deserialize(&bytes), Err(BocError::InvalidHeader("cell count")));
    }

    #[test]
    fn heavy_subtree_laid_out_after_light_one() {
        let mut chain = CellBuilder::new().build().unwrap();
        for i in 0..70u64 {
            let mut link = CellBuilder::new();
            link.store_uint(i, 8).unwrap();
            link.store_ref(chain).unwrap();
            chain = link.build().unwrap();
        }
        let chain = Arc::new(chain);
        let mut leaf = CellBuilder::new();
        leaf.store_uint(0xff, 8).unwrap();
        let leaf = leaf.build().unwrap();
        let mut small = CellBuilder::new();
        small.store_ref(leaf.clone()).unwrap();
        let small = small.build().unwrap();
        let mut root = CellBuilder::new();
        root.store_ref(small.clone()).unwrap();
        root.store_ref(chain.clone()).unwrap();
        let root = root.build().unwrap();

        // the light branch is finished before the chain continues
        let order = Ordering::of(&[&root]);
        assert_eq!(order.cells.len(), 74);
        let hashes: Vec<_> = order.cells[..4].iter().map(|c| c.hash()).collect();
        assert_eq!(hashes, [root.hash(), small.hash(), chain.hash(), leaf.hash()]);
        assert_eq!(order.refs[0], vec![1, 2]);
        assert_eq!(order.refs[2], vec![4]);
        assert!(order.refs.iter().last().is_some_and(Vec::is_empty));

        let back = deserialize_root(&serialize(&root, BocOptions::default())).unwrap();
        assert_eq!(back.hash(), root.hash());
    }
}

//! # Interior Nodes
//!
//! A node carries the compressed key segment below its parent (the prefix),
//! an optional terminal leaf for the key that ends exactly at this node, and
//! a sorted array of (branch byte, child link) slots. The slot array lives in
//! its own allocation so it can be regrown without moving the node, which
//! keeps every inbound link to the node stable across child insertions.
//!
//! ## Node Layout
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  ------------------------------------
//! 0       1     kind (= KIND_NODE)
//! 1       1     padding
//! 2       2     child_count
//! 4       4     prefix_len
//! 8       8     prefix_ptr (null when prefix is inline)
//! 16      16    prefix_inline
//! 32      8     terminal (leaf link, null if none)
//! 40      8     slots (link to the slot block)
//! 48      4     slot_cap
//! 52      4     reserved
//! ```
//!
//! Each slot is 16 bytes: the branch byte, padding, then the child link at
//! offset 8. Child links are self-relative to their own field, so moving an
//! entry to a different slot index re-encodes its displacement; the slot
//! helpers below always go through absolute positions for that reason.

use eyre::{ensure, Result};
use smallvec::SmallVec;
use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::relptr::RelPtr;
use super::{block_kind, KIND_NODE};
use crate::tx::TxScope;

pub const NODE_HEADER_SIZE: usize = 56;
pub const NODE_INLINE_PREFIX: usize = 16;
pub const SLOT_SIZE: usize = 16;

/// Slot capacity of a freshly created node.
pub const INITIAL_SLOT_CAP: u32 = 4;

/// One slot per possible branch byte.
pub const MAX_CHILDREN: usize = 256;

const PREFIX_PTR_OFFSET: u64 = core::mem::offset_of!(NodeHeader, prefix_ptr) as u64;
const TERMINAL_OFFSET: u64 = core::mem::offset_of!(NodeHeader, terminal) as u64;
const SLOTS_OFFSET: u64 = core::mem::offset_of!(NodeHeader, slots) as u64;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct NodeHeader {
    kind: u8,
    _pad: u8,
    child_count: U16,
    prefix_len: U32,
    prefix_ptr: RelPtr,
    prefix_inline: [u8; NODE_INLINE_PREFIX],
    terminal: RelPtr,
    slots: RelPtr,
    slot_cap: U32,
    _reserved: [u8; 4],
}

const _: () = assert!(std::mem::size_of::<NodeHeader>() == NODE_HEADER_SIZE);

fn header_ref(bytes: &[u8], pos: u64) -> Result<&NodeHeader> {
    ensure!(
        block_kind(bytes, pos)? == KIND_NODE,
        "expected node block at position {}",
        pos
    );
    let start = pos as usize;
    ensure!(
        start + NODE_HEADER_SIZE <= bytes.len(),
        "node header at {} beyond region end {}",
        start,
        bytes.len()
    );
    NodeHeader::ref_from_bytes(&bytes[start..start + NODE_HEADER_SIZE])
        .map_err(|e| eyre::eyre!("failed to read node header at {}: {:?}", pos, e))
}

fn header_mut(bytes: &mut [u8], pos: u64) -> Result<&mut NodeHeader> {
    ensure!(
        block_kind(bytes, pos)? == KIND_NODE,
        "expected node block at position {}",
        pos
    );
    let start = pos as usize;
    ensure!(
        start + NODE_HEADER_SIZE <= bytes.len(),
        "node header at {} beyond region end {}",
        start,
        bytes.len()
    );
    NodeHeader::mut_from_bytes(&mut bytes[start..start + NODE_HEADER_SIZE])
        .map_err(|e| eyre::eyre!("failed to read node header at {}: {:?}", pos, e))
}

/// Read view of a node block.
pub struct NodeRef<'a> {
    header: &'a NodeHeader,
    bytes: &'a [u8],
    pos: u64,
}

impl<'a> NodeRef<'a> {
    pub fn read(bytes: &'a [u8], pos: u64) -> Result<Self> {
        let header = header_ref(bytes, pos)?;
        Ok(Self { header, bytes, pos })
    }

    pub fn prefix(&self) -> Result<&'a [u8]> {
        let len = self.header.prefix_len.get() as usize;
        if len <= NODE_INLINE_PREFIX {
            return Ok(&self.header.prefix_inline[..len]);
        }

        let blob = self
            .header
            .prefix_ptr
            .resolve(self.pos + PREFIX_PTR_OFFSET)
            .ok_or_else(|| {
                eyre::eyre!("node at {} has external prefix but null prefix link", self.pos)
            })?;
        let start = blob as usize;
        ensure!(
            start + len <= self.bytes.len(),
            "node prefix blob {}..{} beyond region end {}",
            start,
            start + len,
            self.bytes.len()
        );
        Ok(&self.bytes[start..start + len])
    }

    pub fn prefix_blob(&self) -> Option<u64> {
        if self.header.prefix_len.get() as usize <= NODE_INLINE_PREFIX {
            None
        } else {
            self.header.prefix_ptr.resolve(self.pos + PREFIX_PTR_OFFSET)
        }
    }

    /// Leaf whose key ends exactly at this node's prefix boundary.
    pub fn terminal(&self) -> Option<u64> {
        self.header.terminal.resolve(self.pos + TERMINAL_OFFSET)
    }

    pub fn child_count(&self) -> usize {
        self.header.child_count.get() as usize
    }

    pub fn slot_cap(&self) -> u32 {
        self.header.slot_cap.get()
    }

    pub fn slots_pos(&self) -> Result<u64> {
        self.header
            .slots
            .resolve(self.pos + SLOTS_OFFSET)
            .ok_or_else(|| eyre::eyre!("node at {} has null slot block link", self.pos))
    }

    pub fn slot_byte(&self, idx: usize) -> Result<u8> {
        ensure!(
            idx < self.child_count(),
            "slot index {} out of range for node at {} with {} children",
            idx,
            self.pos,
            self.child_count()
        );
        let entry = self.slots_pos()? as usize + idx * SLOT_SIZE;
        Ok(self.bytes[entry])
    }

    pub fn slot_child(&self, idx: usize) -> Result<u64> {
        ensure!(
            idx < self.child_count(),
            "slot index {} out of range for node at {} with {} children",
            idx,
            self.pos,
            self.child_count()
        );
        let field = self.slots_pos()? + (idx * SLOT_SIZE) as u64 + 8;
        super::relptr::read_at(self.bytes, field)?
            .ok_or_else(|| eyre::eyre!("null child link in slot {} of node at {}", idx, self.pos))
    }

    /// Binary search over the sorted slot array. `Ok(idx)` for a present
    /// branch byte, `Err(idx)` for its insertion point.
    pub fn search(&self, byte: u8) -> Result<std::result::Result<usize, usize>> {
        let slots = self.slots_pos()? as usize;
        let count = self.child_count();

        let mut lo = 0usize;
        let mut hi = count;
        while lo < hi {
            let mid = (lo + hi) / 2;
            let b = self.bytes[slots + mid * SLOT_SIZE];
            match b.cmp(&byte) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Ok(Ok(mid)),
            }
        }
        Ok(Err(lo))
    }
}

fn read_entries(bytes: &[u8], slots_pos: u64, count: usize) -> Result<SmallVec<[(u8, u64); 16]>> {
    let mut entries = SmallVec::with_capacity(count);
    for idx in 0..count {
        let entry = slots_pos + (idx * SLOT_SIZE) as u64;
        let byte = bytes[entry as usize];
        let child = super::relptr::read_at(bytes, entry + 8)?
            .ok_or_else(|| eyre::eyre!("null child link in slot block at {}", slots_pos))?;
        entries.push((byte, child));
    }
    Ok(entries)
}

fn write_entries(bytes: &mut [u8], slots_pos: u64, entries: &[(u8, u64)]) -> Result<()> {
    for (idx, &(byte, child)) in entries.iter().enumerate() {
        let entry = slots_pos + (idx * SLOT_SIZE) as u64;
        let start = entry as usize;
        bytes[start] = byte;
        bytes[start + 1..start + 8].fill(0);
        super::relptr::write_at(bytes, entry + 8, Some(child))?;
    }
    Ok(())
}

/// Allocates and initializes a node with the given prefix and terminal leaf
/// and an empty slot array.
pub fn create_node<S: TxScope>(scope: &mut S, prefix: &[u8], terminal: Option<u64>) -> Result<u64> {
    ensure!(
        prefix.len() <= u32::MAX as usize,
        "prefix of {} bytes exceeds the maximum prefix length",
        prefix.len()
    );

    let node = scope.allocate(NODE_HEADER_SIZE)?;
    let slots = scope.allocate(INITIAL_SLOT_CAP as usize * SLOT_SIZE)?;
    let blob = if prefix.len() > NODE_INLINE_PREFIX {
        Some(scope.allocate(prefix.len())?)
    } else {
        None
    };

    let bytes = scope.bytes_mut();

    let mut header = NodeHeader {
        kind: KIND_NODE,
        _pad: 0,
        child_count: U16::new(0),
        prefix_len: U32::new(prefix.len() as u32),
        prefix_ptr: RelPtr::NULL,
        prefix_inline: [0; NODE_INLINE_PREFIX],
        terminal: match terminal {
            Some(t) => RelPtr::encode(node + TERMINAL_OFFSET, t),
            None => RelPtr::NULL,
        },
        slots: RelPtr::encode(node + SLOTS_OFFSET, slots),
        slot_cap: U32::new(INITIAL_SLOT_CAP),
        _reserved: [0; 4],
    };

    match blob {
        Some(b) => {
            bytes[b as usize..b as usize + prefix.len()].copy_from_slice(prefix);
            header.prefix_ptr = RelPtr::encode(node + PREFIX_PTR_OFFSET, b);
        }
        None => {
            header.prefix_inline[..prefix.len()].copy_from_slice(prefix);
        }
    }

    let start = node as usize;
    bytes[start..start + NODE_HEADER_SIZE].copy_from_slice(header.as_bytes());

    Ok(node)
}

/// Points the node's terminal link at `leaf` (or clears it).
pub fn set_terminal<S: TxScope>(scope: &mut S, node_pos: u64, leaf: Option<u64>) -> Result<()> {
    NodeRef::read(scope.bytes(), node_pos)?;
    scope.snapshot(node_pos, NODE_HEADER_SIZE)?;
    super::relptr::write_at(scope.bytes_mut(), node_pos + TERMINAL_OFFSET, leaf)
}

/// Replaces the node's prefix, reallocating the external blob as needed.
pub fn set_prefix<S: TxScope>(scope: &mut S, node_pos: u64, prefix: &[u8]) -> Result<()> {
    ensure!(
        prefix.len() <= u32::MAX as usize,
        "prefix of {} bytes exceeds the maximum prefix length",
        prefix.len()
    );

    let old_blob = NodeRef::read(scope.bytes(), node_pos)?.prefix_blob();
    scope.snapshot(node_pos, NODE_HEADER_SIZE)?;

    let new_blob = if prefix.len() > NODE_INLINE_PREFIX {
        Some(scope.allocate(prefix.len())?)
    } else {
        None
    };

    {
        let bytes = scope.bytes_mut();
        if let Some(b) = new_blob {
            bytes[b as usize..b as usize + prefix.len()].copy_from_slice(prefix);
        }
        let header = header_mut(bytes, node_pos)?;
        header.prefix_len = U32::new(prefix.len() as u32);
        match new_blob {
            Some(b) => header.prefix_ptr = RelPtr::encode(node_pos + PREFIX_PTR_OFFSET, b),
            None => {
                header.prefix_ptr = RelPtr::NULL;
                header.prefix_inline = [0; NODE_INLINE_PREFIX];
                header.prefix_inline[..prefix.len()].copy_from_slice(prefix);
            }
        }
    }

    if let Some(b) = old_blob {
        scope.free(b)?;
    }
    Ok(())
}

/// Inserts a child slot for `byte`, keeping the array sorted and growing the
/// slot block when it is full.
pub fn insert_child<S: TxScope>(scope: &mut S, node_pos: u64, byte: u8, child: u64) -> Result<()> {
    let (slots, count, cap, idx) = {
        let node = NodeRef::read(scope.bytes(), node_pos)?;
        let idx = match node.search(byte)? {
            Ok(_) => eyre::bail!(
                "branch byte {} already present in node at {}",
                byte,
                node_pos
            ),
            Err(idx) => idx,
        };
        (node.slots_pos()?, node.child_count(), node.slot_cap(), idx)
    };
    ensure!(
        count < MAX_CHILDREN,
        "node at {} already holds the maximum number of children",
        node_pos
    );

    let mut entries = read_entries(scope.bytes(), slots, count)?;
    entries.insert(idx, (byte, child));

    scope.snapshot(node_pos, NODE_HEADER_SIZE)?;

    if count < cap as usize {
        // The array stays put; rewrite the tail that shifts plus the new slot.
        scope.snapshot(slots + (idx * SLOT_SIZE) as u64, (count + 1 - idx) * SLOT_SIZE)?;
        let bytes = scope.bytes_mut();
        write_entries(
            bytes,
            slots + (idx * SLOT_SIZE) as u64,
            &entries[idx..],
        )?;
        let header = header_mut(bytes, node_pos)?;
        header.child_count = U16::new((count + 1) as u16);
    } else {
        let new_cap = (cap as usize * 2).min(MAX_CHILDREN) as u32;
        let new_slots = scope.allocate(new_cap as usize * SLOT_SIZE)?;
        let bytes = scope.bytes_mut();
        write_entries(bytes, new_slots, &entries)?;
        let header = header_mut(bytes, node_pos)?;
        header.child_count = U16::new((count + 1) as u16);
        header.slots = RelPtr::encode(node_pos + SLOTS_OFFSET, new_slots);
        header.slot_cap = U32::new(new_cap);
        scope.free(slots)?;
    }
    Ok(())
}

/// Re-targets the child link of slot `idx` without disturbing its neighbors.
pub fn set_child_at<S: TxScope>(scope: &mut S, node_pos: u64, idx: usize, child: u64) -> Result<()> {
    let slots = {
        let node = NodeRef::read(scope.bytes(), node_pos)?;
        ensure!(
            idx < node.child_count(),
            "slot index {} out of range for node at {}",
            idx,
            node_pos
        );
        node.slots_pos()?
    };

    let field = slots + (idx * SLOT_SIZE) as u64 + 8;
    scope.snapshot(field, super::relptr::RELPTR_SIZE)?;
    super::relptr::write_at(scope.bytes_mut(), field, Some(child))
}

/// Removes slot `idx`, shifting the tail left.
pub fn remove_child_at<S: TxScope>(scope: &mut S, node_pos: u64, idx: usize) -> Result<()> {
    let (slots, count) = {
        let node = NodeRef::read(scope.bytes(), node_pos)?;
        ensure!(
            idx < node.child_count(),
            "slot index {} out of range for node at {}",
            idx,
            node_pos
        );
        (node.slots_pos()?, node.child_count())
    };

    let mut entries = read_entries(scope.bytes(), slots, count)?;
    entries.remove(idx);

    scope.snapshot(node_pos, NODE_HEADER_SIZE)?;
    scope.snapshot(slots + (idx * SLOT_SIZE) as u64, (count - idx) * SLOT_SIZE)?;

    let bytes = scope.bytes_mut();
    write_entries(bytes, slots + (idx * SLOT_SIZE) as u64, &entries[idx..])?;
    let header = header_mut(bytes, node_pos)?;
    header.child_count = U16::new((count - 1) as u16);
    Ok(())
}

/// Schedules the node, its slot block, and its prefix blob for release at
/// commit. Children are not touched.
pub fn free_node<S: TxScope>(scope: &mut S, node_pos: u64) -> Result<()> {
    let (slots, blob) = {
        let node = NodeRef::read(scope.bytes(), node_pos)?;
        (node.slots_pos()?, node.prefix_blob())
    };
    if let Some(b) = blob {
        scope.free(b)?;
    }
    scope.free(slots)?;
    scope.free(node_pos)
}

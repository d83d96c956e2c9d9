//! # Leaf Blocks
//!
//! A leaf owns one key and one value. The value bytes sit directly after the
//! fixed 32-byte header; the key is inlined into the header when it fits
//! [`LEAF_INLINE_KEY`] bytes, otherwise it lives in a separately allocated
//! blob reached through a self-relative link. Short keys therefore cost a
//! single allocation.
//!
//! ## Layout
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  ---------------------------------
//! 0       1     kind (= KIND_LEAF)
//! 1       3     padding
//! 4       4     key_len
//! 8       8     key_ptr (null when key is inline)
//! 16      16    key_inline
//! 32      -     value bytes (size_of::<V>())
//! ```
//!
//! A leaf's key is immutable once written; only the value bytes are ever
//! rewritten in place.

use eyre::{ensure, Result};
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::relptr::RelPtr;
use super::{block_kind, Value, KIND_LEAF};
use crate::tx::TxScope;

pub const LEAF_HEADER_SIZE: usize = 32;
pub const LEAF_INLINE_KEY: usize = 16;

const KEY_PTR_OFFSET: u64 = core::mem::offset_of!(LeafHeader, key_ptr) as u64;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct LeafHeader {
    kind: u8,
    _pad: [u8; 3],
    key_len: U32,
    key_ptr: RelPtr,
    key_inline: [u8; LEAF_INLINE_KEY],
}

const _: () = assert!(std::mem::size_of::<LeafHeader>() == LEAF_HEADER_SIZE);

/// Read view of a leaf block.
pub struct LeafRef<'a> {
    header: &'a LeafHeader,
    bytes: &'a [u8],
    pos: u64,
}

impl<'a> LeafRef<'a> {
    pub fn read(bytes: &'a [u8], pos: u64) -> Result<Self> {
        ensure!(
            block_kind(bytes, pos)? == KIND_LEAF,
            "expected leaf block at position {}",
            pos
        );
        let start = pos as usize;
        ensure!(
            start + LEAF_HEADER_SIZE <= bytes.len(),
            "leaf header at {} beyond region end {}",
            start,
            bytes.len()
        );
        let header = LeafHeader::ref_from_bytes(&bytes[start..start + LEAF_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read leaf header at {}: {:?}", pos, e))?;
        Ok(Self { header, bytes, pos })
    }

    pub fn key(&self) -> Result<&'a [u8]> {
        let len = self.header.key_len.get() as usize;
        if len <= LEAF_INLINE_KEY {
            return Ok(&self.header.key_inline[..len]);
        }

        let blob = self
            .header
            .key_ptr
            .resolve(self.pos + KEY_PTR_OFFSET)
            .ok_or_else(|| eyre::eyre!("leaf at {} has external key but null key link", self.pos))?;
        let start = blob as usize;
        ensure!(
            start + len <= self.bytes.len(),
            "leaf key blob {}..{} beyond region end {}",
            start,
            start + len,
            self.bytes.len()
        );
        Ok(&self.bytes[start..start + len])
    }

    /// Position of the external key blob, if the key is not inline.
    pub fn key_blob(&self) -> Option<u64> {
        if self.header.key_len.get() as usize <= LEAF_INLINE_KEY {
            None
        } else {
            self.header.key_ptr.resolve(self.pos + KEY_PTR_OFFSET)
        }
    }
}

/// Region position of a leaf's value bytes.
pub fn value_pos(leaf_pos: u64) -> u64 {
    leaf_pos + LEAF_HEADER_SIZE as u64
}

pub fn read_value<V: Value>(bytes: &[u8], leaf_pos: u64) -> Result<V> {
    let start = value_pos(leaf_pos) as usize;
    let size = std::mem::size_of::<V>();
    ensure!(
        start + size <= bytes.len(),
        "leaf value at {} beyond region end {}",
        start,
        bytes.len()
    );
    V::read_from_bytes(&bytes[start..start + size])
        .map_err(|e| eyre::eyre!("failed to read value of leaf at {}: {:?}", leaf_pos, e))
}

/// Overwrites a leaf's value bytes. The caller snapshots the range first.
pub fn write_value<V: Value>(bytes: &mut [u8], leaf_pos: u64, value: &V) -> Result<()> {
    let start = value_pos(leaf_pos) as usize;
    let size = std::mem::size_of::<V>();
    ensure!(
        start + size <= bytes.len(),
        "leaf value at {} beyond region end {}",
        start,
        bytes.len()
    );
    bytes[start..start + size].copy_from_slice(value.as_bytes());
    Ok(())
}

/// Allocates and initializes a leaf for `(key, value)`.
///
/// Fresh blocks only; nothing pre-existing is written, so no snapshots are
/// taken here.
pub fn create_leaf<S: TxScope, V: Value>(scope: &mut S, key: &[u8], value: &V) -> Result<u64> {
    ensure!(
        key.len() <= u32::MAX as usize,
        "key of {} bytes exceeds the maximum key length",
        key.len()
    );

    let leaf = scope.allocate(LEAF_HEADER_SIZE + std::mem::size_of::<V>())?;
    let blob = if key.len() > LEAF_INLINE_KEY {
        Some(scope.allocate(key.len())?)
    } else {
        None
    };

    let bytes = scope.bytes_mut();

    let mut header = LeafHeader {
        kind: KIND_LEAF,
        _pad: [0; 3],
        key_len: U32::new(key.len() as u32),
        key_ptr: RelPtr::NULL,
        key_inline: [0; LEAF_INLINE_KEY],
    };

    match blob {
        Some(b) => {
            bytes[b as usize..b as usize + key.len()].copy_from_slice(key);
            header.key_ptr = RelPtr::encode(leaf + KEY_PTR_OFFSET, b);
        }
        None => {
            header.key_inline[..key.len()].copy_from_slice(key);
        }
    }

    let start = leaf as usize;
    bytes[start..start + LEAF_HEADER_SIZE].copy_from_slice(header.as_bytes());
    write_value(bytes, leaf, value)?;

    Ok(leaf)
}

/// Schedules a leaf (and its key blob, if any) for release at commit.
pub fn free_leaf<S: TxScope>(scope: &mut S, leaf_pos: u64) -> Result<()> {
    let blob = LeafRef::read(scope.bytes(), leaf_pos)?.key_blob();
    if let Some(b) = blob {
        scope.free(b)?;
    }
    scope.free(leaf_pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::mem::MemScope;
    use crate::tx::ReadScope;

    #[test]
    fn inline_key_round_trip() {
        let mut scope = MemScope::new(8192);

        let pos = create_leaf(&mut scope, b"short", &7u64).unwrap();
        let leaf = LeafRef::read(scope.bytes(), pos).unwrap();

        assert_eq!(leaf.key().unwrap(), b"short");
        assert_eq!(leaf.key_blob(), None);
        assert_eq!(read_value::<u64>(scope.bytes(), pos).unwrap(), 7);
    }

    #[test]
    fn long_key_uses_a_blob() {
        let mut scope = MemScope::new(8192);
        let key = b"a key well beyond sixteen bytes";

        let pos = create_leaf(&mut scope, key, &42u32).unwrap();
        let leaf = LeafRef::read(scope.bytes(), pos).unwrap();

        assert_eq!(leaf.key().unwrap(), key.as_slice());
        assert!(leaf.key_blob().is_some());
        assert_eq!(read_value::<u32>(scope.bytes(), pos).unwrap(), 42);
    }

    #[test]
    fn empty_key_is_allowed() {
        let mut scope = MemScope::new(8192);

        let pos = create_leaf(&mut scope, b"", &1u8).unwrap();
        let leaf = LeafRef::read(scope.bytes(), pos).unwrap();

        assert_eq!(leaf.key().unwrap(), b"");
    }

    #[test]
    fn value_rewrite_in_place() {
        let mut scope = MemScope::new(8192);

        let pos = create_leaf(&mut scope, b"k", &1u64).unwrap();
        write_value(scope.bytes_mut(), pos, &99u64).unwrap();

        assert_eq!(read_value::<u64>(scope.bytes(), pos).unwrap(), 99);
        // The key is untouched by value writes.
        assert_eq!(LeafRef::read(scope.bytes(), pos).unwrap().key().unwrap(), b"k");
    }

    #[test]
    fn non_leaf_position_is_rejected() {
        let scope = MemScope::new(8192);
        assert!(LeafRef::read(scope.bytes(), 4096).is_err());
    }
}

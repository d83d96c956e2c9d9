//! # Region Header
//!
//! Every region file starts with a fixed 128-byte header containing magic
//! bytes, a format version, the persistent allocator state, and the tree
//! anchor. The anchor is the caller-visible root storage: a self-relative
//! root link, the entry count, and a generation counter bumped by every
//! structural mutation (cursors validate against it).
//!
//! ## Layout
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----------------------------------------
//! 0       16    magic
//! 16      4     version
//! 20      4     value_size   (guard; meaningful when FLAG_VALUE_SIZE_SET)
//! 24      8     heap_top     (allocator bump pointer)
//! 32      8     free_head    (allocator free-list head, 0 = empty)
//! 40      8     root         (self-relative link to root node/leaf)
//! 48      8     entry_count
//! 56      8     generation
//! 64      4     flags
//! 68      60    reserved
//! ```
//!
//! All multi-byte fields are little-endian zerocopy types, so the header can
//! be read and written in place over the mmap without copies. `value_size`
//! records `size_of` the stored value type on first insert; reopening the
//! region with a different value type fails fast instead of misreading
//! leaves.
//!
//! Mutations of header fields inside a transaction go through the usual
//! snapshot-before-write protocol; the fixed field positions are exported as
//! constants for that purpose.

use eyre::{ensure, Result};
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::tree::relptr::RelPtr;

pub const REGION_MAGIC: &[u8; 16] = b"permap region v1";
pub const CURRENT_VERSION: u32 = 1;
pub const REGION_HEADER_SIZE: usize = 128;

/// Allocations start right after the header.
pub const ARENA_START: u64 = REGION_HEADER_SIZE as u64;

/// Position and length of the allocator state (heap_top + free_head).
pub const ALLOC_STATE_POS: u64 = core::mem::offset_of!(RegionHeader, heap_top) as u64;
pub const ALLOC_STATE_LEN: usize = 16;

/// Position of the root link field. Tree links resolve relative to this.
pub const ROOT_FIELD_POS: u64 = core::mem::offset_of!(RegionHeader, root) as u64;

/// Position and length of the tree anchor (root + entry_count + generation).
pub const ANCHOR_POS: u64 = ROOT_FIELD_POS;
pub const ANCHOR_LEN: usize = 24;

pub const VALUE_SIZE_POS: u64 = core::mem::offset_of!(RegionHeader, value_size) as u64;
pub const FLAGS_POS: u64 = core::mem::offset_of!(RegionHeader, flags) as u64;

pub const FLAG_VALUE_SIZE_SET: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct RegionHeader {
    magic: [u8; 16],
    version: U32,
    value_size: U32,
    heap_top: U64,
    free_head: U64,
    root: RelPtr,
    entry_count: U64,
    generation: U64,
    flags: U32,
    reserved: [u8; 60],
}

const _: () = assert!(std::mem::size_of::<RegionHeader>() == REGION_HEADER_SIZE);

impl RegionHeader {
    pub fn new() -> Self {
        Self {
            magic: *REGION_MAGIC,
            version: U32::new(CURRENT_VERSION),
            value_size: U32::new(0),
            heap_top: U64::new(ARENA_START),
            free_head: U64::new(0),
            root: RelPtr::NULL,
            entry_count: U64::new(0),
            generation: U64::new(0),
            flags: U32::new(0),
            reserved: [0u8; 60],
        }
    }

    /// Parses and validates the header at the start of `bytes`.
    pub fn ref_from(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= REGION_HEADER_SIZE,
            "region too small for header: {} < {}",
            bytes.len(),
            REGION_HEADER_SIZE
        );

        let header = Self::ref_from_bytes(&bytes[..REGION_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse region header: {:?}", e))?;

        ensure!(
            &header.magic == REGION_MAGIC,
            "invalid magic bytes, not a permap region"
        );

        ensure!(
            header.version.get() == CURRENT_VERSION,
            "unsupported region version: {} (expected {})",
            header.version.get(),
            CURRENT_VERSION
        );

        Ok(header)
    }

    pub fn mut_from(bytes: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            bytes.len() >= REGION_HEADER_SIZE,
            "region too small for header: {} < {}",
            bytes.len(),
            REGION_HEADER_SIZE
        );

        let header = Self::mut_from_bytes(&mut bytes[..REGION_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse region header: {:?}", e))?;

        ensure!(
            &header.magic == REGION_MAGIC,
            "invalid magic bytes, not a permap region"
        );

        Ok(header)
    }

    crate::zerocopy_accessors! {
        value_size: u32,
        heap_top: u64,
        free_head: u64,
        entry_count: u64,
        generation: u64,
        flags: u32,
    }

    pub fn version(&self) -> u32 {
        self.version.get()
    }

    pub fn root(&self) -> Option<u64> {
        self.root.resolve(ROOT_FIELD_POS)
    }

    pub fn set_root(&mut self, target: Option<u64>) {
        self.root = match target {
            Some(t) => RelPtr::encode(ROOT_FIELD_POS, t),
            None => RelPtr::NULL,
        };
    }

    pub fn value_size_set(&self) -> bool {
        self.flags.get() & FLAG_VALUE_SIZE_SET != 0
    }
}

impl Default for RegionHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes a fresh header into `bytes`, formatting it as an empty region.
pub fn format_region(bytes: &mut [u8]) -> Result<()> {
    ensure!(
        bytes.len() >= REGION_HEADER_SIZE,
        "region too small to format: {} < {}",
        bytes.len(),
        REGION_HEADER_SIZE
    );
    let header = RegionHeader::new();
    bytes[..REGION_HEADER_SIZE].copy_from_slice(header.as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_then_parse() {
        let mut bytes = vec![0u8; 4096];
        format_region(&mut bytes).unwrap();

        let header = RegionHeader::ref_from(&bytes).unwrap();
        assert_eq!(header.version(), CURRENT_VERSION);
        assert_eq!(header.heap_top(), ARENA_START);
        assert_eq!(header.free_head(), 0);
        assert_eq!(header.root(), None);
        assert_eq!(header.entry_count(), 0);
        assert!(!header.value_size_set());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = vec![0u8; 4096];
        format_region(&mut bytes).unwrap();
        bytes[0] = b'X';

        assert!(RegionHeader::ref_from(&bytes).is_err());
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut bytes = vec![0u8; 4096];
        format_region(&mut bytes).unwrap();
        bytes[16..20].copy_from_slice(&99u32.to_le_bytes());

        assert!(RegionHeader::ref_from(&bytes).is_err());
    }

    #[test]
    fn root_link_round_trip() {
        let mut bytes = vec![0u8; 4096];
        format_region(&mut bytes).unwrap();

        let header = RegionHeader::mut_from(&mut bytes).unwrap();
        header.set_root(Some(512));
        assert_eq!(header.root(), Some(512));

        header.set_root(None);
        assert_eq!(header.root(), None);
    }

    #[test]
    fn field_positions_match_layout() {
        assert_eq!(ALLOC_STATE_POS, 24);
        assert_eq!(ROOT_FIELD_POS, 40);
        assert_eq!(VALUE_SIZE_POS, 20);
        assert_eq!(FLAGS_POS, 64);
    }
}

//! # Compressed Radix Tree
//!
//! An ordered map over byte-string keys, stored entirely inside the region
//! arena and linked with self-relative handles. Single-child chains are
//! collapsed into per-node prefixes, so tree depth is bounded by the number
//! of distinct branch points, not by key length.
//!
//! ## Block Kinds
//!
//! The tree is a graph of three allocation shapes, each starting with (or
//! reached from) a one-byte kind tag, so traversal is self-describing:
//!
//! - **Leaf**: key (inline or blob) + value bytes.
//! - **Node**: compressed prefix, optional terminal leaf link, and a sorted
//!   sparse child-slot array living in a separately allocated slots block.
//! - **Blobs** (key/prefix overflow, slots blocks): raw bytes, reached only
//!   through typed links, carrying no tag of their own.
//!
//! ## Ordering
//!
//! Lexicographic byte order. A key that is a strict prefix of another sorts
//! first, which is why a node's terminal leaf (key ends exactly at the
//! node's prefix boundary) is visited before any child slot.
//!
//! ## Module Organization
//!
//! - `relptr`: self-relative link fields
//! - `leaf`: leaf block layout and lifecycle
//! - `node`: node block layout, slot array operations
//! - `tree`: lookup, emplace, erase, clear, seek, diagnostic dump
//! - `cursor`: ordered traversal with generation-checked validity

pub mod cursor;
pub mod leaf;
pub mod node;
pub mod relptr;
#[allow(clippy::module_inception)]
pub mod tree;

pub use cursor::Cursor;
pub use relptr::RelPtr;
pub use tree::{RadixTree, TreeReader};

use eyre::{ensure, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes};

/// Values live in the region as their exact byte representation, so any
/// fixed-size type that is plain bytes in both directions qualifies.
pub trait Value: FromBytes + IntoBytes + Immutable + Copy {}

impl<T: FromBytes + IntoBytes + Immutable + Copy> Value for T {}

pub const KIND_NODE: u8 = 1;
pub const KIND_LEAF: u8 = 2;

/// Reads the kind tag of the block at `pos`.
pub(crate) fn block_kind(bytes: &[u8], pos: u64) -> Result<u8> {
    let pos = pos as usize;
    ensure!(
        pos < bytes.len(),
        "block position {} beyond region end {}",
        pos,
        bytes.len()
    );
    let kind = bytes[pos];
    ensure!(
        kind == KIND_NODE || kind == KIND_LEAF,
        "unknown block kind {} at position {}",
        kind,
        pos
    );
    Ok(kind)
}

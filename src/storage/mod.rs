//! # Storage Module
//!
//! The persistent substrate under the tree: a memory-mapped region file with
//! a fixed header, a block allocator whose state lives inside that header,
//! and an undo log providing before-image rollback.
//!
//! ## Architecture Overview
//!
//! ```text
//! +--------------------------------------+
//! | Region (open/create/recover)         |
//! +--------------------------------------+
//! | Tx (snapshot / allocate / free)      |
//! +-------------------+------------------+
//! | alloc (free list  | UndoLog (crc64   |
//! |  + bump pointer)  |  before-images)  |
//! +-------------------+------------------+
//! | RegionHeader (128B, zerocopy)        |
//! +--------------------------------------+
//! | MmapArena (memmap2, byte-granular)   |
//! +--------------------------------------+
//! ```
//!
//! Everything above `MmapArena` addresses the region by `u64` position from
//! the start of the file. The mapping's virtual base never leaks upward,
//! which is what allows a region written in one run to be remapped anywhere
//! in a later one.
//!
//! ## Crash Consistency
//!
//! The undo log holds before-images, fsynced before the first in-place write
//! to each range. Commit syncs the region then truncates the log; rollback
//! (explicit, on drop, or during recovery at open) restores frames in
//! reverse. At every durable point the region is either fully pre- or fully
//! post-transaction.

pub mod alloc;
pub mod header;
pub mod mmap;
pub mod undo;

pub use header::{RegionHeader, ARENA_START, REGION_HEADER_SIZE};
pub use mmap::MmapArena;
pub use undo::{UndoFrame, UndoLog};

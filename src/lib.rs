//! # permap
//!
//! An ordered, byte-string-keyed index stored inside a memory-mapped region
//! file. Keys live in a compressed radix tree whose internal links are
//! self-relative, so the file can be remapped at any virtual base (or copied
//! wholesale) and reopened as-is. Mutations run inside explicit transactions
//! backed by an undo log of before-images; a crash at any point leaves the
//! region either fully pre- or fully post-transaction after recovery.
//!
//! ## Architecture
//!
//! ```text
//! +----------------------------------------------+
//! |  RadixTree / TreeReader / Cursor   (tree/)   |
//! |  lookup, emplace, erase, seek, dump          |
//! +----------------------------------------------+
//! |  ReadScope / TxScope seam          (tx.rs)   |
//! |  snapshot, allocate, free                    |
//! +----------------------------------------------+
//! |  Region lifecycle + recovery   (region.rs)   |
//! +----------------------------------------------+
//! |  header / alloc / undo / mmap  (storage/)    |
//! +----------------------------------------------+
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use permap::{RadixTree, Region};
//!
//! fn main() -> eyre::Result<()> {
//!     let mut region = Region::create("index.region", 1 << 20)?;
//!
//!     let mut tx = region.begin()?;
//!     let mut tree = RadixTree::<_, u64>::new(&mut tx)?;
//!     tree.try_emplace(b"example1", 1)?;
//!     tree.try_emplace(b"example2", 2)?;
//!     drop(tree);
//!     tx.commit()?;
//!
//!     let reader = region.reader::<u64>()?;
//!     assert_eq!(reader.get(b"example1")?, Some(1));
//!
//!     let mut cursor = reader.cursor_first()?;
//!     while cursor.valid() {
//!         println!("{:?} -> {}", cursor.key(&region)?, cursor.value(&region)?);
//!         if !cursor.advance(&region)? {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Guarantees
//!
//! - Lexicographic iteration order; a strict prefix sorts before its
//!   extensions.
//! - `try_emplace` never overwrites; `update` and `Cursor::set_value` rewrite
//!   values in place without invalidating cursors.
//! - Dropping an uncommitted [`Tx`] rolls back; so does reopening a region
//!   whose last transaction was interrupted.
//! - Single writer at a time, enforced by the borrow checker; readers need no
//!   transaction.

mod macros;

pub mod region;
pub mod storage;
pub mod tree;
pub mod tx;

pub use region::Region;
pub use tree::{Cursor, RadixTree, TreeReader, Value};
pub use tx::{ReadScope, Tx, TxScope};

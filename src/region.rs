//! # Region Lifecycle
//!
//! `Region` is the top-level handle: it creates or opens the mapped file,
//! validates the header, runs crash recovery, and hands out transactions and
//! readers.
//!
//! ## Recovery on Open
//!
//! A region file is always paired with a sidecar undo log (`<file>.undo`).
//! An empty or absent log means the last transaction finished cleanly. A
//! non-empty log means a transaction was interrupted mid-flight; `open`
//! replays its before-images in reverse, syncs, and discards the log, so the
//! caller always observes the pre-transaction state. No structural repair of
//! the tree itself is ever needed or attempted.
//!
//! ## Usage
//!
//! ```ignore
//! let mut region = Region::create("data.region", 1 << 20)?;
//! let mut tx = region.begin()?;
//! let mut tree = RadixTree::<_, u64>::new(&mut tx)?;
//! tree.try_emplace(b"example1", 1)?;
//! drop(tree);
//! tx.commit()?;
//!
//! let reader = region.reader::<u64>()?;
//! assert_eq!(reader.get(b"example1")?, Some(1));
//! ```

use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};

use crate::storage::header::{format_region, RegionHeader};
use crate::storage::{MmapArena, UndoLog};
use crate::tree::tree::TreeReader;
use crate::tree::Value;
use crate::tx::{ReadScope, Tx};

/// Smallest region worth creating: header plus one granule of arena.
pub const MIN_REGION_SIZE: u64 = 4096;

pub struct Region {
    arena: MmapArena,
    undo_path: PathBuf,
}

fn undo_path_for(path: &Path) -> PathBuf {
    let mut os = path.to_path_buf().into_os_string();
    os.push(".undo");
    PathBuf::from(os)
}

impl Region {
    /// Creates and formats a new region file of at least `size` bytes.
    pub fn create<P: AsRef<Path>>(path: P, size: u64) -> Result<Self> {
        let path = path.as_ref();
        ensure!(
            size >= MIN_REGION_SIZE,
            "region size {} below minimum {}",
            size,
            MIN_REGION_SIZE
        );

        let undo_path = undo_path_for(path);
        if undo_path.exists() {
            tracing::warn!(path = %undo_path.display(), "removing stale undo log");
            std::fs::remove_file(&undo_path)
                .wrap_err_with(|| format!("failed to remove '{}'", undo_path.display()))?;
        }

        let mut arena = MmapArena::create(path, size)?;
        format_region(arena.bytes_mut())?;
        arena.sync()?;

        tracing::debug!(path = %path.display(), size = arena.len(), "region created");

        Ok(Self { arena, undo_path })
    }

    /// Opens an existing region, rolling back any interrupted transaction.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut arena = MmapArena::open(path)?;

        RegionHeader::ref_from(arena.bytes())
            .wrap_err_with(|| format!("invalid region file '{}'", path.display()))?;

        let undo_path = undo_path_for(path);
        if undo_path.exists() {
            let restored = UndoLog::recover(&undo_path, arena.bytes_mut())?;
            if restored > 0 {
                arena.sync()?;
                tracing::warn!(
                    path = %path.display(),
                    frames = restored,
                    "rolled back interrupted transaction"
                );
            }
            std::fs::remove_file(&undo_path)
                .wrap_err_with(|| format!("failed to remove '{}'", undo_path.display()))?;
        }

        tracing::debug!(path = %path.display(), size = arena.len(), "region opened");

        Ok(Self { arena, undo_path })
    }

    /// Starts a transaction. Exclusive: the borrow checker admits one at a
    /// time, which is the single-writer discipline the tree requires.
    pub fn begin(&mut self) -> Result<Tx<'_>> {
        let log = UndoLog::create(&self.undo_path)?;
        Ok(Tx::new(self, log))
    }

    /// Read view of the tree stored in this region.
    pub fn reader<V: Value>(&self) -> Result<TreeReader<'_, V>> {
        TreeReader::new(self)
    }

    /// Number of entries in the stored tree.
    pub fn entry_count(&self) -> Result<u64> {
        Ok(RegionHeader::ref_from(self.arena.bytes())?.entry_count())
    }

    pub fn len(&self) -> u64 {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Forces the mapped bytes out to disk.
    pub fn sync(&self) -> Result<()> {
        self.arena.sync()
    }

    pub(crate) fn arena(&self) -> &MmapArena {
        &self.arena
    }

    pub(crate) fn arena_mut(&mut self) -> &mut MmapArena {
        &mut self.arena
    }
}

impl ReadScope for Region {
    fn bytes(&self) -> &[u8] {
        self.arena.bytes()
    }
}

//! # Transaction Scope
//!
//! The narrow interface the tree consumes from the region engine, and its
//! real implementation.
//!
//! ## The Trait Seam
//!
//! Tree algorithms never touch files or the allocator directly; they are
//! written against two small traits:
//!
//! - [`ReadScope`]: byte access to the region. Lookups and cursors need
//!   nothing else, so they run without a transaction.
//! - [`TxScope`]: mutable byte access plus the three transactional calls -
//!   `snapshot` (record a range's prior bytes before the first overwrite),
//!   `allocate`, and `free` (deferred to commit, so an aborted erase never
//!   leaves a dangling reference to reclaimed space).
//!
//! [`Tx`] implements both against a live [`Region`]. Tests implement them
//! against a plain in-memory arena to drive the tree through failure and
//! abort paths without a file system.
//!
//! ## Write Protocol
//!
//! 1. `snapshot` appends the range's before-image to the undo log and fsyncs
//!    before returning; duplicate (position, length) ranges within one
//!    transaction are skipped.
//! 2. The caller overwrites the range in the mapped region.
//! 3. `commit` performs deferred frees (still snapshotted), msyncs the
//!    region, then truncates the log.
//! 4. `abort` restores before-images in reverse order. Dropping an
//!    uncommitted `Tx` does the same, so every early-return path in caller
//!    code rolls back.
//!
//! Fresh allocations are initialized without snapshots: rolling back the
//! allocator state (which is snapshotted) already un-allocates them.
//!
//! ## Concurrency
//!
//! `Tx` holds `&mut Region`, so the borrow checker enforces the
//! single-writer-at-a-time discipline; readers clone nothing and take
//! `&Region`.

use eyre::{ensure, Result};
use hashbrown::HashSet;

use crate::region::Region;
use crate::storage::alloc;
use crate::storage::undo::{UndoFrame, UndoLog};

/// Growth step when the arena runs out of room mid-transaction.
const GROW_CHUNK: u64 = 64 * 1024;

/// Read-only access to the region bytes.
pub trait ReadScope {
    fn bytes(&self) -> &[u8];
}

/// The mutation interface consumed by tree algorithms.
pub trait TxScope: ReadScope {
    fn bytes_mut(&mut self) -> &mut [u8];

    /// Records the prior contents of `pos..pos + len`. Must be called before
    /// the first overwrite of any pre-existing range in this transaction.
    fn snapshot(&mut self, pos: u64, len: usize) -> Result<()>;

    /// Allocates a block of at least `size` bytes, growing the region if
    /// needed. Reversible: abort restores the allocator state.
    fn allocate(&mut self, size: usize) -> Result<u64>;

    /// Schedules a block for release at commit.
    fn free(&mut self, pos: u64) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Active,
    Committed,
    Aborted,
}

/// A transaction over a region. Obtained from [`Region::begin`].
pub struct Tx<'a> {
    region: &'a mut Region,
    log: UndoLog,
    frames: Vec<UndoFrame>,
    seen: HashSet<(u64, u32)>,
    deferred_free: Vec<u64>,
    state: TxState,
}

fn snapshot_range(
    log: &mut UndoLog,
    frames: &mut Vec<UndoFrame>,
    seen: &mut HashSet<(u64, u32)>,
    bytes: &[u8],
    pos: u64,
    len: usize,
) -> Result<()> {
    if len == 0 {
        return Ok(());
    }
    ensure!(
        pos as usize + len <= bytes.len(),
        "snapshot of {}..{} beyond region end {}",
        pos,
        pos as usize + len,
        bytes.len()
    );
    if !seen.insert((pos, len as u32)) {
        return Ok(());
    }

    let data = bytes[pos as usize..pos as usize + len].to_vec();
    log.append(pos, &data)?;
    frames.push(UndoFrame { pos, data });
    Ok(())
}

impl<'a> Tx<'a> {
    pub(crate) fn new(region: &'a mut Region, log: UndoLog) -> Self {
        Self {
            region,
            log,
            frames: Vec::new(),
            seen: HashSet::new(),
            deferred_free: Vec::new(),
            state: TxState::Active,
        }
    }

    /// Performs deferred frees, makes the region durable, and discards the
    /// undo log. After a successful commit nothing is rolled back on drop.
    pub fn commit(mut self) -> Result<()> {
        let deferred = std::mem::take(&mut self.deferred_free);
        for pos in deferred {
            let Tx {
                region,
                log,
                frames,
                seen,
                ..
            } = &mut self;
            let bytes = region.arena_mut().bytes_mut();
            let mut snap = |cur: &[u8], pos: u64, len: usize| {
                snapshot_range(log, frames, seen, cur, pos, len)
            };
            alloc::free_block(bytes, pos, &mut snap)?;
        }

        self.region.arena().sync()?;
        self.log.discard()?;
        self.state = TxState::Committed;
        tracing::trace!(frames = self.frames.len(), "transaction committed");
        Ok(())
    }

    /// Restores every snapshotted range, leaving the region exactly in its
    /// pre-transaction shape.
    pub fn abort(mut self) -> Result<()> {
        self.rollback()?;
        self.state = TxState::Aborted;
        tracing::trace!(frames = self.frames.len(), "transaction aborted");
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let bytes = self.region.arena_mut().bytes_mut();
        for frame in self.frames.iter().rev() {
            let start = frame.pos as usize;
            let end = start + frame.data.len();
            ensure!(
                end <= bytes.len(),
                "undo frame for {}..{} beyond region end {}",
                start,
                end,
                bytes.len()
            );
            bytes[start..end].copy_from_slice(&frame.data);
        }
        self.region.arena().sync()?;
        self.log.discard()?;
        Ok(())
    }
}

impl Drop for Tx<'_> {
    fn drop(&mut self) {
        if self.state == TxState::Active {
            if let Err(e) = self.rollback() {
                tracing::error!(error = %e, "rollback of dropped transaction failed");
            }
        }
    }
}

impl ReadScope for Tx<'_> {
    fn bytes(&self) -> &[u8] {
        self.region.arena().bytes()
    }
}

impl TxScope for Tx<'_> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.region.arena_mut().bytes_mut()
    }

    fn snapshot(&mut self, pos: u64, len: usize) -> Result<()> {
        let Tx {
            region,
            log,
            frames,
            seen,
            ..
        } = self;
        snapshot_range(log, frames, seen, region.arena().bytes(), pos, len)
    }

    fn allocate(&mut self, size: usize) -> Result<u64> {
        loop {
            let res = {
                let Tx {
                    region,
                    log,
                    frames,
                    seen,
                    ..
                } = self;
                let bytes = region.arena_mut().bytes_mut();
                let mut snap = |cur: &[u8], pos: u64, len: usize| {
                    snapshot_range(log, frames, seen, cur, pos, len)
                };
                alloc::allocate(bytes, size, &mut snap)?
            };

            match res {
                Some(pos) => return Ok(pos),
                None => {
                    let new_len =
                        self.region.arena().len() + GROW_CHUNK.max(size as u64 + 16);
                    self.region.arena_mut().grow(new_len)?;
                }
            }
        }
    }

    fn free(&mut self, pos: u64) -> Result<()> {
        ensure!(self.state == TxState::Active, "free outside an active transaction");
        self.deferred_free.push(pos);
        Ok(())
    }
}

/// In-memory scope for exercising tree algorithms without a region file.
///
/// Implements the same snapshot/allocate/free contract over a `Vec<u8>`
/// arena, with explicit `abort`/`commit` and an optional allocation-failure
/// fuse for error-path coverage.
#[cfg(test)]
pub(crate) mod mem {
    use super::*;
    use crate::storage::header::format_region;
    use eyre::bail;

    pub struct MemScope {
        bytes: Vec<u8>,
        frames: Vec<UndoFrame>,
        seen: HashSet<(u64, u32)>,
        deferred_free: Vec<u64>,
        allocs_until_failure: Option<u32>,
    }

    impl MemScope {
        pub fn new(size: usize) -> Self {
            let mut bytes = vec![0u8; size];
            format_region(&mut bytes).unwrap();
            Self {
                bytes,
                frames: Vec::new(),
                seen: HashSet::new(),
                deferred_free: Vec::new(),
                allocs_until_failure: None,
            }
        }

        /// Makes the n-th subsequent allocation fail.
        pub fn fail_allocs_after(&mut self, n: u32) {
            self.allocs_until_failure = Some(n);
        }

        pub fn clear_failure(&mut self) {
            self.allocs_until_failure = None;
        }

        /// Restores all before-images in reverse, like a real abort.
        pub fn abort(&mut self) {
            for frame in self.frames.iter().rev() {
                let start = frame.pos as usize;
                self.bytes[start..start + frame.data.len()].copy_from_slice(&frame.data);
            }
            self.frames.clear();
            self.seen.clear();
            self.deferred_free.clear();
        }

        /// Applies deferred frees and forgets the before-images.
        pub fn commit(&mut self) {
            let deferred = std::mem::take(&mut self.deferred_free);
            for pos in deferred {
                let mut snap = |_: &[u8], _: u64, _: usize| Ok(());
                alloc::free_block(&mut self.bytes, pos, &mut snap).unwrap();
            }
            self.frames.clear();
            self.seen.clear();
        }
    }

    impl ReadScope for MemScope {
        fn bytes(&self) -> &[u8] {
            &self.bytes
        }
    }

    impl TxScope for MemScope {
        fn bytes_mut(&mut self) -> &mut [u8] {
            &mut self.bytes
        }

        fn snapshot(&mut self, pos: u64, len: usize) -> Result<()> {
            if len == 0 {
                return Ok(());
            }
            ensure!(
                pos as usize + len <= self.bytes.len(),
                "snapshot of {}..{} beyond arena end {}",
                pos,
                pos as usize + len,
                self.bytes.len()
            );
            if !self.seen.insert((pos, len as u32)) {
                return Ok(());
            }
            let data = self.bytes[pos as usize..pos as usize + len].to_vec();
            self.frames.push(UndoFrame { pos, data });
            Ok(())
        }

        fn allocate(&mut self, size: usize) -> Result<u64> {
            if let Some(n) = self.allocs_until_failure {
                if n == 0 {
                    bail!("allocation of {} bytes failed (simulated)", size);
                }
                self.allocs_until_failure = Some(n - 1);
            }

            loop {
                let res = {
                    let MemScope {
                        bytes,
                        frames,
                        seen,
                        ..
                    } = self;
                    let mut snap = |cur: &[u8], pos: u64, len: usize| {
                        if len == 0 || !seen.insert((pos, len as u32)) {
                            return Ok(());
                        }
                        let data = cur[pos as usize..pos as usize + len].to_vec();
                        frames.push(UndoFrame { pos, data });
                        Ok(())
                    };
                    alloc::allocate(bytes, size, &mut snap)?
                };
                match res {
                    Some(pos) => return Ok(pos),
                    None => {
                        let new_len = self.bytes.len() + 64 * 1024;
                        self.bytes.resize(new_len, 0);
                    }
                }
            }
        }

        fn free(&mut self, pos: u64) -> Result<()> {
            self.deferred_free.push(pos);
            Ok(())
        }
    }
}

//! # Block Allocator
//!
//! Variable-size block allocation inside the region arena. Every block is an
//! 8-byte size header followed by an 8-byte-aligned payload; callers hold the
//! payload position. Free blocks are threaded into a singly-linked first-fit
//! free list through their payloads (first 8 bytes = next free payload
//! position, 0 = end). The list head and the bump pointer live in the region
//! header, so allocator state persists with the region and needs no rebuild
//! on open.
//!
//! ## Allocation Strategy
//!
//! 1. First fit over the free list; a block is reused whole (no splitting,
//!    internal fragmentation accepted - block sizes recur heavily here).
//! 2. Otherwise bump `heap_top`. If the arena is too small the caller grows
//!    the backing file and retries (`Ok(None)` signals this).
//!
//! ## Transactional Discipline
//!
//! Every mutation of *pre-existing* bytes (allocator state in the header,
//! free-list links, the next pointer of a reused block) is announced through
//! the snapshot callback before the write, so an aborting transaction can
//! restore the allocator exactly. Initialization of space beyond the old
//! `heap_top` is not snapshotted: rolling back `heap_top` already un-allocates
//! it. Frees are expected to be deferred to commit by the transaction layer;
//! this module just performs them.

use eyre::{ensure, Result};

use super::header::{RegionHeader, ALLOC_STATE_LEN, ALLOC_STATE_POS, ARENA_START};

pub const BLOCK_HEADER_SIZE: u64 = 8;
pub const MIN_BLOCK_SIZE: usize = 8;

/// Snapshot callback: (current bytes, position, length) of a range about to
/// be overwritten.
pub type SnapFn<'a> = &'a mut dyn FnMut(&[u8], u64, usize) -> Result<()>;

fn read_u64(bytes: &[u8], pos: u64) -> Result<u64> {
    let pos = pos as usize;
    ensure!(
        pos + 8 <= bytes.len(),
        "read of 8 bytes at {} beyond region end {}",
        pos,
        bytes.len()
    );
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[pos..pos + 8]);
    Ok(u64::from_le_bytes(buf))
}

fn write_u64(bytes: &mut [u8], pos: u64, val: u64) -> Result<()> {
    let pos = pos as usize;
    ensure!(
        pos + 8 <= bytes.len(),
        "write of 8 bytes at {} beyond region end {}",
        pos,
        bytes.len()
    );
    bytes[pos..pos + 8].copy_from_slice(&val.to_le_bytes());
    Ok(())
}

fn round_up(size: usize) -> usize {
    size.max(MIN_BLOCK_SIZE).div_ceil(8) * 8
}

/// Payload size of the block at `pos`.
pub fn block_size(bytes: &[u8], pos: u64) -> Result<u64> {
    ensure!(
        pos >= ARENA_START + BLOCK_HEADER_SIZE,
        "position {} is not a block payload",
        pos
    );
    let size = read_u64(bytes, pos - BLOCK_HEADER_SIZE)?;
    ensure!(
        size >= MIN_BLOCK_SIZE as u64 && pos + size <= bytes.len() as u64,
        "corrupt block header at {}: size {}",
        pos - BLOCK_HEADER_SIZE,
        size
    );
    Ok(size)
}

/// Allocates a block of at least `size` bytes.
///
/// Returns `Ok(None)` when the arena has no room left, in which case the
/// caller should grow the backing storage and retry.
pub fn allocate(bytes: &mut [u8], size: usize, snap: SnapFn) -> Result<Option<u64>> {
    ensure!(size > 0, "zero-size allocation");
    let rounded = round_up(size);

    let header = RegionHeader::ref_from(bytes)?;
    let free_head = header.free_head();
    let heap_top = header.heap_top();

    // First fit over the free list. `prev` is the payload position of the
    // previous free block, None while still at the list head.
    let mut prev: Option<u64> = None;
    let mut cur = free_head;
    while cur != 0 {
        let bsize = block_size(bytes, cur)?;
        let next = read_u64(bytes, cur)?;
        if bsize >= rounded as u64 {
            // The reused block's next pointer is about to be clobbered by the
            // caller; keep its before-image so abort can relink the list.
            snap(bytes, cur, 8)?;
            match prev {
                Some(p) => {
                    snap(bytes, p, 8)?;
                    write_u64(bytes, p, next)?;
                }
                None => {
                    snap(bytes, ALLOC_STATE_POS, ALLOC_STATE_LEN)?;
                    RegionHeader::mut_from(bytes)?.set_free_head(next);
                }
            }
            return Ok(Some(cur));
        }
        prev = Some(cur);
        cur = next;
    }

    // Bump allocation.
    let payload = heap_top + BLOCK_HEADER_SIZE;
    let new_top = payload + rounded as u64;
    if new_top > bytes.len() as u64 {
        return Ok(None);
    }

    snap(bytes, ALLOC_STATE_POS, ALLOC_STATE_LEN)?;
    write_u64(bytes, heap_top, rounded as u64)?;
    RegionHeader::mut_from(bytes)?.set_heap_top(new_top);

    Ok(Some(payload))
}

/// Returns the block at `pos` to the free list.
pub fn free_block(bytes: &mut [u8], pos: u64, snap: SnapFn) -> Result<()> {
    // Validates the size header before the block is relinked.
    block_size(bytes, pos)?;

    let free_head = RegionHeader::ref_from(bytes)?.free_head();

    snap(bytes, ALLOC_STATE_POS, ALLOC_STATE_LEN)?;
    snap(bytes, pos, 8)?;

    write_u64(bytes, pos, free_head)?;
    RegionHeader::mut_from(bytes)?.set_free_head(pos);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::header::format_region;

    fn arena(size: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; size];
        format_region(&mut bytes).unwrap();
        bytes
    }

    fn no_snap() -> impl FnMut(&[u8], u64, usize) -> Result<()> {
        |_, _, _| Ok(())
    }

    #[test]
    fn bump_allocations_are_disjoint_and_aligned() {
        let mut bytes = arena(4096);
        let mut snap = no_snap();

        let a = allocate(&mut bytes, 24, &mut snap).unwrap().unwrap();
        let b = allocate(&mut bytes, 100, &mut snap).unwrap().unwrap();

        assert_eq!(a % 8, 0);
        assert_eq!(b % 8, 0);
        assert!(b >= a + 24);
        assert_eq!(block_size(&bytes, a).unwrap(), 24);
        assert_eq!(block_size(&bytes, b).unwrap(), 104);
    }

    #[test]
    fn free_then_allocate_reuses_the_block() {
        let mut bytes = arena(4096);
        let mut snap = no_snap();

        let a = allocate(&mut bytes, 64, &mut snap).unwrap().unwrap();
        let top_before = RegionHeader::ref_from(&bytes).unwrap().heap_top();

        free_block(&mut bytes, a, &mut snap).unwrap();
        let b = allocate(&mut bytes, 48, &mut snap).unwrap().unwrap();

        assert_eq!(a, b);
        assert_eq!(
            RegionHeader::ref_from(&bytes).unwrap().heap_top(),
            top_before
        );
    }

    #[test]
    fn first_fit_skips_too_small_blocks() {
        let mut bytes = arena(4096);
        let mut snap = no_snap();

        let small = allocate(&mut bytes, 16, &mut snap).unwrap().unwrap();
        let large = allocate(&mut bytes, 128, &mut snap).unwrap().unwrap();

        free_block(&mut bytes, small, &mut snap).unwrap();
        free_block(&mut bytes, large, &mut snap).unwrap();

        // List order is large -> small after the two frees; a 100-byte
        // request must land in the large block.
        let got = allocate(&mut bytes, 100, &mut snap).unwrap().unwrap();
        assert_eq!(got, large);

        let got_small = allocate(&mut bytes, 8, &mut snap).unwrap().unwrap();
        assert_eq!(got_small, small);
    }

    #[test]
    fn exhausted_arena_asks_for_growth() {
        let mut bytes = arena(256);
        let mut snap = no_snap();

        assert!(allocate(&mut bytes, 4096, &mut snap).unwrap().is_none());
    }

    #[test]
    fn snapshots_cover_every_preexisting_write() {
        let mut bytes = arena(4096);
        let mut ranges: Vec<(u64, usize)> = Vec::new();

        {
            let mut snap = |_: &[u8], pos: u64, len: usize| {
                ranges.push((pos, len));
                Ok(())
            };
            let a = allocate(&mut bytes, 32, &mut snap).unwrap().unwrap();
            free_block(&mut bytes, a, &mut snap).unwrap();
            allocate(&mut bytes, 32, &mut snap).unwrap().unwrap();
        }

        // Bump, free (state + link), reuse (link + state) all announced.
        assert!(ranges.contains(&(ALLOC_STATE_POS, ALLOC_STATE_LEN)));
        assert!(ranges.iter().filter(|(_, len)| *len == 8).count() >= 2);
    }
}

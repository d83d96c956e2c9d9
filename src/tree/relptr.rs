//! # Self-Relative Handles
//!
//! A `RelPtr` references another region position as a signed displacement
//! from the position of the field that stores it, not as an absolute address
//! or a region-base offset. A handle is therefore meaningful only at the
//! position it was encoded for: the same eight bytes stored one field to the
//! left would resolve to a different target. In exchange, a mapped region can
//! move to a different virtual base (or the file can be copied wholesale) and
//! every link inside it stays valid, because only displacements are stored.
//!
//! Raw value 0 is the null sentinel. A real displacement of 0 would mean a
//! field referencing its own first byte, which never occurs: targets are
//! always block starts and link fields always live inside some *other* block.
//! `encode` debug-asserts this.
//!
//! All positions are `u64` byte offsets from the start of the region file.

use eyre::{ensure, Result};
use zerocopy::little_endian::I64;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

pub const RELPTR_SIZE: usize = 8;

/// A self-relative link field, stored little-endian.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct RelPtr(I64);

impl RelPtr {
    pub const NULL: RelPtr = RelPtr(I64::ZERO);

    /// Encodes a handle that, when stored at `at`, resolves to `target`.
    pub fn encode(at: u64, target: u64) -> Self {
        debug_assert!(target != at, "a link field cannot reference itself");
        RelPtr(I64::new(target as i64 - at as i64))
    }

    /// Resolves the handle stored at `at`, or `None` for the null sentinel.
    pub fn resolve(self, at: u64) -> Option<u64> {
        let raw = self.0.get();
        if raw == 0 {
            None
        } else {
            Some((at as i64).wrapping_add(raw) as u64)
        }
    }

    pub fn is_null(self) -> bool {
        self.0.get() == 0
    }
}

/// Reads and resolves the link field stored at region position `at`.
pub fn read_at(bytes: &[u8], at: u64) -> Result<Option<u64>> {
    let at = at as usize;
    ensure!(
        at + RELPTR_SIZE <= bytes.len(),
        "link field at {} extends beyond region end {}",
        at,
        bytes.len()
    );
    let ptr = RelPtr::read_from_bytes(&bytes[at..at + RELPTR_SIZE])
        .map_err(|e| eyre::eyre!("failed to read link field at {}: {:?}", at, e))?;
    Ok(ptr.resolve(at as u64))
}

/// Encodes and stores a link field at region position `at`.
///
/// Callers mutating pre-existing bytes must have snapshotted the range first.
pub fn write_at(bytes: &mut [u8], at: u64, target: Option<u64>) -> Result<()> {
    let ptr = match target {
        Some(t) => RelPtr::encode(at, t),
        None => RelPtr::NULL,
    };
    let at = at as usize;
    ensure!(
        at + RELPTR_SIZE <= bytes.len(),
        "link field at {} extends beyond region end {}",
        at,
        bytes.len()
    );
    bytes[at..at + RELPTR_SIZE].copy_from_slice(ptr.as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_resolves_to_none() {
        assert!(RelPtr::NULL.is_null());
        assert_eq!(RelPtr::NULL.resolve(1234), None);
    }

    #[test]
    fn encode_resolve_round_trip() {
        let ptr = RelPtr::encode(100, 4096);
        assert_eq!(ptr.resolve(100), Some(4096));

        let back = RelPtr::encode(4096, 100);
        assert_eq!(back.resolve(4096), Some(100));
    }

    #[test]
    fn displacement_survives_rebase() {
        // The same displacement stored at the same relative location keeps
        // resolving to the same relative target, whatever base the region
        // occupies. This is what makes the on-file form rebase-independent.
        let ptr = RelPtr::encode(128, 640);
        for base in [0u64, 1 << 20, 7 << 30] {
            assert_eq!(ptr.resolve(base + 128), Some(base + 640));
        }
    }

    #[test]
    fn read_write_at_region_positions() {
        let mut bytes = vec![0u8; 256];

        write_at(&mut bytes, 16, Some(200)).unwrap();
        assert_eq!(read_at(&bytes, 16).unwrap(), Some(200));

        write_at(&mut bytes, 16, None).unwrap();
        assert_eq!(read_at(&bytes, 16).unwrap(), None);
    }

    #[test]
    fn out_of_bounds_field_is_an_error() {
        let bytes = vec![0u8; 16];
        assert!(read_at(&bytes, 12).is_err());
    }

    #[test]
    fn backward_links_encode_negative_displacements() {
        let mut bytes = vec![0u8; 256];
        write_at(&mut bytes, 240, Some(8)).unwrap();
        assert_eq!(read_at(&bytes, 240).unwrap(), Some(8));
    }
}

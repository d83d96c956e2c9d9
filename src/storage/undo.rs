//! # Undo Log
//!
//! A sidecar file of before-image frames backing transaction rollback and
//! crash recovery. Each frame records the prior contents of one byte range of
//! the region, appended and fsynced *before* that range is first overwritten
//! within a transaction. The ordering gives the recovery invariant: any
//! region write that might have reached disk has its before-image durable in
//! the log.
//!
//! ## Frame Format
//!
//! ```text
//! +------------------+----------------+
//! | Frame Header     | Prior Bytes    |
//! | (24 bytes)       | (len bytes)    |
//! +------------------+----------------+
//! ```
//!
//! The header carries the region position, the length, and a CRC-64/ECMA
//! checksum over position, length, and data. A frame that fails its checksum
//! (or is cut short) is a torn tail write; by the fsync ordering the region
//! range it names was never modified, so recovery treats it as end-of-log.
//!
//! ## Lifecycle
//!
//! - `create` truncates and starts a fresh log for one transaction.
//! - `append` writes one frame, fsyncing before returning.
//! - `discard` truncates after commit or rollback; an empty log means the
//!   region is consistent.
//! - `recover` replays a leftover log in reverse frame order onto the region
//!   bytes. It runs on region open, turning an interrupted transaction back
//!   into its pre-transaction state.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use crc::{Crc, CRC_64_ECMA_182};
use eyre::{ensure, Result, WrapErr};
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

pub const UNDO_FRAME_HEADER_SIZE: usize = 24;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct UndoFrameHeader {
    pos: U64,
    len: U32,
    _reserved: U32,
    checksum: U64,
}

const _: () = assert!(std::mem::size_of::<UndoFrameHeader>() == UNDO_FRAME_HEADER_SIZE);

fn compute_checksum(pos: u64, data: &[u8]) -> u64 {
    let mut digest = CRC64.digest();
    digest.update(&pos.to_le_bytes());
    digest.update(&(data.len() as u32).to_le_bytes());
    digest.update(data);
    digest.finalize()
}

/// One decoded frame: the prior contents of `pos..pos + data.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoFrame {
    pub pos: u64,
    pub data: Vec<u8>,
}

pub struct UndoLog {
    file: File,
}

impl UndoLog {
    /// Starts a fresh, empty log for one transaction.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)
            .wrap_err_with(|| format!("failed to create undo log at '{}'", path.display()))?;

        Ok(Self { file })
    }

    /// Appends one before-image frame and fsyncs.
    pub fn append(&mut self, pos: u64, data: &[u8]) -> Result<()> {
        ensure!(!data.is_empty(), "empty undo frame");
        ensure!(
            data.len() <= u32::MAX as usize,
            "undo frame too large: {} bytes",
            data.len()
        );

        let header = UndoFrameHeader {
            pos: U64::new(pos),
            len: U32::new(data.len() as u32),
            _reserved: U32::new(0),
            checksum: U64::new(compute_checksum(pos, data)),
        };

        self.file
            .write_all(header.as_bytes())
            .wrap_err("failed to write undo frame header")?;
        self.file
            .write_all(data)
            .wrap_err("failed to write undo frame data")?;
        self.file
            .sync_all()
            .wrap_err("failed to sync undo frame to disk")?;

        Ok(())
    }

    /// Truncates the log after commit or rollback.
    pub fn discard(&mut self) -> Result<()> {
        self.file
            .set_len(0)
            .wrap_err("failed to truncate undo log")?;
        self.file
            .sync_all()
            .wrap_err("failed to sync undo log truncation")?;
        Ok(())
    }

    /// Reads every valid frame from a leftover log file.
    ///
    /// Stops at the first torn or checksum-invalid frame; by the append
    /// ordering such a frame never had its region write applied.
    pub fn read_frames<P: AsRef<Path>>(path: P) -> Result<Vec<UndoFrame>> {
        let path = path.as_ref();
        let mut file = File::open(path)
            .wrap_err_with(|| format!("failed to open undo log at '{}'", path.display()))?;

        let mut frames = Vec::new();
        loop {
            let mut header_bytes = [0u8; UNDO_FRAME_HEADER_SIZE];
            match file.read_exact(&mut header_bytes) {
                Ok(()) => {}
                Err(_) => break,
            }

            let Ok(header) = UndoFrameHeader::read_from_bytes(&header_bytes) else {
                break;
            };

            let len = header.len.get() as usize;
            if len == 0 {
                break;
            }

            let mut data = vec![0u8; len];
            if file.read_exact(&mut data).is_err() {
                break;
            }

            if compute_checksum(header.pos.get(), &data) != header.checksum.get() {
                break;
            }

            frames.push(UndoFrame {
                pos: header.pos.get(),
                data,
            });
        }

        Ok(frames)
    }

    /// Replays a leftover log onto `bytes` in reverse frame order.
    ///
    /// Returns the number of frames restored. The caller syncs the region
    /// and discards the log afterwards.
    pub fn recover<P: AsRef<Path>>(path: P, bytes: &mut [u8]) -> Result<usize> {
        let frames = Self::read_frames(path)?;

        for frame in frames.iter().rev() {
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

        Ok(frames.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn frames_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tx.undo");

        let mut log = UndoLog::create(&path).unwrap();
        log.append(100, b"hello").unwrap();
        log.append(300, b"world!").unwrap();

        let frames = UndoLog::read_frames(&path).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].pos, 100);
        assert_eq!(frames[0].data, b"hello");
        assert_eq!(frames[1].pos, 300);
        assert_eq!(frames[1].data, b"world!");
    }

    #[test]
    fn recover_restores_in_reverse_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tx.undo");

        // Two snapshots of the same range: the first (oldest) must win.
        let mut log = UndoLog::create(&path).unwrap();
        log.append(10, b"AAAA").unwrap();
        log.append(10, b"BBBB").unwrap();

        let mut bytes = vec![0u8; 64];
        let n = UndoLog::recover(&path, &mut bytes).unwrap();

        assert_eq!(n, 2);
        assert_eq!(&bytes[10..14], b"AAAA");
    }

    #[test]
    fn torn_tail_frame_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tx.undo");

        let mut log = UndoLog::create(&path).unwrap();
        log.append(10, b"good").unwrap();
        log.append(20, b"lost").unwrap();

        // Cut the file mid-way through the second frame.
        let full = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(full - 2).unwrap();

        let frames = UndoLog::read_frames(&path).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, b"good");
    }

    #[test]
    fn corrupted_frame_stops_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tx.undo");

        let mut log = UndoLog::create(&path).unwrap();
        log.append(10, b"good").unwrap();
        log.append(20, b"bad!").unwrap();

        // Flip a data byte in the second frame.
        let mut raw = std::fs::read(&path).unwrap();
        let second_data = UNDO_FRAME_HEADER_SIZE * 2 + 4;
        raw[second_data] ^= 0xFF;
        std::fs::write(&path, &raw).unwrap();

        let frames = UndoLog::read_frames(&path).unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn discard_empties_the_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tx.undo");

        let mut log = UndoLog::create(&path).unwrap();
        log.append(10, b"data").unwrap();
        log.discard().unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
        assert!(UndoLog::read_frames(&path).unwrap().is_empty());
    }
}

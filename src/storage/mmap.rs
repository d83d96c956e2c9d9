//! # Memory-Mapped Region File
//!
//! `MmapArena` maps a region file into the process address space and hands
//! out byte slices over it. All higher layers address the region by `u64`
//! position from the start of the file; nothing above this module touches the
//! mapping's virtual base, which is what lets the region move between runs.
//!
//! ## Safety Considerations
//!
//! A mapping becomes invalid when the file is grown and remapped. Instead of
//! hazard pointers or reference counting, the borrow checker enforces safety:
//!
//! ```text
//! bytes(&self) -> &[u8]          // Immutable borrow of self
//! bytes_mut(&mut self) -> &mut [u8]  // Mutable borrow of self
//! grow(&mut self)                // Mutable borrow (exclusive)
//! ```
//!
//! Since `grow()` takes `&mut self`, no slice into the old mapping can be
//! live when the remap happens. Zero runtime overhead, checked by rustc.
//!
//! ## File Format
//!
//! The file is sized in 4096-byte granules. The first 128 bytes hold the
//! region header; the rest is the allocation arena. Durability is `msync`
//! via `sync()`; write ordering against the undo log is the transaction
//! layer's responsibility.

use std::fs::{File, OpenOptions};
use std::path::Path;

use eyre::{ensure, Result, WrapErr};
use memmap2::MmapMut;

/// File sizes are kept to multiples of this.
pub const GRANULE: u64 = 4096;

#[derive(Debug)]
pub struct MmapArena {
    file: File,
    mmap: MmapMut,
    len: u64,
}

impl MmapArena {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open region file '{}'", path.display()))?;

        let metadata = file
            .metadata()
            .wrap_err_with(|| format!("failed to get metadata for '{}'", path.display()))?;

        let len = metadata.len();

        ensure!(
            len > 0,
            "cannot open empty region file '{}'",
            path.display()
        );

        ensure!(
            len % GRANULE == 0,
            "region file '{}' size {} is not a multiple of {}",
            path.display(),
            len,
            GRANULE
        );

        // SAFETY: MmapMut::map_mut is unsafe because memory-mapped files can
        // be modified externally. This is safe because:
        // 1. Region files are single-process by contract (callers provide
        //    mutual exclusion)
        // 2. The mmap lifetime is tied to MmapArena, preventing use-after-unmap
        // 3. All access goes through bytes()/bytes_mut(), bounds-checked slices
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
        };

        Ok(Self { file, mmap, len })
    }

    pub fn create<P: AsRef<Path>>(path: P, size: u64) -> Result<Self> {
        let path = path.as_ref();

        ensure!(size > 0, "initial region size must be nonzero");
        let len = size.div_ceil(GRANULE) * GRANULE;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .wrap_err_with(|| format!("failed to create region file '{}'", path.display()))?;

        file.set_len(len)
            .wrap_err_with(|| format!("failed to set region size to {} bytes", len))?;

        // SAFETY: same argument as in open(); additionally the file was just
        // created with truncate=true, so no other mapping exists.
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
        };

        Ok(Self { file, mmap, len })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.mmap[..]
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Grows the file to at least `new_len` bytes and remaps.
    pub fn grow(&mut self, new_len: u64) -> Result<()> {
        if new_len <= self.len {
            return Ok(());
        }

        let new_len = new_len.div_ceil(GRANULE) * GRANULE;

        self.mmap
            .flush()
            .wrap_err("failed to flush mmap before grow")?;

        self.file
            .set_len(new_len)
            .wrap_err_with(|| format!("failed to extend region file to {} bytes", new_len))?;

        // SAFETY: grow() holds &mut self, so no slice into the old mapping
        // is live; the old mmap was flushed and is dropped on reassignment.
        self.mmap = unsafe {
            MmapMut::map_mut(&self.file).wrap_err("failed to remap region file after grow")?
        };

        self.len = new_len;

        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.mmap.flush().wrap_err("failed to sync region to disk")
    }
}

//! Growable memory-mapped file.

use super::accessor::Accessor;
use super::allocator::Allocator;
use crate::error::{Result, StorageError};
use memmap2::MmapRaw;
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Mapping state shared by every guard handed out by a [`MemoryMap`].
pub(crate) struct Region {
    pub(super) file: Option<File>,
    pub(super) map: Option<MmapRaw>,
    /// Physical (mapped) size.
    pub(super) file_size: usize,
    /// Bytes in use. Never exceeds `file_size`.
    pub(super) logical_size: usize,
    pub(super) closed: bool,
    pub(super) stopped: bool,
    pub(super) halted: bool,
}

impl Region {
    /// Resize the backing file and map it again.
    ///
    /// Every pointer into the old mapping is invalid afterwards, which is why
    /// this only runs under the exclusive lock.
    pub(super) fn truncate_mapped(&mut self, size: usize) -> io::Result<()> {
        self.map = None;
        self.file_size = 0;

        let file = self
            .file
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file handle released"))?;
        file.set_len(size as u64)?;
        self.map = Some(MmapRaw::map_raw(file)?);
        self.file_size = size;
        Ok(())
    }
}

/// A file mapped into memory that grows on demand.
///
/// Reads and in-place writes go through shared [`Accessor`] guards. Growth
/// goes through an [`Allocator`] guard, which is exclusive against other
/// allocators and waits for all accessors to drain before it remaps.
pub struct MemoryMap {
    path: PathBuf,
    region: RwLock<Region>,
}

impl MemoryMap {
    /// Bind to a path. No I/O happens until [`MemoryMap::create`] or
    /// [`MemoryMap::start`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            region: RwLock::new(Region {
                file: None,
                map: None,
                file_size: 0,
                logical_size: 0,
                closed: true,
                stopped: true,
                halted: false,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // =========================================================================
    // Startup and shutdown
    // =========================================================================

    /// Create (or truncate) the backing file with a single byte, the smallest
    /// file that can be mapped.
    pub fn create(&self) -> Result<()> {
        if !self.region.read().closed {
            return Err(StorageError::AlreadyStarted(self.path.clone()));
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|err| StorageError::io("create", &self.path, err))?;
        file.set_len(1)
            .and_then(|_| file.sync_all())
            .map_err(|err| StorageError::io("initialize", &self.path, err))?;
        Ok(())
    }

    /// Open and map an existing file. Not idempotent.
    pub fn start(&self) -> Result<()> {
        let region = self.region.upgradable_read();
        if !region.stopped {
            return Err(StorageError::AlreadyStarted(self.path.clone()));
        }

        let mut region = RwLockUpgradableReadGuard::upgrade(region);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|err| StorageError::io("open", &self.path, err))?;
        let size = file
            .metadata()
            .map_err(|err| StorageError::io("stat", &self.path, err))?
            .len() as usize;
        if size == 0 {
            return Err(StorageError::corrupt(&self.path, "file is empty"));
        }

        let map = MmapRaw::map_raw(&file).map_err(|err| StorageError::io("map", &self.path, err))?;
        region.file = Some(file);
        region.map = Some(map);
        region.file_size = size;
        region.logical_size = size;
        region.closed = false;
        region.stopped = false;
        region.halted = false;
        drop(region);

        debug!(path = %self.path.display(), size, "Mapping");
        Ok(())
    }

    /// Signal stop. Idempotent; the mapping stays valid until `close`.
    pub fn stop(&self) {
        self.region.write().stopped = true;
    }

    pub fn stopped(&self) -> bool {
        self.region.read().stopped
    }

    /// Flush, unmap and truncate the file to its logical size. Idempotent.
    ///
    /// Threads using the map must have been joined first.
    pub fn close(&self) -> Result<()> {
        let region = self.region.upgradable_read();
        if region.closed {
            return Ok(());
        }

        let mut region = RwLockUpgradableReadGuard::upgrade(region);
        region.closed = true;
        region.stopped = true;
        let logical_size = region.logical_size;

        if let Some(map) = region.map.take() {
            map.flush()
                .map_err(|err| StorageError::io("flush", &self.path, err))?;
        }
        region.file_size = 0;

        if let Some(file) = region.file.take() {
            file.set_len(logical_size as u64)
                .map_err(|err| StorageError::io("truncate", &self.path, err))?;
            file.sync_all()
                .map_err(|err| StorageError::io("sync", &self.path, err))?;
        }
        drop(region);

        debug!(path = %self.path.display(), size = logical_size, "Unmapped");
        Ok(())
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Physical size of the mapping.
    pub fn size(&self) -> usize {
        self.region.read().file_size
    }

    /// Bytes in use.
    pub fn logical_size(&self) -> usize {
        self.region.read().logical_size
    }

    /// Shared access to the mapped bytes.
    pub fn access(&self) -> Result<Accessor<'_>> {
        let region = self.region.read();
        if region.closed {
            return Err(StorageError::Closed(self.path.clone()));
        }
        if region.map.is_none() {
            return Err(StorageError::Halted(self.path.clone()));
        }
        Ok(Accessor::new(region))
    }

    /// Take the growth lock.
    pub fn allocate(&self) -> Result<Allocator<'_>> {
        let region = self.region.upgradable_read();
        if region.closed {
            return Err(StorageError::Closed(self.path.clone()));
        }
        if region.halted {
            return Err(StorageError::Halted(self.path.clone()));
        }
        Ok(Allocator::new(&self.path, region))
    }

    /// Grow the logical size to `size`, mapping exactly that much if needed.
    pub fn resize(&self, size: usize) -> Result<Accessor<'_>> {
        self.allocate()?.resize(size)
    }

    /// Grow the logical size to `size`, over-allocating if the file must grow.
    pub fn reserve(&self, size: usize) -> Result<Accessor<'_>> {
        self.allocate()?.reserve(size)
    }

    /// Flush dirty pages to disk.
    pub fn flush(&self) -> Result<()> {
        let region = self.region.read();
        match region.map.as_ref() {
            Some(map) => map
                .flush()
                .map_err(|err| StorageError::io("flush", &self.path, err)),
            None => Err(StorageError::Closed(self.path.clone())),
        }
    }
}

impl Drop for MemoryMap {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            error!(path = %self.path.display(), %err, "Failed to close mapped file");
        }
    }
}

//! Exclusive growth guard for a mapped file.

use super::accessor::Accessor;
use super::map::Region;
use crate::error::{Result, StorageError};
use parking_lot::{RwLockUpgradableReadGuard, RwLockWriteGuard};
use std::path::Path;
use tracing::{debug, error};

/// Over-allocation applied when a reserve must grow the file, in percent.
const EXPANSION_NUMERATOR: usize = 150;
const EXPANSION_DENOMINATOR: usize = 100;

/// The growth lock of a [`MemoryMap`](super::MemoryMap).
///
/// Only one allocator exists at a time. Readers keep running until a remap is
/// actually needed; the remap itself happens under the exclusive lock and the
/// caller gets its buffer back only after the lock is downgraded to shared.
pub struct Allocator<'a> {
    path: &'a Path,
    region: RwLockUpgradableReadGuard<'a, Region>,
}

impl<'a> Allocator<'a> {
    pub(super) fn new(path: &'a Path, region: RwLockUpgradableReadGuard<'a, Region>) -> Self {
        Self { path, region }
    }

    /// Physical size of the mapping.
    pub fn size(&self) -> usize {
        self.region.file_size
    }

    pub fn logical_size(&self) -> usize {
        self.region.logical_size
    }

    /// Ensure `size` logical bytes, growing the file by half again if it is
    /// too small.
    pub fn reserve(self, size: usize) -> Result<Accessor<'a>> {
        self.grow(size, EXPANSION_NUMERATOR)
    }

    /// Ensure `size` logical bytes, growing the file to exactly `size`.
    pub fn resize(self, size: usize) -> Result<Accessor<'a>> {
        self.grow(size, EXPANSION_DENOMINATOR)
    }

    fn grow(self, size: usize, expansion: usize) -> Result<Accessor<'a>> {
        let Self { path, region } = self;

        if size <= region.logical_size {
            return Ok(Accessor::new(RwLockUpgradableReadGuard::downgrade(region)));
        }

        let mut region = RwLockUpgradableReadGuard::upgrade(region);
        if size > region.file_size {
            let target = size.saturating_mul(expansion) / EXPANSION_DENOMINATOR;
            debug!(path = %path.display(), size = target, "Resizing");

            // Other files may already hold writes that depend on this one,
            // so there is no rolling back from here: refuse further growth.
            if let Err(err) = region.truncate_mapped(target) {
                region.halted = true;
                error!(path = %path.display(), %err, "Resize failed, disk space may be low");
                return Err(StorageError::io("resize", path, err));
            }
        }

        region.logical_size = size;
        Ok(Accessor::new(RwLockWriteGuard::downgrade(region)))
    }
}

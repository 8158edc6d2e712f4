//! Shared view into a mapped file.

use super::map::Region;
use crate::error::{Result, StorageError};
use parking_lot::RwLockReadGuard;

/// A window onto mapped bytes, valid for as long as the guard lives.
///
/// Holding an accessor pins the mapping: no remap can happen until it is
/// dropped. A thread must therefore drop its accessors on a file before it
/// allocates on that file, or the allocation waits on itself.
pub struct Accessor<'a> {
    region: RwLockReadGuard<'a, Region>,
    start: usize,
    end: usize,
}

impl<'a> Accessor<'a> {
    pub(super) fn new(region: RwLockReadGuard<'a, Region>) -> Self {
        let end = region.logical_size;
        Self {
            region,
            start: 0,
            end,
        }
    }

    /// Narrow the view to `len` bytes at `offset` past its current start.
    pub fn slice(self, offset: usize, len: usize) -> Result<Self> {
        let start = self.start.saturating_add(offset);
        let end = start.saturating_add(len);
        if end > self.end {
            return Err(StorageError::OutOfBounds {
                offset: start,
                len,
                size: self.end,
            });
        }
        Ok(Self { start, end, ..self })
    }

    /// Advance the start of the view by `offset`, keeping its end.
    pub fn offset(self, offset: usize) -> Result<Self> {
        let len = self
            .end
            .checked_sub(self.start.saturating_add(offset))
            .ok_or(StorageError::OutOfBounds {
                offset: self.start.saturating_add(offset),
                len: 0,
                size: self.end,
            })?;
        self.slice(offset, len)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn as_slice(&self) -> &[u8] {
        match self.region.map.as_ref() {
            // SAFETY: start..end lies within the logical size, which never
            // exceeds the mapped length, and the read guard keeps the mapping
            // from being replaced while the slice is borrowed.
            Some(map) => unsafe {
                std::slice::from_raw_parts(map.as_ptr().add(self.start), self.len())
            },
            None => &[],
        }
    }

    /// Mutable view of the window.
    ///
    /// Writers only ever touch ranges the record and slab managers handed to
    /// them exclusively, so concurrent accessors never write the same bytes.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self.region.map.as_ref() {
            // SAFETY: bounds as in `as_slice`; exclusivity of the range is
            // upheld by the allocating manager.
            Some(map) => unsafe {
                std::slice::from_raw_parts_mut(map.as_mut_ptr().add(self.start), self.len())
            },
            None => &mut [],
        }
    }
}

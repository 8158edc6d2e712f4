//! Fixed-size record allocation.
//!
//! ```text
//! [ header       ]
//! [ count: u32   ]
//! [ record 0     ]
//! [ ...          ]
//! ```

use super::{ArrayIndex, Link};
use crate::error::{Result, StorageError};
use crate::memory::{Accessor, MemoryMap};
use parking_lot::RwLock;
use std::sync::Arc;

const COUNT_SIZE: usize = 4;

/// Hands out numbered, fixed-width slots after a caller-defined header.
///
/// Records are never freed one by one; `set_count` truncates the tail.
pub struct RecordManager {
    file: Arc<MemoryMap>,
    header_size: usize,
    record_size: usize,
    count: RwLock<ArrayIndex>,
}

impl RecordManager {
    pub fn new(file: Arc<MemoryMap>, header_size: usize, record_size: usize) -> Self {
        Self {
            file,
            header_size,
            record_size,
            count: RwLock::new(0),
        }
    }

    /// Size the file for an empty manager and persist a zero count.
    pub fn create(&self) -> Result<()> {
        let count = self.count.write();
        if *count != 0 {
            return Err(StorageError::AlreadyExists(format!(
                "{} records in {}",
                *count,
                self.file.path().display()
            )));
        }

        drop(self.file.resize(self.header_size + self.record_to_position(0))?);
        self.write_count(*count)
    }

    /// Load the persisted count.
    pub fn start(&self) -> Result<()> {
        let mut count = self.count.write();
        let persisted = self.read_count()?;

        let minimum = self.header_size + self.record_to_position(persisted);
        if minimum > self.file.size() {
            return Err(StorageError::corrupt(
                self.file.path(),
                format!("{} records need {} bytes", persisted, minimum),
            ));
        }

        *count = persisted;
        Ok(())
    }

    /// Persist the count.
    pub fn sync(&self) -> Result<()> {
        let count = self.count.write();
        self.write_count(*count)
    }

    pub fn count(&self) -> ArrayIndex {
        *self.count.read()
    }

    /// Move the logical end back to `value`. Truncated records are not
    /// scrubbed, only forgotten.
    pub fn set_count(&self, value: ArrayIndex) -> Result<()> {
        let mut count = self.count.write();
        if value > *count {
            return Err(StorageError::InvalidCount {
                count: *count,
                requested: value,
            });
        }
        *count = value;
        Ok(())
    }

    /// Reserve `records` contiguous slots and return the first index.
    ///
    /// Concurrent callers always receive disjoint ranges.
    pub fn new_records(&self, records: ArrayIndex) -> Result<ArrayIndex> {
        let mut count = self.count.write();
        let next = *count;
        let total = next
            .checked_add(records)
            .filter(|total| *total != ArrayIndex::EMPTY)
            .ok_or(StorageError::InvalidCount {
                count: next,
                requested: next.saturating_add(records),
            })?;

        drop(self.file.reserve(self.header_size + self.record_to_position(total))?);
        *count = total;
        Ok(next)
    }

    /// The bytes of one record. Fails past the logical end.
    pub fn get(&self, index: ArrayIndex) -> Result<Accessor<'_>> {
        let count = self.count();
        if index >= count {
            return Err(StorageError::OutOfBounds {
                offset: index as usize,
                len: 1,
                size: count as usize,
            });
        }

        self.file
            .access()?
            .slice(self.header_size + self.record_to_position(index), self.record_size)
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn file(&self) -> &Arc<MemoryMap> {
        &self.file
    }

    fn record_to_position(&self, index: ArrayIndex) -> usize {
        COUNT_SIZE + index as usize * self.record_size
    }

    fn read_count(&self) -> Result<ArrayIndex> {
        let accessor = self
            .file
            .access()?
            .slice(self.header_size, COUNT_SIZE)
            .map_err(|_| StorageError::corrupt(self.file.path(), "missing record count"))?;
        Ok(ArrayIndex::read(accessor.as_slice()))
    }

    fn write_count(&self, count: ArrayIndex) -> Result<()> {
        let mut accessor = self.file.access()?.slice(self.header_size, COUNT_SIZE)?;
        count.write(accessor.as_mut_slice());
        Ok(())
    }
}

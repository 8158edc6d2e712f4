//! Variable-size slab allocation.
//!
//! ```text
//! [ header             ]
//! [ payload_size: u64  ]  <- offset 0, counts itself
//! [ slab at offset 8   ]
//! [ ...                ]
//! ```

use super::{FileOffset, Link};
use crate::error::{Result, StorageError};
use crate::memory::{Accessor, MemoryMap};
use parking_lot::RwLock;
use std::sync::Arc;

const SIZE_FIELD: FileOffset = 8;

/// Appends variable-size slabs after a caller-defined header.
///
/// Slab offsets are relative to the end of the header. The payload size
/// includes its own eight bytes, so the first slab sits at offset 8 and
/// offset 0 never names a slab.
pub struct SlabManager {
    file: Arc<MemoryMap>,
    header_size: usize,
    payload_size: RwLock<FileOffset>,
}

impl SlabManager {
    pub fn new(file: Arc<MemoryMap>, header_size: usize) -> Self {
        Self {
            file,
            header_size,
            payload_size: RwLock::new(SIZE_FIELD),
        }
    }

    pub fn create(&self) -> Result<()> {
        let payload_size = self.payload_size.write();
        if *payload_size != SIZE_FIELD {
            return Err(StorageError::AlreadyExists(format!(
                "{} slab bytes in {}",
                *payload_size,
                self.file.path().display()
            )));
        }

        drop(self.file.resize(self.header_size + SIZE_FIELD as usize)?);
        self.write_size(*payload_size)
    }

    pub fn start(&self) -> Result<()> {
        let mut payload_size = self.payload_size.write();
        let persisted = self.read_size()?;

        if persisted < SIZE_FIELD {
            return Err(StorageError::corrupt(
                self.file.path(),
                format!("payload size {} below minimum", persisted),
            ));
        }
        let minimum = self.header_size as u64 + persisted;
        if minimum > self.file.size() as u64 {
            return Err(StorageError::corrupt(
                self.file.path(),
                format!("payload of {} bytes needs {} bytes", persisted, minimum),
            ));
        }

        *payload_size = persisted;
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        let payload_size = self.payload_size.write();
        self.write_size(*payload_size)
    }

    pub fn payload_size(&self) -> FileOffset {
        *self.payload_size.read()
    }

    /// Reserve `size` bytes and return their offset.
    pub fn new_slab(&self, size: usize) -> Result<FileOffset> {
        let mut payload_size = self.payload_size.write();
        let offset = *payload_size;
        let total = offset + size as FileOffset;

        drop(self.file.reserve(self.header_size + total as usize)?);
        *payload_size = total;
        Ok(offset)
    }

    /// The bytes from a slab to the end of the payload.
    ///
    /// Slabs do not record their length; readers know their own framing.
    pub fn get(&self, offset: FileOffset) -> Result<Accessor<'_>> {
        let payload_size = self.payload_size();
        if offset < SIZE_FIELD || offset >= payload_size {
            return Err(StorageError::OutOfBounds {
                offset: offset as usize,
                len: 0,
                size: payload_size as usize,
            });
        }

        self.file.access()?.slice(
            self.header_size + offset as usize,
            (payload_size - offset) as usize,
        )
    }

    pub fn file(&self) -> &Arc<MemoryMap> {
        &self.file
    }

    fn read_size(&self) -> Result<FileOffset> {
        let accessor = self
            .file
            .access()?
            .slice(self.header_size, SIZE_FIELD as usize)
            .map_err(|_| StorageError::corrupt(self.file.path(), "missing payload size"))?;
        Ok(FileOffset::read(accessor.as_slice()))
    }

    fn write_size(&self, size: FileOffset) -> Result<()> {
        let mut accessor = self
            .file
            .access()?
            .slice(self.header_size, SIZE_FIELD as usize)?;
        size.write(accessor.as_mut_slice());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(dir: &tempfile::TempDir) -> SlabManager {
        let file = Arc::new(MemoryMap::new(dir.path().join("slabs")));
        file.create().unwrap();
        file.start().unwrap();
        let manager = SlabManager::new(file, 0);
        manager.create().unwrap();
        manager
    }

    #[test]
    fn test_first_slab_follows_size_field() {
        let dir = tempfile::tempdir().unwrap();
        let manager = setup(&dir);

        assert_eq!(manager.payload_size(), 8);
        assert_eq!(manager.new_slab(10).unwrap(), 8);
        assert_eq!(manager.new_slab(5).unwrap(), 18);
        assert_eq!(manager.payload_size(), 23);
    }

    #[test]
    fn test_get_spans_to_payload_end() {
        let dir = tempfile::tempdir().unwrap();
        let manager = setup(&dir);

        let first = manager.new_slab(3).unwrap();
        manager.get(first).unwrap().as_mut_slice()[..3].copy_from_slice(b"abc");
        let second = manager.new_slab(2).unwrap();

        assert_eq!(manager.get(first).unwrap().len(), 5);
        assert_eq!(&manager.get(first).unwrap().as_slice()[..3], b"abc");
        assert_eq!(manager.get(second).unwrap().len(), 2);
    }

    #[test]
    fn test_get_rejects_invalid_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let manager = setup(&dir);
        manager.new_slab(4).unwrap();

        assert!(matches!(manager.get(0), Err(StorageError::OutOfBounds { .. })));
        assert!(matches!(manager.get(12), Err(StorageError::OutOfBounds { .. })));
    }

    #[test]
    fn test_payload_size_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slabs");
        {
            let manager = setup(&dir);
            manager.new_slab(100).unwrap();
            manager.sync().unwrap();
        }

        let file = Arc::new(MemoryMap::new(&path));
        file.start().unwrap();
        let manager = SlabManager::new(file, 0);
        manager.start().unwrap();
        assert_eq!(manager.payload_size(), 108);
        assert_eq!(manager.new_slab(1).unwrap(), 108);
    }
}

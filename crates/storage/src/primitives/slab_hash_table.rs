//! Hash table of variable-size elements.
//!
//! ```text
//! element: [ key: KEY ][ next: u64 ][ value ]
//! ```

use super::{bucket_index, hash_table_header_size, FileOffset, HashTableHeader, Link, SlabManager};
use crate::error::{Result, StorageError};
use crate::memory::{Accessor, MemoryMap};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Slab size for an element with `KEY`-byte key and `value_size`-byte value.
pub const fn slab_hash_table_size(key_size: usize, value_size: usize) -> usize {
    key_size + <FileOffset as Link>::SIZE + value_size
}

/// Open-chained hash table whose elements are slabs.
///
/// Chaining and visibility follow [`RecordHashTable`](super::RecordHashTable).
/// Values carry their own framing; `get` returns everything from the value
/// to the end of the payload.
pub struct SlabHashTable<const KEY: usize> {
    header: HashTableHeader<FileOffset>,
    manager: SlabManager,
    buckets: u32,
    chains: Mutex<()>,
    /// Shared while walking a chain, exclusive while `remove` rewrites a link.
    links: RwLock<()>,
}

impl<const KEY: usize> SlabHashTable<KEY> {
    pub fn new(file: Arc<MemoryMap>, buckets: u32) -> Self {
        let header_size = hash_table_header_size::<FileOffset>(buckets);
        Self {
            header: HashTableHeader::new(Arc::clone(&file)),
            manager: SlabManager::new(file, header_size),
            buckets,
            chains: Mutex::new(()),
            links: RwLock::new(()),
        }
    }

    pub fn create(&self) -> Result<()> {
        self.header.create(self.buckets)?;
        self.manager.create()
    }

    pub fn start(&self) -> Result<()> {
        self.header.start()?;
        if self.header.size() != self.buckets {
            return Err(StorageError::corrupt(
                self.manager.file().path(),
                format!("expected {} buckets, found {}", self.buckets, self.header.size()),
            ));
        }
        self.manager.start()
    }

    pub fn sync(&self) -> Result<()> {
        self.manager.sync()
    }

    /// Insert an element with a `value_size`-byte value written by `write`.
    /// Returns the element's offset.
    pub fn store<F>(&self, key: &[u8; KEY], value_size: usize, write: F) -> Result<FileOffset>
    where
        F: FnOnce(&mut [u8]),
    {
        let bucket = bucket_index(key, self.buckets);
        let size = slab_hash_table_size(KEY, value_size);
        let _chains = self.chains.lock();

        let offset = self.manager.new_slab(size)?;
        let head = self.header.read(bucket)?;
        {
            let mut slab = self.manager.get(offset)?.slice(0, size)?;
            let buffer = slab.as_mut_slice();
            buffer[..KEY].copy_from_slice(key);
            head.write(&mut buffer[KEY..KEY + FileOffset::SIZE]);
            write(&mut buffer[KEY + FileOffset::SIZE..]);
        }
        self.header.write(bucket, offset)?;
        Ok(offset)
    }

    /// Value of the most recent element stored under `key`.
    pub fn get(&self, key: &[u8; KEY]) -> Result<Option<Accessor<'_>>> {
        let _links = self.links.read();
        let mut current = self.header.read(bucket_index(key, self.buckets))?;

        while current != FileOffset::EMPTY {
            let slab = self.manager.get(current)?;
            let (matched, next) = {
                let buffer = slab.as_slice();
                (&buffer[..KEY] == key, FileOffset::read(&buffer[KEY..]))
            };
            if matched {
                return slab.offset(KEY + FileOffset::SIZE).map(Some);
            }
            current = next;
        }
        Ok(None)
    }

    /// Value at a known element offset, as returned by `store`.
    pub fn get_at(&self, offset: FileOffset) -> Result<Accessor<'_>> {
        self.manager.get(offset)?.offset(KEY + FileOffset::SIZE)
    }

    /// Key at a known element offset.
    pub fn key_at(&self, offset: FileOffset) -> Result<[u8; KEY]> {
        let slab = self.manager.get(offset)?.slice(0, KEY)?;
        let mut key = [0u8; KEY];
        key.copy_from_slice(slab.as_slice());
        Ok(key)
    }

    /// Unlink the most recent element stored under `key`.
    pub fn remove(&self, key: &[u8; KEY]) -> Result<bool> {
        let bucket = bucket_index(key, self.buckets);
        let _chains = self.chains.lock();

        let mut previous: Option<FileOffset> = None;
        let mut current = self.header.read(bucket)?;

        while current != FileOffset::EMPTY {
            let (matched, next) = {
                let slab = self.manager.get(current)?;
                let buffer = slab.as_slice();
                (&buffer[..KEY] == key, FileOffset::read(&buffer[KEY..]))
            };
            if matched {
                match previous {
                    None => self.header.write(bucket, next)?,
                    Some(previous) => {
                        let _links = self.links.write();
                        let mut slab = self.manager.get(previous)?;
                        next.write(&mut slab.as_mut_slice()[KEY..]);
                    }
                }
                return Ok(true);
            }
            previous = Some(current);
            current = next;
        }
        Ok(false)
    }

    pub fn payload_size(&self) -> FileOffset {
        self.manager.payload_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(dir: &tempfile::TempDir, buckets: u32) -> SlabHashTable<8> {
        let file = Arc::new(MemoryMap::new(dir.path().join("slabs")));
        file.create().unwrap();
        file.start().unwrap();
        let table = SlabHashTable::new(file, buckets);
        table.create().unwrap();
        table
    }

    fn store(table: &SlabHashTable<8>, key: u64, value: &[u8]) -> FileOffset {
        table
            .store(&key.to_le_bytes(), value.len(), |buffer| buffer.copy_from_slice(value))
            .unwrap()
    }

    fn get(table: &SlabHashTable<8>, key: u64, len: usize) -> Option<Vec<u8>> {
        table
            .get(&key.to_le_bytes())
            .unwrap()
            .map(|value| value.as_slice()[..len].to_vec())
    }

    #[test]
    fn test_variable_sized_values() {
        let dir = tempfile::tempdir().unwrap();
        let table = setup(&dir, 10);

        let first = store(&table, 1, b"short");
        store(&table, 2, b"a somewhat longer value");

        assert_eq!(first, 8);
        assert_eq!(get(&table, 1, 5).unwrap(), b"short");
        assert_eq!(get(&table, 2, 23).unwrap(), b"a somewhat longer value");
        assert_eq!(get(&table, 3, 0), None);

        assert_eq!(&table.get_at(first).unwrap().as_slice()[..5], b"short");
        assert_eq!(table.key_at(first).unwrap(), 1u64.to_le_bytes());
    }

    #[test]
    fn test_remove_relinks_chain() {
        let dir = tempfile::tempdir().unwrap();
        let table = setup(&dir, 1);

        for key in 0..5u64 {
            store(&table, key, &[key as u8; 3]);
        }
        assert!(table.remove(&2u64.to_le_bytes()).unwrap());
        assert!(table.remove(&4u64.to_le_bytes()).unwrap());
        assert!(!table.remove(&4u64.to_le_bytes()).unwrap());

        assert_eq!(get(&table, 2, 3), None);
        assert_eq!(get(&table, 4, 3), None);
        for key in [0u64, 1, 3] {
            assert_eq!(get(&table, key, 3).unwrap(), vec![key as u8; 3]);
        }
    }

    #[test]
    fn test_values_survive_growth() {
        let dir = tempfile::tempdir().unwrap();
        let table = setup(&dir, 4);

        let value = vec![0xAB; 1000];
        for key in 0..50u64 {
            store(&table, key, &value);
        }
        for key in 0..50u64 {
            assert_eq!(get(&table, key, 1000).unwrap(), value);
        }
    }

    #[test]
    fn test_lookups_during_removes() {
        let dir = tempfile::tempdir().unwrap();
        let table = setup(&dir, 1);

        store(&table, u64::MAX, b"tail");
        for key in 0..200u64 {
            store(&table, key, &[key as u8; 2]);
        }

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for key in (0..200u64).step_by(3) {
                    assert!(table.remove(&key.to_le_bytes()).unwrap());
                }
            });
            for _ in 0..200 {
                assert_eq!(get(&table, u64::MAX, 4).unwrap(), b"tail");
            }
        });

        assert_eq!(get(&table, 3, 2), None);
        assert_eq!(get(&table, 4, 2).unwrap(), vec![4u8; 2]);
    }
}

//! Hash table of fixed-size elements.
//!
//! ```text
//! element: [ key: KEY ][ next: u32 ][ value ]
//! ```

use super::{bucket_index, hash_table_header_size, ArrayIndex, HashTableHeader, Link, RecordManager};
use crate::error::{Result, StorageError};
use crate::memory::{Accessor, MemoryMap};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Record size for a table with `KEY`-byte keys and `value_size`-byte values.
pub const fn record_hash_table_size(key_size: usize, value_size: usize) -> usize {
    key_size + <ArrayIndex as Link>::SIZE + value_size
}

/// Open-chained hash table whose elements are records.
///
/// New elements are prepended to their bucket, so a lookup finds the most
/// recent element stored under a key. Lookups do not wait for `store`: an
/// element is fully written before the bucket head points at it. A `remove`
/// that relinks the middle of a chain waits for lookups walking chains.
pub struct RecordHashTable<const KEY: usize> {
    header: HashTableHeader<ArrayIndex>,
    manager: RecordManager,
    buckets: u32,
    chains: Mutex<()>,
    /// Shared while walking a chain, exclusive while `remove` rewrites a link.
    links: RwLock<()>,
}

impl<const KEY: usize> RecordHashTable<KEY> {
    pub fn new(file: Arc<MemoryMap>, buckets: u32, value_size: usize) -> Self {
        let header_size = hash_table_header_size::<ArrayIndex>(buckets);
        Self {
            header: HashTableHeader::new(Arc::clone(&file)),
            manager: RecordManager::new(file, header_size, record_hash_table_size(KEY, value_size)),
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

    /// Insert an element and let `write` fill its value.
    ///
    /// Keys are not deduplicated: storing a key twice shadows the older
    /// element until the newer one is removed.
    pub fn store<F>(&self, key: &[u8; KEY], write: F) -> Result<ArrayIndex>
    where
        F: FnOnce(&mut [u8]),
    {
        let bucket = bucket_index(key, self.buckets);
        let _chains = self.chains.lock();

        let index = self.manager.new_records(1)?;
        let head = self.header.read(bucket)?;
        {
            let mut record = self.manager.get(index)?;
            let buffer = record.as_mut_slice();
            buffer[..KEY].copy_from_slice(key);
            head.write(&mut buffer[KEY..KEY + ArrayIndex::SIZE]);
            write(&mut buffer[KEY + ArrayIndex::SIZE..]);
        }
        self.header.write(bucket, index)?;
        Ok(index)
    }

    /// Value of the most recent element stored under `key`.
    pub fn get(&self, key: &[u8; KEY]) -> Result<Option<Accessor<'_>>> {
        let _links = self.links.read();
        let mut current = self.header.read(bucket_index(key, self.buckets))?;

        while current != ArrayIndex::EMPTY {
            let record = self.manager.get(current)?;
            let (matched, next) = {
                let buffer = record.as_slice();
                (&buffer[..KEY] == key, ArrayIndex::read(&buffer[KEY..]))
            };
            if matched {
                return record.offset(KEY + ArrayIndex::SIZE).map(Some);
            }
            current = next;
        }
        Ok(None)
    }

    /// Unlink the most recent element stored under `key`.
    ///
    /// The record itself is not reclaimed.
    pub fn remove(&self, key: &[u8; KEY]) -> Result<bool> {
        let bucket = bucket_index(key, self.buckets);
        let _chains = self.chains.lock();

        let mut previous: Option<ArrayIndex> = None;
        let mut current = self.header.read(bucket)?;

        while current != ArrayIndex::EMPTY {
            let (matched, next) = self.read_element(current, key)?;
            if matched {
                match previous {
                    None => self.header.write(bucket, next)?,
                    Some(previous) => {
                        let _links = self.links.write();
                        let mut record = self.manager.get(previous)?;
                        next.write(&mut record.as_mut_slice()[KEY..]);
                    }
                }
                return Ok(true);
            }
            previous = Some(current);
            current = next;
        }
        Ok(false)
    }

    /// Elements ever allocated, removed ones included.
    pub fn count(&self) -> ArrayIndex {
        self.manager.count()
    }

    fn read_element(&self, index: ArrayIndex, key: &[u8; KEY]) -> Result<(bool, ArrayIndex)> {
        let record = self.manager.get(index)?;
        let buffer = record.as_slice();
        Ok((&buffer[..KEY] == key, ArrayIndex::read(&buffer[KEY..])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(dir: &tempfile::TempDir, buckets: u32) -> RecordHashTable<4> {
        let file = Arc::new(MemoryMap::new(dir.path().join("table")));
        file.create().unwrap();
        file.start().unwrap();
        let table = RecordHashTable::new(file, buckets, 8);
        table.create().unwrap();
        table
    }

    fn store(table: &RecordHashTable<4>, key: &[u8; 4], value: u64) {
        table
            .store(key, |buffer| buffer.copy_from_slice(&value.to_le_bytes()))
            .unwrap();
    }

    fn get(table: &RecordHashTable<4>, key: &[u8; 4]) -> Option<u64> {
        table.get(key).unwrap().map(|value| u64::read(value.as_slice()))
    }

    #[test]
    fn test_store_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let table = setup(&dir, 100);

        store(&table, b"abcd", 1);
        store(&table, b"efgh", 2);

        assert_eq!(get(&table, b"abcd"), Some(1));
        assert_eq!(get(&table, b"efgh"), Some(2));
        assert_eq!(get(&table, b"ijkl"), None);
    }

    #[test]
    fn test_single_bucket_chains() {
        let dir = tempfile::tempdir().unwrap();
        let table = setup(&dir, 1);

        for value in 0..20u64 {
            store(&table, &(value as u32).to_le_bytes(), value);
        }
        for value in 0..20u64 {
            assert_eq!(get(&table, &(value as u32).to_le_bytes()), Some(value));
        }

        // Remove from the middle, the head and the tail of the chain.
        assert!(table.remove(&10u32.to_le_bytes()).unwrap());
        assert!(table.remove(&19u32.to_le_bytes()).unwrap());
        assert!(table.remove(&0u32.to_le_bytes()).unwrap());
        assert!(!table.remove(&10u32.to_le_bytes()).unwrap());

        assert_eq!(get(&table, &10u32.to_le_bytes()), None);
        assert_eq!(get(&table, &9u32.to_le_bytes()), Some(9));
        assert_eq!(get(&table, &11u32.to_le_bytes()), Some(11));
        assert_eq!(get(&table, &1u32.to_le_bytes()), Some(1));
    }

    #[test]
    fn test_newer_element_shadows_older() {
        let dir = tempfile::tempdir().unwrap();
        let table = setup(&dir, 8);

        store(&table, b"same", 1);
        store(&table, b"same", 2);
        assert_eq!(get(&table, b"same"), Some(2));

        assert!(table.remove(b"same").unwrap());
        assert_eq!(get(&table, b"same"), Some(1));
        assert_eq!(table.count(), 2);
    }

    #[test]
    fn test_reopen_checks_bucket_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table");
        {
            let table = setup(&dir, 16);
            store(&table, b"keep", 42);
            table.sync().unwrap();
        }

        let file = Arc::new(MemoryMap::new(&path));
        file.start().unwrap();
        let table = RecordHashTable::<4>::new(Arc::clone(&file), 16, 8);
        table.start().unwrap();
        assert_eq!(get(&table, b"keep"), Some(42));

        let mismatched = RecordHashTable::<4>::new(file, 32, 8);
        assert!(matches!(
            mismatched.start(),
            Err(StorageError::CorruptHeader { .. })
        ));
    }

    #[test]
    fn test_lookups_during_removes() {
        let dir = tempfile::tempdir().unwrap();
        let table = setup(&dir, 1);

        // The anchor sits at the tail, behind every element removed below.
        store(&table, b"tail", 7);
        for value in 0..200u32 {
            store(&table, &value.to_le_bytes(), u64::from(value));
        }

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for value in (0..200u32).filter(|value| value % 2 == 0) {
                    assert!(table.remove(&value.to_le_bytes()).unwrap());
                }
            });
            for _ in 0..200 {
                assert_eq!(get(&table, b"tail"), Some(7));
            }
        });

        assert_eq!(get(&table, &4u32.to_le_bytes()), None);
        assert_eq!(get(&table, &5u32.to_le_bytes()), Some(5));
    }
}

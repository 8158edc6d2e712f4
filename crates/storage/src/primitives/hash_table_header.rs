//! Bucket array at the front of a hash table file.
//!
//! ```text
//! [ bucket_count: u32 ]
//! [ head 0: Link      ]
//! [ ...               ]
//! ```

use super::Link;
use crate::error::{Result, StorageError};
use crate::memory::MemoryMap;
use parking_lot::RwLock;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const COUNT_SIZE: usize = 4;

/// Bytes taken by a header with `buckets` heads of type `L`.
pub fn hash_table_header_size<L: Link>(buckets: u32) -> usize {
    COUNT_SIZE + L::SIZE * buckets as usize
}

/// Chain heads of a hash table, one per bucket.
pub struct HashTableHeader<L: Link> {
    file: Arc<MemoryMap>,
    buckets: AtomicU32,
    heads: RwLock<()>,
    _link: PhantomData<L>,
}

impl<L: Link> HashTableHeader<L> {
    pub fn new(file: Arc<MemoryMap>) -> Self {
        Self {
            file,
            buckets: AtomicU32::new(0),
            heads: RwLock::new(()),
            _link: PhantomData,
        }
    }

    /// Size the file for `buckets` heads, all empty.
    pub fn create(&self, buckets: u32) -> Result<()> {
        if buckets == 0 {
            return Err(StorageError::InvalidData(format!(
                "hash table {} needs at least one bucket",
                self.file.path().display()
            )));
        }

        let _heads = self.heads.write();
        let size = hash_table_header_size::<L>(buckets);

        let mut accessor = self.file.resize(size)?.slice(0, size)?;
        let buffer = accessor.as_mut_slice();
        buckets.write(&mut buffer[..COUNT_SIZE]);
        for head in buffer[COUNT_SIZE..].chunks_exact_mut(L::SIZE) {
            L::EMPTY.write(head);
        }

        self.buckets.store(buckets, Ordering::Release);
        Ok(())
    }

    /// Load the bucket count and check that the file holds every head.
    pub fn start(&self) -> Result<()> {
        let _heads = self.heads.write();
        let buckets = {
            let accessor = self
                .file
                .access()?
                .slice(0, COUNT_SIZE)
                .map_err(|_| StorageError::corrupt(self.file.path(), "missing bucket count"))?;
            u32::read(accessor.as_slice())
        };

        if buckets == 0 {
            return Err(StorageError::corrupt(self.file.path(), "zero buckets"));
        }
        if hash_table_header_size::<L>(buckets) > self.file.size() {
            return Err(StorageError::corrupt(
                self.file.path(),
                format!("{} buckets do not fit", buckets),
            ));
        }

        self.buckets.store(buckets, Ordering::Release);
        Ok(())
    }

    /// Head of a bucket's chain.
    pub fn read(&self, bucket: u32) -> Result<L> {
        let _heads = self.heads.read();
        let accessor = self.file.access()?.slice(self.position(bucket)?, L::SIZE)?;
        Ok(L::read(accessor.as_slice()))
    }

    pub fn write(&self, bucket: u32, value: L) -> Result<()> {
        let _heads = self.heads.write();
        let mut accessor = self.file.access()?.slice(self.position(bucket)?, L::SIZE)?;
        value.write(accessor.as_mut_slice());
        Ok(())
    }

    /// Bucket count.
    pub fn size(&self) -> u32 {
        self.buckets.load(Ordering::Acquire)
    }

    fn position(&self, bucket: u32) -> Result<usize> {
        let buckets = self.size();
        if bucket >= buckets {
            return Err(StorageError::OutOfBounds {
                offset: bucket as usize,
                len: 1,
                size: buckets as usize,
            });
        }
        Ok(COUNT_SIZE + bucket as usize * L::SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_empties_every_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let file = Arc::new(MemoryMap::new(dir.path().join("table")));
        file.create().unwrap();
        file.start().unwrap();

        let header = HashTableHeader::<u64>::new(Arc::clone(&file));
        header.create(10).unwrap();

        assert_eq!(header.size(), 10);
        assert_eq!(file.logical_size(), hash_table_header_size::<u64>(10));
        for bucket in 0..10 {
            assert_eq!(header.read(bucket).unwrap(), u64::EMPTY);
        }
        assert!(header.read(10).is_err());
    }

    #[test]
    fn test_create_rejects_zero_buckets() {
        let dir = tempfile::tempdir().unwrap();
        let file = Arc::new(MemoryMap::new(dir.path().join("table")));
        file.create().unwrap();
        file.start().unwrap();

        let before = file.logical_size();
        let header = HashTableHeader::<u32>::new(Arc::clone(&file));
        assert!(matches!(header.create(0), Err(StorageError::InvalidData(_))));
        assert_eq!(header.size(), 0);
        assert_eq!(file.logical_size(), before);
    }

    #[test]
    fn test_heads_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table");
        {
            let file = Arc::new(MemoryMap::new(&path));
            file.create().unwrap();
            file.start().unwrap();
            let header = HashTableHeader::<u32>::new(file);
            header.create(4).unwrap();
            header.write(2, 77).unwrap();
        }

        let file = Arc::new(MemoryMap::new(&path));
        file.start().unwrap();
        let header = HashTableHeader::<u32>::new(file);
        header.start().unwrap();
        assert_eq!(header.size(), 4);
        assert_eq!(header.read(2).unwrap(), 77);
        assert_eq!(header.read(3).unwrap(), u32::EMPTY);
    }
}

//! Which input spent an output.
//!
//! ```text
//! element: [ output point: 36 ][ next: u32 ][ input point: 36 ]
//! ```

use super::{create_file, Cursor, Writer};
use crate::error::Result;
use crate::memory::MemoryMap;
use crate::primitives::{record_hash_table_size, RecordHashTable};
use ferrochain_core::{OutputPoint, POINT_SIZE};
use std::path::PathBuf;
use std::sync::Arc;

pub struct SpendDatabase {
    lookup_file: Arc<MemoryMap>,
    lookup: RecordHashTable<POINT_SIZE>,
}

impl SpendDatabase {
    /// Record width of the spend table.
    pub const RECORD_SIZE: usize = record_hash_table_size(POINT_SIZE, POINT_SIZE);

    pub fn new(lookup_path: impl Into<PathBuf>, buckets: u32) -> Self {
        let lookup_file = Arc::new(MemoryMap::new(lookup_path));
        Self {
            lookup: RecordHashTable::new(Arc::clone(&lookup_file), buckets, POINT_SIZE),
            lookup_file,
        }
    }

    pub fn create(&self) -> Result<()> {
        create_file(&self.lookup_file)?;
        self.lookup.create()
    }

    pub fn start(&self) -> Result<()> {
        self.lookup_file.start()?;
        self.lookup.start()
    }

    pub fn stop(&self) {
        self.lookup_file.stop();
    }

    pub fn close(&self) -> Result<()> {
        self.lookup_file.close()
    }

    pub fn sync(&self) -> Result<()> {
        self.lookup.sync()
    }

    /// The input point (spending transaction hash and input index) that
    /// spent `outpoint`.
    pub fn get(&self, outpoint: &OutputPoint) -> Result<Option<OutputPoint>> {
        match self.lookup.get(&outpoint.to_key())? {
            Some(value) => Cursor::new(value.as_slice()).read_point().map(Some),
            None => Ok(None),
        }
    }

    pub fn store(&self, outpoint: &OutputPoint, spender: &OutputPoint) -> Result<()> {
        self.lookup.store(&outpoint.to_key(), |buffer| {
            Writer::new(buffer).write_point(spender);
        })?;
        Ok(())
    }

    pub fn remove(&self, outpoint: &OutputPoint) -> Result<bool> {
        self.lookup.remove(&outpoint.to_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrochain_core::hash;

    #[test]
    fn test_store_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let database = SpendDatabase::new(dir.path().join("spend_table"), 16);
        database.create().unwrap();

        let outpoint = OutputPoint::new(hash(b"funding"), 1);
        let spender = OutputPoint::new(hash(b"spending"), 0);
        database.store(&outpoint, &spender).unwrap();

        assert_eq!(database.get(&outpoint).unwrap(), Some(spender));
        assert_eq!(database.get(&OutputPoint::new(hash(b"funding"), 0)).unwrap(), None);

        assert!(database.remove(&outpoint).unwrap());
        assert_eq!(database.get(&outpoint).unwrap(), None);
    }

    #[test]
    fn test_record_size() {
        assert_eq!(SpendDatabase::RECORD_SIZE, 36 + 4 + 36);
    }
}

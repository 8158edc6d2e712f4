//! Transactions by hash.
//!
//! ```text
//! element: [ height: u32 ][ position: u32 ][ tx_len: u32 ][ tx ]
//! ```

use super::{create_file, Cursor, Writer};
use crate::error::Result;
use crate::memory::MemoryMap;
use crate::primitives::SlabHashTable;
use ferrochain_core::{Hash, Transaction, HASH_SIZE};
use std::path::PathBuf;
use std::sync::Arc;

/// A confirmed transaction with its place in the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTransaction {
    /// Height of the containing block.
    pub height: u64,
    /// Position within the containing block.
    pub position: u32,
    pub transaction: Transaction,
}

pub struct TransactionDatabase {
    lookup_file: Arc<MemoryMap>,
    lookup: SlabHashTable<HASH_SIZE>,
}

impl TransactionDatabase {
    pub fn new(lookup_path: impl Into<PathBuf>, buckets: u32) -> Self {
        let lookup_file = Arc::new(MemoryMap::new(lookup_path));
        Self {
            lookup: SlabHashTable::new(Arc::clone(&lookup_file), buckets),
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

    pub fn get(&self, hash: &Hash) -> Result<Option<StoredTransaction>> {
        let element = match self.lookup.get(hash.as_bytes())? {
            Some(element) => element,
            None => return Ok(None),
        };

        let mut cursor = Cursor::new(element.as_slice());
        let height = u64::from(cursor.read_u32()?);
        let position = cursor.read_u32()?;
        let len = cursor.read_u32()? as usize;
        let transaction = Transaction::from_bytes(cursor.take(len)?)?;

        Ok(Some(StoredTransaction {
            height,
            position,
            transaction,
        }))
    }

    pub fn store(&self, height: u64, position: u32, transaction: &Transaction) -> Result<()> {
        let bytes = transaction.to_bytes();
        let value_size = 4 + 4 + 4 + bytes.len();

        self.lookup
            .store(transaction.hash().as_bytes(), value_size, |buffer| {
                let mut writer = Writer::new(buffer);
                writer.write_u32(height as u32);
                writer.write_u32(position);
                writer.write_u32(bytes.len() as u32);
                writer.write_bytes(&bytes);
            })?;
        Ok(())
    }

    pub fn remove(&self, hash: &Hash) -> Result<bool> {
        self.lookup.remove(hash.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrochain_core::OutputPoint;

    fn setup(dir: &tempfile::TempDir) -> TransactionDatabase {
        let database = TransactionDatabase::new(dir.path().join("transaction_table"), 64);
        database.create().unwrap();
        database
    }

    #[test]
    fn test_store_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let database = setup(&dir);

        let coinbase = Transaction::coinbase(7, 50, vec![0xAA]);
        let spend = Transaction::spend(OutputPoint::new(coinbase.hash(), 0), 40, vec![0xBB]);
        database.store(7, 0, &coinbase).unwrap();
        database.store(9, 3, &spend).unwrap();

        let stored = database.get(&spend.hash()).unwrap().unwrap();
        assert_eq!(stored.height, 9);
        assert_eq!(stored.position, 3);
        assert_eq!(stored.transaction, spend);

        assert_eq!(database.get(&coinbase.hash()).unwrap().unwrap().height, 7);
        assert!(database.get(&Hash::ZERO).unwrap().is_none());
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let database = setup(&dir);

        let coinbase = Transaction::coinbase(1, 50, vec![]);
        database.store(1, 0, &coinbase).unwrap();

        assert!(database.remove(&coinbase.hash()).unwrap());
        assert!(database.get(&coinbase.hash()).unwrap().is_none());
        assert!(!database.remove(&coinbase.hash()).unwrap());
    }
}

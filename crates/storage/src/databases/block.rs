//! Blocks by hash and by height.
//!
//! ```text
//! lookup element: [ header_len: u32 ][ header ][ height: u32 ][ tx_count: u32 ][ tx_hash: 32 ]...
//! index record:   [ lookup offset: u64 ]   one per height, 0 marks a gap
//! ```

use super::{create_file, Cursor, Writer};
use crate::error::{Result, StorageError};
use crate::memory::MemoryMap;
use crate::primitives::{FileOffset, Link, RecordManager, SlabHashTable};
use ferrochain_core::{Block, BlockHeader, Hash, HASH_SIZE};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

/// Index value of a height with no block. Slab offsets are never zero.
const EMPTY: FileOffset = 0;

/// A block as indexed: its header and the hashes of its transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlock {
    pub header: BlockHeader,
    pub height: u64,
    pub tx_hashes: Vec<Hash>,
}

impl StoredBlock {
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    fn decode(buffer: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(buffer);
        let header_len = cursor.read_u32()? as usize;
        let header = BlockHeader::from_bytes(cursor.take(header_len)?)?;
        let height = u64::from(cursor.read_u32()?);
        let tx_count = cursor.read_u32()?;
        let tx_hashes = (0..tx_count)
            .map(|_| cursor.read_hash())
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            header,
            height,
            tx_hashes,
        })
    }
}

pub struct BlockDatabase {
    lookup_file: Arc<MemoryMap>,
    index_file: Arc<MemoryMap>,
    lookup: SlabHashTable<HASH_SIZE>,
    index: RecordManager,
    /// Serializes index growth so gap filling never erases a concurrent write.
    write: Mutex<()>,
}

impl BlockDatabase {
    pub fn new(lookup_path: impl Into<PathBuf>, index_path: impl Into<PathBuf>, buckets: u32) -> Self {
        let lookup_file = Arc::new(MemoryMap::new(lookup_path));
        let index_file = Arc::new(MemoryMap::new(index_path));
        Self {
            lookup: SlabHashTable::new(Arc::clone(&lookup_file), buckets),
            index: RecordManager::new(Arc::clone(&index_file), 0, FileOffset::SIZE),
            lookup_file,
            index_file,
            write: Mutex::new(()),
        }
    }

    // =========================================================================
    // Startup and shutdown
    // =========================================================================

    pub fn create(&self) -> Result<()> {
        create_file(&self.lookup_file)?;
        create_file(&self.index_file)?;
        self.lookup.create()?;
        self.index.create()
    }

    pub fn start(&self) -> Result<()> {
        self.lookup_file.start()?;
        self.index_file.start()?;
        self.lookup.start()?;
        self.index.start()
    }

    pub fn stop(&self) {
        self.lookup_file.stop();
        self.index_file.stop();
    }

    pub fn close(&self) -> Result<()> {
        self.lookup_file.close()?;
        self.index_file.close()
    }

    pub fn sync(&self) -> Result<()> {
        self.lookup.sync()?;
        self.index.sync()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Block at `height`, or `None` past the top or in a gap.
    pub fn get_by_height(&self, height: u64) -> Result<Option<StoredBlock>> {
        if height >= u64::from(self.index.count()) {
            return Ok(None);
        }

        let position = self.read_position(height as u32)?;
        if position == EMPTY {
            return Ok(None);
        }

        let element = self.lookup.get_at(position)?;
        StoredBlock::decode(element.as_slice()).map(Some)
    }

    pub fn get_by_hash(&self, hash: &Hash) -> Result<Option<StoredBlock>> {
        match self.lookup.get(hash.as_bytes())? {
            Some(element) => StoredBlock::decode(element.as_slice()).map(Some),
            None => Ok(None),
        }
    }

    /// Highest indexed height, gaps included.
    pub fn top(&self) -> Option<u64> {
        u64::from(self.index.count()).checked_sub(1)
    }

    /// Number of indexed heights, gaps included.
    pub fn count(&self) -> u64 {
        u64::from(self.index.count())
    }

    /// First and last empty heights below the top.
    pub fn gap_range(&self) -> Result<Option<(u64, u64)>> {
        let count = self.index.count();

        let mut first = None;
        for height in 0..count {
            if self.read_position(height)? == EMPTY {
                first = Some(height);
                break;
            }
        }
        let first = match first {
            Some(first) => first,
            None => return Ok(None),
        };

        for height in (first + 1..count).rev() {
            if self.read_position(height)? == EMPTY {
                return Ok(Some((u64::from(first), u64::from(height))));
            }
        }
        Ok(Some((u64::from(first), u64::from(first))))
    }

    /// First empty height at or after `start`, or the count when the chain
    /// above `start` is complete. `None` when empty or `start` is past the end.
    pub fn next_gap(&self, start: u64) -> Result<Option<u64>> {
        let count = u64::from(self.index.count());
        if count == 0 || start > count {
            return Ok(None);
        }

        for height in start..count {
            if self.read_position(height as u32)? == EMPTY {
                return Ok(Some(height));
            }
        }
        Ok(Some(count))
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Index `block` at `height`, extending the height index with gaps if it
    /// lies beyond the top.
    pub fn store(&self, block: &Block, height: u64) -> Result<()> {
        let height = u32::try_from(height)
            .ok()
            .filter(|height| *height < u32::MAX - 1)
            .ok_or(StorageError::InvalidCount {
                count: self.index.count(),
                requested: u32::MAX,
            })?;

        let header = block.header.to_bytes();
        let tx_hashes: Vec<Hash> = block.transactions.iter().map(|tx| tx.hash()).collect();
        let value_size = 4 + header.len() + 4 + 4 + HASH_SIZE * tx_hashes.len();

        let position = self
            .lookup
            .store(block.hash().as_bytes(), value_size, |buffer| {
                let mut writer = Writer::new(buffer);
                writer.write_u32(header.len() as u32);
                writer.write_bytes(&header);
                writer.write_u32(height);
                writer.write_u32(tx_hashes.len() as u32);
                for hash in &tx_hashes {
                    writer.write_bytes(hash.as_bytes());
                }
            })?;

        self.write_position(position, height)
    }

    /// Forget every height from `from_height` up.
    pub fn unlink(&self, from_height: u64) -> Result<()> {
        let _write = self.write.lock();
        if u64::from(self.index.count()) > from_height {
            self.index.set_count(from_height as u32)?;
        }
        Ok(())
    }

    /// Drop the hash lookup of a block.
    pub fn remove(&self, hash: &Hash) -> Result<bool> {
        self.lookup.remove(hash.as_bytes())
    }

    fn write_position(&self, position: FileOffset, height: u32) -> Result<()> {
        let _write = self.write.lock();
        let initial_count = self.index.count();
        let new_count = height + 1;

        if new_count > initial_count {
            self.index.new_records(new_count - initial_count)?;
            // Truncated records keep stale offsets.
            for gap in initial_count..height {
                self.set_position(gap, EMPTY)?;
            }
        }
        self.set_position(height, position)
    }

    fn set_position(&self, height: u32, position: FileOffset) -> Result<()> {
        let mut record = self.index.get(height)?;
        position.write(record.as_mut_slice());
        Ok(())
    }

    fn read_position(&self, height: u32) -> Result<FileOffset> {
        let record = self.index.get(height)?;
        Ok(FileOffset::read(record.as_slice()))
    }
}

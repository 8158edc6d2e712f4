//! Payment history per script.
//!
//! ```text
//! row: [ kind: u8 ][ point: 36 ][ height: u32 ][ value: u64 ]
//! ```
//!
//! Output rows carry the output value. Spend rows carry a checksum of the
//! spent output point so a spend can be paired with the output it consumed.

use super::{create_file, Cursor, Writer};
use crate::error::{Result, StorageError};
use crate::memory::MemoryMap;
use crate::primitives::{record_multimap_size, RecordHashTable, RecordList, RecordMultimap};
use ferrochain_core::{Hash, OutputPoint, HASH_SIZE, POINT_SIZE};
use std::path::PathBuf;
use std::sync::Arc;

/// Payload width of a history row.
pub const HISTORY_ROW_SIZE: usize = 1 + POINT_SIZE + 4 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointKind {
    Output = 0,
    Spend = 1,
}

/// One history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryRow {
    pub kind: PointKind,
    /// The output created, or the input point that spends.
    pub point: OutputPoint,
    pub height: u64,
    /// Output value, or the spent point's checksum for spends.
    pub value: u64,
}

impl HistoryRow {
    fn decode(buffer: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(buffer);
        let kind = match cursor.read_u8()? {
            0 => PointKind::Output,
            1 => PointKind::Spend,
            other => return Err(StorageError::InvalidData(format!("history row kind {}", other))),
        };
        Ok(Self {
            kind,
            point: cursor.read_point()?,
            height: u64::from(cursor.read_u32()?),
            value: cursor.read_u64()?,
        })
    }
}

/// Checksum pairing a spend row with the output row it consumed.
pub fn point_checksum(point: &OutputPoint) -> u64 {
    let digest = blake3::hash(&point.to_key());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(prefix)
}

pub struct HistoryDatabase {
    lookup_file: Arc<MemoryMap>,
    rows_file: Arc<MemoryMap>,
    rows: RecordMultimap<HASH_SIZE>,
}

impl HistoryDatabase {
    pub fn new(lookup_path: impl Into<PathBuf>, rows_path: impl Into<PathBuf>, buckets: u32) -> Self {
        let lookup_file = Arc::new(MemoryMap::new(lookup_path));
        let rows_file = Arc::new(MemoryMap::new(rows_path));
        let rows = RecordMultimap::new(
            RecordHashTable::new(Arc::clone(&lookup_file), buckets, record_multimap_size()),
            RecordList::new(Arc::clone(&rows_file), 0, HISTORY_ROW_SIZE),
        );
        Self {
            lookup_file,
            rows_file,
            rows,
        }
    }

    pub fn create(&self) -> Result<()> {
        create_file(&self.lookup_file)?;
        create_file(&self.rows_file)?;
        self.rows.create()
    }

    pub fn start(&self) -> Result<()> {
        self.lookup_file.start()?;
        self.rows_file.start()?;
        self.rows.start()
    }

    pub fn stop(&self) {
        self.lookup_file.stop();
        self.rows_file.stop();
    }

    pub fn close(&self) -> Result<()> {
        self.lookup_file.close()?;
        self.rows_file.close()
    }

    pub fn sync(&self) -> Result<()> {
        self.rows.sync()
    }

    pub fn add_output(&self, key: &Hash, point: &OutputPoint, height: u64, value: u64) -> Result<()> {
        self.add_row(key, PointKind::Output, point, height, value)
    }

    pub fn add_spend(
        &self,
        key: &Hash,
        point: &OutputPoint,
        height: u64,
        previous: &OutputPoint,
    ) -> Result<()> {
        self.add_row(key, PointKind::Spend, point, height, point_checksum(previous))
    }

    /// Undo the newest row under `key`.
    pub fn delete_last_row(&self, key: &Hash) -> Result<bool> {
        self.rows.delete_last_row(key.as_bytes())
    }

    /// Remove the newest row under `key` recording `point` at `height`.
    pub fn delete_row(
        &self,
        key: &Hash,
        kind: PointKind,
        point: &OutputPoint,
        height: u64,
    ) -> Result<bool> {
        self.rows.delete_row(key.as_bytes(), |payload| {
            HistoryRow::decode(payload)
                .map(|row| row.kind == kind && row.point == *point && row.height == height)
                .unwrap_or(false)
        })
    }

    /// Rows under `key`, newest first.
    ///
    /// A `limit` of zero means no limit. Rows below `from_height` are
    /// skipped.
    pub fn get(&self, key: &Hash, limit: usize, from_height: u64) -> Result<Vec<HistoryRow>> {
        let mut result = Vec::new();
        for index in self.rows.rows(key.as_bytes())? {
            if limit > 0 && result.len() >= limit {
                break;
            }

            let row = {
                let payload = self.rows.get(index)?;
                HistoryRow::decode(payload.as_slice())?
            };
            if row.height >= from_height {
                result.push(row);
            }
        }
        Ok(result)
    }

    fn add_row(
        &self,
        key: &Hash,
        kind: PointKind,
        point: &OutputPoint,
        height: u64,
        value: u64,
    ) -> Result<()> {
        self.rows.add_row(key.as_bytes(), |buffer| {
            let mut writer = Writer::new(buffer);
            writer.write_u8(kind as u8);
            writer.write_point(point);
            writer.write_u32(height as u32);
            writer.write_u64(value);
        })?;
        Ok(())
    }
}

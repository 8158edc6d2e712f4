//! Domain databases composed from the primitives.
//!
//! Each database owns its files. `create` initializes and starts them,
//! `start` opens existing ones.

mod block;
mod history;
mod spend;
mod transaction;

pub use block::{BlockDatabase, StoredBlock};
pub use history::{point_checksum, HistoryDatabase, HistoryRow, PointKind, HISTORY_ROW_SIZE};
pub use spend::SpendDatabase;
pub use transaction::{StoredTransaction, TransactionDatabase};

use crate::error::{Result, StorageError};
use crate::memory::MemoryMap;
use crate::primitives::Link;
use ferrochain_core::{Hash, OutputPoint, HASH_SIZE};

/// Create the backing file and map it.
fn create_file(file: &MemoryMap) -> Result<()> {
    file.create()?;
    file.start()
}

/// Sequential reader over a stored element.
struct Cursor<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> Cursor<'a> {
    fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.position.saturating_add(len);
        let bytes = self
            .buffer
            .get(self.position..end)
            .ok_or(StorageError::OutOfBounds {
                offset: self.position,
                len,
                size: self.buffer.len(),
            })?;
        self.position = end;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::read(self.take(4)?))
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::read(self.take(8)?))
    }

    fn read_hash(&mut self) -> Result<Hash> {
        let mut hash = [0u8; HASH_SIZE];
        hash.copy_from_slice(self.take(HASH_SIZE)?);
        Ok(Hash(hash))
    }

    fn read_point(&mut self) -> Result<OutputPoint> {
        let hash = self.read_hash()?;
        let index = self.read_u32()?;
        Ok(OutputPoint::new(hash, index))
    }
}

/// Sequential writer into a freshly allocated element.
///
/// Panics if the element is smaller than what is written; callers size the
/// allocation from the same fields.
struct Writer<'a> {
    buffer: &'a mut [u8],
    position: usize,
}

impl<'a> Writer<'a> {
    fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer[self.position..self.position + bytes.len()].copy_from_slice(bytes);
        self.position += bytes.len();
    }

    fn write_u8(&mut self, value: u8) {
        self.write_bytes(&[value]);
    }

    fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    fn write_point(&mut self, point: &OutputPoint) {
        self.write_bytes(&point.to_key());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_reads_in_order() {
        let mut buffer = [0u8; 13];
        {
            let mut writer = Writer::new(&mut buffer);
            writer.write_u8(7);
            writer.write_u32(0x0102_0304);
            writer.write_u64(u64::MAX);
        }

        let mut cursor = Cursor::new(&buffer);
        assert_eq!(cursor.read_u8().unwrap(), 7);
        assert_eq!(cursor.read_u32().unwrap(), 0x0102_0304);
        assert_eq!(cursor.read_u64().unwrap(), u64::MAX);
        assert!(matches!(
            cursor.read_u8(),
            Err(StorageError::OutOfBounds { offset: 13, .. })
        ));
    }
}

//! Allocators and open-chained hash tables over memory-mapped files.
//!
//! ```text
//!   RecordMultimap ──► RecordHashTable ──► HashTableHeader ─┐
//!        │                  │                               ├─► MemoryMap
//!        └──► RecordList ───┴─────────► RecordManager ──────┘
//!
//!   SlabHashTable ──► HashTableHeader + SlabManager ──► MemoryMap
//! ```
//!
//! Links between elements are indices (records) or offsets (slabs), resolved
//! through the manager on every hop, so they stay valid across remaps.

mod hash_table_header;
mod record_hash_table;
mod record_list;
mod record_manager;
mod record_multimap;
mod slab_hash_table;
mod slab_manager;

pub use hash_table_header::{hash_table_header_size, HashTableHeader};
pub use record_hash_table::{record_hash_table_size, RecordHashTable};
pub use record_list::{record_list_size, RecordList};
pub use record_manager::RecordManager;
pub use record_multimap::{record_multimap_size, RecordMultimap};
pub use slab_hash_table::{slab_hash_table_size, SlabHashTable};
pub use slab_manager::SlabManager;

use std::fmt;

/// Slot number of a fixed-size record.
pub type ArrayIndex = u32;

/// Byte position of a slab, relative to the end of the file header.
pub type FileOffset = u64;

/// A persisted pointer: a record index or a slab offset.
pub trait Link: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Encoded width in bytes.
    const SIZE: usize;
    /// Marks an empty bucket or the end of a chain.
    const EMPTY: Self;

    /// Decode from the first `SIZE` bytes of `buffer`.
    fn read(buffer: &[u8]) -> Self;

    /// Encode into the first `SIZE` bytes of `buffer`.
    fn write(self, buffer: &mut [u8]);
}

impl Link for u32 {
    const SIZE: usize = 4;
    const EMPTY: Self = u32::MAX;

    fn read(buffer: &[u8]) -> Self {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&buffer[..4]);
        u32::from_le_bytes(bytes)
    }

    fn write(self, buffer: &mut [u8]) {
        buffer[..4].copy_from_slice(&self.to_le_bytes());
    }
}

impl Link for u64 {
    const SIZE: usize = 8;
    const EMPTY: Self = u64::MAX;

    fn read(buffer: &[u8]) -> Self {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&buffer[..8]);
        u64::from_le_bytes(bytes)
    }

    fn write(self, buffer: &mut [u8]) {
        buffer[..8].copy_from_slice(&self.to_le_bytes());
    }
}

/// Bucket for a key.
///
/// Buckets are persisted, so this must give the same answer on every build
/// and platform: the first eight bytes of the key's blake3 digest, modulo
/// the bucket count.
pub(crate) fn bucket_index(key: &[u8], buckets: u32) -> u32 {
    let digest = blake3::hash(key);
    let prefix = u64::read(digest.as_bytes());
    (prefix % u64::from(buckets.max(1))) as u32
}

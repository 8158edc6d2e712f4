//! Singly-linked lists of fixed-size records.
//!
//! ```text
//! node: [ next: u32 ][ payload ]
//! ```

use super::{ArrayIndex, Link, RecordManager};
use crate::error::Result;
use crate::memory::{Accessor, MemoryMap};
use std::sync::Arc;

/// Record size of a list node with `value_size`-byte payload.
pub const fn record_list_size(value_size: usize) -> usize {
    <ArrayIndex as Link>::SIZE + value_size
}

/// Linked lists sharing one record file.
///
/// Lists grow at the front: `insert` returns a new head pointing at the old
/// one. A node leaves a list when its predecessor's link skips it; its record
/// is not reclaimed.
pub struct RecordList {
    manager: RecordManager,
}

impl RecordList {
    pub fn new(file: Arc<MemoryMap>, header_size: usize, value_size: usize) -> Self {
        Self {
            manager: RecordManager::new(file, header_size, record_list_size(value_size)),
        }
    }

    pub fn create(&self) -> Result<()> {
        self.manager.create()
    }

    pub fn start(&self) -> Result<()> {
        self.manager.start()
    }

    pub fn sync(&self) -> Result<()> {
        self.manager.sync()
    }

    /// Start a new list with a single node.
    pub fn create_node(&self) -> Result<ArrayIndex> {
        self.insert(ArrayIndex::EMPTY)
    }

    /// New node in front of `next`.
    pub fn insert(&self, next: ArrayIndex) -> Result<ArrayIndex> {
        let index = self.manager.new_records(1)?;
        let mut record = self.manager.get(index)?;
        next.write(record.as_mut_slice());
        Ok(index)
    }

    /// Successor of a node, or `ArrayIndex::EMPTY` at the end.
    pub fn next(&self, index: ArrayIndex) -> Result<ArrayIndex> {
        let record = self.manager.get(index)?;
        Ok(ArrayIndex::read(record.as_slice()))
    }

    /// Point `index` at a new successor.
    pub fn set_next(&self, index: ArrayIndex, next: ArrayIndex) -> Result<()> {
        let mut record = self.manager.get(index)?;
        next.write(record.as_mut_slice());
        Ok(())
    }

    /// Payload of a node.
    pub fn get(&self, index: ArrayIndex) -> Result<Accessor<'_>> {
        self.manager.get(index)?.offset(ArrayIndex::SIZE)
    }

    /// Walk a list from `head`.
    pub fn iter(&self, head: ArrayIndex) -> RecordListIter<'_> {
        RecordListIter {
            list: self,
            current: head,
        }
    }

    pub fn count(&self) -> ArrayIndex {
        self.manager.count()
    }
}

/// Node indices of one list, front to back.
pub struct RecordListIter<'a> {
    list: &'a RecordList,
    current: ArrayIndex,
}

impl Iterator for RecordListIter<'_> {
    type Item = Result<ArrayIndex>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current == ArrayIndex::EMPTY {
            return None;
        }

        let index = self.current;
        match self.list.next(index) {
            Ok(next) => {
                self.current = next;
                Some(Ok(index))
            }
            Err(err) => {
                self.current = ArrayIndex::EMPTY;
                Some(Err(err))
            }
        }
    }
}

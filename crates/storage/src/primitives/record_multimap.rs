//! Many rows per key.
//!
//! A record hash table maps each key to the head of a record list; rows are
//! the list's nodes, newest first.

use super::{ArrayIndex, Link, RecordHashTable, RecordList};
use crate::error::{Result, StorageError};
use crate::memory::Accessor;
use parking_lot::RwLock;

/// Value size of the key table: one list head.
pub const fn record_multimap_size() -> usize {
    <ArrayIndex as Link>::SIZE
}

pub struct RecordMultimap<const KEY: usize> {
    map: RecordHashTable<KEY>,
    rows: RecordList,
    update: RwLock<()>,
}

impl<const KEY: usize> RecordMultimap<KEY> {
    /// `map` must have been built with a value size of
    /// [`record_multimap_size`].
    pub fn new(map: RecordHashTable<KEY>, rows: RecordList) -> Self {
        Self {
            map,
            rows,
            update: RwLock::new(()),
        }
    }

    pub fn create(&self) -> Result<()> {
        self.map.create()?;
        self.rows.create()
    }

    pub fn start(&self) -> Result<()> {
        self.map.start()?;
        self.rows.start()
    }

    pub fn sync(&self) -> Result<()> {
        self.map.sync()?;
        self.rows.sync()
    }

    /// Index of the newest row under `key`.
    pub fn lookup(&self, key: &[u8; KEY]) -> Result<Option<ArrayIndex>> {
        let _update = self.update.read();
        self.head(key)
    }

    /// Row indices under `key`, newest first.
    pub fn rows(&self, key: &[u8; KEY]) -> Result<Vec<ArrayIndex>> {
        let _update = self.update.read();
        match self.head(key)? {
            Some(head) => self.rows.iter(head).collect(),
            None => Ok(Vec::new()),
        }
    }

    /// Payload of a row.
    pub fn get(&self, index: ArrayIndex) -> Result<Accessor<'_>> {
        self.rows.get(index)
    }

    /// Prepend a row under `key`, filled by `write`.
    pub fn add_row<F>(&self, key: &[u8; KEY], write: F) -> Result<ArrayIndex>
    where
        F: FnOnce(&mut [u8]),
    {
        let _update = self.update.write();
        let head = self.head(key)?;

        let index = match head {
            Some(head) => self.rows.insert(head)?,
            None => self.rows.create_node()?,
        };
        write(self.rows.get(index)?.as_mut_slice());

        match head {
            Some(_) => self.set_head(key, index)?,
            None => {
                self.map.store(key, |buffer| index.write(buffer))?;
            }
        }
        Ok(index)
    }

    /// Drop the newest row under `key`. Removes the key once no rows remain.
    pub fn delete_last_row(&self, key: &[u8; KEY]) -> Result<bool> {
        self.delete_row(key, |_| true)
    }

    /// Unlink the newest row under `key` whose payload satisfies `matches`.
    /// Removes the key once no rows remain.
    pub fn delete_row<F>(&self, key: &[u8; KEY], matches: F) -> Result<bool>
    where
        F: Fn(&[u8]) -> bool,
    {
        let _update = self.update.write();
        let head = match self.head(key)? {
            Some(head) => head,
            None => return Ok(false),
        };

        let mut previous = None;
        let mut current = head;
        while current != ArrayIndex::EMPTY {
            let next = self.rows.next(current)?;
            if matches(self.rows.get(current)?.as_slice()) {
                match previous {
                    Some(previous) => self.rows.set_next(previous, next)?,
                    None if next == ArrayIndex::EMPTY => {
                        self.map.remove(key)?;
                    }
                    None => self.set_head(key, next)?,
                }
                return Ok(true);
            }
            previous = Some(current);
            current = next;
        }
        Ok(false)
    }

    fn head(&self, key: &[u8; KEY]) -> Result<Option<ArrayIndex>> {
        Ok(self
            .map
            .get(key)?
            .map(|value| ArrayIndex::read(value.as_slice())))
    }

    fn set_head(&self, key: &[u8; KEY], index: ArrayIndex) -> Result<()> {
        let mut value = self
            .map
            .get(key)?
            .ok_or_else(|| StorageError::NotFound(hex::encode(key)))?;
        index.write(value.as_mut_slice());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryMap;
    use std::sync::Arc;

    fn setup(dir: &tempfile::TempDir) -> RecordMultimap<4> {
        let lookup = Arc::new(MemoryMap::new(dir.path().join("lookup")));
        let rows = Arc::new(MemoryMap::new(dir.path().join("rows")));
        for file in [&lookup, &rows] {
            file.create().unwrap();
            file.start().unwrap();
        }

        let multimap = RecordMultimap::new(
            RecordHashTable::new(lookup, 16, record_multimap_size()),
            RecordList::new(rows, 0, 1),
        );
        multimap.create().unwrap();
        multimap
    }

    fn payloads(multimap: &RecordMultimap<4>, key: &[u8; 4]) -> Vec<u8> {
        multimap
            .rows(key)
            .unwrap()
            .into_iter()
            .map(|index| multimap.get(index).unwrap().as_slice()[0])
            .collect()
    }

    #[test]
    fn test_rows_are_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let multimap = setup(&dir);

        for value in 1..=3u8 {
            multimap.add_row(b"addr", |row| row[0] = value).unwrap();
        }
        multimap.add_row(b"else", |row| row[0] = 9).unwrap();

        assert_eq!(payloads(&multimap, b"addr"), vec![3, 2, 1]);
        assert_eq!(payloads(&multimap, b"else"), vec![9]);
        assert!(payloads(&multimap, b"none").is_empty());
    }

    #[test]
    fn test_delete_last_row_unwinds() {
        let dir = tempfile::tempdir().unwrap();
        let multimap = setup(&dir);

        multimap.add_row(b"addr", |row| row[0] = 1).unwrap();
        let newest = multimap.add_row(b"addr", |row| row[0] = 2).unwrap();
        assert_eq!(multimap.lookup(b"addr").unwrap(), Some(newest));

        assert!(multimap.delete_last_row(b"addr").unwrap());
        assert_eq!(payloads(&multimap, b"addr"), vec![1]);

        assert!(multimap.delete_last_row(b"addr").unwrap());
        assert_eq!(multimap.lookup(b"addr").unwrap(), None);
        assert!(!multimap.delete_last_row(b"addr").unwrap());

        // The key can be reused after it empties.
        multimap.add_row(b"addr", |row| row[0] = 5).unwrap();
        assert_eq!(payloads(&multimap, b"addr"), vec![5]);
    }

    #[test]
    fn test_delete_row_unlinks_from_middle() {
        let dir = tempfile::tempdir().unwrap();
        let multimap = setup(&dir);

        for value in 1..=4u8 {
            multimap.add_row(b"addr", |row| row[0] = value).unwrap();
        }

        assert!(multimap.delete_row(b"addr", |row| row[0] == 2).unwrap());
        assert_eq!(payloads(&multimap, b"addr"), vec![4, 3, 1]);

        assert!(multimap.delete_row(b"addr", |row| row[0] == 1).unwrap());
        assert_eq!(payloads(&multimap, b"addr"), vec![4, 3]);

        assert!(!multimap.delete_row(b"addr", |row| row[0] == 7).unwrap());
        assert!(multimap.delete_row(b"addr", |row| row[0] == 4).unwrap());
        assert!(multimap.delete_row(b"addr", |row| row[0] == 3).unwrap());
        assert_eq!(multimap.lookup(b"addr").unwrap(), None);
    }
}

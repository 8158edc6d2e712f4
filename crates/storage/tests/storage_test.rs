use ferrochain_core::{Block, Hash, Transaction};
use ferrochain_storage::primitives::{Link, RecordHashTable, RecordManager, SlabHashTable};
use ferrochain_storage::{Database, DatabaseConfig, MemoryMap};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

fn started(dir: &tempfile::TempDir, name: &str) -> Arc<MemoryMap> {
    let file = Arc::new(MemoryMap::new(dir.path().join(name)));
    file.create().unwrap();
    file.start().unwrap();
    file
}

#[test]
fn test_concurrent_new_records_are_disjoint() {
    let dir = tempfile::tempdir().unwrap();
    let manager = RecordManager::new(started(&dir, "records"), 0, 16);
    manager.create().unwrap();

    const THREADS: usize = 8;
    const PER_THREAD: usize = 200;

    let mut indices: Vec<u32> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    (0..PER_THREAD)
                        .map(|_| {
                            let index = manager.new_records(1).unwrap();
                            // Touch the record so remaps race with writers.
                            manager.get(index).unwrap().as_mut_slice()[0] = 1;
                            index
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect()
    });

    indices.sort_unstable();
    let expected: Vec<u32> = (0..(THREADS * PER_THREAD) as u32).collect();
    assert_eq!(indices, expected);
    assert_eq!(manager.count() as usize, THREADS * PER_THREAD);
}

#[test]
fn test_concurrent_store_and_get() {
    let dir = tempfile::tempdir().unwrap();
    let table = RecordHashTable::<8>::new(started(&dir, "table"), 97, 8);
    table.create().unwrap();

    thread::scope(|scope| {
        for worker in 0..4u64 {
            let table = &table;
            scope.spawn(move || {
                for item in 0..250u64 {
                    let key = (worker * 1000 + item).to_le_bytes();
                    table
                        .store(&key, |buffer| buffer.copy_from_slice(&item.to_le_bytes()))
                        .unwrap();
                    let value = table.get(&key).unwrap().unwrap();
                    assert_eq!(u64::read(value.as_slice()), item);
                }
            });
        }
    });

    for worker in 0..4u64 {
        for item in 0..250u64 {
            let key = (worker * 1000 + item).to_le_bytes();
            let value = table.get(&key).unwrap().unwrap();
            assert_eq!(u64::read(value.as_slice()), item);
        }
    }
}

#[test]
fn test_random_slab_roundtrip() {
    let mut rng = rand::thread_rng();

    for buckets in [1u32, 7, 1000] {
        let dir = tempfile::tempdir().unwrap();
        let table = SlabHashTable::<32>::new(started(&dir, "slabs"), buckets);
        table.create().unwrap();

        let mut expected = HashMap::new();
        for _ in 0..200 {
            let key: [u8; 32] = rng.gen();
            let size = rng.gen_range(1..=64);
            let value: Vec<u8> = (0..size).map(|_| rng.gen()).collect();

            table
                .store(&key, value.len(), |buffer| buffer.copy_from_slice(&value))
                .unwrap();
            expected.insert(key, value);
        }

        for (key, value) in &expected {
            let stored = table.get(key).unwrap().unwrap();
            assert_eq!(&stored.as_slice()[..value.len()], value.as_slice());
        }

        let missing: [u8; 32] = rng.gen();
        if !expected.contains_key(&missing) {
            assert!(table.get(&missing).unwrap().is_none());
        }
    }
}

#[test]
fn test_concurrent_import_out_of_order() {
    let dir = tempfile::tempdir().unwrap();
    let database = Database::new(dir.path().join("chain"), &DatabaseConfig::with_buckets(128));
    database.create().unwrap();

    let blocks: Vec<Block> = (0..24u64)
        .map(|height| {
            let coinbase = Transaction::coinbase(height, 50, vec![height as u8]);
            Block::new(height, Hash::ZERO, vec![coinbase], 1)
        })
        .collect();

    let mut order: Vec<usize> = (0..blocks.len()).collect();
    order.shuffle(&mut rand::thread_rng());

    thread::scope(|scope| {
        for chunk in order.chunks(6) {
            let database = &database;
            let blocks = &blocks;
            scope.spawn(move || {
                for &height in chunk {
                    database.push_at(&blocks[height], height as u64).unwrap();
                }
            });
        }
    });

    assert_eq!(database.top(), Some(23));
    assert_eq!(database.blocks.gap_range().unwrap(), None);
    assert_eq!(database.blocks.next_gap(0).unwrap(), Some(24));
    for (height, block) in blocks.iter().enumerate() {
        assert_eq!(database.get_block(height as u64).unwrap().as_ref(), Some(block));
    }
}

#[test]
fn test_push_pop_stack_discipline() {
    let dir = tempfile::tempdir().unwrap();
    let database = Database::new(dir.path().join("chain"), &DatabaseConfig::with_buckets(16));
    database.create().unwrap();

    let mut previous = Hash::ZERO;
    let mut pushed = Vec::new();
    for height in 0..6u64 {
        // Every block pays the same script so history rows stack on one key.
        let block = Block::new(
            height,
            previous,
            vec![Transaction::coinbase(height, 50, vec![0xAA])],
            1,
        );
        previous = block.hash();
        database.push(&block).unwrap();
        pushed.push(block);
    }

    let script = pushed[0].transactions[0].outputs[0].script_hash();
    assert_eq!(database.get_history(&script, 0, 0).unwrap().len(), 6);

    while let Some(expected) = pushed.pop() {
        assert_eq!(database.pop().unwrap(), expected);
        let history = database.get_history(&script, 0, 0).unwrap();
        assert_eq!(history.len(), pushed.len());
        if let Some(top) = history.first() {
            assert_eq!(top.height, pushed.len() as u64 - 1);
        }
    }
    assert_eq!(database.top(), None);
}

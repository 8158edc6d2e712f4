//! Orphan pool for blocks not (yet) on the main chain.
//!
//! The pool holds received blocks until the organizer decides whether they
//! extend or replace the main chain. Blocks whose ancestry cannot be resolved
//! yet are parked in a pending map under the hash they are waiting for.

use crate::block_detail::BlockDetailPtr;
use ferrochain_core::{BlockHeader, Hash};
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during orphan pool operations.
#[derive(Debug, Error)]
pub enum OrphanPoolError {
    #[error("block already in orphan pool")]
    DuplicateBlock,

    #[error("orphan pool is full (capacity: {0})")]
    PoolFull(usize),

    #[error("pending map is full (capacity: {0})")]
    PendingFull(usize),
}

pub type Result<T> = std::result::Result<T, OrphanPoolError>;

/// Configuration for the orphan pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanPoolConfig {
    /// Maximum number of blocks in the pool.
    pub capacity: usize,
    /// Maximum number of blocks parked in the pending map.
    pub pending_capacity: usize,
}

impl Default for OrphanPoolConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            pending_capacity: 50,
        }
    }
}

#[derive(Default)]
struct PoolState {
    /// Insertion order.
    buffer: Vec<BlockDetailPtr>,
    /// Blocks waiting for a hash to reach the main chain.
    pending: HashMap<Hash, Vec<BlockDetailPtr>>,
    pending_len: usize,
}

impl PoolState {
    fn find(&self, hash: &Hash) -> Option<&BlockDetailPtr> {
        self.buffer.iter().find(|block| block.hash() == *hash)
    }
}

/// Bounded set of blocks off the main chain.
///
/// There is no eviction: once full, `add` is refused until the organizer
/// removes blocks.
pub struct OrphanPool {
    config: OrphanPoolConfig,
    state: RwLock<PoolState>,
}

impl OrphanPool {
    /// Create a new pool with default configuration.
    pub fn new() -> Self {
        Self::with_config(OrphanPoolConfig::default())
    }

    /// Create a new pool with the given configuration.
    pub fn with_config(config: OrphanPoolConfig) -> Self {
        Self {
            config,
            state: RwLock::new(PoolState::default()),
        }
    }

    /// Number of blocks in the pool.
    pub fn len(&self) -> usize {
        self.state.read().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().buffer.is_empty()
    }

    /// Add a block. Nothing changes on failure.
    pub fn add(&self, block: BlockDetailPtr) -> Result<()> {
        let hash = block.hash();
        let mut state = self.state.write();

        if state.find(&hash).is_some() {
            return Err(OrphanPoolError::DuplicateBlock);
        }

        if state.buffer.len() >= self.config.capacity {
            return Err(OrphanPoolError::PoolFull(self.config.capacity));
        }

        state.buffer.push(block);
        debug!(hash = %hash.short(), size = state.buffer.len(), "Orphan added");
        Ok(())
    }

    /// Remove a block if present.
    pub fn remove(&self, block: &BlockDetailPtr) -> bool {
        let hash = block.hash();
        let mut state = self.state.write();

        let before = state.buffer.len();
        state.buffer.retain(|entry| entry.hash() != hash);
        let removed = state.buffer.len() != before;

        if removed {
            debug!(hash = %hash.short(), size = state.buffer.len(), "Orphan removed");
        }
        removed
    }

    pub fn exists(&self, hash: &Hash) -> bool {
        self.state.read().find(hash).is_some()
    }

    pub fn exists_header(&self, header: &BlockHeader) -> bool {
        self.exists(&header.hash())
    }

    /// Longest chain of pooled ancestors ending at `end`, parent first.
    ///
    /// Empty when the parent of `end` is not in the pool.
    pub fn trace(&self, end: &BlockDetailPtr) -> Vec<BlockDetailPtr> {
        let state = self.state.read();

        let mut chain = Vec::new();
        let mut previous = end.previous_hash();
        while let Some(parent) = state.find(&previous) {
            // Bounded by the pool size in case of a self-referencing entry.
            if chain.len() >= state.buffer.len() {
                break;
            }
            previous = parent.previous_hash();
            chain.push(parent.clone());
        }

        if chain.is_empty() {
            return chain;
        }

        chain.reverse();
        chain.push(end.clone());
        chain
    }

    /// Blocks not yet validated, most recently added first.
    pub fn unprocessed(&self) -> Vec<BlockDetailPtr> {
        self.state
            .read()
            .buffer
            .iter()
            .rev()
            .filter(|block| !block.is_processed())
            .cloned()
            .collect()
    }

    /// Park `block` until `needed` reaches the main chain.
    pub fn add_pending_block(&self, needed: Hash, block: BlockDetailPtr) -> Result<()> {
        let mut state = self.state.write();

        let hash = block.hash();
        let already = state
            .pending
            .get(&needed)
            .is_some_and(|waiting| waiting.iter().any(|entry| entry.hash() == hash));
        if already {
            return Ok(());
        }

        if state.pending_len >= self.config.pending_capacity {
            return Err(OrphanPoolError::PendingFull(self.config.pending_capacity));
        }

        state.pending.entry(needed).or_default().push(block);
        state.pending_len += 1;
        debug!(hash = %hash.short(), needed = %needed.short(), "Orphan pending");
        Ok(())
    }

    /// Take every block waiting on `needed`.
    pub fn delete_pending_block(&self, needed: &Hash) -> Vec<BlockDetailPtr> {
        let mut state = self.state.write();
        let waiting = state.pending.remove(needed).unwrap_or_default();
        state.pending_len -= waiting.len();
        waiting
    }

    /// Drop hashes already held by the pool from an inventory request.
    pub fn filter(&self, hashes: &mut Vec<Hash>) {
        let state = self.state.read();
        hashes.retain(|hash| state.find(hash).is_none());
    }

    /// Get pool statistics.
    pub fn stats(&self) -> OrphanPoolStats {
        let state = self.state.read();
        OrphanPoolStats {
            orphans: state.buffer.len(),
            unprocessed: state.buffer.iter().filter(|b| !b.is_processed()).count(),
            pending: state.pending_len,
            capacity: self.config.capacity,
        }
    }
}

impl Default for OrphanPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Orphan pool statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanPoolStats {
    /// Blocks in the pool.
    pub orphans: usize,
    /// Blocks awaiting validation.
    pub unprocessed: usize,
    /// Blocks parked on a missing ancestor.
    pub pending: usize,
    /// Pool capacity.
    pub capacity: usize,
}

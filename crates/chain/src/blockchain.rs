//! Main-chain state over the block store.
//!
//! [`BlockChain`] is the concrete [`SimpleChain`]: it maps chain-state
//! queries onto the storage [`Database`] and turns pushes and pops into
//! block-store updates.

use crate::block_detail::{BlockDetail, BlockDetailPtr};
use crate::error::{ChainError, Result};
use crate::orphan_pool::OrphanPoolConfig;
use crate::simple_chain::SimpleChain;
use ferrochain_core::{Block, BlockHeader, Hash, OutputPoint, Transaction};
use ferrochain_storage::{Database, DatabaseConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Chain configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainConfig {
    /// Hash table sizing of the block store.
    pub database: DatabaseConfig,
    /// Orphan pool and pending map capacities.
    pub orphans: OrphanPoolConfig,
}

/// The main chain, persisted in a [`Database`].
pub struct BlockChain {
    database: Database,
    stopped: AtomicBool,
}

impl BlockChain {
    /// Wrap a started database.
    pub fn new(database: Database) -> Self {
        Self {
            database,
            stopped: AtomicBool::new(false),
        }
    }

    /// Create a fresh store in `directory`.
    pub fn create(directory: impl Into<PathBuf>, config: &DatabaseConfig) -> Result<Self> {
        let database = Database::new(directory, config);
        database.create()?;
        Ok(Self::new(database))
    }

    /// Open an existing store in `directory`.
    pub fn open(directory: impl Into<PathBuf>, config: &DatabaseConfig) -> Result<Self> {
        let database = Database::new(directory, config);
        database.open()?;
        Ok(Self::new(database))
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Accept updates again after `stop`.
    pub fn start(&self) {
        self.stopped.store(false, Ordering::Release);
    }

    /// Refuse further updates. Idempotent.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            info!(directory = %self.database.directory().display(), "Chain stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stop and close the store.
    pub fn close(&self) -> Result<()> {
        self.stop();
        self.database.stop();
        Ok(self.database.close()?)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn get_block(&self, height: u64) -> Result<Option<Block>> {
        Ok(self.database.get_block(height)?)
    }

    pub fn get_block_by_hash(&self, hash: &Hash) -> Result<Option<(u64, Block)>> {
        Ok(self.database.get_block_by_hash(hash)?)
    }

    /// Get chain statistics.
    pub fn stats(&self) -> Result<ChainStats> {
        Ok(ChainStats {
            last_height: self.database.top(),
            gap_range: self.database.blocks.gap_range()?,
            stopped: self.is_stopped(),
        })
    }

    fn check_running(&self) -> Result<()> {
        if self.is_stopped() {
            return Err(ChainError::Stopped);
        }
        Ok(())
    }

    /// Number of heights indexed, gaps included.
    fn length(&self) -> u64 {
        self.database.blocks.count()
    }
}

impl SimpleChain for BlockChain {
    fn get_gap_range(&self) -> Result<Option<(u64, u64)>> {
        Ok(self.database.blocks.gap_range()?)
    }

    fn get_next_gap(&self, start: u64) -> Result<Option<u64>> {
        Ok(self.database.blocks.next_gap(start)?)
    }

    fn get_difficulty(&self, height: u64) -> Result<u128> {
        let mut work = 0u128;
        for current in height..self.length() {
            let stored = self
                .database
                .blocks
                .get_by_height(current)?
                .ok_or(ChainError::MissingBlock(current))?;
            work += stored.header.work();
        }
        Ok(work)
    }

    fn get_header(&self, height: u64) -> Result<Option<BlockHeader>> {
        Ok(self
            .database
            .blocks
            .get_by_height(height)?
            .map(|stored| stored.header))
    }

    fn get_height(&self, hash: &Hash) -> Result<Option<u64>> {
        Ok(self
            .database
            .blocks
            .get_by_hash(hash)?
            .map(|stored| stored.height))
    }

    fn get_last_height(&self) -> Result<Option<u64>> {
        Ok(self.database.top())
    }

    fn get_outpoint_transaction(&self, outpoint: &OutputPoint) -> Result<Option<Hash>> {
        Ok(self.database.get_spend(outpoint)?.map(|spender| spender.hash))
    }

    fn get_transaction(&self, hash: &Hash) -> Result<Option<(Transaction, u64)>> {
        Ok(self
            .database
            .get_transaction(hash)?
            .map(|stored| (stored.transaction, stored.height)))
    }

    fn import(&self, block: Arc<Block>, height: u64) -> Result<()> {
        self.check_running()?;
        self.database.push_at(&block, height)?;
        debug!(height, hash = %block.hash().short(), "Imported block");
        Ok(())
    }

    fn push(&self, block: &BlockDetailPtr) -> Result<()> {
        self.check_running()?;

        let expected = self.length();
        if block.height() != expected {
            return Err(ChainError::HeightMismatch {
                expected,
                actual: block.height(),
            });
        }

        self.database.push_at(block.actual(), expected)?;
        Ok(())
    }

    fn pop_from(&self, height: u64) -> Result<Vec<BlockDetailPtr>> {
        self.check_running()?;

        let length = self.length();
        if height > length {
            return Err(ChainError::InvalidPop { height, length });
        }

        let mut popped = Vec::with_capacity((length - height) as usize);
        while self.length() > height {
            let top = self.length() - 1;
            if self.database.blocks.get_by_height(top)?.is_none() {
                self.database.blocks.unlink(top)?;
                continue;
            }

            let detail = BlockDetail::new(self.database.pop()?).into_ptr();
            detail.set_orphan();
            popped.push(detail);
        }
        Ok(popped)
    }
}

/// Chain statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStats {
    /// Highest indexed height.
    pub last_height: Option<u64>,
    /// First and last empty heights.
    pub gap_range: Option<(u64, u64)>,
    /// Whether updates are refused.
    pub stopped: bool,
}

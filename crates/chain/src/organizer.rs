//! Fork detection and chain reorganization.
//!
//! The organizer takes received blocks into the orphan pool and, on each
//! `organize` pass, decides for every unprocessed block whether the pooled
//! chain ending at it carries more work than the main chain above the fork
//! point. If it does, the main chain is cut back to the fork point and the
//! pooled chain is validated and pushed in its place.
//!
//! A reorganization is all-or-nothing: when a block fails validation the
//! blocks pushed so far are popped again, the replaced blocks are restored,
//! and the failing block and its descendants are clipped from the pool.

use crate::block_detail::{BlockDetail, BlockDetailPtr};
use crate::blockchain::ChainConfig;
use crate::error::{ChainError, Result};
use crate::orphan_pool::{OrphanPool, OrphanPoolConfig, OrphanPoolStats};
use crate::simple_chain::SimpleChain;
use crate::validator::{BlockValidator, ValidationError};
use ferrochain_core::{Block, Hash};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A completed reorganization.
#[derive(Debug, Clone)]
pub struct Reorganization {
    /// Height of the last block shared by both chains.
    pub fork_point: u64,
    /// Blocks now on the main chain above the fork point, bottom to top.
    pub arrivals: Vec<BlockDetailPtr>,
    /// Blocks removed from the main chain, bottom to top.
    pub replaced: Vec<BlockDetailPtr>,
}

/// Notification delivered to reorganization subscribers.
#[derive(Debug, Clone)]
pub enum ReorganizeEvent {
    Reorganized(Reorganization),
    /// The organizer is shutting down.
    Stopped,
}

pub type ReorganizeHandler = Box<dyn Fn(&ReorganizeEvent) + Send + Sync>;

/// Result of processing one pooled block.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The block's chain became the main chain.
    Reorganized(Reorganization),
    /// A block failed validation; the main chain is unchanged.
    Aborted { hash: Hash, error: ValidationError },
    /// The chain ending at the block does not outweigh the main chain.
    InsufficientWork { hash: Hash },
    /// The block waits for `needed` to reach the main chain.
    Pending { hash: Hash, needed: Hash },
}

/// Feeds pooled blocks into the main chain.
pub struct Organizer {
    chain: Arc<dyn SimpleChain>,
    validator: Arc<dyn BlockValidator>,
    pool: OrphanPool,
    stopped: AtomicBool,
    /// Held across a whole organize pass.
    reorganize: Mutex<()>,
    subscribers: Mutex<Vec<ReorganizeHandler>>,
}

impl Organizer {
    /// Create an organizer with a default-sized orphan pool.
    pub fn new(chain: Arc<dyn SimpleChain>, validator: Arc<dyn BlockValidator>) -> Self {
        Self::with_config(chain, validator, OrphanPoolConfig::default())
    }

    /// Create an organizer with the orphan pool sized by `config`.
    pub fn with_chain_config(
        chain: Arc<dyn SimpleChain>,
        validator: Arc<dyn BlockValidator>,
        config: &ChainConfig,
    ) -> Self {
        Self::with_config(chain, validator, config.orphans.clone())
    }

    pub fn with_config(
        chain: Arc<dyn SimpleChain>,
        validator: Arc<dyn BlockValidator>,
        config: OrphanPoolConfig,
    ) -> Self {
        Self {
            chain,
            validator,
            pool: OrphanPool::with_config(config),
            stopped: AtomicBool::new(false),
            reorganize: Mutex::new(()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn pool_stats(&self) -> OrphanPoolStats {
        self.pool.stats()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn start(&self) {
        self.stopped.store(false, Ordering::Release);
    }

    /// Refuse further work and tell subscribers.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.notify(&ReorganizeEvent::Stopped);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn subscribe_reorganize(
        &self,
        handler: impl Fn(&ReorganizeEvent) + Send + Sync + 'static,
    ) {
        self.subscribers.lock().push(Box::new(handler));
    }

    fn notify(&self, event: &ReorganizeEvent) {
        for handler in self.subscribers.lock().iter() {
            handler(event);
        }
    }

    fn check_running(&self) -> Result<()> {
        if self.is_stopped() {
            return Err(ChainError::Stopped);
        }
        Ok(())
    }

    // =========================================================================
    // Intake
    // =========================================================================

    /// Queue a received block for the next `organize` pass.
    ///
    /// Blocks parked waiting for this one are queued again.
    pub fn add(&self, block: Block) -> Result<BlockDetailPtr> {
        self.check_running()?;

        let detail = BlockDetail::new(block).into_ptr();
        if self.chain.get_height(&detail.hash())?.is_some() {
            return Err(ChainError::AlreadyInChain(detail.hash()));
        }

        self.pool.add(detail.clone())?;
        self.resume_pending(&detail.hash());
        Ok(detail)
    }

    /// Requeue the blocks parked under `needed`.
    fn resume_pending(&self, needed: &Hash) {
        for waiting in self.pool.delete_pending_block(needed) {
            waiting.set_unprocessed();
        }
    }

    /// Drop hashes already queued from an inventory request.
    pub fn filter_orphans(&self, hashes: &mut Vec<Hash>) {
        self.pool.filter(hashes);
    }

    // =========================================================================
    // Organization
    // =========================================================================

    /// Process every unprocessed pooled block, earliest arrival first.
    ///
    /// Blocks resumed from the pending map during the pass are processed in
    /// the same pass.
    pub fn organize(&self) -> Result<Vec<Outcome>> {
        self.check_running()?;
        let _guard = self.reorganize.lock();
        let mut outcomes = Vec::new();

        loop {
            let mut batch = self.pool.unprocessed();
            if batch.is_empty() {
                break;
            }

            while let Some(detail) = batch.pop() {
                self.check_running()?;
                if detail.is_processed() || !self.pool.exists(&detail.hash()) {
                    continue;
                }
                if let Some(outcome) = self.process(&detail)? {
                    outcomes.push(outcome);
                }
            }
        }
        Ok(outcomes)
    }

    fn process(&self, detail: &BlockDetailPtr) -> Result<Option<Outcome>> {
        detail.set_processed();
        let hash = detail.hash();

        if self.chain.get_height(&hash)?.is_some() {
            self.pool.remove(detail);
            return Ok(None);
        }

        let mut orphan_chain = self.pool.trace(detail);
        if orphan_chain.is_empty() {
            orphan_chain.push(detail.clone());
        }

        let needed = orphan_chain[0].previous_hash();
        let Some(fork_point) = self.chain.get_height(&needed)? else {
            debug!(hash = %hash.short(), needed = %needed.short(), "Missing ancestor");
            if let Err(err) = self.pool.add_pending_block(needed, detail.clone()) {
                warn!(hash = %hash.short(), %err, "Cannot park orphan");
            }
            return Ok(Some(Outcome::Pending { hash, needed }));
        };

        let begin = fork_point + 1;
        let orphan_work: u128 = orphan_chain.iter().map(|block| block.actual().work()).sum();
        let main_work = self.chain.get_difficulty(begin)?;
        if orphan_work <= main_work {
            debug!(
                hash = %hash.short(),
                orphan_work,
                main_work,
                "Insufficient work to reorganize"
            );
            return Ok(Some(Outcome::InsufficientWork { hash }));
        }

        self.replace_chain(fork_point, orphan_chain).map(Some)
    }

    fn replace_chain(&self, fork_point: u64, arrivals: Vec<BlockDetailPtr>) -> Result<Outcome> {
        let begin = fork_point + 1;
        info!(
            fork_point,
            arrivals = arrivals.len(),
            top = %arrivals.last().map(|b| b.hash().short()).unwrap_or_default(),
            "Reorganizing chain"
        );

        let mut replaced = self.chain.pop_from(begin)?;
        replaced.reverse();

        for (offset, arrival) in arrivals.iter().enumerate() {
            let height = begin + offset as u64;

            if let Err(invalid) = self.validator.validate(arrival.actual(), height, &*self.chain) {
                warn!(height, hash = %arrival.hash().short(), error = %invalid, "Invalid block");
                self.rollback(begin, &arrivals[..offset], &replaced)?;
                let hash = arrival.hash();
                self.clip_orphans(&arrivals[offset..], invalid.clone());
                return Ok(Outcome::Aborted { hash, error: invalid });
            }

            arrival.set_height(height);
            if let Err(err) = self.chain.push(arrival) {
                error!(height, hash = %arrival.hash().short(), %err, "Failed to push block");
                self.rollback(begin, &arrivals[..=offset], &replaced)?;
                return Err(err);
            }
        }

        for arrival in &arrivals {
            self.pool.remove(arrival);
        }
        for block in &replaced {
            block.set_processed();
            if let Err(err) = self.pool.add(block.clone()) {
                debug!(hash = %block.hash().short(), %err, "Replaced block not pooled");
            }
        }
        for arrival in &arrivals {
            self.resume_pending(&arrival.hash());
        }

        let reorganization = Reorganization {
            fork_point,
            arrivals,
            replaced,
        };
        self.notify(&ReorganizeEvent::Reorganized(reorganization.clone()));
        Ok(Outcome::Reorganized(reorganization))
    }

    /// Pop the `pushed` arrivals and push `replaced` back, bottom up.
    fn rollback(
        &self,
        begin: u64,
        pushed: &[BlockDetailPtr],
        replaced: &[BlockDetailPtr],
    ) -> Result<()> {
        self.chain.pop_from(begin)?;
        for arrival in pushed {
            arrival.set_orphan();
        }

        for (offset, block) in replaced.iter().enumerate() {
            block.set_height(begin + offset as u64);
            self.chain.push(block)?;
        }

        info!(fork_point = begin - 1, restored = replaced.len(), "Rolled back reorganization");
        Ok(())
    }

    /// Mark the failing block and everything built on it invalid and drop
    /// them from the pool, along with blocks waiting on them.
    fn clip_orphans(&self, clipped: &[BlockDetailPtr], reason: ValidationError) {
        for (index, block) in clipped.iter().enumerate() {
            let error = if index == 0 {
                reason.clone()
            } else {
                ValidationError::PreviousBlockInvalid
            };
            block.set_error(error);
            block.set_processed();
            block.set_orphan();
            self.pool.remove(block);

            for waiting in self.pool.delete_pending_block(&block.hash()) {
                waiting.set_error(ValidationError::PreviousBlockInvalid);
                waiting.set_processed();
                self.pool.remove(&waiting);
            }
        }
    }
}

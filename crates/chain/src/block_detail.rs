//! A block plus the bookkeeping the organizer attaches to it.

use crate::validator::ValidationError;
use ferrochain_core::{Block, BlockHeader, Hash};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Shared handle to a [`BlockDetail`].
pub type BlockDetailPtr = Arc<BlockDetail>;

/// Height of a block that is not on the main chain.
pub const ORPHAN_HEIGHT: u64 = 0;

/// An immutable block with mutable validation state.
///
/// Each field is atomic on its own; there is no atomicity across fields.
/// A reader may observe a new height together with a stale error, for
/// example. Writers are the organizer, which serializes its own updates.
#[derive(Debug)]
pub struct BlockDetail {
    actual: Arc<Block>,
    hash: OnceLock<Hash>,
    processed: AtomicBool,
    height: AtomicU64,
    error: Mutex<Option<ValidationError>>,
}

impl BlockDetail {
    pub fn new(block: Block) -> Self {
        Self::from_arc(Arc::new(block))
    }

    pub fn from_arc(actual: Arc<Block>) -> Self {
        Self {
            actual,
            hash: OnceLock::new(),
            processed: AtomicBool::new(false),
            height: AtomicU64::new(ORPHAN_HEIGHT),
            error: Mutex::new(None),
        }
    }

    /// Wrap into a shared handle.
    pub fn into_ptr(self) -> BlockDetailPtr {
        Arc::new(self)
    }

    pub fn actual(&self) -> &Arc<Block> {
        &self.actual
    }

    pub fn header(&self) -> &BlockHeader {
        &self.actual.header
    }

    /// Block hash, computed once.
    pub fn hash(&self) -> Hash {
        *self.hash.get_or_init(|| self.actual.hash())
    }

    pub fn previous_hash(&self) -> Hash {
        self.actual.previous_hash()
    }

    pub fn is_processed(&self) -> bool {
        self.processed.load(Ordering::Acquire)
    }

    pub fn set_processed(&self) {
        self.processed.store(true, Ordering::Release);
    }

    /// Queue the block for another organizer pass.
    pub fn set_unprocessed(&self) {
        self.processed.store(false, Ordering::Release);
    }

    /// Main-chain height, or [`ORPHAN_HEIGHT`].
    pub fn height(&self) -> u64 {
        self.height.load(Ordering::Acquire)
    }

    pub fn is_orphan(&self) -> bool {
        self.height() == ORPHAN_HEIGHT
    }

    /// Record the main-chain height. Use [`BlockDetail::set_orphan`] to
    /// clear it.
    pub fn set_height(&self, height: u64) {
        debug_assert!(height != ORPHAN_HEIGHT, "use set_orphan to clear the height");
        self.height.store(height, Ordering::Release);
    }

    pub fn set_orphan(&self) {
        self.height.store(ORPHAN_HEIGHT, Ordering::Release);
    }

    pub fn error(&self) -> Option<ValidationError> {
        self.error.lock().clone()
    }

    pub fn set_error(&self, error: ValidationError) {
        *self.error.lock() = Some(error);
    }
}

impl From<Block> for BlockDetail {
    fn from(block: Block) -> Self {
        Self::new(block)
    }
}

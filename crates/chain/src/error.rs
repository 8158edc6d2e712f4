//! Chain-state errors.

use crate::orphan_pool::OrphanPoolError;
use ferrochain_core::Hash;
use ferrochain_storage::StorageError;
use thiserror::Error;

/// Errors that can occur in chain-state operations.
///
/// Block validation failures are not errors of this type; they are recorded
/// on the block as a [`crate::ValidationError`] and abort the reorganization.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("orphan pool error: {0}")]
    OrphanPool(#[from] OrphanPoolError),

    #[error("chain is stopped")]
    Stopped,

    #[error("block {0} is already on the main chain")]
    AlreadyInChain(Hash),

    #[error("cannot pop from height {height}: chain length is {length}")]
    InvalidPop { height: u64, length: u64 },

    #[error("block carries height {actual}, next height is {expected}")]
    HeightMismatch { expected: u64, actual: u64 },

    #[error("no block at height {0}")]
    MissingBlock(u64),
}

pub type Result<T> = std::result::Result<T, ChainError>;

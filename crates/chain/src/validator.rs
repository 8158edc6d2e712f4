//! Block validation seam.
//!
//! The organizer calls a [`BlockValidator`] for every block it is about to
//! push during a reorganization. Consensus rules live behind this trait; the
//! bundled [`StructuralValidator`] only checks that a block is well formed
//! and links to its parent.

use crate::simple_chain::SimpleChain;
use ferrochain_core::{Block, Hash};
use thiserror::Error;

/// Why a block was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("merkle root does not match transactions")]
    MerkleMismatch,

    #[error("block has no transactions")]
    EmptyBlock,

    #[error("first transaction is not a coinbase")]
    MissingCoinbase,

    #[error("previous hash {found} does not match parent {expected}")]
    ParentMismatch { expected: Hash, found: Hash },

    #[error("previous block invalid")]
    PreviousBlockInvalid,

    #[error("block rejected: {0}")]
    Rejected(String),

    #[error("chain error: {0}")]
    Chain(String),
}

/// Accepts or rejects a block about to be pushed at `height`.
///
/// `chain` holds every block below `height`; blocks above it have been
/// popped for the reorganization in progress.
pub trait BlockValidator: Send + Sync {
    fn validate(
        &self,
        block: &Block,
        height: u64,
        chain: &dyn SimpleChain,
    ) -> Result<(), ValidationError>;
}

/// Checks the merkle root, the leading coinbase and parent linkage.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralValidator;

impl BlockValidator for StructuralValidator {
    fn validate(
        &self,
        block: &Block,
        height: u64,
        chain: &dyn SimpleChain,
    ) -> Result<(), ValidationError> {
        let first = block.transactions.first().ok_or(ValidationError::EmptyBlock)?;
        if !first.is_coinbase() {
            return Err(ValidationError::MissingCoinbase);
        }
        if !block.verify_merkle_root() {
            return Err(ValidationError::MerkleMismatch);
        }

        let expected = match height.checked_sub(1) {
            Some(parent) => chain
                .get_header(parent)
                .map_err(|err| ValidationError::Chain(err.to_string()))?
                .map(|header| header.hash())
                .ok_or_else(|| ValidationError::Chain(format!("no block at height {}", parent)))?,
            None => Hash::ZERO,
        };

        let found = block.previous_hash();
        if found != expected {
            return Err(ValidationError::ParentMismatch { expected, found });
        }
        Ok(())
    }
}

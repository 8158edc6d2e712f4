//! The chain-state interface the organizer works against.

use crate::block_detail::BlockDetailPtr;
use crate::error::Result;
use ferrochain_core::{Block, BlockHeader, Hash, OutputPoint, Transaction};
use std::sync::Arc;

/// Read and update access to the main chain.
///
/// `import` may run concurrently for different heights. `push` and
/// `pop_from` expect a single writer.
pub trait SimpleChain: Send + Sync {
    /// First and last empty heights below the top, if any.
    fn get_gap_range(&self) -> Result<Option<(u64, u64)>>;

    /// First empty height at or after `start`, or the chain length when the
    /// chain has no gaps there. `None` past the end.
    fn get_next_gap(&self, start: u64) -> Result<Option<u64>>;

    /// Total work of the blocks from `height` to the top.
    fn get_difficulty(&self, height: u64) -> Result<u128>;

    fn get_header(&self, height: u64) -> Result<Option<BlockHeader>>;

    /// Main-chain height of a block.
    fn get_height(&self, hash: &Hash) -> Result<Option<u64>>;

    fn get_last_height(&self) -> Result<Option<u64>>;

    /// Hash of the transaction that spent `outpoint`.
    fn get_outpoint_transaction(&self, outpoint: &OutputPoint) -> Result<Option<Hash>>;

    /// A transaction and the height of its block.
    fn get_transaction(&self, hash: &Hash) -> Result<Option<(Transaction, u64)>>;

    /// Store `block` at `height` without validation.
    fn import(&self, block: Arc<Block>, height: u64) -> Result<()>;

    /// Append a block whose height is set to the next height.
    fn push(&self, block: &BlockDetailPtr) -> Result<()>;

    /// Remove every block from `height` up, returned top to bottom.
    ///
    /// Empty heights in the range are dropped without producing a block.
    /// Popping from one past the top removes nothing. Popping from higher
    /// fails.
    fn pop_from(&self, height: u64) -> Result<Vec<BlockDetailPtr>>;
}

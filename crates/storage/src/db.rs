//! The block store: all databases behind one facade.

use crate::databases::{
    BlockDatabase, HistoryDatabase, HistoryRow, PointKind, SpendDatabase, StoredBlock, StoredTransaction,
    TransactionDatabase,
};
use crate::error::{Result, StorageError};
use ferrochain_core::{Block, Hash, OutputPoint, Transaction};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info};

/// Bucket counts of the hash tables.
///
/// Bucket counts are persisted; a database must be opened with the counts it
/// was created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub block_buckets: u32,
    pub transaction_buckets: u32,
    pub spend_buckets: u32,
    pub history_buckets: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            block_buckets: 600_000,
            transaction_buckets: 1_000_000,
            spend_buckets: 1_000_000,
            history_buckets: 1_000_000,
        }
    }
}

impl DatabaseConfig {
    /// Same bucket count everywhere. Handy for small stores and tests.
    pub fn with_buckets(buckets: u32) -> Self {
        Self {
            block_buckets: buckets,
            transaction_buckets: buckets,
            spend_buckets: buckets,
            history_buckets: buckets,
        }
    }
}

/// Blocks, transactions, spends and payment history in one directory.
///
/// `push_at` may run concurrently for different heights. `push` and `pop`
/// assume a single writer.
pub struct Database {
    directory: PathBuf,
    pub blocks: BlockDatabase,
    pub transactions: TransactionDatabase,
    pub spends: SpendDatabase,
    pub history: HistoryDatabase,
    started: AtomicBool,
}

impl Database {
    pub fn new(directory: impl Into<PathBuf>, config: &DatabaseConfig) -> Self {
        let directory = directory.into();
        Self {
            blocks: BlockDatabase::new(
                directory.join("block_table"),
                directory.join("block_index"),
                config.block_buckets,
            ),
            transactions: TransactionDatabase::new(
                directory.join("transaction_table"),
                config.transaction_buckets,
            ),
            spends: SpendDatabase::new(directory.join("spend_table"), config.spend_buckets),
            history: HistoryDatabase::new(
                directory.join("history_table"),
                directory.join("history_rows"),
                config.history_buckets,
            ),
            directory,
            started: AtomicBool::new(false),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    // =========================================================================
    // Startup and shutdown
    // =========================================================================

    /// Create every file from scratch and leave the store started.
    pub fn create(&self) -> Result<()> {
        std::fs::create_dir_all(&self.directory)
            .map_err(|err| StorageError::io("create", &self.directory, err))?;

        self.blocks.create()?;
        self.transactions.create()?;
        self.spends.create()?;
        self.history.create()?;
        self.started.store(true, Ordering::Release);

        info!(directory = %self.directory.display(), "Created database");
        Ok(())
    }

    /// Open an existing store.
    pub fn open(&self) -> Result<()> {
        self.blocks.start()?;
        self.transactions.start()?;
        self.spends.start()?;
        self.history.start()?;
        self.started.store(true, Ordering::Release);

        info!(
            directory = %self.directory.display(),
            top = ?self.blocks.top(),
            "Opened database"
        );
        Ok(())
    }

    /// Mark every file stopped. Idempotent.
    pub fn stop(&self) {
        self.blocks.stop();
        self.transactions.stop();
        self.spends.stop();
        self.history.stop();
    }

    /// Persist counts and close every file. Idempotent.
    pub fn close(&self) -> Result<()> {
        if !self.started.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        self.sync()?;
        self.blocks.close()?;
        self.transactions.close()?;
        self.spends.close()?;
        self.history.close()
    }

    /// Persist record counts and payload sizes.
    pub fn sync(&self) -> Result<()> {
        self.blocks.sync()?;
        self.transactions.sync()?;
        self.spends.sync()?;
        self.history.sync()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Highest indexed height, gaps included.
    pub fn top(&self) -> Option<u64> {
        self.blocks.top()
    }

    pub fn get_block(&self, height: u64) -> Result<Option<Block>> {
        match self.blocks.get_by_height(height)? {
            Some(stored) => self.assemble(stored).map(Some),
            None => Ok(None),
        }
    }

    /// A block and its height.
    pub fn get_block_by_hash(&self, hash: &Hash) -> Result<Option<(u64, Block)>> {
        match self.blocks.get_by_hash(hash)? {
            Some(stored) => {
                let height = stored.height;
                Ok(Some((height, self.assemble(stored)?)))
            }
            None => Ok(None),
        }
    }

    pub fn get_transaction(&self, hash: &Hash) -> Result<Option<StoredTransaction>> {
        self.transactions.get(hash)
    }

    /// The input that spent `outpoint`.
    pub fn get_spend(&self, outpoint: &OutputPoint) -> Result<Option<OutputPoint>> {
        self.spends.get(outpoint)
    }

    pub fn get_history(&self, key: &Hash, limit: usize, from_height: u64) -> Result<Vec<HistoryRow>> {
        self.history.get(key, limit, from_height)
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Append `block` above the top. Returns its height.
    pub fn push(&self, block: &Block) -> Result<u64> {
        let height = self.blocks.count();
        self.push_at(block, height)?;
        Ok(height)
    }

    /// Index `block` at `height`.
    ///
    /// Transactions, spends and history go in first; the block becomes
    /// visible by height last.
    pub fn push_at(&self, block: &Block, height: u64) -> Result<()> {
        for (position, tx) in block.transactions.iter().enumerate() {
            self.push_transaction(tx, height, position as u32)?;
        }
        self.blocks.store(block, height)?;

        debug!(height, hash = %block.hash().short(), txs = block.tx_count(), "Pushed block");
        Ok(())
    }

    /// Remove the top block, undoing its indexing in reverse order.
    pub fn pop(&self) -> Result<Block> {
        let height = self
            .blocks
            .top()
            .ok_or_else(|| StorageError::NotFound("top block".into()))?;
        let stored = self
            .blocks
            .get_by_height(height)?
            .ok_or_else(|| StorageError::NotFound(format!("block at height {}", height)))?;
        let hash = stored.hash();
        let block = self.assemble(stored)?;

        for tx in block.transactions.iter().rev() {
            self.pop_transaction(tx, height)?;
        }
        self.blocks.unlink(height)?;
        self.blocks.remove(&hash)?;

        debug!(height, hash = %hash.short(), "Popped block");
        Ok(block)
    }

    fn push_transaction(&self, tx: &Transaction, height: u64, position: u32) -> Result<()> {
        let tx_hash = tx.hash();

        if !tx.is_coinbase() {
            for (index, input) in tx.inputs.iter().enumerate() {
                let point = OutputPoint::new(tx_hash, index as u32);
                self.spends.store(&input.previous_output, &point)?;
                self.history
                    .add_spend(&input.script_hash(), &point, height, &input.previous_output)?;
            }
        }

        for (index, output) in tx.outputs.iter().enumerate() {
            let point = OutputPoint::new(tx_hash, index as u32);
            self.history
                .add_output(&output.script_hash(), &point, height, output.value)?;
        }

        self.transactions.store(height, position, tx)
    }

    fn pop_transaction(&self, tx: &Transaction, height: u64) -> Result<()> {
        let tx_hash = tx.hash();
        self.transactions.remove(&tx_hash)?;

        for (index, output) in tx.outputs.iter().enumerate().rev() {
            let point = OutputPoint::new(tx_hash, index as u32);
            self.pop_history(&output.script_hash(), PointKind::Output, &point, height)?;
        }

        if !tx.is_coinbase() {
            for (index, input) in tx.inputs.iter().enumerate().rev() {
                let point = OutputPoint::new(tx_hash, index as u32);
                self.pop_history(&input.script_hash(), PointKind::Spend, &point, height)?;
                self.spends.remove(&input.previous_output)?;
            }
        }
        Ok(())
    }

    /// Rows are matched by point and height, not by position.
    fn pop_history(
        &self,
        key: &Hash,
        kind: PointKind,
        point: &OutputPoint,
        height: u64,
    ) -> Result<()> {
        if !self.history.delete_row(key, kind, point, height)? {
            return Err(StorageError::NotFound(format!(
                "history row for {}:{} at height {}",
                point.hash, point.index, height
            )));
        }
        Ok(())
    }

    fn assemble(&self, stored: StoredBlock) -> Result<Block> {
        let transactions = stored
            .tx_hashes
            .iter()
            .map(|hash| {
                self.transactions
                    .get(hash)?
                    .map(|stored| stored.transaction)
                    .ok_or_else(|| StorageError::NotFound(format!("transaction {}", hash)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Block {
            header: stored.header,
            transactions,
        })
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            error!(directory = %self.directory.display(), %err, "Failed to close database");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(dir: &tempfile::TempDir) -> Database {
        let database = Database::new(dir.path().join("chain"), &DatabaseConfig::with_buckets(64));
        database.create().unwrap();
        database
    }

    fn block(number: u64, previous: Hash) -> Block {
        let coinbase = Transaction::coinbase(number, 50, vec![0xAA]);
        Block::new(number, previous, vec![coinbase], 1)
    }

    #[test]
    fn test_push_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let database = setup(&dir);

        let genesis = block(0, Hash::ZERO);
        assert_eq!(database.push(&genesis).unwrap(), 0);
        let next = block(1, genesis.hash());
        assert_eq!(database.push(&next).unwrap(), 1);

        assert_eq!(database.get_block(1).unwrap(), Some(next.clone()));
        assert_eq!(database.get_block_by_hash(&genesis.hash()).unwrap(), Some((0, genesis)));

        let tx = database
            .get_transaction(&next.transactions[0].hash())
            .unwrap()
            .unwrap();
        assert_eq!(tx.height, 1);
        assert_eq!(tx.position, 0);
    }

    #[test]
    fn test_pop_reverses_indexing() {
        let dir = tempfile::tempdir().unwrap();
        let database = setup(&dir);

        let genesis = block(0, Hash::ZERO);
        database.push(&genesis).unwrap();

        let funding = OutputPoint::new(genesis.transactions[0].hash(), 0);
        let spend = Transaction::spend(funding, 40, vec![0xBB]);
        let next = Block::new(
            1,
            genesis.hash(),
            vec![Transaction::coinbase(1, 50, vec![0xAA]), spend.clone()],
            1,
        );
        database.push(&next).unwrap();

        let script = genesis.transactions[0].outputs[0].script_hash();
        assert_eq!(database.get_history(&script, 0, 0).unwrap().len(), 2);
        assert_eq!(
            database.get_spend(&funding).unwrap(),
            Some(OutputPoint::new(spend.hash(), 0))
        );

        assert_eq!(database.pop().unwrap(), next);
        assert_eq!(database.top(), Some(0));
        assert_eq!(database.get_spend(&funding).unwrap(), None);
        assert!(database.get_transaction(&spend.hash()).unwrap().is_none());
        assert!(database.get_block_by_hash(&next.hash()).unwrap().is_none());

        let history = database.get_history(&script, 0, 0).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].point, funding);
    }

    #[test]
    fn test_pop_empty_fails() {
        let dir = tempfile::tempdir().unwrap();
        let database = setup(&dir);
        assert!(matches!(database.pop(), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig::with_buckets(64);
        let genesis = block(0, Hash::ZERO);
        {
            let database = setup(&dir);
            database.push(&genesis).unwrap();
            database.close().unwrap();
        }

        let database = Database::new(dir.path().join("chain"), &config);
        database.open().unwrap();
        assert_eq!(database.top(), Some(0));
        assert_eq!(database.get_block(0).unwrap(), Some(genesis));
    }

    #[test]
    fn test_pop_after_out_of_order_import() {
        let dir = tempfile::tempdir().unwrap();
        let database = setup(&dir);

        // Same script at every height, indexed as 0, 2, 1.
        for height in [0u64, 2, 1] {
            database.push_at(&block(height, Hash::ZERO), height).unwrap();
        }
        let script = block(0, Hash::ZERO).transactions[0].outputs[0].script_hash();

        database.pop().unwrap();
        assert_eq!(database.top(), Some(1));

        let heights: Vec<u64> = database
            .get_history(&script, 0, 0)
            .unwrap()
            .into_iter()
            .map(|row| row.height)
            .collect();
        assert_eq!(heights, vec![1, 0]);
    }
}

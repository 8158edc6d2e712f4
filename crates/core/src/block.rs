//! Block and block header structures.

use crate::hash::{hash, hash_concat, Hash};
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// The header of a block containing metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    /// Height the producer claims for this block. Storage tracks the
    /// accepted height separately.
    pub number: u64,
    /// Hash of the previous block.
    pub previous_block_hash: Hash,
    /// Merkle root of transactions.
    pub merkle_root: Hash,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Target difficulty. Also the amount of work the block contributes.
    pub difficulty: u64,
    pub nonce: u64,
}

impl BlockHeader {
    /// Calculate the hash of this block header.
    pub fn hash(&self) -> Hash {
        hash(&self.to_bytes())
    }

    /// Serialize the header.
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("serialization should not fail")
    }

    /// Deserialize a header written by [`BlockHeader::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Work contributed by a block with this header.
    pub fn work(&self) -> u128 {
        u128::from(self.difficulty)
    }

    /// Get the current Unix timestamp.
    pub fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time went backwards")
            .as_secs()
    }
}

/// A complete block: header plus transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Create a new block on top of `previous_block_hash`.
    pub fn new(
        number: u64,
        previous_block_hash: Hash,
        transactions: Vec<Transaction>,
        difficulty: u64,
    ) -> Self {
        let tx_hashes: Vec<Hash> = transactions.iter().map(|tx| tx.hash()).collect();

        Self {
            header: BlockHeader {
                version: 1,
                number,
                previous_block_hash,
                merkle_root: merkle_root(&tx_hashes),
                timestamp: BlockHeader::current_timestamp(),
                difficulty,
                nonce: 0,
            },
            transactions,
        }
    }

    /// Create the genesis block.
    pub fn genesis(coinbase: Transaction) -> Self {
        Self::new(0, Hash::ZERO, vec![coinbase], 1)
    }

    /// Get the block hash (hash of the header).
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn previous_hash(&self) -> Hash {
        self.header.previous_block_hash
    }

    /// Check if this is a genesis block.
    pub fn is_genesis(&self) -> bool {
        self.header.number == 0 && self.header.previous_block_hash.is_zero()
    }

    /// Get the number of transactions in this block.
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn work(&self) -> u128 {
        self.header.work()
    }

    /// Verify the merkle root matches the transactions.
    pub fn verify_merkle_root(&self) -> bool {
        let tx_hashes: Vec<Hash> = self.transactions.iter().map(|tx| tx.hash()).collect();
        merkle_root(&tx_hashes) == self.header.merkle_root
    }
}

/// Merkle root over transaction hashes.
///
/// Odd levels pair the last hash with itself. An empty list has the zero root.
pub fn merkle_root(hashes: &[Hash]) -> Hash {
    if hashes.is_empty() {
        return Hash::ZERO;
    }

    let mut level = hashes.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let right = pair.get(1).unwrap_or(&pair[0]);
                hash_concat(&[pair[0].as_bytes(), right.as_bytes()])
            })
            .collect();
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::OutputPoint;

    fn coinbase(height: u64) -> Transaction {
        Transaction::coinbase(height, 50, vec![0xAA])
    }

    #[test]
    fn test_genesis_block() {
        let genesis = Block::genesis(coinbase(0));

        assert!(genesis.is_genesis());
        assert_eq!(genesis.previous_hash(), Hash::ZERO);
        assert_eq!(genesis.tx_count(), 1);
        assert!(genesis.verify_merkle_root());
    }

    #[test]
    fn test_block_hash_commits_to_parent() {
        let a = Block::new(1, Hash([1; 32]), vec![coinbase(1)], 1);
        let mut b = a.clone();
        b.header.previous_block_hash = Hash([2; 32]);

        assert_eq!(a.hash(), a.hash());
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_header_bytes_roundtrip() {
        let block = Block::new(3, Hash([9; 32]), vec![coinbase(3)], 7);
        let decoded = BlockHeader::from_bytes(&block.header.to_bytes()).unwrap();
        assert_eq!(decoded, block.header);
    }

    #[test]
    fn test_merkle_root_verification() {
        let first = coinbase(1);
        let spend = Transaction::spend(OutputPoint::new(first.hash(), 0), 10, vec![0xBB]);
        let mut block = Block::new(1, Hash::ZERO, vec![first, spend], 1);

        assert!(block.verify_merkle_root());
        block.transactions.pop();
        assert!(!block.verify_merkle_root());
    }

    #[test]
    fn test_merkle_root_shapes() {
        let a = hash(b"a");
        let b = hash(b"b");
        let c = hash(b"c");

        assert_eq!(merkle_root(&[]), Hash::ZERO);
        assert_eq!(merkle_root(&[a]), a);

        let ab = hash_concat(&[a.as_bytes(), b.as_bytes()]);
        let cc = hash_concat(&[c.as_bytes(), c.as_bytes()]);
        let root = hash_concat(&[ab.as_bytes(), cc.as_bytes()]);
        assert_eq!(merkle_root(&[a, b, c]), root);
    }

    #[test]
    fn test_work_is_difficulty() {
        let block = Block::new(1, Hash::ZERO, vec![], 12);
        assert_eq!(block.work(), 12);
    }
}

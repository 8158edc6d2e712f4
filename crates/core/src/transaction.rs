//! Transactions and the output points that link them together.

use crate::hash::{hash, Hash, HASH_SIZE};
use serde::{Deserialize, Serialize};

/// Encoded width of an [`OutputPoint`]: hash plus little-endian index.
pub const POINT_SIZE: usize = HASH_SIZE + 4;

/// Reference to one output of a previous transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputPoint {
    /// Hash of the transaction holding the output.
    pub hash: Hash,
    /// Position of the output within that transaction.
    pub index: u32,
}

impl OutputPoint {
    pub fn new(hash: Hash, index: u32) -> Self {
        Self { hash, index }
    }

    /// The point carried by coinbase inputs.
    pub fn null() -> Self {
        Self {
            hash: Hash::ZERO,
            index: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.index == u32::MAX && self.hash.is_zero()
    }

    /// Fixed-width key form used by the storage indexes.
    pub fn to_key(&self) -> [u8; POINT_SIZE] {
        let mut key = [0u8; POINT_SIZE];
        key[..HASH_SIZE].copy_from_slice(&self.hash.0);
        key[HASH_SIZE..].copy_from_slice(&self.index.to_le_bytes());
        key
    }

    /// Decode the key form. Returns `None` for short buffers.
    pub fn from_key(bytes: &[u8]) -> Option<Self> {
        let hash = Hash::from_slice(bytes)?;
        let index: [u8; 4] = bytes.get(HASH_SIZE..POINT_SIZE)?.try_into().ok()?;
        Some(Self {
            hash,
            index: u32::from_le_bytes(index),
        })
    }
}

/// A transaction input spending a previous output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub previous_output: OutputPoint,
    /// Unlocking script (opaque to this crate).
    pub script: Vec<u8>,
    pub sequence: u32,
}

impl Input {
    /// Key under which this spend is indexed in payment history.
    pub fn script_hash(&self) -> Hash {
        hash(&self.script)
    }
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub value: u64,
    /// Locking script (opaque to this crate).
    pub script: Vec<u8>,
}

impl Output {
    /// Key under which payment history for this output's script is indexed.
    pub fn script_hash(&self) -> Hash {
        hash(&self.script)
    }
}

/// A transaction on the blockchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn new(inputs: Vec<Input>, outputs: Vec<Output>) -> Self {
        Self {
            version: 1,
            inputs,
            outputs,
            lock_time: 0,
        }
    }

    /// Create a coinbase paying `value` to `script`.
    ///
    /// The height is committed into the input script so coinbases at
    /// different heights never share a hash.
    pub fn coinbase(height: u64, value: u64, script: Vec<u8>) -> Self {
        let input = Input {
            previous_output: OutputPoint::null(),
            script: height.to_le_bytes().to_vec(),
            sequence: u32::MAX,
        };
        Self::new(vec![input], vec![Output { value, script }])
    }

    /// Create a transaction spending `previous` into a single output.
    pub fn spend(previous: OutputPoint, value: u64, script: Vec<u8>) -> Self {
        let input = Input {
            previous_output: previous,
            script: Vec::new(),
            sequence: u32::MAX,
        };
        Self::new(vec![input], vec![Output { value, script }])
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    /// Serialize the transaction.
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("serialization should not fail")
    }

    /// Deserialize a transaction written by [`Transaction::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Get the transaction hash.
    pub fn hash(&self) -> Hash {
        hash(&self.to_bytes())
    }

    /// Sum of output values.
    pub fn total_output_value(&self) -> u64 {
        self.outputs.iter().map(|output| output.value).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_key_roundtrip() {
        let point = OutputPoint::new(hash(b"tx"), 7);
        let key = point.to_key();
        assert_eq!(key.len(), POINT_SIZE);
        assert_eq!(OutputPoint::from_key(&key), Some(point));
        assert_eq!(OutputPoint::from_key(&key[..10]), None);
    }

    #[test]
    fn test_coinbase() {
        let coinbase = Transaction::coinbase(5, 50, vec![0xAA]);
        assert!(coinbase.is_coinbase());
        assert_eq!(coinbase.total_output_value(), 50);

        let spend = Transaction::spend(OutputPoint::new(coinbase.hash(), 0), 40, vec![0xBB]);
        assert!(!spend.is_coinbase());
    }

    #[test]
    fn test_coinbase_hash_unique_per_height() {
        let a = Transaction::coinbase(1, 50, vec![0xAA]);
        let b = Transaction::coinbase(2, 50, vec![0xAA]);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_bytes_roundtrip() {
        let tx = Transaction::coinbase(3, 10, vec![1, 2, 3]);
        let decoded = Transaction::from_bytes(&tx.to_bytes()).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.hash(), tx.hash());
    }

    #[test]
    fn test_script_hash() {
        let a = Output { value: 1, script: vec![1] };
        let b = Output { value: 2, script: vec![1] };
        assert_eq!(a.script_hash(), b.script_hash());
    }
}

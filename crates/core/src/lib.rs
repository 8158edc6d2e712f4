//! Core blockchain primitives for ferrochain.
//!
//! This crate provides the domain types the storage engine and the
//! chain-state layer move around:
//! - Hashing (blake3 digests)
//! - Transactions, output points, inputs and outputs
//! - Blocks, block headers and proof-of-work accounting

pub mod block;
pub mod hash;
pub mod transaction;

// Re-export commonly used types at the crate root
pub use block::{merkle_root, Block, BlockHeader};
pub use hash::{hash, hash_concat, Hash, H256, HASH_SIZE};
pub use transaction::{Input, Output, OutputPoint, Transaction, POINT_SIZE};

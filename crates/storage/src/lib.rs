//! Persistent storage layer for ferrochain.
//!
//! This crate provides the embedded block store:
//! - Growable memory-mapped files with remap-safe guards
//! - Fixed-size record and variable-size slab allocators
//! - Open-chained hash tables, linked lists and multimaps over them
//! - Block, transaction, spend and history databases
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Chain-state Layer                     │
//! │           (BlockChain, Organizer, Orphan Pool)           │
//! └────────────────────────┬────────────────────────────────┘
//!                          │
//! ┌────────────────────────▼────────────────────────────────┐
//! │                       Database                           │
//! │  ┌──────────┐ ┌──────────────┐ ┌────────┐ ┌──────────┐  │
//! │  │  Blocks  │ │ Transactions │ │ Spends │ │ History  │  │
//! │  └──────────┘ └──────────────┘ └────────┘ └──────────┘  │
//! └────────────────────────┬────────────────────────────────┘
//!                          │
//! ┌────────────────────────▼────────────────────────────────┐
//! │                      Primitives                          │
//! │   hash tables, record lists, record and slab managers    │
//! └────────────────────────┬────────────────────────────────┘
//!                          │
//! ┌────────────────────────▼────────────────────────────────┐
//! │                  MemoryMap (memmap2)                     │
//! │        Accessor (shared) / Allocator (growth)            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use ferrochain_core::{Block, Transaction};
//! use ferrochain_storage::{Database, DatabaseConfig};
//!
//! let database = Database::new("./blockchain_data", &DatabaseConfig::default());
//! database.create().unwrap();
//!
//! let genesis = Block::genesis(Transaction::coinbase(0, 50, vec![0xAA]));
//! database.push(&genesis).unwrap();
//! assert_eq!(database.top(), Some(0));
//!
//! database.close().unwrap();
//! ```

pub mod databases;
pub mod db;
pub mod error;
pub mod memory;
pub mod primitives;

// Re-export commonly used types
pub use databases::{HistoryRow, PointKind, StoredBlock, StoredTransaction};
pub use db::{Database, DatabaseConfig};
pub use error::{Result, StorageError};
pub use memory::{Accessor, Allocator, MemoryMap};
pub use primitives::{ArrayIndex, FileOffset};

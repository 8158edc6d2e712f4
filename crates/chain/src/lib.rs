//! Chain-state layer for ferrochain.
//!
//! This crate keeps the main chain in step with the blocks a node receives:
//! - **Block detail**: a block plus its validation state
//! - **Orphan pool**: blocks waiting to join the main chain
//! - **Simple chain**: the chain-state interface, backed by the block store
//! - **Organizer**: fork detection and all-or-nothing reorganization
//!
//! # Example
//!
//! ```rust,no_run
//! use ferrochain_chain::{BlockChain, Organizer, SimpleChain, StructuralValidator};
//! use ferrochain_core::{Block, Transaction};
//! use ferrochain_storage::DatabaseConfig;
//! use std::sync::Arc;
//!
//! // Setup storage with a genesis block
//! let chain = Arc::new(BlockChain::create("./blockchain_data", &DatabaseConfig::default()).unwrap());
//! let genesis = Block::genesis(Transaction::coinbase(0, 50, vec![0xAA]));
//! chain.import(Arc::new(genesis.clone()), 0).unwrap();
//!
//! // Feed received blocks through the organizer
//! let organizer = Organizer::new(chain.clone(), Arc::new(StructuralValidator));
//! organizer.subscribe_reorganize(|event| println!("{:?}", event));
//!
//! let next = Block::new(1, genesis.hash(), vec![Transaction::coinbase(1, 50, vec![0xAA])], 1);
//! organizer.add(next).unwrap();
//! organizer.organize().unwrap();
//! assert_eq!(chain.get_last_height().unwrap(), Some(1));
//! ```

pub mod block_detail;
pub mod blockchain;
pub mod error;
pub mod orphan_pool;
pub mod organizer;
pub mod simple_chain;
pub mod validator;

// Re-export commonly used types
pub use block_detail::{BlockDetail, BlockDetailPtr};
pub use blockchain::{BlockChain, ChainConfig, ChainStats};
pub use error::{ChainError, Result};
pub use organizer::{Organizer, Outcome, Reorganization, ReorganizeEvent, ReorganizeHandler};
pub use orphan_pool::{OrphanPool, OrphanPoolConfig, OrphanPoolError, OrphanPoolStats};
pub use simple_chain::SimpleChain;
pub use validator::{BlockValidator, StructuralValidator, ValidationError};

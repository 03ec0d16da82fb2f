//! tipindex - tip-following mined-blocks indexer
//!
//! Derives a "which address mined which block" index from a Flux/Zcash-family
//! node and keeps it current as the chain tip advances. Also provides the
//! reward schedule, coinbase attribution and confirmation-gated block caches
//! used by query-serving code.

pub mod attribution;
pub mod cache;
pub mod error;
pub mod rewards;
pub mod types;

// Persistence
pub mod keys;
pub mod records;
pub mod store;

// Chain access and indexing
pub mod explorer;
pub mod indexer;
pub mod poller;
pub mod rpc;
pub mod source;

pub mod cli;
pub mod config;

// Re-export the main types for convenience
pub use error::IndexError;
pub use indexer::{IndexerConfig, IndexerState, IndexerStatus, TipFollower};
pub use store::{CheckpointStore, MemoryIndexStore, MinedBlocksStore, RocksIndexStore};

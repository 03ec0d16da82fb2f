//! Chain-data collaborator contracts.
//!
//! The indexer and the block explorer only talk to the node through these
//! traits; [`crate::rpc::RpcClient`] implements both against JSON-RPC, tests
//! substitute in-memory fakes.

use alloy_primitives::B256;
use async_trait::async_trait;

use crate::error::IndexError;
use crate::types::{BlockHeader, BlockId, BlockRecord, TransactionDetail};

/// Read access to blocks and the chain tip.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Fetch a block by hash.
    async fn get_block(&self, hash: &B256) -> Result<BlockRecord, IndexError>;

    /// Fetch a block header by hash or height.
    async fn get_block_header(&self, id: BlockId) -> Result<BlockHeader, IndexError>;

    /// Fetch a block by height.
    async fn get_json_block(&self, height: u64) -> Result<BlockRecord, IndexError>;

    /// Hashes of blocks with `low <= time < high`, oldest first.
    async fn get_block_hashes_by_timestamp(
        &self,
        high: u64,
        low: u64,
    ) -> Result<Vec<B256>, IndexError>;

    /// Height of the current chain tip.
    async fn current_tip_height(&self) -> Result<u64, IndexError>;
}

/// Read access to decoded transactions.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Fetch a transaction with its ordered, address-decoded outputs.
    async fn get_detailed_transaction(&self, txid: &B256)
        -> Result<TransactionDetail, IndexError>;
}

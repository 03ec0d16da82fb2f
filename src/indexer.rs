//! Tip-following incremental indexer
//!
//! Keeps the blocks-mined index in step with the chain tip. Every tip event
//! raises a known-tip watermark; at most one catch-up run per follower walks
//! the heights between the persisted checkpoint and that watermark, crediting
//! each block's miner and advancing the checkpoint one height at a time.
//!
//! Runs are fail-stop: the first error aborts the run, leaves the checkpoint
//! at the last completed height and is reported through [`TipFollower::status`].
//! The next tip event (or a restart) resumes from the checkpoint.

use crate::attribution::{credited_address, AttributionPolicy};
use crate::error::IndexError;
use crate::rewards::block_reward;
use crate::source::{ChainSource, TransactionSource};
use crate::store::{CheckpointStore, MinedBlocksStore};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Index type maintained by the blocks-mined follower.
pub const BLOCKS_MINED: &str = "BLOCKS_MINED";

/// Follower settings.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Checkpoint namespace
    pub index_type: String,
    /// Threshold used to pick the credited coinbase output
    pub policy: AttributionPolicy,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            index_type: BLOCKS_MINED.to_string(),
            policy: AttributionPolicy::MINED_INDEX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexerState {
    Idle,
    CatchingUp,
}

impl fmt::Display for IndexerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::CatchingUp => write!(f, "catching_up"),
        }
    }
}

/// Point-in-time view of a follower for operators.
#[derive(Debug, Clone, Serialize)]
pub struct IndexerStatus {
    pub index_type: String,
    pub state: IndexerState,
    pub known_tip: u64,
    pub checkpoint: u64,
    /// Error that aborted the most recent run, cleared by the next clean run
    pub last_error: Option<String>,
}

/// Follows the chain tip for one index type.
pub struct TipFollower {
    config: IndexerConfig,
    chain: Arc<dyn ChainSource>,
    txs: Arc<dyn TransactionSource>,
    checkpoints: Arc<dyn CheckpointStore>,
    mined: Arc<dyn MinedBlocksStore>,
    known_tip: AtomicU64,
    catching_up: AtomicBool,
    // Mirror of the persisted checkpoint for status reads.
    checkpoint: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl TipFollower {
    pub fn new(
        config: IndexerConfig,
        chain: Arc<dyn ChainSource>,
        txs: Arc<dyn TransactionSource>,
        checkpoints: Arc<dyn CheckpointStore>,
        mined: Arc<dyn MinedBlocksStore>,
    ) -> Self {
        Self {
            config,
            chain,
            txs,
            checkpoints,
            mined,
            known_tip: AtomicU64::new(0),
            catching_up: AtomicBool::new(false),
            checkpoint: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    pub fn index_type(&self) -> &str {
        &self.config.index_type
    }

    /// Load (or create) the checkpoint, read the current tip and deliver it
    /// as the first tip event.
    ///
    /// Returns the handle of the catch-up run this started, if any.
    pub async fn start(self: &Arc<Self>) -> Result<Option<JoinHandle<()>>, IndexError> {
        let checkpoint = self
            .checkpoints
            .init_checkpoint(&self.config.index_type)
            .map_err(IndexError::persistence)?;
        self.checkpoint.store(checkpoint, Ordering::SeqCst);

        let tip = self.chain.current_tip_height().await?;
        info!(
            index_type = %self.config.index_type,
            checkpoint,
            tip,
            "Starting tip follower"
        );

        Ok(self.notify_tip(tip))
    }

    /// Tip-advance handler.
    ///
    /// Raises the known tip and starts a catch-up run unless one is already
    /// in flight, in which case the event is absorbed by the watermark and
    /// `None` is returned. Never blocks and never fails.
    pub fn notify_tip(self: &Arc<Self>, height: u64) -> Option<JoinHandle<()>> {
        let previous = self.known_tip.fetch_max(height, Ordering::SeqCst);
        if !self.try_begin_run() {
            debug!(height, known_tip = previous.max(height), "Run in flight, tip event coalesced");
            return None;
        }

        let follower = Arc::clone(self);
        Some(tokio::spawn(async move { follower.drive().await }))
    }

    pub fn status(&self) -> IndexerStatus {
        let state = if self.catching_up.load(Ordering::SeqCst) {
            IndexerState::CatchingUp
        } else {
            IndexerState::Idle
        };
        IndexerStatus {
            index_type: self.config.index_type.clone(),
            state,
            known_tip: self.known_tip.load(Ordering::SeqCst),
            checkpoint: self.checkpoint.load(Ordering::SeqCst),
            last_error: self.last_error.lock().clone(),
        }
    }

    fn try_begin_run(&self) -> bool {
        self.catching_up
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Run catch-up passes until the watermark stops moving.
    ///
    /// Entered with the catching-up flag held.
    async fn drive(self: Arc<Self>) {
        loop {
            let target = self.known_tip.load(Ordering::SeqCst);
            let result = self.catch_up(target).await;
            self.catching_up.store(false, Ordering::SeqCst);

            match result {
                Ok(()) => *self.last_error.lock() = None,
                Err(e) => {
                    error!(
                        index_type = %self.config.index_type,
                        checkpoint = self.checkpoint.load(Ordering::SeqCst),
                        target,
                        error = %e,
                        "Catch-up run aborted"
                    );
                    *self.last_error.lock() = Some(e.to_string());
                    return;
                }
            }

            // Events that arrived mid-run were coalesced into the watermark.
            // If a fresh event already started a run, leave it to that one.
            if self.known_tip.load(Ordering::SeqCst) <= target || !self.try_begin_run() {
                return;
            }
        }
    }

    async fn catch_up(&self, target: u64) -> Result<(), IndexError> {
        let checkpoint = self
            .checkpoints
            .checkpoint(&self.config.index_type)
            .map_err(IndexError::persistence)?
            .unwrap_or(0);
        self.checkpoint.store(checkpoint, Ordering::SeqCst);

        if checkpoint >= target {
            return Ok(());
        }

        info!(
            index_type = %self.config.index_type,
            from = checkpoint + 1,
            to = target,
            "Catching up"
        );
        for height in checkpoint + 1..=target {
            self.index_height(height).await?;
        }
        info!(index_type = %self.config.index_type, checkpoint = target, "Caught up");
        Ok(())
    }

    /// Credit the miner of the block at `height` and advance the checkpoint.
    async fn index_height(&self, height: u64) -> Result<(), IndexError> {
        let block = self.chain.get_json_block(height).await?;

        match block.coinbase_txid() {
            Some(txid) => {
                let coinbase = self.txs.get_detailed_transaction(txid).await?;
                let expected = block_reward(height);
                match credited_address(&coinbase.outputs, expected, self.config.policy) {
                    Some(address) => {
                        let credited = self
                            .mined
                            .record_mined(address, height)
                            .map_err(IndexError::persistence)?;
                        if !credited {
                            debug!(height, address, "Height already credited");
                        }
                    }
                    None => debug!(height, expected, "No coinbase output above threshold"),
                }
            }
            None => warn!(height, "Block has no transactions, nothing to credit"),
        }

        self.checkpoints
            .set_checkpoint(&self.config.index_type, height)
            .map_err(IndexError::persistence)?;
        self.checkpoint.store(height, Ordering::SeqCst);
        debug!(height, "Indexed block");
        Ok(())
    }
}

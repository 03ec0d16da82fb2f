//! CLI implementation for blockctl
//!
//! Operator tool for the mined-blocks index and for ad-hoc block queries
//! against the node. All commands output pretty JSON.

use crate::cache::{DEFAULT_BLOCK_CACHE_SIZE, DEFAULT_SUMMARY_CACHE_SIZE};
use crate::config::load_pools_or_empty;
use crate::explorer::BlockExplorer;
use crate::indexer::BLOCKS_MINED;
use crate::rewards::{block_reward, circulating_supply, format_coins, halvings};
use crate::rpc::RpcClient;
use crate::store::{CheckpointStore, MinedBlocksStore, RocksIndexStore};
use crate::types::{hash_hex, parse_hash};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// Mined-blocks index CLI tool
#[derive(Parser)]
#[command(name = "blockctl")]
#[command(about = "Inspect the mined-blocks index and query blocks")]
pub struct Cli {
    /// Path to the RocksDB database directory
    #[arg(short, long, default_value = "./index_db")]
    db_path: PathBuf,

    /// Index type whose checkpoint is read or written
    #[arg(long, default_value = BLOCKS_MINED)]
    index_type: String,

    /// Node RPC endpoint URL
    #[arg(short, long, default_value = "http://127.0.0.1:16124")]
    rpc_url: String,

    /// RPC user name
    #[arg(long)]
    rpc_user: Option<String>,

    /// RPC password
    #[arg(long, default_value = "")]
    rpc_password: String,

    /// Pool table JSON file
    #[arg(long)]
    pools: Option<PathBuf>,

    /// Capacity of the block detail cache
    #[arg(long, default_value_t = DEFAULT_BLOCK_CACHE_SIZE)]
    block_cache_size: u32,

    /// Capacity of the block summary cache
    #[arg(long, default_value_t = DEFAULT_SUMMARY_CACHE_SIZE)]
    summary_cache_size: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Get the indexer checkpoint
    GetCheckpoint,
    /// Set the indexer checkpoint (the next run resumes at height + 1)
    SetCheckpoint {
        /// Last processed height
        height: u64,
    },
    /// Number of blocks credited to an address and the latest credited height
    Mined {
        /// Miner address
        address: String,
    },
    /// Addresses with the most credited blocks
    Top {
        /// Maximum number of addresses
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Address credited for the block at a height
    CreditedAt {
        /// Block height
        height: u64,
    },
    /// Block subsidy at a height
    Reward {
        /// Block height
        height: u64,
    },
    /// Coins issued up to and including a height
    Supply {
        /// Block height
        height: u64,
    },
    /// Full block view (queries the node)
    Block {
        /// Block hash in hex
        hash: String,
    },
    /// Compact block view (queries the node)
    Summary {
        /// Block hash in hex
        hash: String,
    },
    /// Main-chain blocks mined on a UTC day, newest first (queries the node)
    List {
        /// Day to list as yyyy-mm-dd (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Only list blocks older than this Unix timestamp
        #[arg(long)]
        start_ts: Option<u64>,
        /// Maximum number of blocks (defaults to 200)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Main-chain block hash at a height (queries the node)
    BlockHash {
        /// Block height
        height: u64,
    },
}

impl Cli {
    fn open_store(&self) -> Result<RocksIndexStore> {
        RocksIndexStore::open(&self.db_path)
            .with_context(|| format!("Failed to open database at {:?}", self.db_path))
    }

    fn rpc_client(&self) -> RpcClient {
        let client = RpcClient::new(self.rpc_url.clone());
        match &self.rpc_user {
            Some(user) => client.with_auth(user.clone(), self.rpc_password.clone()),
            None => client,
        }
    }

    fn explorer(&self) -> Result<BlockExplorer> {
        let pools = load_pools_or_empty(self.pools.as_deref())?;
        let rpc = Arc::new(self.rpc_client());
        Ok(BlockExplorer::new(
            rpc.clone(),
            rpc,
            pools,
            self.block_cache_size,
            self.summary_cache_size,
        ))
    }
}

/// Execute a parsed command and return its JSON output.
pub async fn execute(cli: &Cli) -> Result<Value> {
    let result = match &cli.command {
        Commands::GetCheckpoint => {
            let store = cli.open_store()?;
            json!({
                "index_type": cli.index_type,
                "checkpoint": store.checkpoint(&cli.index_type)?,
            })
        }
        Commands::SetCheckpoint { height } => {
            let store = cli.open_store()?;
            store.set_checkpoint(&cli.index_type, *height)?;
            json!({ "status": "ok", "index_type": cli.index_type, "checkpoint": height })
        }
        Commands::Mined { address } => {
            let store = cli.open_store()?;
            let miner = store.miner(address)?;
            json!({
                "address": address,
                "blocks_mined": miner.as_ref().map_or(0, |m| m.count),
                "last_height": miner.map(|m| m.last_height),
            })
        }
        Commands::Top { limit } => {
            let store = cli.open_store()?;
            let miners: Vec<Value> = store
                .top_miners(*limit)?
                .into_iter()
                .map(|(address, count)| json!({ "address": address, "blocks_mined": count }))
                .collect();
            json!({ "miners": miners })
        }
        Commands::CreditedAt { height } => {
            let store = cli.open_store()?;
            json!({ "height": height, "address": store.credited_at(*height)? })
        }
        Commands::Reward { height } => {
            let reward = block_reward(*height);
            json!({
                "height": height,
                "reward": format_coins(reward),
                "satoshis": reward,
                "halvings": halvings(*height),
            })
        }
        Commands::Supply { height } => {
            let supply = circulating_supply(*height);
            json!({
                "height": height,
                "supply": format_coins(supply),
                "satoshis": supply,
            })
        }
        Commands::Block { hash } => {
            let hash = parse_hash(hash)?;
            let detail = cli
                .explorer()?
                .block_detail(&hash)
                .await
                .with_context(|| format!("Failed to fetch block {}", hash_hex(&hash)))?;
            serde_json::to_value(detail)?
        }
        Commands::Summary { hash } => {
            let hash = parse_hash(hash)?;
            let summary = cli
                .explorer()?
                .block_summary(&hash)
                .await
                .with_context(|| format!("Failed to fetch block {}", hash_hex(&hash)))?;
            serde_json::to_value(summary)?
        }
        Commands::List { date, start_ts, limit } => {
            let list = cli
                .explorer()?
                .list_blocks(*date, *start_ts, *limit)
                .await
                .context("Failed to list blocks")?;
            serde_json::to_value(list)?
        }
        Commands::BlockHash { height } => {
            let hash = cli
                .explorer()?
                .block_hash(*height)
                .await
                .with_context(|| format!("Failed to fetch block hash at {}", height))?;
            json!({ "height": height, "blockHash": hash_hex(&hash) })
        }
    };

    Ok(result)
}

/// Run the CLI command and print JSON output.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let result = execute(&cli).await?;

    // Pretty print JSON
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

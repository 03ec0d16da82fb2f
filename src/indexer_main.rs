//! Tip-following indexer binary
//!
//! Keeps the mined-blocks index in step with a Flux/Zcash-family node:
//! resumes from the stored checkpoint, then polls the node tip and catches
//! up whenever it advances.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tipindex::indexer::{IndexerConfig, TipFollower, BLOCKS_MINED};
use tipindex::poller::follow_tip;
use tipindex::rpc::RpcClient;
use tipindex::store::RocksIndexStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Mined-blocks indexer
#[derive(Parser)]
#[command(name = "tipindexd")]
#[command(about = "Follow the chain tip and index which address mined each block")]
struct Args {
    /// Node RPC endpoint URL
    #[arg(short, long, default_value = "http://127.0.0.1:16124")]
    rpc_url: String,

    /// RPC user name
    #[arg(long)]
    rpc_user: Option<String>,

    /// RPC password
    #[arg(long, default_value = "")]
    rpc_password: String,

    /// Path to RocksDB database directory
    #[arg(short, long, default_value = "./index_db")]
    db_path: PathBuf,

    /// Checkpoint namespace for this index
    #[arg(long, default_value = BLOCKS_MINED)]
    index_type: String,

    /// Seconds between tip polls
    #[arg(long, default_value_t = 10)]
    poll_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Starting tip indexer");
    info!("RPC URL: {}", args.rpc_url);
    info!("Database: {:?}", args.db_path);

    let mut rpc = RpcClient::new(args.rpc_url);
    if let Some(user) = args.rpc_user {
        rpc = rpc.with_auth(user, args.rpc_password);
    }
    let rpc = Arc::new(rpc);

    let store = Arc::new(
        RocksIndexStore::open(&args.db_path)
            .with_context(|| format!("Failed to open database at {:?}", args.db_path))?,
    );

    let config = IndexerConfig {
        index_type: args.index_type,
        ..IndexerConfig::default()
    };
    let follower = Arc::new(TipFollower::new(
        config,
        rpc.clone(),
        rpc.clone(),
        store.clone(),
        store,
    ));

    follower
        .start()
        .await
        .with_context(|| format!("Failed to start tip follower for {}", follower.index_type()))?;

    let interval = Duration::from_secs(args.poll_interval_secs.max(1));

    // Handle Ctrl+C gracefully
    tokio::select! {
        _ = follow_tip(rpc, follower.clone(), interval) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    let status = follower.status();
    info!(
        index_type = %status.index_type,
        state = %status.state,
        checkpoint = status.checkpoint,
        known_tip = status.known_tip,
        "Indexer stopped"
    );
    Ok(())
}

//! blockctl - mined-blocks index CLI tool
//!
//! Reads and adjusts the index kept by tipindexd and runs one-off block
//! queries against the node.

use tipindex::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

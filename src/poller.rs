//! Tip-advance event source
//!
//! Polls the node for its tip height and delivers every increase to a
//! [`TipFollower`] as a tip event.

use crate::indexer::TipFollower;
use crate::source::ChainSource;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Poll `chain` every `interval` and notify `follower` whenever the tip grows.
///
/// Poll failures are logged and polling continues. Never returns.
pub async fn follow_tip(chain: Arc<dyn ChainSource>, follower: Arc<TipFollower>, interval: Duration) {
    let mut last_seen = follower.status().known_tip;
    loop {
        tokio::time::sleep(interval).await;

        match chain.current_tip_height().await {
            Ok(tip) if tip > last_seen => {
                debug!(tip, previous = last_seen, "New tip");
                last_seen = tip;
                follower.notify_tip(tip);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to poll chain tip"),
        }
    }
}

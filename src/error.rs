//! Error types for the indexing pipeline.
//!
//! Storage code keeps using `anyhow` internally; failures are folded into
//! [`IndexError::Persistence`] at the indexer boundary so a catch-up run can
//! tell "not there yet" apart from "the node is down" and "the disk is down".

use thiserror::Error;

/// Errors that can abort a lookup or a catch-up run.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Block, header or transaction is not (yet) known to the node.
    #[error("Not found: {0}")]
    NotFound(String),

    /// RPC transport failure or an unusable response.
    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    /// Checkpoint or aggregate write failed.
    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl IndexError {
    /// Returns `true` if the node simply does not have the requested item.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Wrap a storage error, keeping its whole context chain.
    pub fn persistence(err: anyhow::Error) -> Self {
        Self::Persistence(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_persistence_keeps_context_chain() {
        let err: anyhow::Result<()> = Err(anyhow::anyhow!("disk full"));
        let err = err.context("Failed to put checkpoint").unwrap_err();
        let wrapped = IndexError::persistence(err);
        assert_eq!(
            wrapped.to_string(),
            "Persistence failure: Failed to put checkpoint: disk full"
        );
        assert!(!wrapped.is_not_found());
    }

    #[test]
    fn test_not_found_predicate() {
        assert!(IndexError::NotFound("block 7".into()).is_not_found());
        assert!(!IndexError::Upstream("timeout".into()).is_not_found());
    }
}

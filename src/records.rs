//! Record types for the derived index
//!
//! These structs represent the values stored in the index store.
//! They use postcard for binary serialization, which is compact and deterministic.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Per-address mined-block aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerRecord {
    /// Number of blocks credited to this address
    pub count: u64,
    /// Highest height credited to this address
    pub last_height: u64,
}

impl MinerRecord {
    /// Count one more block at `height`.
    pub fn credit(&mut self, height: u64) {
        self.count += 1;
        self.last_height = self.last_height.max(height);
    }
}

/// Marks a height as already credited, making replays no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditRecord {
    /// Address that was credited for the block at this height
    pub address: String,
}

/// Encode a height as a fixed 8-byte big-endian value.
pub fn encode_height(height: u64) -> [u8; 8] {
    height.to_be_bytes()
}

/// Decode an 8-byte big-endian height.
pub fn decode_height(bytes: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = bytes
        .try_into()
        .with_context(|| format!("Height must be 8 bytes (u64), got {}", bytes.len()))?;
    Ok(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_height_encoding() {
        assert_eq!(decode_height(&encode_height(987_654)).unwrap(), 987_654);
        assert!(decode_height(&[0u8; 4]).is_err());
    }

    #[test]
    fn test_miner_record_credit() {
        let mut record = MinerRecord::default();
        record.credit(100);
        record.credit(90);
        assert_eq!(record.count, 2);
        assert_eq!(record.last_height, 100);
    }

    #[test]
    fn test_miner_record_postcard() {
        let record = MinerRecord { count: 7, last_height: 1_500_000 };
        let bytes = postcard::to_allocvec(&record).unwrap();
        let decoded: MinerRecord = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(record, decoded);
    }
}

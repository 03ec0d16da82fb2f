//! Coinbase attribution
//!
//! Decides which address "mined" a block by looking for a coinbase output
//! that carries most of the expected subsidy, and resolves known pool
//! addresses to a display name.

use serde::{Deserialize, Serialize};

use crate::types::TxOutput;

/// Fraction of the expected subsidy an output must exceed to be credited.
///
/// Kept as a ratio so the comparison stays in integer arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributionPolicy {
    numerator: u64,
    denominator: u64,
}

impl AttributionPolicy {
    /// Block display: an output above 60% of the subsidy is the miner.
    pub const DISPLAY: Self = Self::new(3, 5);

    /// Mined-block index: an output above 80% of the subsidy is the miner.
    pub const MINED_INDEX: Self = Self::new(4, 5);

    /// Build a policy for `numerator / denominator`.
    ///
    /// # Panics
    ///
    /// Panics if `denominator` is zero. In a `const` context this is a
    /// compile error.
    pub const fn new(numerator: u64, denominator: u64) -> Self {
        assert!(denominator != 0, "attribution policy denominator must be non-zero");
        Self {
            numerator,
            denominator,
        }
    }

    /// Returns `true` if `amount > expected_reward * numerator / denominator`.
    pub fn exceeds(&self, amount: u64, expected_reward: u64) -> bool {
        (amount as u128) * (self.denominator as u128)
            > (expected_reward as u128) * (self.numerator as u128)
    }
}

/// Address credited with mining a block.
///
/// Every output above the threshold overwrites the previous pick, so the last
/// qualifying output wins, even when its script has no decodable address.
pub fn credited_address(
    outputs: &[TxOutput],
    expected_reward: u64,
    policy: AttributionPolicy,
) -> Option<&str> {
    let mut credited = None;
    for output in outputs {
        if policy.exceeds(output.satoshis, expected_reward) {
            credited = output.address.as_deref();
        }
    }
    credited
}

/// Pool entry as written in the pools file.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolDefinition {
    #[serde(rename = "poolName")]
    pub pool_name: String,
    pub url: String,
    #[serde(rename = "searchStrings", default)]
    pub search_strings: Vec<String>,
}

/// Display information for a known pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfo {
    #[serde(rename = "poolName")]
    pub pool_name: String,
    pub url: String,
}

/// Ordered search-string table; the first entry contained in an address wins.
#[derive(Debug, Clone, Default)]
pub struct PoolTable {
    entries: Vec<(String, PoolInfo)>,
}

impl PoolTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten pool definitions into search entries, preserving order.
    pub fn from_definitions(pools: Vec<PoolDefinition>) -> Self {
        let mut entries = Vec::new();
        for pool in pools {
            let info = PoolInfo {
                pool_name: pool.pool_name,
                url: pool.url,
            };
            for needle in pool.search_strings {
                if needle.is_empty() {
                    continue;
                }
                entries.push((needle, info.clone()));
            }
        }
        Self { entries }
    }

    /// Resolve a credited address to pool info.
    pub fn lookup(&self, address: &str) -> Option<&PoolInfo> {
        self.entries
            .iter()
            .find(|(needle, _)| address.contains(needle.as_str()))
            .map(|(_, info)| info)
    }

    /// Number of search strings in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewards::{block_reward, COIN};

    fn out(address: &str, satoshis: u64) -> TxOutput {
        TxOutput {
            address: Some(address.to_string()),
            satoshis,
        }
    }

    #[test]
    fn test_single_qualifying_output() {
        let reward = 8 * COIN;
        let outputs = vec![out("t1Pool", 7 * COIN), out("t1Node", COIN)];
        assert_eq!(
            credited_address(&outputs, reward, AttributionPolicy::MINED_INDEX),
            Some("t1Pool")
        );
    }

    #[test]
    fn test_threshold_is_strict() {
        let reward = 10 * COIN;
        let exactly_eighty = vec![out("t1Pool", 8 * COIN)];
        assert_eq!(
            credited_address(&exactly_eighty, reward, AttributionPolicy::MINED_INDEX),
            None
        );
        assert_eq!(
            credited_address(&exactly_eighty, reward, AttributionPolicy::DISPLAY),
            Some("t1Pool")
        );
    }

    #[test]
    fn test_last_qualifying_output_wins() {
        let reward = 4 * COIN;
        let outputs = vec![
            out("t1First", 4 * COIN),
            out("t1Small", COIN),
            out("t1Second", 35 * COIN / 10),
        ];
        // The larger output comes first; order decides, not amount.
        assert_eq!(
            credited_address(&outputs, reward, AttributionPolicy::MINED_INDEX),
            Some("t1Second")
        );
    }

    #[test]
    fn test_qualifying_output_without_address_clears_pick() {
        let reward = 4 * COIN;
        let outputs = vec![
            out("t1First", 4 * COIN),
            TxOutput {
                address: None,
                satoshis: 4 * COIN,
            },
        ];
        assert_eq!(
            credited_address(&outputs, reward, AttributionPolicy::MINED_INDEX),
            None
        );
    }

    #[test]
    fn test_empty_outputs() {
        assert_eq!(
            credited_address(&[], block_reward(1), AttributionPolicy::MINED_INDEX),
            None
        );
    }

    #[test]
    fn test_policies_differ() {
        let reward = 10 * COIN;
        let outputs = vec![out("t1Pool", 7 * COIN)];
        assert_eq!(
            credited_address(&outputs, reward, AttributionPolicy::DISPLAY),
            Some("t1Pool")
        );
        assert_eq!(
            credited_address(&outputs, reward, AttributionPolicy::MINED_INDEX),
            None
        );
    }

    #[test]
    #[should_panic(expected = "denominator must be non-zero")]
    fn test_zero_denominator_rejected() {
        let _ = AttributionPolicy::new(3, 0);
    }

    #[test]
    fn test_large_amounts_do_not_overflow() {
        let policy = AttributionPolicy::new(u64::MAX, 1);
        assert!(!policy.exceeds(u64::MAX, u64::MAX));
        assert!(AttributionPolicy::MINED_INDEX.exceeds(u64::MAX, u64::MAX));
    }

    fn table() -> PoolTable {
        let pools: Vec<PoolDefinition> = serde_json::from_str(
            r#"[
                {"poolName": "Alpha Pool", "url": "https://alpha.example", "searchStrings": ["t1Alpha", "t1Shared"]},
                {"poolName": "Beta Pool", "url": "https://beta.example", "searchStrings": ["t1Beta", "Shared"]}
            ]"#,
        )
        .unwrap();
        PoolTable::from_definitions(pools)
    }

    #[test]
    fn test_pool_lookup_substring() {
        let pools = table();
        assert_eq!(pools.len(), 4);
        let info = pools.lookup("t1BetaXYZ").unwrap();
        assert_eq!(info.pool_name, "Beta Pool");
        assert!(pools.lookup("t1Unknown").is_none());
    }

    #[test]
    fn test_pool_lookup_first_entry_wins() {
        let pools = table();
        // Both "t1Shared" (Alpha) and "Shared" (Beta) match.
        let info = pools.lookup("t1SharedAddr").unwrap();
        assert_eq!(info.pool_name, "Alpha Pool");
    }
}

//! Block views for query serving
//!
//! Builds the per-block detail and summary objects shown by explorers:
//! block data plus reward, credited miner and pool, and the per-day block
//! list built from summaries. Deeply confirmed views are kept in the
//! confirmation-gated caches, so one explorer should serve many queries.

use crate::attribution::{credited_address, AttributionPolicy, PoolInfo, PoolTable};
use crate::cache::{confirmations_at, BlockCaches, CachedBlock};
use crate::error::IndexError;
use crate::rewards::{block_reward, to_coins};
use crate::source::{ChainSource, TransactionSource};
use crate::types::{serialize_hash, serialize_hash_opt, serialize_hash_vec, BlockId, BlockRecord};
use alloy_primitives::B256;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Default number of blocks in one page of a block list.
pub const BLOCK_LIST_LIMIT: usize = 200;

const SECONDS_PER_DAY: i64 = 86_400;

/// Full block view.
#[derive(Debug, Clone, Serialize)]
pub struct BlockDetail {
    #[serde(serialize_with = "serialize_hash")]
    pub hash: B256,
    pub size: u64,
    pub height: u64,
    pub version: i64,
    #[serde(rename = "merkleroot")]
    pub merkle_root: String,
    #[serde(serialize_with = "serialize_hash_vec")]
    pub tx: Vec<B256>,
    pub time: u64,
    pub nonce: String,
    pub bits: String,
    pub difficulty: f64,
    #[serde(rename = "chainwork")]
    pub chain_work: String,
    pub confirmations: i64,
    #[serde(rename = "previousblockhash", serialize_with = "serialize_hash_opt")]
    pub previous_hash: Option<B256>,
    #[serde(rename = "nextblockhash", serialize_with = "serialize_hash_opt")]
    pub next_hash: Option<B256>,
    /// Block subsidy in whole coins
    pub reward: f64,
    #[serde(rename = "isMainChain")]
    pub is_main_chain: bool,
    #[serde(rename = "minedBy")]
    pub mined_by: Option<String>,
    pub solution: Option<String>,
    #[serde(rename = "poolInfo")]
    pub pool_info: Option<PoolInfo>,
}

impl CachedBlock for BlockDetail {
    fn height(&self) -> u64 {
        self.height
    }

    fn set_confirmations(&mut self, confirmations: i64) {
        self.confirmations = confirmations;
    }
}

/// Compact block view used by block lists.
#[derive(Debug, Clone, Serialize)]
pub struct BlockSummary {
    pub height: u64,
    pub size: u64,
    #[serde(serialize_with = "serialize_hash")]
    pub hash: B256,
    pub time: u64,
    #[serde(rename = "txlength")]
    pub tx_count: usize,
    #[serde(rename = "minedBy")]
    pub mined_by: Option<String>,
    #[serde(rename = "poolInfo")]
    pub pool_info: Option<PoolInfo>,
    #[serde(rename = "isMainChain")]
    pub is_main_chain: bool,
    pub confirmations: i64,
}

impl CachedBlock for BlockSummary {
    fn height(&self) -> u64 {
        self.height
    }

    fn set_confirmations(&mut self, confirmations: i64) {
        self.confirmations = confirmations;
    }
}

/// Navigation data for a page of the block list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPagination {
    /// Day containing the upper bound of this page
    pub next: Option<String>,
    /// Day before the listed day
    pub prev: Option<String>,
    /// Last second covered by this page
    pub current_ts: u64,
    /// Listed day, `yyyy-mm-dd`
    pub current: String,
    pub is_today: bool,
    /// Whether the day holds blocks beyond this page
    pub more: bool,
    /// Upper bound to pass as the start timestamp of the next page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub more_ts: Option<u64>,
}

/// One page of main-chain blocks mined on a day, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct BlockList {
    pub blocks: Vec<BlockSummary>,
    pub length: usize,
    pub pagination: ListPagination,
}

/// Builds and caches block views.
pub struct BlockExplorer {
    chain: Arc<dyn ChainSource>,
    txs: Arc<dyn TransactionSource>,
    caches: BlockCaches<BlockDetail, BlockSummary>,
    pools: PoolTable,
    policy: AttributionPolicy,
}

impl BlockExplorer {
    pub fn new(
        chain: Arc<dyn ChainSource>,
        txs: Arc<dyn TransactionSource>,
        pools: PoolTable,
        block_cache_size: u32,
        summary_cache_size: u32,
    ) -> Self {
        Self {
            chain,
            txs,
            caches: BlockCaches::new(block_cache_size, summary_cache_size),
            pools,
            policy: AttributionPolicy::DISPLAY,
        }
    }

    /// Full view of the block with `hash`.
    pub async fn block_detail(&self, hash: &B256) -> Result<BlockDetail, IndexError> {
        let tip = self.chain.current_tip_height().await?;
        if let Some(detail) = self.caches.blocks.get(hash, tip) {
            debug!(height = detail.height, "Block detail cache hit");
            return Ok(detail);
        }

        let block = self.chain.get_block(hash).await?;
        let header = self.chain.get_block_header(BlockId::Hash(*hash)).await?;
        let reward = block_reward(header.height);
        let (mined_by, pool_info) = if header.height == 0 {
            (None, None)
        } else {
            self.attribute(&block, reward).await?
        };

        let detail = BlockDetail {
            hash: block.hash,
            size: block.size,
            height: header.height,
            version: block.version,
            merkle_root: block.merkle_root,
            tx: block.tx,
            time: block.time,
            nonce: block.nonce,
            bits: block.bits,
            difficulty: block.difficulty,
            chain_work: header.chain_work,
            confirmations: header.confirmations,
            previous_hash: block.previous_hash.filter(|prev| *prev != B256::ZERO),
            next_hash: header.next_hash,
            reward: to_coins(reward),
            is_main_chain: header.confirmations != -1,
            mined_by,
            solution: block.solution,
            pool_info,
        };

        self.caches
            .blocks
            .put(*hash, detail.clone(), detail.confirmations);
        Ok(detail)
    }

    /// Compact view of the block with `hash`.
    pub async fn block_summary(&self, hash: &B256) -> Result<BlockSummary, IndexError> {
        let tip = self.chain.current_tip_height().await?;
        self.summary_at(hash, tip).await
    }

    async fn summary_at(&self, hash: &B256, tip: u64) -> Result<BlockSummary, IndexError> {
        if let Some(summary) = self.caches.summaries.get(hash, tip) {
            return Ok(summary);
        }

        let block = self.chain.get_block(hash).await?;
        let (mined_by, pool_info) = if block.height == 0 {
            (None, None)
        } else {
            self.attribute(&block, block_reward(block.height)).await?
        };

        let summary = BlockSummary {
            height: block.height,
            size: block.size,
            hash: block.hash,
            time: block.time,
            tx_count: block.tx.len(),
            mined_by,
            pool_info,
            is_main_chain: block.is_main_chain(),
            confirmations: confirmations_at(tip, block.height),
        };

        self.caches
            .summaries
            .put(*hash, summary.clone(), summary.confirmations);
        Ok(summary)
    }

    /// Main-chain blocks mined on `day` (UTC, today when `None`).
    ///
    /// Walks the day's blocks from newest to oldest, starting below
    /// `start_ts` when given, and stops once `limit` main-chain blocks are
    /// collected. Orphaned blocks are skipped and do not count towards the
    /// limit. `pagination.more` is set when unvisited blocks remain, in which
    /// case `pagination.more_ts` is the start timestamp of the next page.
    pub async fn list_blocks(
        &self,
        day: Option<NaiveDate>,
        start_ts: Option<u64>,
        limit: Option<usize>,
    ) -> Result<BlockList, IndexError> {
        let today = Utc::now().date_naive();
        let day = day.unwrap_or(today);
        let limit = limit.unwrap_or(BLOCK_LIST_LIMIT);

        let low = day.and_time(NaiveTime::MIN).and_utc().timestamp();
        let high = start_ts.map_or(low + SECONDS_PER_DAY, |ts| {
            i64::try_from(ts).unwrap_or(i64::MAX)
        });
        let (low, high) = (low.max(0) as u64, high.max(0) as u64);

        let mut hashes = self.chain.get_block_hashes_by_timestamp(high, low).await?;
        hashes.reverse();

        let tip = self.chain.current_tip_height().await?;
        let mut blocks = Vec::new();
        let mut visited = 0;
        for hash in &hashes {
            if blocks.len() >= limit {
                break;
            }
            let summary = self.summary_at(hash, tip).await?;
            visited += 1;
            if summary.is_main_chain {
                blocks.push(summary);
            } else {
                debug!(height = summary.height, "Skipping orphaned block in list");
            }
        }
        let more = visited < hashes.len();

        blocks.sort_by(|a, b| b.height.cmp(&a.height));
        let more_ts = if more {
            blocks.last().map(|block| block.time)
        } else {
            None
        };

        let pagination = ListPagination {
            next: format_day(high as i64),
            prev: format_day(low as i64 - SECONDS_PER_DAY),
            current_ts: high.saturating_sub(1),
            current: day.format("%Y-%m-%d").to_string(),
            is_today: day == today,
            more,
            more_ts,
        };
        Ok(BlockList {
            length: blocks.len(),
            blocks,
            pagination,
        })
    }

    /// Main-chain block hash at `height`.
    pub async fn block_hash(&self, height: u64) -> Result<B256, IndexError> {
        let header = self.chain.get_block_header(BlockId::Height(height)).await?;
        Ok(header.hash)
    }

    /// Credited address and pool of a block's coinbase.
    async fn attribute(
        &self,
        block: &BlockRecord,
        reward: u64,
    ) -> Result<(Option<String>, Option<PoolInfo>), IndexError> {
        let Some(txid) = block.coinbase_txid() else {
            return Ok((None, None));
        };
        let coinbase = self.txs.get_detailed_transaction(txid).await?;
        let mined_by = credited_address(&coinbase.outputs, reward, self.policy).map(str::to_string);
        let pool_info = mined_by
            .as_deref()
            .and_then(|address| self.pools.lookup(address))
            .cloned();
        Ok((mined_by, pool_info))
    }
}

/// UTC day containing `timestamp`, `yyyy-mm-dd`.
fn format_day(timestamp: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(timestamp, 0).map(|t| t.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::PoolDefinition;
    use crate::rewards::COIN;
    use crate::types::{BlockHeader, TransactionDetail, TxOutput};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    // 2020-09-13 12:26:40 UTC
    const BASE_TIME: u64 = 1_600_000_000;

    fn hash(n: u8) -> B256 {
        B256::repeat_byte(n)
    }

    fn parent(n: u8) -> B256 {
        B256::repeat_byte(0x40 + n)
    }

    fn coinbase_id(n: u8) -> B256 {
        B256::repeat_byte(0xc0 ^ n)
    }

    #[derive(Default)]
    struct MockChain {
        tip: AtomicU64,
        blocks: Mutex<HashMap<B256, BlockRecord>>,
        orphans: Mutex<HashSet<B256>>,
        block_fetches: AtomicUsize,
    }

    impl MockChain {
        fn add_block(&self, n: u8, height: u64) {
            let block = BlockRecord {
                hash: hash(n),
                height,
                size: 1_500,
                time: BASE_TIME + height,
                tx: vec![coinbase_id(n), B256::repeat_byte(0xee)],
                confirmations: 1,
                merkle_root: "ab".repeat(32),
                previous_hash: Some(if height == 0 { B256::ZERO } else { parent(n) }),
                ..Default::default()
            };
            self.blocks.lock().insert(hash(n), block);
        }

        fn set_tip(&self, tip: u64) {
            self.tip.store(tip, Ordering::SeqCst);
        }

        fn confirmations(&self, height: u64) -> i64 {
            confirmations_at(self.tip.load(Ordering::SeqCst), height)
        }
    }

    #[async_trait]
    impl ChainSource for MockChain {
        async fn get_block(&self, hash: &B256) -> Result<BlockRecord, IndexError> {
            self.block_fetches.fetch_add(1, Ordering::SeqCst);
            let mut block = self
                .blocks
                .lock()
                .get(hash)
                .cloned()
                .ok_or_else(|| IndexError::NotFound(format!("block {}", hash)))?;
            block.confirmations = if self.orphans.lock().contains(hash) {
                -1
            } else {
                self.confirmations(block.height)
            };
            Ok(block)
        }

        async fn get_block_header(&self, id: BlockId) -> Result<BlockHeader, IndexError> {
            let blocks = self.blocks.lock();
            let block = match id {
                BlockId::Hash(hash) => blocks.get(&hash),
                BlockId::Height(height) => blocks.values().find(|b| b.height == height),
            }
            .ok_or_else(|| IndexError::NotFound(format!("header {}", id)))?;
            Ok(BlockHeader {
                hash: block.hash,
                height: block.height,
                confirmations: self.confirmations(block.height),
                chain_work: "00ff".to_string(),
                next_hash: None,
            })
        }

        async fn get_json_block(&self, height: u64) -> Result<BlockRecord, IndexError> {
            Err(IndexError::NotFound(format!("height {}", height)))
        }

        async fn get_block_hashes_by_timestamp(
            &self,
            high: u64,
            low: u64,
        ) -> Result<Vec<B256>, IndexError> {
            let mut blocks: Vec<(u64, B256)> = self
                .blocks
                .lock()
                .values()
                .filter(|b| b.time >= low && b.time < high)
                .map(|b| (b.time, b.hash))
                .collect();
            blocks.sort();
            Ok(blocks.into_iter().map(|(_, hash)| hash).collect())
        }

        async fn current_tip_height(&self) -> Result<u64, IndexError> {
            Ok(self.tip.load(Ordering::SeqCst))
        }
    }

    /// Coinbase for block `n`: 65% to the pool address, the rest to a node
    /// operator. Above the display threshold, below the index threshold.
    struct MockTxs;

    #[async_trait]
    impl TransactionSource for MockTxs {
        async fn get_detailed_transaction(
            &self,
            txid: &B256,
        ) -> Result<TransactionDetail, IndexError> {
            let reward = 21_000 * COIN;
            Ok(TransactionDetail {
                txid: *txid,
                outputs: vec![
                    TxOutput {
                        address: Some("t1PoolAbcdef".to_string()),
                        satoshis: reward / 100 * 65,
                    },
                    TxOutput {
                        address: Some("t1Node".to_string()),
                        satoshis: reward / 100 * 35,
                    },
                ],
            })
        }
    }

    fn explorer(chain: Arc<MockChain>) -> BlockExplorer {
        let pools = PoolTable::from_definitions(vec![PoolDefinition {
            pool_name: "Abc Pool".to_string(),
            url: "https://pool.example".to_string(),
            search_strings: vec!["PoolAbc".to_string()],
        }]);
        BlockExplorer::new(chain, Arc::new(MockTxs), pools, 10, 10)
    }

    #[tokio::test]
    async fn test_block_detail_uses_display_threshold() {
        let chain = Arc::new(MockChain::default());
        chain.add_block(1, 1);
        chain.set_tip(3);

        let detail = explorer(chain).block_detail(&hash(1)).await.unwrap();
        assert_eq!(detail.height, 1);
        assert_eq!(detail.reward, 21_000.0);
        assert_eq!(detail.mined_by.as_deref(), Some("t1PoolAbcdef"));
        assert_eq!(detail.pool_info.unwrap().pool_name, "Abc Pool");
        assert_eq!(detail.confirmations, 3);
        assert!(detail.is_main_chain);
        assert_eq!(detail.previous_hash, Some(parent(1)));
    }

    #[tokio::test]
    async fn test_genesis_detail_skips_coinbase() {
        let chain = Arc::new(MockChain::default());
        chain.add_block(0, 0);
        chain.set_tip(10);

        let detail = explorer(chain).block_detail(&hash(0)).await.unwrap();
        assert_eq!(detail.reward, 0.0);
        assert!(detail.mined_by.is_none());
        assert!(detail.pool_info.is_none());
        // All-zero previous hash is reported as absent.
        assert!(detail.previous_hash.is_none());
    }

    #[tokio::test]
    async fn test_shallow_detail_is_not_cached() {
        let chain = Arc::new(MockChain::default());
        chain.add_block(5, 100);
        chain.set_tip(104);
        let explorer = explorer(chain.clone());

        explorer.block_detail(&hash(5)).await.unwrap();
        explorer.block_detail(&hash(5)).await.unwrap();
        assert_eq!(chain.block_fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cached_detail_confirmations_follow_tip() {
        let chain = Arc::new(MockChain::default());
        chain.add_block(5, 100);
        chain.set_tip(105);
        let explorer = explorer(chain.clone());

        let first = explorer.block_detail(&hash(5)).await.unwrap();
        assert_eq!(first.confirmations, 6);

        chain.set_tip(130);
        let second = explorer.block_detail(&hash(5)).await.unwrap();
        assert_eq!(second.confirmations, 31);
        assert_eq!(chain.block_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_block_summary_caching() {
        let chain = Arc::new(MockChain::default());
        chain.add_block(7, 200);
        chain.set_tip(203);
        let explorer = explorer(chain.clone());

        let shallow = explorer.block_summary(&hash(7)).await.unwrap();
        assert_eq!(shallow.confirmations, 4);
        assert_eq!(shallow.tx_count, 2);
        assert_eq!(shallow.mined_by.as_deref(), Some("t1PoolAbcdef"));

        chain.set_tip(205);
        explorer.block_summary(&hash(7)).await.unwrap();
        chain.set_tip(300);
        let deep = explorer.block_summary(&hash(7)).await.unwrap();
        assert_eq!(deep.confirmations, 101);
        // Fetched while shallow, then once more to admit it.
        assert_eq!(chain.block_fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_block_hash_by_height() {
        let chain = Arc::new(MockChain::default());
        chain.add_block(9, 42);
        let explorer = explorer(chain);

        assert_eq!(explorer.block_hash(42).await.unwrap(), hash(9));
        assert!(explorer.block_hash(43).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_detail_json_field_names() {
        let chain = Arc::new(MockChain::default());
        chain.add_block(1, 1);
        chain.set_tip(1);

        let detail = explorer(chain).block_detail(&hash(1)).await.unwrap();
        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["hash"], "01".repeat(32));
        assert_eq!(value["minedBy"], "t1PoolAbcdef");
        assert_eq!(value["poolInfo"]["poolName"], "Abc Pool");
        assert_eq!(value["isMainChain"], true);
        assert!(value["nextblockhash"].is_null());
    }

    fn day(s: &str) -> Option<NaiveDate> {
        Some(s.parse().unwrap())
    }

    #[tokio::test]
    async fn test_list_blocks_pages_newest_first() {
        let chain = Arc::new(MockChain::default());
        for n in 1..=5 {
            chain.add_block(n, n as u64);
        }
        chain.set_tip(100);
        let explorer = explorer(chain);

        let page = explorer
            .list_blocks(day("2020-09-13"), None, Some(3))
            .await
            .unwrap();
        let heights: Vec<u64> = page.blocks.iter().map(|b| b.height).collect();
        assert_eq!(heights, vec![5, 4, 3]);
        assert_eq!(page.length, 3);
        assert!(page.pagination.more);
        assert_eq!(page.pagination.more_ts, Some(BASE_TIME + 3));
        assert_eq!(page.pagination.current, "2020-09-13");
        assert_eq!(page.pagination.prev.as_deref(), Some("2020-09-12"));
        assert_eq!(page.pagination.next.as_deref(), Some("2020-09-14"));
        assert_eq!(page.pagination.current_ts, 1_600_041_599);
        assert!(!page.pagination.is_today);

        let rest = explorer
            .list_blocks(day("2020-09-13"), page.pagination.more_ts, Some(3))
            .await
            .unwrap();
        let heights: Vec<u64> = rest.blocks.iter().map(|b| b.height).collect();
        assert_eq!(heights, vec![2, 1]);
        assert!(!rest.pagination.more);
        assert!(rest.pagination.more_ts.is_none());
        assert_eq!(rest.pagination.current_ts, BASE_TIME + 2);

        let value = serde_json::to_value(&rest).unwrap();
        assert_eq!(value["length"], 2);
        assert_eq!(value["pagination"]["isToday"], false);
        assert!(value["pagination"].get("moreTs").is_none());
    }

    #[tokio::test]
    async fn test_list_blocks_skips_orphans() {
        let chain = Arc::new(MockChain::default());
        for n in 1..=4 {
            chain.add_block(n, n as u64);
        }
        chain.orphans.lock().insert(hash(3));
        chain.set_tip(100);
        let explorer = explorer(chain);

        let page = explorer.list_blocks(day("2020-09-13"), None, Some(2)).await.unwrap();
        let heights: Vec<u64> = page.blocks.iter().map(|b| b.height).collect();
        // The orphan is visited but does not use up the limit.
        assert_eq!(heights, vec![4, 2]);
        assert!(page.pagination.more);
        assert_eq!(page.pagination.more_ts, Some(BASE_TIME + 2));

        let all = explorer.list_blocks(day("2020-09-13"), None, None).await.unwrap();
        assert_eq!(all.length, 3);
        assert!(all.blocks.iter().all(|b| b.is_main_chain));
        assert!(!all.pagination.more);
    }

    #[tokio::test]
    async fn test_list_blocks_reuses_summary_cache() {
        let chain = Arc::new(MockChain::default());
        for n in 1..=3 {
            chain.add_block(n, n as u64);
        }
        chain.set_tip(100);
        let explorer = explorer(chain.clone());

        explorer.list_blocks(day("2020-09-13"), None, None).await.unwrap();
        assert_eq!(chain.block_fetches.load(Ordering::SeqCst), 3);

        chain.set_tip(120);
        let page = explorer.list_blocks(day("2020-09-13"), None, None).await.unwrap();
        assert_eq!(page.blocks[0].confirmations, 118);
        explorer.block_summary(&hash(2)).await.unwrap();
        assert_eq!(chain.block_fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_list_blocks_empty_day() {
        let chain = Arc::new(MockChain::default());
        chain.add_block(1, 1);
        chain.set_tip(100);

        let page = explorer(chain)
            .list_blocks(day("2020-09-14"), None, None)
            .await
            .unwrap();
        assert!(page.blocks.is_empty());
        assert!(!page.pagination.more);
        assert!(page.pagination.more_ts.is_none());
        assert_eq!(page.pagination.prev.as_deref(), Some("2020-09-13"));
    }
}

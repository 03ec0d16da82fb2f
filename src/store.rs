//! Index store traits and RocksDB implementation
//!
//! Persists the two pieces of state the tip follower owns: the per-index
//! checkpoint (last fully processed height) and the derived blocks-mined
//! counts. Uses RocksDB with column families:
//! - checkpoints: index type -> height
//! - blocks_mined: address -> [`MinerRecord`]
//! - credits: height -> [`CreditRecord`], one marker per credited block
//!
//! Crediting is idempotent per height: the credit marker and the updated
//! count are committed in one `WriteBatch`, and a height that already has a
//! marker is skipped. Replaying a height after a crash therefore never
//! double counts.

use crate::keys::{decode_miner_key, encode_checkpoint_key, encode_credit_key, encode_miner_key};
use crate::records::{decode_height, encode_height, CreditRecord, MinerRecord};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::collections::HashMap;
use std::path::Path;

const CF_CHECKPOINTS: &str = "checkpoints";
const CF_BLOCKS_MINED: &str = "blocks_mined";
const CF_CREDITS: &str = "credits";

/// Durable per-index progress marker.
pub trait CheckpointStore: Send + Sync {
    /// Last fully processed height for `index_type`, if one was ever written.
    fn checkpoint(&self, index_type: &str) -> Result<Option<u64>>;

    /// Record `height` as the last fully processed height for `index_type`.
    fn set_checkpoint(&self, index_type: &str, height: u64) -> Result<()>;

    /// Return the checkpoint, creating it at 0 if it does not exist.
    fn init_checkpoint(&self, index_type: &str) -> Result<u64> {
        match self.checkpoint(index_type)? {
            Some(height) => Ok(height),
            None => {
                self.set_checkpoint(index_type, 0)?;
                Ok(0)
            }
        }
    }
}

/// Derived blocks-mined index.
pub trait MinedBlocksStore: Send + Sync {
    /// Credit the block at `height` to `address`.
    ///
    /// Returns `false` if `height` was already credited, in which case
    /// nothing is written.
    fn record_mined(&self, address: &str, height: u64) -> Result<bool>;

    /// Aggregate for `address`, if it was ever credited.
    fn miner(&self, address: &str) -> Result<Option<MinerRecord>>;

    /// Address credited for the block at `height`, if any.
    fn credited_at(&self, height: u64) -> Result<Option<String>>;

    /// Up to `limit` addresses ordered by count descending, then address.
    fn top_miners(&self, limit: usize) -> Result<Vec<(String, u64)>>;
}

fn rank(mut miners: Vec<(String, u64)>, limit: usize) -> Vec<(String, u64)> {
    miners.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    miners.truncate(limit);
    miners
}

/// RocksDB-backed index store.
pub struct RocksIndexStore {
    db: DB,
    // Serializes the read-modify-write in record_mined.
    write_lock: Mutex<()>,
}

impl RocksIndexStore {
    /// Open or create a RocksDB database at the given path.
    ///
    /// Creates all required column families if they don't exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let column_families = vec![
            ColumnFamilyDescriptor::new(CF_CHECKPOINTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_BLOCKS_MINED, Options::default()),
            ColumnFamilyDescriptor::new(CF_CREDITS, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, column_families)
            .context("Failed to open RocksDB database")?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle by name.
    fn get_cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .with_context(|| format!("Column family '{}' not found", name))
    }
}

impl CheckpointStore for RocksIndexStore {
    fn checkpoint(&self, index_type: &str) -> Result<Option<u64>> {
        let cf = self.get_cf(CF_CHECKPOINTS)?;
        let key = encode_checkpoint_key(index_type);
        match self.db.get_cf(cf, &key).context("Failed to get checkpoint")? {
            Some(bytes) => Ok(Some(
                decode_height(&bytes).context("Failed to decode checkpoint")?,
            )),
            None => Ok(None),
        }
    }

    fn set_checkpoint(&self, index_type: &str, height: u64) -> Result<()> {
        let cf = self.get_cf(CF_CHECKPOINTS)?;
        let key = encode_checkpoint_key(index_type);
        self.db
            .put_cf(cf, &key, encode_height(height))
            .context("Failed to set checkpoint")?;
        Ok(())
    }
}

impl MinedBlocksStore for RocksIndexStore {
    fn record_mined(&self, address: &str, height: u64) -> Result<bool> {
        let _guard = self.write_lock.lock();

        let credits = self.get_cf(CF_CREDITS)?;
        let credit_key = encode_credit_key(height);
        if self
            .db
            .get_cf(credits, &credit_key)
            .context("Failed to get credit marker")?
            .is_some()
        {
            return Ok(false);
        }

        let mut record = self.miner(address)?.unwrap_or_default();
        record.credit(height);

        let credit = CreditRecord {
            address: address.to_string(),
        };
        let miner_value =
            postcard::to_allocvec(&record).context("Failed to serialize miner record")?;
        let credit_value =
            postcard::to_allocvec(&credit).context("Failed to serialize credit record")?;

        let mut batch = WriteBatch::default();
        batch.put_cf(self.get_cf(CF_BLOCKS_MINED)?, encode_miner_key(address), miner_value);
        batch.put_cf(credits, credit_key, credit_value);
        self.db
            .write(batch)
            .context("Failed to write blocks-mined batch")?;
        Ok(true)
    }

    fn miner(&self, address: &str) -> Result<Option<MinerRecord>> {
        let cf = self.get_cf(CF_BLOCKS_MINED)?;
        let key = encode_miner_key(address);
        match self.db.get_cf(cf, &key).context("Failed to get miner record")? {
            Some(bytes) => {
                let record =
                    postcard::from_bytes(&bytes).context("Failed to deserialize miner record")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn credited_at(&self, height: u64) -> Result<Option<String>> {
        let cf = self.get_cf(CF_CREDITS)?;
        let key = encode_credit_key(height);
        match self.db.get_cf(cf, &key).context("Failed to get credit marker")? {
            Some(bytes) => {
                let record: CreditRecord =
                    postcard::from_bytes(&bytes).context("Failed to deserialize credit record")?;
                Ok(Some(record.address))
            }
            None => Ok(None),
        }
    }

    fn top_miners(&self, limit: usize) -> Result<Vec<(String, u64)>> {
        let cf = self.get_cf(CF_BLOCKS_MINED)?;
        let mut miners = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item.context("Failed to read iterator")?;
            let Some(address) = decode_miner_key(&key) else {
                continue;
            };
            let record: MinerRecord =
                postcard::from_bytes(&value).context("Failed to deserialize miner record")?;
            miners.push((address.to_string(), record.count));
        }
        Ok(rank(miners, limit))
    }
}

/// In-memory index store, used by tests and dry runs.
#[derive(Default)]
pub struct MemoryIndexStore {
    checkpoints: Mutex<HashMap<String, u64>>,
    mined: Mutex<MinedState>,
}

#[derive(Default)]
struct MinedState {
    miners: HashMap<String, MinerRecord>,
    credits: HashMap<u64, String>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryIndexStore {
    fn checkpoint(&self, index_type: &str) -> Result<Option<u64>> {
        Ok(self.checkpoints.lock().get(index_type).copied())
    }

    fn set_checkpoint(&self, index_type: &str, height: u64) -> Result<()> {
        self.checkpoints
            .lock()
            .insert(index_type.to_string(), height);
        Ok(())
    }
}

impl MinedBlocksStore for MemoryIndexStore {
    fn record_mined(&self, address: &str, height: u64) -> Result<bool> {
        let mut state = self.mined.lock();
        if state.credits.contains_key(&height) {
            return Ok(false);
        }
        state.credits.insert(height, address.to_string());
        state
            .miners
            .entry(address.to_string())
            .or_default()
            .credit(height);
        Ok(true)
    }

    fn miner(&self, address: &str) -> Result<Option<MinerRecord>> {
        Ok(self.mined.lock().miners.get(address).cloned())
    }

    fn credited_at(&self, height: u64) -> Result<Option<String>> {
        Ok(self.mined.lock().credits.get(&height).cloned())
    }

    fn top_miners(&self, limit: usize) -> Result<Vec<(String, u64)>> {
        let miners = self
            .mined
            .lock()
            .miners
            .iter()
            .map(|(address, record)| (address.clone(), record.count))
            .collect();
        Ok(rank(miners, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksIndexStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = RocksIndexStore::open(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    fn mined_count(store: &impl MinedBlocksStore, address: &str) -> u64 {
        store.miner(address).unwrap().map_or(0, |record| record.count)
    }

    #[test]
    fn test_checkpoint_initialized_to_zero() {
        let (store, _temp_dir) = create_test_store();
        assert_eq!(store.checkpoint("BLOCKS_MINED").unwrap(), None);
        assert_eq!(store.init_checkpoint("BLOCKS_MINED").unwrap(), 0);
        assert_eq!(store.checkpoint("BLOCKS_MINED").unwrap(), Some(0));
    }

    #[test]
    fn test_init_keeps_existing_checkpoint() {
        let (store, _temp_dir) = create_test_store();
        store.set_checkpoint("BLOCKS_MINED", 1_234).unwrap();
        assert_eq!(store.init_checkpoint("BLOCKS_MINED").unwrap(), 1_234);
    }

    #[test]
    fn test_checkpoints_are_per_index_type() {
        let (store, _temp_dir) = create_test_store();
        store.set_checkpoint("BLOCKS_MINED", 10).unwrap();
        store.set_checkpoint("OTHER", 20).unwrap();
        assert_eq!(store.checkpoint("BLOCKS_MINED").unwrap(), Some(10));
        assert_eq!(store.checkpoint("OTHER").unwrap(), Some(20));
    }

    #[test]
    fn test_checkpoint_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = RocksIndexStore::open(temp_dir.path()).unwrap();
            store.set_checkpoint("BLOCKS_MINED", 101).unwrap();
            store.record_mined("t1miner", 101).unwrap();
        }
        let store = RocksIndexStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.checkpoint("BLOCKS_MINED").unwrap(), Some(101));
        assert_eq!(mined_count(&store, "t1miner"), 1);
    }

    #[test]
    fn test_record_mined_is_idempotent_per_height() {
        let (store, _temp_dir) = create_test_store();
        assert!(store.record_mined("t1miner", 500).unwrap());
        assert!(!store.record_mined("t1miner", 500).unwrap());
        assert!(!store.record_mined("t1other", 500).unwrap());

        assert_eq!(mined_count(&store, "t1miner"), 1);
        assert_eq!(mined_count(&store, "t1other"), 0);
        assert!(store.miner("t1other").unwrap().is_none());
        assert_eq!(store.credited_at(500).unwrap().as_deref(), Some("t1miner"));
        assert_eq!(store.credited_at(501).unwrap(), None);
    }

    #[test]
    fn test_miner_tracks_last_height() {
        let (store, _temp_dir) = create_test_store();
        store.record_mined("t1miner", 700).unwrap();
        store.record_mined("t1miner", 650).unwrap();

        let record = store.miner("t1miner").unwrap().unwrap();
        assert_eq!(record.count, 2);
        assert_eq!(record.last_height, 700);
    }

    #[test]
    fn test_top_miners_ordering() {
        let (store, _temp_dir) = create_test_store();
        store.record_mined("t1b", 1).unwrap();
        store.record_mined("t1b", 2).unwrap();
        store.record_mined("t1a", 3).unwrap();
        store.record_mined("t1c", 4).unwrap();
        store.record_mined("t1c", 5).unwrap();

        let top = store.top_miners(10).unwrap();
        assert_eq!(
            top,
            vec![
                ("t1b".to_string(), 2),
                ("t1c".to_string(), 2),
                ("t1a".to_string(), 1),
            ]
        );
        assert_eq!(store.top_miners(1).unwrap().len(), 1);
    }

    #[test]
    fn test_memory_store_matches_rocks_semantics() {
        let store = MemoryIndexStore::new();
        assert_eq!(store.init_checkpoint("BLOCKS_MINED").unwrap(), 0);
        assert!(store.record_mined("t1a", 7).unwrap());
        assert!(!store.record_mined("t1a", 7).unwrap());
        store.record_mined("t1b", 8).unwrap();
        store.record_mined("t1b", 9).unwrap();

        assert_eq!(mined_count(&store, "t1a"), 1);
        assert_eq!(store.credited_at(9).unwrap().as_deref(), Some("t1b"));
        assert_eq!(
            store.top_miners(5).unwrap(),
            vec![("t1b".to_string(), 2), ("t1a".to_string(), 1)]
        );
    }
}

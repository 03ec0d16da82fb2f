//! Confirmation-gated block caches
//!
//! In-memory LRU caches for block views built by the query side.
//!
//! Strategy:
//! - Only blocks with at least [`CONFIRMATION_THRESHOLD`] confirmations are
//!   admitted; shallower blocks may still be reorganized away
//! - Entries are never invalidated, only evicted by LRU pressure
//! - Confirmations are recomputed from the caller's tip on every hit, since
//!   they keep growing after the entry was stored

use alloy_primitives::B256;
use parking_lot::Mutex;
use schnellru::{ByLength, LruMap};

/// Minimum confirmation depth for cache admission.
pub const CONFIRMATION_THRESHOLD: i64 = 6;

/// Default capacity of the full block detail cache.
pub const DEFAULT_BLOCK_CACHE_SIZE: u32 = 1_000;

/// Default capacity of the compact block summary cache.
pub const DEFAULT_SUMMARY_CACHE_SIZE: u32 = 1_000_000;

/// A cacheable block view whose confirmation count is derived from the tip.
pub trait CachedBlock: Clone {
    /// Height of the block this view describes.
    fn height(&self) -> u64;

    /// Overwrite the presentation-layer confirmation count.
    fn set_confirmations(&mut self, confirmations: i64);
}

/// Confirmations of a block at `height` when the chain tip is `tip_height`.
pub fn confirmations_at(tip_height: u64, height: u64) -> i64 {
    tip_height as i64 - height as i64 + 1
}

/// Bounded LRU cache keyed by block hash.
pub struct ConfirmedCache<V> {
    entries: Mutex<LruMap<B256, V, ByLength>>,
}

impl<V: CachedBlock> ConfirmedCache<V> {
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: u32) -> Self {
        Self {
            entries: Mutex::new(LruMap::new(ByLength::new(capacity))),
        }
    }

    /// Look up a block view, refreshing its confirmations against `tip_height`.
    pub fn get(&self, hash: &B256, tip_height: u64) -> Option<V> {
        let mut entries = self.entries.lock();
        let mut value = entries.get(hash)?.clone();
        value.set_confirmations(confirmations_at(tip_height, value.height()));
        Some(value)
    }

    /// Admit a block view if it is deep enough.
    ///
    /// Returns `true` if the entry was stored.
    pub fn put(&self, hash: B256, value: V, confirmations: i64) -> bool {
        if confirmations < CONFIRMATION_THRESHOLD {
            return false;
        }
        self.entries.lock().insert(hash, value)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The two independently sized caches used by block queries.
pub struct BlockCaches<D, S> {
    /// Full per-block detail views.
    pub blocks: ConfirmedCache<D>,
    /// Compact per-block summaries.
    pub summaries: ConfirmedCache<S>,
}

impl<D: CachedBlock, S: CachedBlock> BlockCaches<D, S> {
    pub fn new(block_capacity: u32, summary_capacity: u32) -> Self {
        Self {
            blocks: ConfirmedCache::new(block_capacity),
            summaries: ConfirmedCache::new(summary_capacity),
        }
    }
}

//! Concurrent tile result cache using moka.
//!
//! Maps [`RegionKey`] to a shared, immutable [`TileResult`]. Reads never
//! block, writes replace whole entries (last writer wins), and `clear()` is
//! safe to call while other threads read and write.
//!
//! Entries are weighted by raster size. With the default bound the cache
//! effectively holds every tile of a tile-source generation; if the bound is
//! exceeded moka evicts the least useful entries and they are recomputed on
//! the next paint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::sync::Cache;
use tracing::debug;

use crate::region::{ImageId, RegionKey};
use crate::tile::TileResult;

use super::CacheStats;

/// Default maximum cache size: 512 MiB.
pub const DEFAULT_TILE_CACHE_BYTES: u64 = 512 * 1024 * 1024;

/// Fixed per-entry overhead added to the raster size when weighing.
const ENTRY_OVERHEAD_BYTES: usize = 128;

/// Thread-safe RegionKey → TileResult store.
pub struct TileCache {
    cache: Cache<RegionKey, Arc<TileResult>>,
    max_size_bytes: u64,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
}

impl TileCache {
    /// Create a cache bounded to `max_size_bytes`.
    pub fn new(max_size_bytes: u64) -> Self {
        let cache = Cache::builder()
            .weigher(|_key: &RegionKey, value: &Arc<TileResult>| -> u32 {
                // moka uses u32 weights
                (value.byte_len() + ENTRY_OVERHEAD_BYTES).min(u32::MAX as usize) as u32
            })
            .max_capacity(max_size_bytes)
            .build();

        Self {
            cache,
            max_size_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
        }
    }

    /// Look up a tile. Never blocks.
    pub fn get(&self, key: &RegionKey) -> Option<Arc<TileResult>> {
        match self.cache.get(key) {
            Some(tile) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(tile)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or replace a tile.
    pub fn put(&self, key: RegionKey, result: impl Into<Arc<TileResult>>) {
        self.cache.insert(key, result.into());
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Check presence without touching hit/miss statistics.
    pub fn contains(&self, key: &RegionKey) -> bool {
        self.cache.contains_key(key)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
        debug!("Tile cache cleared");
    }

    /// Drop every entry belonging to one image.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate_image(&self, image: &ImageId) -> usize {
        let keys: Vec<Arc<RegionKey>> = self
            .cache
            .iter()
            .filter(|(key, _)| key.image() == image)
            .map(|(key, _)| key)
            .collect();
        for key in &keys {
            self.cache.invalidate(key.as_ref());
        }
        self.cache.run_pending_tasks();
        debug!(image = %image, removed = keys.len(), "Invalidated image tiles");
        keys.len()
    }

    /// Number of entries (after pending maintenance).
    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    /// Weighted size in bytes (after pending maintenance).
    pub fn size_bytes(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.weighted_size()
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            entry_count: self.entry_count(),
            size_bytes: self.size_bytes(),
        }
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new(DEFAULT_TILE_CACHE_BYTES)
    }
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCache")
            .field("entries", &self.cache.entry_count())
            .field("max_size_bytes", &self.max_size_bytes)
            .finish()
    }
}

//! Shared state between the paint thread and the workers.
//!
//! - [`TileCache`]: computed tiles, keyed by [`RegionKey`](crate::region::RegionKey)
//! - [`PendingRequestTracker`]: keys with a job queued or running
//! - [`Generation`]: invalidation guard tying both to the active tile source
//!
//! These are the only structures touched by both sides, and all three are
//! internally synchronized; callers never lock anything themselves.

mod generation;
mod pending;
mod tile;

pub use generation::Generation;
pub use pending::PendingRequestTracker;
pub use tile::{TileCache, DEFAULT_TILE_CACHE_BYTES};

use std::fmt;

/// Point-in-time statistics of a [`TileCache`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub entry_count: u64,
    pub size_bytes: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, 0.0 when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries, {} bytes, {} hits / {} misses ({:.1}% hit rate)",
            self.entry_count,
            self.size_bytes,
            self.hits,
            self.misses,
            self.hit_rate() * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_default() {
        let stats = CacheStats::default();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_cache_stats_display() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            inserts: 2,
            entry_count: 2,
            size_bytes: 1024,
        };
        let display = stats.to_string();
        assert!(display.contains("1024 bytes"));
        assert!(display.contains("75.0% hit rate"));
    }
}

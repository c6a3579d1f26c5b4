//! Configuration.
//!
//! [`ConfigFile`] is the persisted INI file; [`OverlayConfig`] is the
//! resolved runtime configuration used to build an
//! [`OverlayRenderer`](crate::overlay::OverlayRenderer).

mod file;
mod keys;
mod size;

pub use file::{
    config_directory, config_file_path, CacheSettings, ConfigError, ConfigFile, LoggingSettings,
    OverlaySettings, DEFAULT_DISPLAY_CACHE_SIZE, DEFAULT_OPACITY, DEFAULT_TILE_CACHE_SIZE,
};
pub use keys::ConfigKey;
pub use size::{format_size, parse_size};

use crate::executor::default_threads;

/// Runtime configuration of an overlay renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayConfig {
    /// Maximum tiles computed at once (at least 1).
    pub threads: usize,
    /// Whether cache misses start computations.
    pub live_prediction: bool,
    /// Overlay opacity, 0..1.
    pub opacity: f32,
    /// Byte bound of the computed tile cache.
    pub tile_cache_bytes: u64,
    /// Byte bound of the colorized display cache.
    pub display_cache_bytes: u64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            live_prediction: true,
            opacity: DEFAULT_OPACITY,
            tile_cache_bytes: DEFAULT_TILE_CACHE_SIZE,
            display_cache_bytes: DEFAULT_DISPLAY_CACHE_SIZE,
        }
    }
}

impl OverlayConfig {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn with_live_prediction(mut self, live: bool) -> Self {
        self.live_prediction = live;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn with_tile_cache_bytes(mut self, bytes: u64) -> Self {
        self.tile_cache_bytes = bytes;
        self
    }

    pub fn with_display_cache_bytes(mut self, bytes: u64) -> Self {
        self.display_cache_bytes = bytes;
        self
    }
}

impl From<&ConfigFile> for OverlayConfig {
    fn from(file: &ConfigFile) -> Self {
        Self {
            threads: file.overlay.threads.unwrap_or_else(default_threads).max(1),
            live_prediction: file.overlay.live_prediction,
            opacity: file.overlay.opacity.clamp(0.0, 1.0),
            tile_cache_bytes: file.cache.tile_cache_size,
            display_cache_bytes: file.cache.display_cache_size,
        }
    }
}

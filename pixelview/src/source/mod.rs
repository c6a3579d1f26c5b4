//! Tile-source capability.
//!
//! The overlay never reads pixels or runs a classifier itself. It asks a
//! [`TileSource`] for the [`ClassificationServer`] of the open image, and that
//! server computes one [`TileResult`] per [`RegionKey`].
//!
//! ```text
//! TileSource ──server_for(image)──► ClassificationServer ──compute_tile(key)──► TileResult
//!   (classifier)                      (per image, pyramid metadata)
//! ```
//!
//! Servers are expected to be deterministic for a given key: the cache relies
//! on "last writer wins" being harmless.

mod error;
pub mod grid;
mod pattern;
mod registry;

pub use error::{ConfigurationError, TileComputeError};
pub use pattern::{PatternMode, PatternServer, PatternSource};
pub use registry::{SourceBuilder, SourceParams, TileSourceRegistry};

use std::sync::Arc;

use crate::region::{ImageContext, RegionKey};
use crate::tile::{OutputKind, TileResult};

/// Default tile edge length in level pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// A classifier (or any per-pixel function) that can produce tiles for images.
pub trait TileSource: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &str;

    /// Resolve the classification server for an image.
    ///
    /// Returns a [`ConfigurationError`] if the source cannot handle the image.
    fn server_for(
        &self,
        image: &ImageContext,
    ) -> Result<Arc<dyn ClassificationServer>, ConfigurationError>;
}

/// Computes classification tiles for one image.
pub trait ClassificationServer: Send + Sync {
    /// Output pyramid description.
    fn metadata(&self) -> &ServerMetadata;

    /// Compute the tile for `key`.
    ///
    /// Called on a worker thread; may be slow.
    fn compute_tile(&self, key: &RegionKey) -> Result<TileResult, TileComputeError>;
}

/// Output pyramid of a classification server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerMetadata {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    downsamples: Vec<f64>,
    pub output: OutputKind,
}

impl ServerMetadata {
    pub fn new(width: u32, height: u32, output: OutputKind) -> Self {
        Self {
            width,
            height,
            tile_width: DEFAULT_TILE_SIZE,
            tile_height: DEFAULT_TILE_SIZE,
            downsamples: vec![1.0],
            output,
        }
    }

    pub fn with_tile_size(mut self, tile_width: u32, tile_height: u32) -> Self {
        self.tile_width = tile_width.max(1);
        self.tile_height = tile_height.max(1);
        self
    }

    /// Set the pyramid downsamples.
    ///
    /// Values are sorted ascending, deduplicated, and non-positive or
    /// non-finite values dropped. An empty list falls back to `[1.0]`.
    pub fn with_downsamples(mut self, downsamples: impl IntoIterator<Item = f64>) -> Self {
        let mut values: Vec<f64> = downsamples
            .into_iter()
            .filter(|d| d.is_finite() && *d > 0.0)
            .collect();
        values.sort_by(|a, b| a.total_cmp(b));
        values.dedup_by(|a, b| (*a - *b).abs() < f64::EPSILON);
        if values.is_empty() {
            values.push(1.0);
        }
        self.downsamples = values;
        self
    }

    /// Pyramid downsamples, ascending; never empty.
    pub fn downsamples(&self) -> &[f64] {
        &self.downsamples
    }

    pub fn n_levels(&self) -> usize {
        self.downsamples.len()
    }
}

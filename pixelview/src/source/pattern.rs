//! Built-in synthetic classifier.
//!
//! Classifies a smooth procedural field that looks vaguely like tissue:
//! background, stroma and tumour regions with organic boundaries. Used by the
//! CLI harness and by tests that need a real, deterministic tile source.
//!
//! # Parameters
//!
//! | name              | default          | meaning                                   |
//! |-------------------|------------------|-------------------------------------------|
//! | `tile_size`       | 256              | tile edge in level pixels                 |
//! | `base_downsample` | 1.0              | resolution the classifier runs at         |
//! | `levels`          | 4                | pyramid levels, each 4x coarser           |
//! | `mode`            | `classification` | `classification` or `probability`         |
//! | `latency_ms`      | 0                | artificial delay per tile                 |
//! | `period`          | 600              | feature size in full-resolution pixels    |

use std::f64::consts::TAU;
use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use crate::region::{ImageContext, RegionKey};
use crate::tile::{OutputKind, PixelClass, Raster, TileResult};

use super::error::{ConfigurationError, TileComputeError};
use super::registry::SourceParams;
use super::{ClassificationServer, ServerMetadata, TileSource, DEFAULT_TILE_SIZE};

/// Factor between consecutive pyramid levels.
const LEVEL_FACTOR: f64 = 4.0;

/// Output encoding of the pattern classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternMode {
    Classification,
    Probability,
}

impl std::str::FromStr for PatternMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "classification" | "class" => Ok(Self::Classification),
            "probability" | "prob" => Ok(Self::Probability),
            _ => Err(()),
        }
    }
}

/// Synthetic tile source.
#[derive(Debug, Clone)]
pub struct PatternSource {
    tile_size: u32,
    base_downsample: f64,
    levels: usize,
    mode: PatternMode,
    latency: Duration,
    period: f64,
}

impl PatternSource {
    pub fn new() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            base_downsample: 1.0,
            levels: 4,
            mode: PatternMode::Classification,
            latency: Duration::ZERO,
            period: 600.0,
        }
    }

    /// Build from registry parameters.
    pub fn from_params(params: &SourceParams) -> Result<Self, ConfigurationError> {
        let defaults = Self::new();
        let mode = match params.get("mode") {
            None => defaults.mode,
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigurationError::InvalidParameter {
                    name: "mode".to_string(),
                    value: raw.to_string(),
                })?,
        };
        let base_downsample = params.get_parsed("base_downsample", defaults.base_downsample)?;
        if !(base_downsample.is_finite() && base_downsample > 0.0) {
            return Err(ConfigurationError::InvalidParameter {
                name: "base_downsample".to_string(),
                value: base_downsample.to_string(),
            });
        }
        Ok(Self {
            tile_size: params.get_parsed("tile_size", defaults.tile_size)?.max(16),
            base_downsample,
            levels: params.get_parsed("levels", defaults.levels)?.clamp(1, 12),
            mode,
            latency: Duration::from_millis(params.get_parsed("latency_ms", 0u64)?),
            period: params.get_parsed("period", defaults.period)?.max(1.0),
        })
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_mode(mut self, mode: PatternMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size.max(16);
        self
    }

    /// Classes emitted by the pattern, in label order.
    pub fn classes() -> Vec<PixelClass> {
        vec![
            PixelClass::ignored("Ignore*"),
            PixelClass::new("Stroma", [150, 200, 150]),
            PixelClass::new("Tumor", [200, 0, 0]),
        ]
    }
}

impl Default for PatternSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TileSource for PatternSource {
    fn name(&self) -> &str {
        "pattern"
    }

    fn server_for(
        &self,
        image: &ImageContext,
    ) -> Result<Arc<dyn ClassificationServer>, ConfigurationError> {
        if image.width == 0 || image.height == 0 {
            return Err(ConfigurationError::Unsupported {
                source_name: self.name().to_string(),
                reason: "image has no pixels".to_string(),
            });
        }

        let classes = Self::classes();
        let output = match self.mode {
            PatternMode::Classification => OutputKind::Classification { classes },
            PatternMode::Probability => OutputKind::Probability { classes },
        };
        let downsamples =
            (0..self.levels).map(|i| self.base_downsample * LEVEL_FACTOR.powi(i as i32));
        let metadata = ServerMetadata::new(image.width, image.height, output)
            .with_tile_size(self.tile_size, self.tile_size)
            .with_downsamples(downsamples);

        Ok(Arc::new(PatternServer {
            metadata,
            mode: self.mode,
            latency: self.latency,
            period: self.period,
        }))
    }
}

/// Per-image server of [`PatternSource`].
#[derive(Debug)]
pub struct PatternServer {
    metadata: ServerMetadata,
    mode: PatternMode,
    latency: Duration,
    period: f64,
}

impl PatternServer {
    /// Smooth field in roughly -1.5..1.5.
    fn field(&self, x: f64, y: f64) -> f64 {
        let p = self.period;
        (x / p * TAU).sin() * (y / p * TAU).cos() + 0.5 * ((x + y) / (p * 0.37)).sin()
    }

    fn label(v: f64) -> u8 {
        if v < -0.4 {
            0
        } else if v < 0.5 {
            1
        } else {
            2
        }
    }

    fn probabilities(v: f64) -> [u8; 3] {
        let scores = [-3.0 * v - 1.2, 1.5 - 3.0 * (v - 0.05).abs(), 3.0 * v - 1.5];
        let max = scores.iter().cloned().fold(f64::MIN, f64::max);
        let exps = scores.map(|s| (s - max).exp());
        let sum: f64 = exps.iter().sum();
        exps.map(|e| ((e / sum) * 255.0).round().clamp(0.0, 255.0) as u8)
    }
}

impl ClassificationServer for PatternServer {
    fn metadata(&self) -> &ServerMetadata {
        &self.metadata
    }

    fn compute_tile(&self, key: &RegionKey) -> Result<TileResult, TileComputeError> {
        let region = key.region();
        if region.is_empty()
            || region.x < 0
            || region.y < 0
            || region.max_x() as i64 > self.metadata.width as i64
            || region.max_y() as i64 > self.metadata.height as i64
        {
            return Err(TileComputeError::InvalidRegion(key.to_string()));
        }

        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        let width = key.level_width();
        let height = key.level_height();
        let scale_x = region.width as f64 / width as f64;
        let scale_y = region.height as f64 / height as f64;

        let channels = match self.mode {
            PatternMode::Classification => 1,
            PatternMode::Probability => 3,
        };
        let mut raster = Raster::zeros(width, height, channels);
        for py in 0..height {
            let fy = region.y as f64 + (py as f64 + 0.5) * scale_y;
            for px in 0..width {
                let fx = region.x as f64 + (px as f64 + 0.5) * scale_x;
                let v = self.field(fx, fy);
                match self.mode {
                    PatternMode::Classification => raster.pixel_mut(px, py)[0] = Self::label(v),
                    PatternMode::Probability => raster
                        .pixel_mut(px, py)
                        .copy_from_slice(&Self::probabilities(v)),
                }
            }
        }

        trace!(key = %key, width, height, "Computed pattern tile");
        Ok(TileResult::new(raster, self.metadata.output.clone()))
    }
}

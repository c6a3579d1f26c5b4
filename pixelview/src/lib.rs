//! PixelView - live pixel-classification overlay for tiled images
//!
//! This library computes classification tiles for the visible part of a
//! large pyramidal image in the background and serves them to a synchronous
//! paint loop that never waits.
//!
//! # Architecture
//!
//! ```text
//! paint callback ──► OverlayRenderer ──► TileCache (hit) ──► canvas
//!                          │
//!                          └─ miss ──► TileDispatcher ──► WorkerPool ──► ClassificationServer
//!                                           │                               │
//!                                  PendingRequestTracker          TileCache + UI notify
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pixelview::config::OverlayConfig;
//! use pixelview::executor::{build_runtime, QueuedUiScheduler};
//! use pixelview::overlay::{OverlayRenderer, RasterCanvas};
//! use pixelview::region::{ImageContext, ImageRegion};
//! use pixelview::source::PatternSource;
//!
//! let config = OverlayConfig::default();
//! let runtime = build_runtime(config.threads).unwrap();
//! let scheduler = Arc::new(QueuedUiScheduler::new());
//! let overlay = OverlayRenderer::new(&config, runtime.handle().clone(), scheduler.clone());
//! overlay.set_tile_source(Some(Arc::new(PatternSource::new())));
//!
//! let image = ImageContext::new("slide-1", 20_000, 15_000);
//! let viewport = ImageRegion::new(0, 0, 4096, 4096);
//! let mut canvas = RasterCanvas::new(viewport, 4.0);
//! overlay.paint_overlay(&mut canvas, &viewport, 4.0, &image, false);
//!
//! // Later, on the UI thread
//! scheduler.run_pending();
//! ```

pub mod cache;
pub mod config;
pub mod executor;
pub mod logging;
pub mod overlay;
pub mod region;
pub mod source;
pub mod telemetry;
pub mod tile;

/// Version of the library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

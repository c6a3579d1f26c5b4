//! Paint-side bridge between a viewer and background tile computation.
//!
//! [`OverlayRenderer::paint_overlay`] is called from the viewer's paint
//! callback and never blocks: cached tiles are drawn straight away, and
//! (with live prediction on) missing tiles are handed to the
//! [`TileDispatcher`]. When a job finishes, a [`OverlayEvent::TileReady`]
//! event is delivered on the UI thread, and the next paint picks it up.
//!
//! ```text
//!                  ┌──────────── paint_overlay ────────────┐
//!  viewport ──► tiles at preferred level ──► display cache ──► draw
//!                               │ miss            │ miss
//!                               │           tile cache ──► colorize ──► draw
//!                               │                 │ miss
//!                               └──────────► dispatcher.submit ──► workers
//! ```
//!
//! Replacing the tile source, stopping the overlay or closing an image
//! invalidates the affected state through the dispatcher's generation
//! guard, so a job finishing late can never publish a stale tile.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use image::imageops;
use image::RgbaImage;
use moka::sync::Cache;
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use super::colorize::{to_rgba, ClassColorizer, TileColorizer};
use super::state::{ListenerId, Listeners, OverlayEvent, OverlayState};
use super::OverlayCanvas;
use crate::cache::{CacheStats, TileCache};
use crate::config::OverlayConfig;
use crate::executor::{SubmitOutcome, TileDispatcher, TileReadyCallback, UiScheduler};
use crate::region::{ImageContext, ImageId, ImageRegion, RegionKey};
use crate::source::{grid, ClassificationServer, ConfigurationError, ServerMetadata, TileSource};
use crate::telemetry::{OverlayMetrics, TelemetrySnapshot};

const DISPLAY_ENTRY_OVERHEAD_BYTES: usize = 64;

/// What one paint pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaintReport {
    /// Tiles drawn from the cache.
    pub drawn: usize,
    /// Tiles not yet available.
    pub missing: usize,
    /// Computations started by this pass.
    pub submitted: usize,
    /// Missing tiles filled from a coarser level.
    pub fallback: usize,
}

/// A colorized tile ready for drawing.
#[derive(Clone)]
struct DisplayTile {
    colorizer: u64,
    image: Arc<RgbaImage>,
}

/// The colorizer in use, tagged so conversions made with an older one are
/// recognised.
#[derive(Clone)]
struct ActiveColorizer {
    epoch: u64,
    colorizer: Arc<dyn TileColorizer>,
}

/// Values fixed for the duration of one paint pass.
struct PaintPass<'a> {
    generation: u64,
    image_epoch: u64,
    image: &'a ImageContext,
    colorizer: ActiveColorizer,
    opacity: f32,
}

/// Live classification overlay for a viewer.
pub struct OverlayRenderer {
    source: RwLock<Option<Arc<dyn TileSource>>>,
    servers: DashMap<ImageId, Arc<dyn ClassificationServer>>,
    colorizer: RwLock<ActiveColorizer>,
    display: Cache<RegionKey, DisplayTile>,
    live: AtomicBool,
    opacity: AtomicU32,
    stopped: Arc<AtomicBool>,
    dispatcher: TileDispatcher,
    listeners: Arc<Listeners>,
    metrics: Arc<OverlayMetrics>,
}

impl OverlayRenderer {
    /// Create an idle overlay whose jobs run on `runtime` and whose
    /// tile-ready events are delivered through `scheduler`.
    pub fn new(config: &OverlayConfig, runtime: Handle, scheduler: Arc<dyn UiScheduler>) -> Self {
        let listeners = Arc::new(Listeners::default());
        let metrics = Arc::new(OverlayMetrics::new());
        let stopped = Arc::new(AtomicBool::new(false));

        let ready_listeners = Arc::clone(&listeners);
        let ready_stopped = Arc::clone(&stopped);
        let on_ready: TileReadyCallback = Arc::new(move |key: &RegionKey| {
            if !ready_stopped.load(Ordering::SeqCst) {
                ready_listeners.notify(&OverlayEvent::TileReady(key.clone()));
            }
        });

        let dispatcher = TileDispatcher::new(
            runtime,
            config.threads,
            Arc::new(TileCache::new(config.tile_cache_bytes)),
            scheduler,
            on_ready,
            Arc::clone(&metrics),
        );

        let display = Cache::builder()
            .weigher(|_key: &RegionKey, tile: &DisplayTile| -> u32 {
                (tile.image.as_raw().len() + DISPLAY_ENTRY_OVERHEAD_BYTES).min(u32::MAX as usize)
                    as u32
            })
            .max_capacity(config.display_cache_bytes)
            .build();

        info!(
            threads = dispatcher.threads(),
            live_prediction = config.live_prediction,
            opacity = config.opacity,
            "Overlay renderer created"
        );

        Self {
            source: RwLock::new(None),
            servers: DashMap::new(),
            colorizer: RwLock::new(ActiveColorizer {
                epoch: 0,
                colorizer: Arc::new(ClassColorizer::new()),
            }),
            display,
            live: AtomicBool::new(config.live_prediction),
            opacity: AtomicU32::new(config.opacity.clamp(0.0, 1.0).to_bits()),
            stopped,
            dispatcher,
            listeners,
            metrics,
        }
    }

    pub fn state(&self) -> OverlayState {
        if self.is_stopped() {
            OverlayState::Stopped
        } else if self.source.read().is_none() {
            OverlayState::Idle
        } else if self.live_prediction() {
            OverlayState::LiveComputing
        } else {
            OverlayState::Active
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Attach, replace or (with `None`) detach the tile source.
    ///
    /// All cached tiles, pending requests, display conversions and
    /// per-image servers of the previous source are dropped.
    pub fn set_tile_source(&self, source: Option<Arc<dyn TileSource>>) {
        if self.is_stopped() {
            debug!("Ignoring tile source change on stopped overlay");
            return;
        }
        let name = source.as_ref().map(|s| s.name().to_string());
        *self.source.write() = source;

        let generation = self.dispatcher.invalidate_with(|| {
            self.servers.clear();
            self.display.invalidate_all();
        });
        info!(
            source = name.as_deref().unwrap_or("none"),
            generation,
            "Tile source changed"
        );
        self.listeners.notify(&OverlayEvent::SourceChanged(name));
    }

    /// Name of the attached tile source.
    pub fn source_name(&self) -> Option<String> {
        self.source.read().as_ref().map(|s| s.name().to_string())
    }

    /// Turn computation of missing tiles on or off. Cached tiles are kept.
    pub fn set_live_prediction(&self, live: bool) {
        if self.is_stopped() {
            return;
        }
        if self.live.swap(live, Ordering::SeqCst) != live {
            info!(live, "Live prediction changed");
            self.listeners
                .notify(&OverlayEvent::LivePredictionChanged(live));
        }
    }

    pub fn live_prediction(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Set the overlay opacity, clamped to 0..1. NaN is ignored.
    pub fn set_opacity(&self, opacity: f32) {
        if self.is_stopped() {
            return;
        }
        if opacity.is_nan() {
            warn!("Ignoring NaN overlay opacity");
            return;
        }
        let opacity = opacity.clamp(0.0, 1.0);
        let previous = f32::from_bits(self.opacity.swap(opacity.to_bits(), Ordering::SeqCst));
        if previous != opacity {
            debug!(opacity, "Overlay opacity changed");
            self.listeners.notify(&OverlayEvent::OpacityChanged(opacity));
        }
    }

    pub fn opacity(&self) -> f32 {
        f32::from_bits(self.opacity.load(Ordering::SeqCst))
    }

    /// Replace the function turning tiles into colours. Computed tiles are
    /// kept; only their colorized forms are dropped.
    pub fn set_colorizer(&self, colorizer: Arc<dyn TileColorizer>) {
        if self.is_stopped() {
            return;
        }
        let name = colorizer.name().to_string();
        {
            let mut active = self.colorizer.write();
            active.epoch += 1;
            active.colorizer = colorizer;
        }
        self.display.invalidate_all();
        debug!(colorizer = %name, "Overlay colorizer changed");
        self.listeners.notify(&OverlayEvent::ColorizerChanged);
    }

    /// Forget everything held for an image that has been closed.
    ///
    /// Jobs still running for the image finish without publishing, and a
    /// paint racing the close cannot re-register its server.
    pub fn image_closed(&self, image: &ImageId) {
        let removed = self.dispatcher.close_image(image, || {
            self.servers.remove(image);
            let keys: Vec<Arc<RegionKey>> = self
                .display
                .iter()
                .filter(|(key, _)| key.image() == image)
                .map(|(key, _)| key)
                .collect();
            for key in &keys {
                self.display.invalidate(key.as_ref());
            }
        });
        debug!(image = %image, tiles = removed, "Image closed");
    }

    /// Register a listener for overlay events.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&OverlayEvent) + Send + Sync + 'static,
    {
        self.listeners.add(Arc::new(listener))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Stop the overlay for good: queued jobs are cancelled, caches cleared
    /// and the tile source released. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.dispatcher.shutdown_now_with(|| {
            self.servers.clear();
            self.display.invalidate_all();
        });
        self.source.write().take();
        info!("Overlay stopped");
        self.listeners.notify(&OverlayEvent::Stopped);
    }

    /// Classification server for `image`, resolving it if needed.
    pub fn server(&self, image: &ImageContext) -> Option<Arc<dyn ClassificationServer>> {
        if self.is_stopped() {
            return None;
        }
        let guard = self.dispatcher.generation_guard();
        self.resolve_server(image, guard.current(), guard.image_epoch(&image.id))
            .ok()
    }

    /// Draw the overlay for `viewport` (full-resolution coordinates) as
    /// seen at `downsample`.
    ///
    /// Never blocks. Cached tiles are drawn; missing tiles are submitted for
    /// computation when live prediction is on. With `paint_completely`,
    /// missing tiles are filled from cached coarser levels where possible.
    pub fn paint_overlay(
        &self,
        canvas: &mut dyn OverlayCanvas,
        viewport: &ImageRegion,
        downsample: f64,
        image: &ImageContext,
        paint_completely: bool,
    ) -> PaintReport {
        let mut report = PaintReport::default();
        if self.is_stopped() || !downsample.is_finite() || downsample <= 0.0 {
            return report;
        }

        let generation = self.dispatcher.generation();
        let image_epoch = self.dispatcher.generation_guard().image_epoch(&image.id);
        let server = match self.resolve_server(image, generation, image_epoch) {
            Ok(server) => server,
            Err(e) => {
                trace!(image = %image.id, error = %e, "Nothing to paint");
                return report;
            }
        };
        let region = match canvas.clip() {
            Some(clip) => viewport.intersection(&clip),
            None => Some(*viewport),
        };
        let Some(region) = region.filter(|r| !r.is_empty()) else {
            return report;
        };

        let meta = server.metadata();
        let level = grid::preferred_level(meta.downsamples(), downsample);
        let keys = grid::tiles_at_level(meta, &image.id, &region, level, image.plane);
        let live = self.live_prediction();
        let pass = PaintPass {
            generation,
            image_epoch,
            image,
            colorizer: self.colorizer.read().clone(),
            opacity: self.opacity(),
        };

        let mut missed = Vec::new();
        for key in keys {
            if let Some(tile) = self.display_tile(&key, &pass) {
                canvas.draw_tile(&tile, key.region(), pass.opacity);
                report.drawn += 1;
                continue;
            }

            report.missing += 1;
            if live {
                let worker_server = Arc::clone(&server);
                let outcome = self.dispatcher.submit_for(generation, key.clone(), move |k| {
                    worker_server.compute_tile(k)
                });
                if outcome == SubmitOutcome::Submitted {
                    report.submitted += 1;
                }
            }
            if paint_completely {
                missed.push(key);
            }
        }

        for key in &missed {
            if self.draw_fallback(canvas, meta, level, key, &pass) {
                report.fallback += 1;
            }
        }

        self.metrics.paint(
            report.drawn as u64,
            report.missing as u64,
            report.fallback as u64,
        );
        trace!(
            image = %image.id,
            level,
            drawn = report.drawn,
            missing = report.missing,
            submitted = report.submitted,
            fallback = report.fallback,
            "Painted overlay"
        );
        report
    }

    /// The computed tile cache.
    pub fn tile_cache(&self) -> &Arc<TileCache> {
        self.dispatcher.cache()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.dispatcher.cache().stats()
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.metrics.snapshot()
    }

    pub fn is_pending(&self, key: &RegionKey) -> bool {
        self.dispatcher.is_pending(key)
    }

    /// Tiles requested and not yet finished.
    pub fn pending_count(&self) -> usize {
        self.dispatcher.pending_count()
    }

    /// Jobs queued or running on the workers.
    pub fn in_flight(&self) -> usize {
        self.dispatcher.in_flight()
    }

    pub fn generation(&self) -> u64 {
        self.dispatcher.generation()
    }

    fn resolve_server(
        &self,
        image: &ImageContext,
        generation: u64,
        image_epoch: u64,
    ) -> Result<Arc<dyn ClassificationServer>, ConfigurationError> {
        if let Some(server) = self.servers.get(&image.id) {
            return Ok(Arc::clone(server.value()));
        }

        let source = self
            .source
            .read()
            .clone()
            .ok_or(ConfigurationError::NoSource)?;
        match source.server_for(image) {
            Ok(server) => {
                self.dispatcher.generation_guard().run_if_image_current(
                    generation,
                    &image.id,
                    image_epoch,
                    || {
                        self.servers.insert(image.id.clone(), Arc::clone(&server));
                    },
                );
                debug!(
                    image = %image.id,
                    source = source.name(),
                    levels = server.metadata().n_levels(),
                    "Resolved classification server"
                );
                Ok(server)
            }
            Err(e) => {
                debug!(image = %image.id, error = %e, "Overlay unavailable for image");
                Err(e)
            }
        }
    }

    /// Colorized tile for `key`, from the display cache or converted from
    /// the tile cache.
    fn display_tile(&self, key: &RegionKey, pass: &PaintPass<'_>) -> Option<Arc<RgbaImage>> {
        if let Some(entry) = self.display.get(key) {
            if entry.colorizer == pass.colorizer.epoch {
                return Some(entry.image);
            }
        }

        let tile = self.dispatcher.cache().get(key)?;
        let image = Arc::new(if tile.output().is_display_ready() {
            to_rgba(tile.raster())
        } else {
            pass.colorizer.colorizer.colorize(&tile)
        });

        let entry = DisplayTile {
            colorizer: pass.colorizer.epoch,
            image: Arc::clone(&image),
        };
        self.dispatcher.generation_guard().run_if_image_current(
            pass.generation,
            key.image(),
            pass.image_epoch,
            || self.display.insert(key.clone(), entry),
        );
        Some(image)
    }

    /// Fill a missing tile from the nearest coarser level whose covering
    /// tiles are all available. Returns `true` if anything was drawn.
    fn draw_fallback(
        &self,
        canvas: &mut dyn OverlayCanvas,
        meta: &ServerMetadata,
        level: usize,
        key: &RegionKey,
        pass: &PaintPass<'_>,
    ) -> bool {
        for coarser in level + 1..meta.n_levels() {
            let covering =
                grid::tiles_at_level(meta, &pass.image.id, key.region(), coarser, pass.image.plane);
            if covering.is_empty() {
                continue;
            }
            let tiles: Option<Vec<(RegionKey, Arc<RgbaImage>)>> = covering
                .into_iter()
                .map(|coarse| {
                    let tile = self.display_tile(&coarse, pass)?;
                    Some((coarse, tile))
                })
                .collect();
            let Some(tiles) = tiles else {
                continue;
            };

            for (coarse, tile) in tiles {
                if let Some(part) = coarse.region().intersection(key.region()) {
                    let cropped = crop_to(&tile, coarse.region(), &part);
                    canvas.draw_tile(&cropped, &part, pass.opacity);
                }
            }
            return true;
        }
        false
    }
}

/// The part of `tile` (covering `tile_region`) that covers `part`.
fn crop_to(tile: &RgbaImage, tile_region: &ImageRegion, part: &ImageRegion) -> RgbaImage {
    let scale_x = tile.width() as f64 / tile_region.width.max(1) as f64;
    let scale_y = tile.height() as f64 / tile_region.height.max(1) as f64;

    let x0 = (((part.x - tile_region.x) as f64 * scale_x).floor() as u32)
        .min(tile.width().saturating_sub(1));
    let y0 = (((part.y - tile_region.y) as f64 * scale_y).floor() as u32)
        .min(tile.height().saturating_sub(1));
    let x1 = (((part.max_x() - tile_region.x) as f64 * scale_x).ceil() as u32).min(tile.width());
    let y1 = (((part.max_y() - tile_region.y) as f64 * scale_y).ceil() as u32).min(tile.height());

    imageops::crop_imm(tile, x0, y0, x1.saturating_sub(x0).max(1), y1.saturating_sub(y0).max(1))
        .to_image()
}

impl Drop for OverlayRenderer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for OverlayRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayRenderer")
            .field("state", &self.state())
            .field("source", &self.source_name())
            .field("opacity", &self.opacity())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

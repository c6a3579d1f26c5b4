//! Integration tests for the overlay renderer.
//!
//! These tests drive the full paint → dispatch → worker → cache → notify
//! flow against a mock classification server that counts its calls, and
//! check:
//! - cache reads are idempotent and acquisition has a single winner
//! - no tile is ever computed twice while a job for it is pending
//! - stop, source replacement and image close drop stale results, even
//!   from jobs that are still running
//! - failing tiles stay empty and are retried by a later paint
//!
//! Run with: `cargo test --test overlay_integration`

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::runtime::Handle;

use pixelview::cache::{PendingRequestTracker, TileCache};
use pixelview::config::OverlayConfig;
use pixelview::executor::QueuedUiScheduler;
use pixelview::overlay::{OverlayEvent, OverlayRenderer, RasterCanvas};
use pixelview::region::{ImageContext, ImageId, ImageRegion, Plane, RegionKey};
use pixelview::source::{
    ClassificationServer, ConfigurationError, ServerMetadata, TileComputeError, TileSource,
};
use pixelview::tile::{OutputKind, PixelClass, Raster, TileResult};

// ============================================================================
// Mock tile source
// ============================================================================

const TILE: i32 = 256;

fn classes() -> Vec<PixelClass> {
    vec![
        PixelClass::ignored("Ignore*"),
        PixelClass::new("Tumor", [200, 0, 0]),
    ]
}

/// Server that counts calls per key and can be held closed or made to fail.
struct MockServer {
    metadata: ServerMetadata,
    calls: Mutex<HashMap<RegionKey, usize>>,
    total_calls: AtomicUsize,
    fail_once: Mutex<HashSet<(i32, i32)>>,
    gate_open: Mutex<bool>,
    gate: Condvar,
}

impl MockServer {
    fn new(width: u32, height: u32) -> Arc<Self> {
        let metadata = ServerMetadata::new(
            width,
            height,
            OutputKind::Classification { classes: classes() },
        )
        .with_tile_size(TILE as u32, TILE as u32)
        .with_downsamples([1.0, 4.0]);
        Arc::new(Self {
            metadata,
            calls: Mutex::new(HashMap::new()),
            total_calls: AtomicUsize::new(0),
            fail_once: Mutex::new(HashSet::new()),
            gate_open: Mutex::new(true),
            gate: Condvar::new(),
        })
    }

    fn hold(&self) {
        *self.gate_open.lock() = false;
    }

    fn release(&self) {
        *self.gate_open.lock() = true;
        self.gate.notify_all();
    }

    fn fail_once_at(&self, x: i32, y: i32) {
        self.fail_once.lock().insert((x, y));
    }

    fn calls_for(&self, key: &RegionKey) -> usize {
        self.calls.lock().get(key).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }
}

impl ClassificationServer for MockServer {
    fn metadata(&self) -> &ServerMetadata {
        &self.metadata
    }

    fn compute_tile(&self, key: &RegionKey) -> Result<TileResult, TileComputeError> {
        *self.calls.lock().entry(key.clone()).or_insert(0) += 1;
        self.total_calls.fetch_add(1, Ordering::SeqCst);

        {
            let mut open = self.gate_open.lock();
            let deadline = Instant::now() + Duration::from_secs(5);
            while !*open {
                if self.gate.wait_until(&mut open, deadline).timed_out() {
                    break;
                }
            }
        }

        if self.fail_once.lock().remove(&(key.x(), key.y())) {
            return Err(TileComputeError::Classifier("model not ready".into()));
        }

        let (w, h) = (key.level_width(), key.level_height());
        let raster = Raster::from_vec(w, h, 1, vec![1; (w * h) as usize])
            .ok_or_else(|| TileComputeError::InvalidRegion(key.to_string()))?;
        Ok(TileResult::new(raster, self.metadata.output.clone()))
    }
}

struct MockSource {
    name: String,
    server: Arc<MockServer>,
}

impl MockSource {
    fn new(name: &str, server: &Arc<MockServer>) -> Arc<dyn TileSource> {
        Arc::new(Self {
            name: name.to_string(),
            server: Arc::clone(server),
        })
    }
}

impl TileSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn server_for(
        &self,
        image: &ImageContext,
    ) -> Result<Arc<dyn ClassificationServer>, ConfigurationError> {
        if image.width == 0 {
            return Err(ConfigurationError::Unsupported {
                source_name: self.name.clone(),
                reason: "empty image".into(),
            });
        }
        Ok(self.server.clone())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 768 x 256 image: three level-0 tiles A, B, C in a row.
fn image() -> ImageContext {
    ImageContext::new("slide-1", 768, 256)
}

fn key_at(x: i32) -> RegionKey {
    RegionKey::new(ImageId::new("slide-1"), x, 0, TILE, TILE, 1.0, Plane::default())
}

fn whole_image() -> ImageRegion {
    ImageRegion::new(0, 0, 768, 256)
}

fn tile_result() -> TileResult {
    TileResult::new(
        Raster::from_vec(1, 1, 1, vec![1]).unwrap(),
        OutputKind::Classification { classes: classes() },
    )
}

fn overlay(live: bool) -> (OverlayRenderer, Arc<QueuedUiScheduler>) {
    let scheduler = Arc::new(QueuedUiScheduler::new());
    let config = OverlayConfig::default()
        .with_threads(4)
        .with_live_prediction(live);
    let renderer = OverlayRenderer::new(&config, Handle::current(), scheduler.clone());
    (renderer, scheduler)
}

fn paint(renderer: &OverlayRenderer) -> pixelview::overlay::PaintReport {
    let viewport = whole_image();
    let mut canvas = RasterCanvas::new(viewport, 1.0);
    renderer.paint_overlay(&mut canvas, &viewport, 1.0, &image(), false)
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn wait_idle(renderer: &OverlayRenderer) {
    wait_until("overlay to go idle", || {
        renderer.pending_count() == 0 && renderer.in_flight() == 0
    })
    .await;
}

// ============================================================================
// Integration Tests
// ============================================================================

/// A stored tile reads back unchanged until the cache is cleared.
#[test]
fn test_cache_read_is_idempotent() {
    let cache = TileCache::default();
    let result = Arc::new(tile_result());
    cache.put(key_at(0), Arc::clone(&result));

    for _ in 0..3 {
        let read = cache.get(&key_at(0)).expect("tile present");
        assert!(Arc::ptr_eq(&read, &result));
    }

    cache.clear();
    assert!(cache.get(&key_at(0)).is_none());
}

/// Exactly one of many racing threads acquires a key until it is released.
#[test]
fn test_single_acquire_winner() {
    const THREADS: usize = 32;
    let tracker = Arc::new(PendingRequestTracker::new());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let tracker = Arc::clone(&tracker);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                tracker.try_acquire(&key_at(0))
            })
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);

    assert!(!tracker.try_acquire(&key_at(0)));
    tracker.release(&key_at(0));
    assert!(tracker.try_acquire(&key_at(0)));
}

/// A and B cached, C missing: A and B are drawn, one job is submitted for
/// C, and the paint returns without waiting for it.
#[tokio::test(flavor = "multi_thread")]
async fn test_hit_hit_miss_scenario() {
    let server = MockServer::new(768, 256);
    let (renderer, _) = overlay(true);
    renderer.set_tile_source(Some(MockSource::new("mock", &server)));

    renderer.tile_cache().put(key_at(0), tile_result());
    renderer.tile_cache().put(key_at(256), tile_result());
    server.hold();

    let start = Instant::now();
    let report = paint(&renderer);
    assert!(start.elapsed() < Duration::from_secs(1), "paint blocked");

    assert_eq!(report.drawn, 2);
    assert_eq!(report.missing, 1);
    assert_eq!(report.submitted, 1);
    assert!(renderer.is_pending(&key_at(512)));

    server.release();
    wait_idle(&renderer).await;
    assert_eq!(server.calls_for(&key_at(512)), 1);
    assert_eq!(server.total_calls(), 1);
    assert!(renderer.tile_cache().contains(&key_at(512)));
}

/// Two paints requesting C before its job finishes submit only one job.
#[tokio::test(flavor = "multi_thread")]
async fn test_double_paint_single_job() {
    let server = MockServer::new(768, 256);
    let (renderer, _) = overlay(true);
    renderer.set_tile_source(Some(MockSource::new("mock", &server)));
    server.hold();

    let first = paint(&renderer);
    let second = paint(&renderer);
    assert_eq!(first.submitted, 3);
    assert_eq!(second.submitted, 0);
    assert_eq!(second.missing, 3);

    server.release();
    wait_idle(&renderer).await;
    for x in [0, 256, 512] {
        assert_eq!(server.calls_for(&key_at(x)), 1);
    }
    assert_eq!(renderer.telemetry().jobs_deduplicated, 3);

    let third = paint(&renderer);
    assert_eq!(third.drawn, 3);
    assert_eq!(server.total_calls(), 3);
}

/// A tile whose computation fails stays empty and a later paint retries it.
#[tokio::test(flavor = "multi_thread")]
async fn test_failing_tile_is_retried() {
    let server = MockServer::new(768, 256);
    let (renderer, _) = overlay(true);
    renderer.set_tile_source(Some(MockSource::new("mock", &server)));
    server.fail_once_at(256, 0);

    paint(&renderer);
    wait_idle(&renderer).await;
    assert!(renderer.tile_cache().get(&key_at(256)).is_none());
    assert!(renderer.tile_cache().get(&key_at(0)).is_some());
    assert!(!renderer.is_pending(&key_at(256)));
    assert_eq!(renderer.telemetry().jobs_failed, 1);

    let retry = paint(&renderer);
    assert_eq!(retry.drawn, 2);
    assert_eq!(retry.submitted, 1);
    wait_idle(&renderer).await;
    assert!(renderer.tile_cache().get(&key_at(256)).is_some());
    assert_eq!(server.calls_for(&key_at(256)), 2);
}

/// After stop nothing is cached and further paints do nothing.
#[tokio::test(flavor = "multi_thread")]
async fn test_stop_clears_cache_and_rejects_work() {
    let server = MockServer::new(768, 256);
    let (renderer, _) = overlay(true);
    renderer.set_tile_source(Some(MockSource::new("mock", &server)));

    paint(&renderer);
    wait_idle(&renderer).await;
    assert_eq!(renderer.tile_cache().entry_count(), 3);

    renderer.stop();
    for x in [0, 256, 512] {
        assert!(renderer.tile_cache().get(&key_at(x)).is_none());
    }

    let report = paint(&renderer);
    assert_eq!(report, Default::default());
    assert_eq!(server.total_calls(), 3);
    assert_eq!(renderer.pending_count(), 0);
}

/// A job still running when the overlay stops finishes, but its tile is
/// discarded and no tile-ready event is delivered.
#[tokio::test(flavor = "multi_thread")]
async fn test_stop_discards_running_job() {
    let server = MockServer::new(768, 256);
    let (renderer, scheduler) = overlay(true);
    renderer.set_tile_source(Some(MockSource::new("mock", &server)));
    let ready = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ready);
    renderer.add_listener(move |event| {
        if matches!(event, OverlayEvent::TileReady(_)) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    server.hold();
    paint(&renderer);
    wait_until("a job to start", || server.total_calls() > 0).await;

    renderer.stop();
    server.release();
    wait_idle(&renderer).await;

    scheduler.run_pending();
    assert_eq!(ready.load(Ordering::SeqCst), 0);
    assert_eq!(renderer.tile_cache().entry_count(), 0);
}

/// Replacing the tile source drops tiles computed by the previous one.
#[tokio::test(flavor = "multi_thread")]
async fn test_source_replacement_clears_cache() {
    let first = MockServer::new(768, 256);
    let second = MockServer::new(768, 256);
    let (renderer, _) = overlay(true);
    renderer.set_tile_source(Some(MockSource::new("first", &first)));

    paint(&renderer);
    wait_idle(&renderer).await;
    assert!(renderer.tile_cache().get(&key_at(0)).is_some());

    renderer.set_tile_source(Some(MockSource::new("second", &second)));
    assert!(renderer.tile_cache().get(&key_at(0)).is_none());

    let report = paint(&renderer);
    assert_eq!(report.drawn, 0);
    assert_eq!(report.submitted, 3);
    wait_idle(&renderer).await;
    assert_eq!(second.total_calls(), 3);
}

/// A job for the old source finishing after a source switch does not leak
/// its tile into the new source's cache.
#[tokio::test(flavor = "multi_thread")]
async fn test_late_result_from_old_source_discarded() {
    let old = MockServer::new(768, 256);
    let new = MockServer::new(768, 256);
    let (renderer, _) = overlay(true);
    renderer.set_tile_source(Some(MockSource::new("old", &old)));

    old.hold();
    paint(&renderer);
    wait_until("old jobs to start", || old.total_calls() > 0).await;

    renderer.set_tile_source(Some(MockSource::new("new", &new)));
    old.release();
    wait_idle(&renderer).await;

    assert_eq!(renderer.tile_cache().entry_count(), 0);
    assert!(renderer.telemetry().results_discarded >= 1);
    assert_eq!(new.total_calls(), 0);
}

/// Closing an image while its tiles are computing drops those results and
/// suppresses their tile-ready events; reopening computes them again.
#[tokio::test(flavor = "multi_thread")]
async fn test_image_closed_discards_running_jobs() {
    let server = MockServer::new(768, 256);
    let (renderer, scheduler) = overlay(true);
    renderer.set_tile_source(Some(MockSource::new("mock", &server)));
    let ready = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ready);
    renderer.add_listener(move |event| {
        if matches!(event, OverlayEvent::TileReady(_)) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    server.hold();
    paint(&renderer);
    wait_until("jobs to start", || server.total_calls() == 3).await;

    renderer.image_closed(&ImageId::new("slide-1"));
    server.release();
    wait_idle(&renderer).await;

    scheduler.run_pending();
    assert_eq!(ready.load(Ordering::SeqCst), 0);
    assert_eq!(renderer.tile_cache().entry_count(), 0);
    assert_eq!(renderer.telemetry().results_discarded, 3);

    let reopened = paint(&renderer);
    assert_eq!(reopened.submitted, 3);
    wait_idle(&renderer).await;
    assert_eq!(renderer.tile_cache().entry_count(), 3);
    assert_eq!(scheduler.run_pending(), 3);
}

/// Tile-ready notifications arrive only when the UI thread drains its queue.
#[tokio::test(flavor = "multi_thread")]
async fn test_tile_ready_delivered_on_ui_thread() {
    let server = MockServer::new(768, 256);
    let (renderer, scheduler) = overlay(true);
    renderer.set_tile_source(Some(MockSource::new("mock", &server)));
    let keys = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&keys);
    renderer.add_listener(move |event| {
        if let OverlayEvent::TileReady(key) = event {
            sink.lock().push(key.clone());
        }
    });

    paint(&renderer);
    wait_idle(&renderer).await;
    assert!(keys.lock().is_empty());

    assert_eq!(scheduler.run_pending(), 3);
    let mut delivered: Vec<i32> = keys.lock().iter().map(|k| k.x()).collect();
    delivered.sort_unstable();
    assert_eq!(delivered, vec![0, 256, 512]);
}

/// An image the source cannot handle paints nothing and submits nothing.
#[tokio::test(flavor = "multi_thread")]
async fn test_unsupported_image_is_noop() {
    let server = MockServer::new(768, 256);
    let (renderer, _) = overlay(true);
    renderer.set_tile_source(Some(MockSource::new("mock", &server)));

    let empty = ImageContext::new("empty", 0, 0);
    let viewport = whole_image();
    let mut canvas = RasterCanvas::new(viewport, 1.0);
    let report = renderer.paint_overlay(&mut canvas, &viewport, 1.0, &empty, false);

    assert_eq!(report, Default::default());
    assert_eq!(server.total_calls(), 0);
}

/// Toggling live prediction keeps cached tiles.
#[tokio::test(flavor = "multi_thread")]
async fn test_live_toggle_keeps_cache() {
    let server = MockServer::new(768, 256);
    let (renderer, _) = overlay(true);
    renderer.set_tile_source(Some(MockSource::new("mock", &server)));
    paint(&renderer);
    wait_idle(&renderer).await;

    renderer.set_live_prediction(false);
    let report = paint(&renderer);
    assert_eq!(report.drawn, 3);

    renderer.set_live_prediction(true);
    assert_eq!(renderer.tile_cache().entry_count(), 3);
}

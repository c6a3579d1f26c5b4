//! Tile job dispatch.
//!
//! The dispatcher ties the worker pool to the shared cache state. For each
//! missing tile the paint pass calls [`TileDispatcher::submit`], which:
//!
//! 1. claims the key in the [`PendingRequestTracker`] while the caller's
//!    [`Generation`] is still current (losers return
//!    [`SubmitOutcome::AlreadyPending`], callers from an invalidated
//!    generation [`SubmitOutcome::Stale`], neither queueing anything)
//! 2. queues the computation on the [`WorkerPool`]
//!
//! When the job finishes, the result is stored in the [`TileCache`] only if
//! the generation has not moved on, a tile-ready notification is posted to
//! the UI thread, and the claim is released. Failed, panicked and
//! cancelled jobs release their claim so a later paint can retry.

use std::sync::Arc;
use std::time::Instant;

use tokio::runtime::Handle;
use tracing::{debug, error, trace, warn};

use super::pool::{JobOutcome, WorkerPool};
use super::scheduler::UiScheduler;
use crate::cache::{Generation, PendingRequestTracker, TileCache};
use crate::region::{ImageId, RegionKey};
use crate::source::TileComputeError;
use crate::telemetry::OverlayMetrics;
use crate::tile::TileResult;

/// Called on the UI thread once a tile has been cached.
pub type TileReadyCallback = Arc<dyn Fn(&RegionKey) + Send + Sync>;

/// Result of [`TileDispatcher::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A new job was queued for the tile.
    Submitted,
    /// A job for the tile is already queued or running.
    AlreadyPending,
    /// The caller's generation was invalidated before the key was claimed.
    Stale,
    /// The dispatcher has been shut down.
    ShutDown,
}

/// Submits tile computations and publishes their results.
pub struct TileDispatcher {
    pool: WorkerPool,
    cache: Arc<TileCache>,
    pending: Arc<PendingRequestTracker>,
    generation: Arc<Generation>,
    scheduler: Arc<dyn UiScheduler>,
    on_ready: TileReadyCallback,
    metrics: Arc<OverlayMetrics>,
}

impl TileDispatcher {
    pub fn new(
        handle: Handle,
        threads: usize,
        cache: Arc<TileCache>,
        scheduler: Arc<dyn UiScheduler>,
        on_ready: TileReadyCallback,
        metrics: Arc<OverlayMetrics>,
    ) -> Self {
        Self {
            pool: WorkerPool::new(handle, threads),
            cache,
            pending: Arc::new(PendingRequestTracker::new()),
            generation: Arc::new(Generation::new()),
            scheduler,
            on_ready,
            metrics,
        }
    }

    /// Request `key` be computed by `compute` unless a job for it is pending.
    pub fn submit<F>(&self, key: RegionKey, compute: F) -> SubmitOutcome
    where
        F: FnOnce(&RegionKey) -> Result<TileResult, TileComputeError> + Send + 'static,
    {
        self.submit_for(self.generation.current(), key, compute)
    }

    /// Like [`submit`](Self::submit), for a caller that resolved `compute`
    /// under `generation`. The result is dropped if that generation is no
    /// longer current when the job finishes.
    pub fn submit_for<F>(&self, generation: u64, key: RegionKey, compute: F) -> SubmitOutcome
    where
        F: FnOnce(&RegionKey) -> Result<TileResult, TileComputeError> + Send + 'static,
    {
        if self.pool.is_shutdown() {
            return SubmitOutcome::ShutDown;
        }

        // Claiming under the guard keeps an invalidation from clearing the
        // tracker between the generation check and the claim.
        let pending = &self.pending;
        let guard = &self.generation;
        let claimed = guard.run_if_current(generation, || {
            pending
                .acquire(&key)
                .map(|claim| (claim, guard.image_epoch(key.image())))
        });
        let (claim, image_epoch) = match claimed {
            None => {
                trace!(key = %key, generation, "Ignoring submit from stale generation");
                return SubmitOutcome::Stale;
            }
            Some(None) => {
                self.metrics.job_deduplicated();
                return SubmitOutcome::AlreadyPending;
            }
            Some(Some(claimed)) => claimed,
        };

        let work_key = key.clone();
        let completion = Completion {
            key: key.clone(),
            claim,
            generation,
            image_epoch,
            cache: Arc::clone(&self.cache),
            pending: Arc::clone(&self.pending),
            generation_guard: Arc::clone(&self.generation),
            scheduler: Arc::clone(&self.scheduler),
            on_ready: Arc::clone(&self.on_ready),
            metrics: Arc::clone(&self.metrics),
        };

        self.metrics.job_submitted();
        let accepted = self.pool.execute(
            move || {
                let start = Instant::now();
                let result = compute(&work_key);
                (result, start.elapsed().as_micros() as u64)
            },
            move |outcome| completion.finish(outcome),
        );

        if !accepted {
            self.pending.release_acquired(&key, claim);
            self.metrics.job_cancelled();
            return SubmitOutcome::ShutDown;
        }

        trace!(key = %key, generation, "Submitted tile job");
        SubmitOutcome::Submitted
    }

    /// Drop every cached tile and pending claim, and make results of jobs
    /// still running stale. Returns the new generation.
    pub fn invalidate(&self) -> u64 {
        self.invalidate_with(|| {})
    }

    /// [`invalidate`](Self::invalidate), also running `also` while no
    /// result can be published.
    pub fn invalidate_with(&self, also: impl FnOnce()) -> u64 {
        let cache = &self.cache;
        let pending = &self.pending;
        let next = self.generation.advance(|| {
            cache.clear();
            pending.clear_all();
            also();
        });
        debug!(generation = next, "Invalidated tile cache");
        next
    }

    /// Drop every cached tile of `image` and make results of its running
    /// jobs stale, also running `also` before any of them can publish.
    /// Returns the number of tiles removed.
    pub fn close_image(&self, image: &ImageId, also: impl FnOnce()) -> usize {
        let cache = &self.cache;
        let (epoch, removed) = self.generation.close_image(image, || {
            let removed = cache.invalidate_image(image);
            also();
            removed
        });
        debug!(image = %image, epoch, tiles = removed, "Closed image");
        removed
    }

    /// Cancel queued jobs, refuse new ones, and invalidate all state.
    pub fn shutdown_now(&self) {
        self.shutdown_now_with(|| {});
    }

    /// [`shutdown_now`](Self::shutdown_now), clearing caller state in the
    /// same invalidation.
    pub fn shutdown_now_with(&self, also: impl FnOnce()) {
        self.pool.shutdown_now();
        self.invalidate_with(also);
    }

    pub fn is_shutdown(&self) -> bool {
        self.pool.is_shutdown()
    }

    pub fn is_pending(&self, key: &RegionKey) -> bool {
        self.pending.is_pending(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Jobs queued or running in the pool.
    pub fn in_flight(&self) -> usize {
        self.pool.in_flight()
    }

    pub fn threads(&self) -> usize {
        self.pool.threads()
    }

    pub fn generation(&self) -> u64 {
        self.generation.current()
    }

    /// The guard shared with anything else whose state follows the cache.
    pub fn generation_guard(&self) -> &Arc<Generation> {
        &self.generation
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }
}

impl std::fmt::Debug for TileDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileDispatcher")
            .field("pool", &self.pool)
            .field("pending", &self.pending.len())
            .field("generation", &self.generation.current())
            .finish_non_exhaustive()
    }
}

/// Everything a finished job needs to publish its result.
struct Completion {
    key: RegionKey,
    claim: u64,
    generation: u64,
    image_epoch: u64,
    cache: Arc<TileCache>,
    pending: Arc<PendingRequestTracker>,
    generation_guard: Arc<Generation>,
    scheduler: Arc<dyn UiScheduler>,
    on_ready: TileReadyCallback,
    metrics: Arc<OverlayMetrics>,
}

impl Completion {
    fn finish(self, outcome: JobOutcome<(Result<TileResult, TileComputeError>, u64)>) {
        match outcome {
            JobOutcome::Completed((Ok(tile), micros)) => {
                self.metrics.compute_time(micros);
                self.metrics.job_completed();
                self.publish(tile);
            }
            JobOutcome::Completed((Err(e), _)) => {
                warn!(key = %self.key, error = %e, "Tile computation failed");
                self.metrics.job_failed();
                self.pending.release_acquired(&self.key, self.claim);
            }
            JobOutcome::Panicked(message) => {
                let e = TileComputeError::Panicked(message);
                error!(key = %self.key, error = %e, "Tile computation panicked");
                self.metrics.job_failed();
                self.pending.release_acquired(&self.key, self.claim);
            }
            JobOutcome::Cancelled => {
                trace!(key = %self.key, "Tile job cancelled");
                self.metrics.job_cancelled();
                self.pending.release_acquired(&self.key, self.claim);
            }
        }
    }

    fn publish(self, tile: TileResult) {
        let cache = &self.cache;
        let key = &self.key;
        // Cache before releasing the claim, so a paint never sees the key
        // as neither cached nor pending and submits it twice.
        let stored = self
            .generation_guard
            .run_if_image_current(self.generation, key.image(), self.image_epoch, || {
                cache.put(key.clone(), tile)
            })
            .is_some();

        if stored {
            let on_ready = Arc::clone(&self.on_ready);
            let ready_key = self.key.clone();
            self.scheduler
                .run_on_ui_thread(Box::new(move || on_ready(&ready_key)));
        } else {
            debug!(
                key = %self.key,
                generation = self.generation,
                "Discarding tile from stale generation or closed image"
            );
            self.metrics.result_discarded();
        }
        self.pending.release_acquired(&self.key, self.claim);
    }
}

//! Atomic overlay counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use super::TelemetrySnapshot;

/// Counters shared by the dispatcher and the renderer.
///
/// All updates use relaxed atomics; a snapshot is a consistent-enough view
/// for display, not a synchronization point.
#[derive(Debug)]
pub struct OverlayMetrics {
    started_at: Instant,
    jobs_submitted: AtomicU64,
    jobs_deduplicated: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_cancelled: AtomicU64,
    results_discarded: AtomicU64,
    compute_time_us: AtomicU64,
    tiles_drawn: AtomicU64,
    tiles_missing: AtomicU64,
    fallback_tiles_drawn: AtomicU64,
    paint_calls: AtomicU64,
}

impl OverlayMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            jobs_submitted: AtomicU64::new(0),
            jobs_deduplicated: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            jobs_cancelled: AtomicU64::new(0),
            results_discarded: AtomicU64::new(0),
            compute_time_us: AtomicU64::new(0),
            tiles_drawn: AtomicU64::new(0),
            tiles_missing: AtomicU64::new(0),
            fallback_tiles_drawn: AtomicU64::new(0),
            paint_calls: AtomicU64::new(0),
        }
    }

    pub fn job_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// A request for a tile that already had a job in flight.
    pub fn job_deduplicated(&self) {
        self.jobs_deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_cancelled(&self) {
        self.jobs_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// A computed result dropped because its generation had moved on.
    pub fn result_discarded(&self) {
        self.results_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn compute_time(&self, micros: u64) {
        self.compute_time_us.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn paint(&self, drawn: u64, missing: u64, fallback: u64) {
        self.paint_calls.fetch_add(1, Ordering::Relaxed);
        self.tiles_drawn.fetch_add(drawn, Ordering::Relaxed);
        self.tiles_missing.fetch_add(missing, Ordering::Relaxed);
        self.fallback_tiles_drawn.fetch_add(fallback, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            uptime: self.started_at.elapsed(),
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            jobs_deduplicated: self.jobs_deduplicated.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_cancelled: self.jobs_cancelled.load(Ordering::Relaxed),
            results_discarded: self.results_discarded.load(Ordering::Relaxed),
            compute_time_us: self.compute_time_us.load(Ordering::Relaxed),
            tiles_drawn: self.tiles_drawn.load(Ordering::Relaxed),
            tiles_missing: self.tiles_missing.load(Ordering::Relaxed),
            fallback_tiles_drawn: self.fallback_tiles_drawn.load(Ordering::Relaxed),
            paint_calls: self.paint_calls.load(Ordering::Relaxed),
        }
    }
}

impl Default for OverlayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters() {
        let metrics = OverlayMetrics::new();
        metrics.job_submitted();
        metrics.job_submitted();
        metrics.job_deduplicated();
        metrics.job_completed();
        metrics.job_failed();
        metrics.job_cancelled();
        metrics.result_discarded();
        metrics.compute_time(1_500);
        metrics.paint(3, 1, 0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_submitted, 2);
        assert_eq!(snapshot.jobs_deduplicated, 1);
        assert_eq!(snapshot.jobs_completed, 1);
        assert_eq!(snapshot.jobs_failed, 1);
        assert_eq!(snapshot.jobs_cancelled, 1);
        assert_eq!(snapshot.results_discarded, 1);
        assert_eq!(snapshot.compute_time_us, 1_500);
        assert_eq!(snapshot.paint_calls, 1);
        assert_eq!(snapshot.tiles_drawn, 3);
        assert_eq!(snapshot.tiles_missing, 1);
    }

    #[test]
    fn test_concurrent_updates() {
        let metrics = Arc::new(OverlayMetrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        metrics.job_submitted();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.snapshot().jobs_submitted, 4_000);
    }
}

//! Point-in-time telemetry copy.

use std::fmt;
use std::time::Duration;

/// Copy of [`OverlayMetrics`](super::OverlayMetrics) counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub uptime: Duration,
    pub jobs_submitted: u64,
    pub jobs_deduplicated: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_cancelled: u64,
    pub results_discarded: u64,
    pub compute_time_us: u64,
    pub tiles_drawn: u64,
    pub tiles_missing: u64,
    pub fallback_tiles_drawn: u64,
    pub paint_calls: u64,
}

impl TelemetrySnapshot {
    /// Jobs submitted but not yet finished in any way.
    pub fn jobs_in_flight(&self) -> u64 {
        self.jobs_submitted.saturating_sub(
            self.jobs_completed + self.jobs_failed + self.jobs_cancelled,
        )
    }

    /// Mean compute time of completed jobs in milliseconds.
    pub fn mean_compute_ms(&self) -> f64 {
        if self.jobs_completed == 0 {
            0.0
        } else {
            self.compute_time_us as f64 / self.jobs_completed as f64 / 1_000.0
        }
    }

    /// Tiles completed per second of uptime.
    pub fn tiles_per_second(&self) -> f64 {
        let secs = self.uptime.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.jobs_completed as f64 / secs
        }
    }
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Jobs:")?;
        writeln!(
            f,
            "  submitted {} (deduplicated {}), completed {}, failed {}, cancelled {}",
            self.jobs_submitted,
            self.jobs_deduplicated,
            self.jobs_completed,
            self.jobs_failed,
            self.jobs_cancelled
        )?;
        writeln!(
            f,
            "  discarded {}, mean compute {:.2} ms, {:.1} tiles/s",
            self.results_discarded,
            self.mean_compute_ms(),
            self.tiles_per_second()
        )?;
        writeln!(f, "Paint:")?;
        write!(
            f,
            "  {} calls, {} tiles drawn, {} missing, {} fallback",
            self.paint_calls, self.tiles_drawn, self.tiles_missing, self.fallback_tiles_drawn
        )
    }
}

//! Overlay telemetry.
//!
//! Lock-free atomic counters recorded by the dispatcher and the renderer,
//! with point-in-time snapshots for display.
//!
//! ```text
//! Dispatcher / Renderer ─────► OverlayMetrics ─────► TelemetrySnapshot ─────► Views
//!                              (atomic counters)     (point-in-time copy)      (CLI, etc.)
//! ```
//!
//! # Example
//!
//! ```
//! use pixelview::telemetry::OverlayMetrics;
//!
//! let metrics = OverlayMetrics::new();
//! metrics.job_submitted();
//! metrics.job_completed();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.jobs_completed, 1);
//! ```

mod metrics;
mod snapshot;

pub use metrics::OverlayMetrics;
pub use snapshot::TelemetrySnapshot;

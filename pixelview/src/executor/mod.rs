//! Background tile computation.
//!
//! - [`WorkerPool`]: bounded pool of blocking workers on a tokio runtime
//! - [`TileDispatcher`]: coalesced submission and generation-guarded publish
//! - [`UiScheduler`]: hands tile-ready notifications back to the UI thread

mod dispatcher;
mod pool;
mod scheduler;

pub use dispatcher::{SubmitOutcome, TileDispatcher, TileReadyCallback};
pub use pool::{build_runtime, default_threads, JobOutcome, WorkerPool};
pub use scheduler::{ImmediateScheduler, QueuedUiScheduler, UiScheduler, UiTask};

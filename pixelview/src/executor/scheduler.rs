//! Handing work back to the UI thread.
//!
//! Workers never touch the viewer directly. When a tile is ready they post a
//! task through a [`UiScheduler`], and the host runs it on whatever thread
//! owns the display.

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::trace;

/// A unit of work to run on the UI thread.
pub type UiTask = Box<dyn FnOnce() + Send + 'static>;

/// Posts tasks to the thread that owns the display.
pub trait UiScheduler: Send + Sync {
    /// Queue `task` to run on the UI thread. Must not block.
    fn run_on_ui_thread(&self, task: UiTask);
}

/// Scheduler backed by a queue the host drains from its own loop.
///
/// ```
/// use pixelview::executor::{QueuedUiScheduler, UiScheduler};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let scheduler = QueuedUiScheduler::new();
/// let hits = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&hits);
/// scheduler.run_on_ui_thread(Box::new(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// }));
///
/// assert_eq!(hits.load(Ordering::SeqCst), 0);
/// assert_eq!(scheduler.run_pending(), 1);
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// ```
pub struct QueuedUiScheduler {
    sender: UnboundedSender<UiTask>,
    receiver: Mutex<UnboundedReceiver<UiTask>>,
}

impl QueuedUiScheduler {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Run every task queued so far on the calling thread.
    ///
    /// Tasks queued while draining are run in the same call. Returns the
    /// number of tasks run.
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        loop {
            // Released before the task runs so tasks may post more tasks.
            let next = self.receiver.lock().try_recv();
            let Ok(task) = next else { break };
            task();
            count += 1;
        }
        if count > 0 {
            trace!(count, "Ran queued UI tasks");
        }
        count
    }

    /// Number of tasks waiting to run.
    pub fn queued(&self) -> usize {
        self.receiver.lock().len()
    }
}

impl Default for QueuedUiScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl UiScheduler for QueuedUiScheduler {
    fn run_on_ui_thread(&self, task: UiTask) {
        // The receiver lives as long as self, so the send cannot fail.
        let _ = self.sender.send(task);
    }
}

impl std::fmt::Debug for QueuedUiScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedUiScheduler").finish_non_exhaustive()
    }
}

/// Runs tasks inline on the posting thread.
///
/// For headless use and tests where there is no separate UI thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateScheduler;

impl UiScheduler for ImmediateScheduler {
    fn run_on_ui_thread(&self, task: UiTask) {
        task();
    }
}

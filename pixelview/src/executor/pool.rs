//! Bounded worker pool for tile computation.
//!
//! Classification is blocking, CPU-bound work, so jobs run on tokio's
//! blocking pool behind a semaphore sized to the configured thread count.
//! Queued jobs wait on the semaphore as lightweight async tasks; a job only
//! occupies a blocking thread once it holds a permit.
//!
//! ```text
//! execute() ──► async task ──► [permit] ──► spawn_blocking(work) ──► on_done(outcome)
//!                   │
//!                   └── shutdown_now() before permit ──► on_done(Cancelled)
//! ```
//!
//! Shutdown cancels everything still waiting for a permit. Jobs already
//! running cannot be interrupted; they finish and report normally, and the
//! caller decides whether the result still matters.
//!
//! If the host runtime shuts down first, its tasks are dropped unrun. Each
//! task owns its completion, so a dropped task still reports `Cancelled`.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::runtime::{Handle, Runtime};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Thread count used when the platform cannot report its parallelism.
const FALLBACK_THREADS: usize = 4;

/// Default worker count: the number of available CPUs.
pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(FALLBACK_THREADS)
}

/// Build a runtime suitable for hosting a [`WorkerPool`].
///
/// The blocking pool is capped at `threads`, so it never holds more
/// threads than the pool can keep busy.
pub fn build_runtime(threads: usize) -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .max_blocking_threads(threads.max(1))
        .thread_name("pixel-worker")
        .enable_time()
        .build()
}

/// How a job ended.
#[derive(Debug)]
pub enum JobOutcome<T> {
    /// The job ran to completion.
    Completed(T),
    /// The job panicked; carries the panic message.
    Panicked(String),
    /// The job never ran because the pool shut down.
    Cancelled,
}

/// Fixed-size pool of blocking workers.
#[derive(Debug)]
pub struct WorkerPool {
    handle: Handle,
    permits: Arc<Semaphore>,
    threads: usize,
    shutdown: CancellationToken,
    queued: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Create a pool running at most `threads` jobs at once on `handle`.
    pub fn new(handle: Handle, threads: usize) -> Self {
        let threads = threads.max(1);
        debug!(threads, "Creating worker pool");
        Self {
            handle,
            permits: Arc::new(Semaphore::new(threads)),
            threads,
            shutdown: CancellationToken::new(),
            queued: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue `work`; `on_done` is called exactly once with its outcome.
    ///
    /// Returns `false` without calling `on_done` if the pool is shut down.
    /// If the runtime behind the pool is gone, `on_done` receives
    /// `Cancelled`, possibly before this returns.
    pub fn execute<T, W, D>(&self, work: W, on_done: D) -> bool
    where
        T: Send + 'static,
        W: FnOnce() -> T + Send + 'static,
        D: FnOnce(JobOutcome<T>) + Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            return false;
        }

        let permits = Arc::clone(&self.permits);
        let token = self.shutdown.clone();
        let active = Arc::clone(&self.active);
        let mut completion = Completion::queued(on_done, Arc::clone(&self.queued));

        self.handle.spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                permit = permits.acquire_owned() => permit.ok(),
            };
            completion.dequeue();

            let Some(permit) = permit else {
                completion.deliver(JobOutcome::Cancelled);
                return;
            };
            if token.is_cancelled() {
                drop(permit);
                completion.deliver(JobOutcome::Cancelled);
                return;
            }

            completion.start(active);
            let result = tokio::task::spawn_blocking(work).await;
            let outcome = match result {
                Ok(value) => JobOutcome::Completed(value),
                Err(e) if e.is_panic() => JobOutcome::Panicked(panic_message(e.into_panic())),
                Err(_) => JobOutcome::Cancelled,
            };
            completion.deliver(outcome);
            drop(permit);
        });
        true
    }

    /// Cancel every queued job and refuse new ones. Idempotent.
    pub fn shutdown_now(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        info!(
            queued = self.queued(),
            active = self.active(),
            "Shutting down worker pool"
        );
        self.shutdown.cancel();
        self.permits.close();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Maximum number of jobs running at once.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Jobs currently running.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Queued plus running jobs.
    pub fn in_flight(&self) -> usize {
        self.queued() + self.active()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown_now();
    }
}

/// Delivers a job's outcome once and keeps the pool counters in step.
///
/// A task dropped before it finished (its runtime shut down, or was already
/// gone when the job was spawned) reports `Cancelled` from `drop`.
struct Completion<T, D>
where
    D: FnOnce(JobOutcome<T>),
{
    on_done: Option<D>,
    queued: Option<Arc<AtomicUsize>>,
    active: Option<Arc<AtomicUsize>>,
    _outcome: PhantomData<fn(JobOutcome<T>)>,
}

impl<T, D> Completion<T, D>
where
    D: FnOnce(JobOutcome<T>),
{
    fn queued(on_done: D, queued: Arc<AtomicUsize>) -> Self {
        queued.fetch_add(1, Ordering::SeqCst);
        Self {
            on_done: Some(on_done),
            queued: Some(queued),
            active: None,
            _outcome: PhantomData,
        }
    }

    fn dequeue(&mut self) {
        if let Some(queued) = self.queued.take() {
            queued.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn start(&mut self, active: Arc<AtomicUsize>) {
        self.dequeue();
        active.fetch_add(1, Ordering::SeqCst);
        self.active = Some(active);
    }

    // A job counts as active until its completion has run.
    fn deliver(&mut self, outcome: JobOutcome<T>) {
        self.dequeue();
        if let Some(on_done) = self.on_done.take() {
            on_done(outcome);
        }
        if let Some(active) = self.active.take() {
            active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl<T, D> Drop for Completion<T, D>
where
    D: FnOnce(JobOutcome<T>),
{
    fn drop(&mut self) {
        if self.on_done.is_some() {
            debug!("Worker task dropped before completing, reporting cancellation");
        }
        self.deliver(JobOutcome::Cancelled);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

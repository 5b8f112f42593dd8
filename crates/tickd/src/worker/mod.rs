//! Cancellable periodic background worker.
//!
//! A [`PeriodicWorker`] describes what to run (interval, version tag, tick
//! sink); each [`PeriodicWorker::start`] spawns one thread and returns the
//! [`WorkerHandle`] that owns it. The handle is the only way to stop the
//! thread: [`WorkerHandle::cancel`] requests the stop and
//! [`WorkerHandle::await_stopped`] confirms it. Once `await_stopped` returns,
//! the worker can no longer emit ticks.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use thiserror::Error;
use tracing::{debug, warn};

mod tick;
mod token;

pub use tick::{StructuredTickSink, Tick, TickSink, TickSinkError};
pub use token::CancellationToken;

pub(crate) const WORKER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::worker");

/// Errors raised while starting a worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The operating system refused to spawn the worker thread.
    #[error("failed to spawn worker thread for generation {generation}: {source}")]
    Spawn {
        /// Generation that failed to start.
        generation: u64,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Factory for periodic worker threads.
#[derive(Clone)]
pub struct PeriodicWorker {
    interval: Duration,
    version: Arc<str>,
    sink: Arc<dyn TickSink>,
}

impl std::fmt::Debug for PeriodicWorker {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("PeriodicWorker")
            .field("interval", &self.interval)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl PeriodicWorker {
    /// Describes a worker ticking every `interval` into `sink`.
    #[must_use]
    pub fn new(interval: Duration, version: &str, sink: Arc<dyn TickSink>) -> Self {
        Self {
            interval,
            version: Arc::from(version),
            sink,
        }
    }

    /// Interval between ticks.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawns a worker thread tagged with `generation`.
    pub fn start(&self, generation: u64) -> Result<WorkerHandle, WorkerError> {
        let token = CancellationToken::new();
        let loop_token = token.clone();
        let interval = self.interval;
        let version = Arc::clone(&self.version);
        let sink = Arc::clone(&self.sink);
        let thread = thread::Builder::new()
            .name(format!("tickd-worker-{generation}"))
            .spawn(move || run_loop(generation, interval, &version, &loop_token, sink.as_ref()))
            .map_err(|source| WorkerError::Spawn { generation, source })?;
        debug!(
            target: WORKER_TARGET,
            generation,
            interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            "worker started"
        );
        Ok(WorkerHandle {
            generation,
            interval,
            token,
            thread: Some(thread),
        })
    }
}

/// Owner of one running worker thread.
///
/// Dropping the handle cancels and joins the worker.
#[derive(Debug)]
pub struct WorkerHandle {
    generation: u64,
    interval: Duration,
    token: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Generation assigned when the worker was started.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Interval the worker ticks at.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Requests the worker to stop.
    ///
    /// Safe to call any number of times; returns `true` only for the call
    /// that actually delivered the cancellation.
    #[must_use]
    pub fn cancel(&self) -> bool {
        let delivered = self.token.cancel();
        if delivered {
            debug!(target: WORKER_TARGET, generation = self.generation, "worker cancellation sent");
        } else {
            debug!(
                target: WORKER_TARGET,
                generation = self.generation,
                "worker already cancelled"
            );
        }
        delivered
    }

    /// Reports whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Reports whether the worker has not yet been cancelled and joined.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.thread.is_some()
    }

    /// Blocks until the worker thread has exited.
    ///
    /// Returns immediately when the thread was already joined. Callers must
    /// [`cancel`](Self::cancel) first or this waits forever.
    pub fn await_stopped(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.join().is_err() {
            warn!(
                target: WORKER_TARGET,
                generation = self.generation,
                "worker thread panicked"
            );
        }
        debug!(target: WORKER_TARGET, generation = self.generation, "worker joined");
    }

    /// Cancels the worker and waits for it to exit.
    ///
    /// Returns `true` when a live worker was joined by this call.
    pub fn stop(&mut self) -> bool {
        let was_live = self.is_live();
        let _delivered = self.cancel();
        self.await_stopped();
        was_live
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.is_live() {
            self.stop();
        }
    }
}

fn run_loop(
    generation: u64,
    interval: Duration,
    version: &Arc<str>,
    token: &CancellationToken,
    sink: &dyn TickSink,
) {
    debug!(target: WORKER_TARGET, generation, "worker loop running");
    let mut deadline = Instant::now().checked_add(interval);
    while let Some(due) = deadline {
        if token.wait_until(due) {
            debug!(target: WORKER_TARGET, generation, "worker loop stopped");
            return;
        }
        let tick = Tick {
            generation,
            timestamp: SystemTime::now(),
            version: Arc::clone(version),
        };
        if let Err(error) = sink.record(&tick) {
            warn!(
                target: WORKER_TARGET,
                generation,
                error = %error,
                "failed to record tick"
            );
        }
        deadline = next_deadline(due, interval, Instant::now());
    }
    warn!(
        target: WORKER_TARGET,
        generation,
        interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        "tick interval is beyond the clock range; idling until cancelled"
    );
    token.wait();
    debug!(target: WORKER_TARGET, generation, "worker loop stopped");
}

/// Deadline following `due`. Overrun intervals are dropped rather than
/// replayed, and `None` means the next deadline cannot be represented.
fn next_deadline(due: Instant, interval: Duration, now: Instant) -> Option<Instant> {
    match due.checked_add(interval) {
        Some(next) if next > now => Some(next),
        _ => now.checked_add(interval),
    }
}

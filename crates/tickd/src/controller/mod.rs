//! Service control state machine.
//!
//! [`ServiceController`] consumes [`ControlRequest`] values one at a time,
//! drives the lifetime of the periodic worker, and publishes every status
//! transition through a [`StatusReporter`]. The controller is the only owner
//! of the [`WorkerHandle`]: a worker is started on entry to `Running` and is
//! cancelled and joined before `Paused` or `StopPending` is reported, so a
//! status that claims the worker is stopped is never published while it can
//! still tick.
//!
//! The host adapter reports `StartPending` before calling
//! [`ServiceController::execute`] and `Stopped` after it returns; the
//! controller itself reports everything in between.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::thread;

use thiserror::Error;
use tracing::{debug, warn};

use crate::eventlog::{self, CONTROL_EVENT_ID, EventLevel, EventLog};
use crate::identity::ServiceIdentity;
use crate::worker::{PeriodicWorker, StructuredTickSink, TickSink, WorkerError, WorkerHandle};

mod reporter;
mod types;

pub use reporter::{LifecycleReporter, StructuredLifecycleReporter};
pub use types::{
    ControlCommand, ControlRequest, ControllerSettings, ServiceStatus, StatusReportError,
    StatusReporter, raw,
};

pub(crate) const CONTROLLER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::controller");

/// Errors surfaced by the control loop.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// A worker could not be started.
    #[error("failed to start worker: {source}")]
    Worker {
        /// Underlying worker error.
        #[source]
        source: WorkerError,
    },
    /// A status could not be delivered to the host.
    #[error("failed to report service status: {source}")]
    Report {
        /// Underlying reporting error.
        #[source]
        source: StatusReportError,
    },
    /// The controller has already run its control loop.
    #[error("controller already executed; current status is {status}")]
    AlreadyExecuted {
        /// Status at the time of the second call.
        status: ServiceStatus,
    },
}

impl From<WorkerError> for ControllerError {
    fn from(source: WorkerError) -> Self {
        Self::Worker { source }
    }
}

impl From<StatusReportError> for ControllerError {
    fn from(source: StatusReportError) -> Self {
        Self::Report { source }
    }
}

enum Flow {
    Continue,
    Exit,
}

/// State machine driving one service run.
pub struct ServiceController {
    identity: ServiceIdentity,
    settings: ControllerSettings,
    worker: PeriodicWorker,
    handle: Option<WorkerHandle>,
    generation: u64,
    status: ServiceStatus,
    event_log: Arc<dyn EventLog>,
    reporter: Arc<dyn LifecycleReporter>,
}

impl std::fmt::Debug for ServiceController {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ServiceController")
            .field("identity", &self.identity)
            .field("settings", &self.settings)
            .field("handle", &self.handle)
            .field("generation", &self.generation)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl ServiceController {
    /// Builds a controller that logs ticks and lifecycle events with
    /// `tracing`.
    #[must_use]
    pub fn new(
        identity: ServiceIdentity,
        settings: ControllerSettings,
        event_log: Arc<dyn EventLog>,
    ) -> Self {
        let worker = PeriodicWorker::new(
            settings.tick_interval,
            identity.version(),
            Arc::new(StructuredTickSink),
        );
        Self {
            identity,
            settings,
            worker,
            handle: None,
            generation: 0,
            status: ServiceStatus::StartPending,
            event_log,
            reporter: Arc::new(StructuredLifecycleReporter::new()),
        }
    }

    /// Replaces the sink ticks are recorded into.
    #[must_use]
    pub fn with_tick_sink(mut self, sink: Arc<dyn TickSink>) -> Self {
        self.worker = PeriodicWorker::new(self.settings.tick_interval, self.identity.version(), sink);
        self
    }

    /// Replaces the lifecycle observer.
    #[must_use]
    pub fn with_lifecycle_reporter(mut self, reporter: Arc<dyn LifecycleReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Identity of the service being controlled.
    #[must_use]
    pub const fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    /// Event log shared with the host adapter.
    #[must_use]
    pub const fn event_log(&self) -> &Arc<dyn EventLog> {
        &self.event_log
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> ServiceStatus {
        self.status
    }

    /// Number of workers started so far.
    #[must_use]
    pub const fn workers_started(&self) -> u64 {
        self.generation
    }

    /// Reports whether a worker is currently live.
    #[must_use]
    pub fn has_live_worker(&self) -> bool {
        self.handle.as_ref().is_some_and(WorkerHandle::is_live)
    }

    /// Runs the control loop until a stop or shutdown request arrives.
    ///
    /// `args` are the service start arguments; they are joined into the
    /// shutdown message written to the event log. A disconnected request
    /// channel is treated as a stop request. On error the worker is stopped
    /// before returning.
    pub fn execute(
        &mut self,
        args: &[String],
        requests: &Receiver<ControlRequest>,
        status: &dyn StatusReporter,
    ) -> Result<(), ControllerError> {
        if self.status != ServiceStatus::StartPending {
            return Err(ControllerError::AlreadyExecuted {
                status: self.status,
            });
        }
        let outcome = self.run(args, requests, status);
        if outcome.is_err() {
            self.stop_worker();
        }
        outcome
    }

    fn run(
        &mut self,
        args: &[String],
        requests: &Receiver<ControlRequest>,
        status: &dyn StatusReporter,
    ) -> Result<(), ControllerError> {
        self.start_worker()?;
        self.transition(ServiceStatus::Running, status)?;
        loop {
            let request = requests.recv().unwrap_or_else(|_| {
                warn!(
                    target: CONTROLLER_TARGET,
                    "control request channel closed; stopping"
                );
                ControlRequest::new(ControlCommand::Stop, 0, self.status)
            });
            self.reporter.request_received(&request);
            if let Flow::Exit = self.handle_request(args, &request, status)? {
                break;
            }
        }
        self.transition(ServiceStatus::StopPending, status)?;
        debug!(target: CONTROLLER_TARGET, "service stopped");
        Ok(())
    }

    fn handle_request(
        &mut self,
        args: &[String],
        request: &ControlRequest,
        status: &dyn StatusReporter,
    ) -> Result<Flow, ControllerError> {
        match request.command {
            ControlCommand::Interrogate => {
                status.report(request.current_status)?;
                // Blocks the control thread; the host waits for this round trip.
                thread::sleep(self.settings.interrogate_delay);
                status.report(request.current_status)?;
                Ok(Flow::Continue)
            }
            ControlCommand::Stop | ControlCommand::Shutdown => {
                self.stop_worker();
                let message = format!("{} shutdown - {}", args.join("-"), request.context);
                eventlog::emit(
                    self.event_log.as_ref(),
                    EventLevel::Info,
                    CONTROL_EVENT_ID,
                    &message,
                );
                Ok(Flow::Exit)
            }
            ControlCommand::Pause => {
                self.stop_worker();
                self.transition(ServiceStatus::Paused, status)?;
                Ok(Flow::Continue)
            }
            ControlCommand::Continue => {
                if self.has_live_worker() {
                    debug!(
                        target: CONTROLLER_TARGET,
                        generation = self.generation,
                        "continue received while running; keeping current worker"
                    );
                } else {
                    self.start_worker()?;
                }
                self.transition(ServiceStatus::Running, status)?;
                Ok(Flow::Continue)
            }
            ControlCommand::Unknown(code) => {
                self.reporter.unexpected_request(code);
                eventlog::emit(
                    self.event_log.as_ref(),
                    EventLevel::Error,
                    CONTROL_EVENT_ID,
                    &format!("unexpected control request: #{code}"),
                );
                Ok(Flow::Continue)
            }
        }
    }

    fn start_worker(&mut self) -> Result<(), ControllerError> {
        // The previous handle, if any, was cancelled and joined before the
        // controller left Running; replacing it here cannot drop a live worker.
        self.stop_worker();
        let generation = self.generation + 1;
        let handle = self.worker.start(generation)?;
        self.generation = generation;
        self.handle = Some(handle);
        self.reporter.worker_started(generation);
        Ok(())
    }

    fn stop_worker(&mut self) {
        let Some(handle) = self.handle.as_mut() else {
            return;
        };
        if handle.stop() {
            self.reporter.worker_stopped(handle.generation());
        }
    }

    fn transition(
        &mut self,
        to: ServiceStatus,
        status: &dyn StatusReporter,
    ) -> Result<(), ControllerError> {
        let from = self.status;
        self.status = to;
        self.reporter.transitioned(from, to);
        status.report(to)?;
        Ok(())
    }
}

//! Adapters connecting the controller to a service host.
//!
//! A [`ServiceHost`] owns the transport for control requests and status
//! reports. It reports `StartPending` before handing control to the
//! [`ServiceController`] and `Stopped` after the controller returns. The host
//! is selected once per process from the [`RunMode`].

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::controller::{ControllerError, ControllerSettings, ServiceController, StatusReportError};
use crate::eventlog::{self, EventLevel, EventLog, HOST_EVENT_ID};
use crate::identity::ServiceIdentity;

mod debug;
#[cfg(windows)]
mod windows;

pub use debug::{ConsoleStatusReporter, DebugHost};
#[cfg(windows)]
pub use windows::WindowsServiceHost;

pub(crate) const HOST_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::host");

/// How the process was launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Interactive console run driven by stdin and Ctrl-C.
    Debug,
    /// Run under the operating system service manager.
    Service,
}

/// Errors raised by host adapters.
#[derive(Debug, Error)]
pub enum HostError {
    /// The control loop failed.
    #[error(transparent)]
    Controller(#[from] ControllerError),
    /// A status outside the control loop could not be delivered.
    #[error("failed to report service status: {0}")]
    Report(#[from] StatusReportError),
    /// Installing the termination signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Signals {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Spawning a host thread failed.
    #[error("failed to spawn {role} thread: {source}")]
    Spawn {
        /// Thread purpose.
        role: &'static str,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The scripted console input was already consumed by an earlier run.
    #[error("console input has already been consumed")]
    InputConsumed,
    /// Service mode is only available on Windows.
    #[error("running under the service manager is not supported on this platform")]
    UnsupportedPlatform,
    /// A dispatcher launch is already in progress for this process.
    #[error("the service dispatcher has already been started")]
    AlreadyDispatched,
    /// The dispatcher returned without invoking the service entry point.
    #[error("the service manager never invoked the service entry point")]
    NotDispatched,
    /// Registering the control handler failed.
    #[cfg(windows)]
    #[error("failed to register control handler: {source}")]
    Register {
        /// Underlying service manager error.
        #[source]
        source: windows_service::Error,
    },
    /// Connecting to the service dispatcher failed.
    #[cfg(windows)]
    #[error("failed to start service dispatcher: {source}")]
    Dispatcher {
        /// Underlying service manager error.
        #[source]
        source: windows_service::Error,
    },
}

/// Transport that drives a controller to completion.
pub trait ServiceHost {
    /// Runs `controller` until it stops.
    fn run(&self, controller: ServiceController) -> Result<(), HostError>;
}

/// Runs the service in `mode`, writing lifecycle messages to the event log
/// registered under the service name.
pub fn run_service(
    identity: ServiceIdentity,
    settings: ControllerSettings,
    mode: RunMode,
) -> Result<(), HostError> {
    let event_log = eventlog::open(identity.name(), mode == RunMode::Debug);
    let host = select_host(mode)?;
    run_service_with(host.as_ref(), identity, settings, event_log)
}

/// Runs the service on an explicit host and event log.
pub fn run_service_with(
    host: &dyn ServiceHost,
    identity: ServiceIdentity,
    settings: ControllerSettings,
    event_log: Arc<dyn EventLog>,
) -> Result<(), HostError> {
    run_controller(host, ServiceController::new(identity, settings, event_log))
}

/// Hands a prepared controller to `host`, bracketing the run with start and
/// stop messages on the controller's event log.
pub fn run_controller(host: &dyn ServiceHost, controller: ServiceController) -> Result<(), HostError> {
    let name = controller.identity().name().to_owned();
    let event_log = Arc::clone(controller.event_log());
    let log = event_log.as_ref();
    eventlog::emit(
        log,
        EventLevel::Info,
        HOST_EVENT_ID,
        &format!("starting {name} service"),
    );
    match host.run(controller) {
        Ok(()) => {
            eventlog::emit(
                log,
                EventLevel::Info,
                HOST_EVENT_ID,
                &format!("stopped {name} service"),
            );
            Ok(())
        }
        Err(error) => {
            tracing::error!(target: HOST_TARGET, service = %name, error = %error, "service failed");
            eventlog::emit(
                log,
                EventLevel::Error,
                HOST_EVENT_ID,
                &format!("{name} service failed: {error}"),
            );
            Err(error)
        }
    }
}

fn select_host(mode: RunMode) -> Result<Box<dyn ServiceHost>, HostError> {
    match mode {
        RunMode::Debug => Ok(Box::new(DebugHost::console())),
        RunMode::Service => service_host(),
    }
}

#[cfg(windows)]
fn service_host() -> Result<Box<dyn ServiceHost>, HostError> {
    Ok(Box::new(WindowsServiceHost::new()))
}

#[cfg(not(windows))]
fn service_host() -> Result<Box<dyn ServiceHost>, HostError> {
    Err(HostError::UnsupportedPlatform)
}

//! Windows service dispatcher host.
//!
//! The dispatcher calls back into a plain `extern "system"` entry point, so
//! the controller is parked in a process-wide slot before the dispatcher
//! starts and the outcome is parked in another slot before the entry point
//! returns.

use std::ffi::OsString;
use std::io;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use windows_service::service::{
    ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState, ServiceStatus as ScmStatus,
    ServiceType,
};
use windows_service::service_control_handler::{
    self, ServiceControlHandlerResult, ServiceStatusHandle,
};
use windows_service::{define_windows_service, service_dispatcher};

use super::{HOST_TARGET, HostError, ServiceHost};
use crate::controller::{
    ControlCommand, ControlRequest, ServiceController, ServiceStatus, StatusReportError,
    StatusReporter,
};

const SERVICE_SPECIFIC_FAILURE: u32 = 1;

static PENDING: Mutex<Option<ServiceController>> = Mutex::new(None);
static OUTCOME: Mutex<Option<Result<(), HostError>>> = Mutex::new(None);

define_windows_service!(ffi_service_main, service_main);

/// Host that hands control to the Windows service dispatcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsServiceHost;

impl WindowsServiceHost {
    /// Builds the host.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ServiceHost for WindowsServiceHost {
    fn run(&self, controller: ServiceController) -> Result<(), HostError> {
        let name = controller.identity().name().to_owned();
        {
            let mut pending = PENDING.lock().unwrap_or_else(PoisonError::into_inner);
            if pending.is_some() {
                return Err(HostError::AlreadyDispatched);
            }
            *pending = Some(controller);
        }
        let dispatched = service_dispatcher::start(&name, ffi_service_main);
        // Drop a controller the dispatcher never claimed.
        PENDING.lock().unwrap_or_else(PoisonError::into_inner).take();
        dispatched.map_err(|source| HostError::Dispatcher { source })?;
        OUTCOME
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or(Err(HostError::NotDispatched))
    }
}

fn service_main(arguments: Vec<OsString>) {
    let claimed = PENDING.lock().unwrap_or_else(PoisonError::into_inner).take();
    let outcome = match claimed {
        Some(controller) => run_dispatched(controller, &arguments),
        None => Err(HostError::AlreadyDispatched),
    };
    if let Err(error) = &outcome {
        tracing::error!(target: HOST_TARGET, error = %error, "service entry point failed");
    }
    *OUTCOME.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
}

fn run_dispatched(
    mut controller: ServiceController,
    arguments: &[OsString],
) -> Result<(), HostError> {
    let (sender, receiver) = mpsc::channel();
    let current = Arc::new(Mutex::new(ServiceStatus::StartPending));
    let handler = control_handler(sender, Arc::clone(&current));
    let handle = service_control_handler::register(controller.identity().name(), handler)
        .map_err(|source| HostError::Register { source })?;
    let reporter = ScmStatusReporter { handle, current };
    reporter.report(ServiceStatus::StartPending)?;

    let args: Vec<String> = arguments
        .iter()
        .map(|argument| argument.to_string_lossy().into_owned())
        .collect();
    let outcome = controller.execute(&args, &receiver, &reporter);
    let exit_code = match outcome {
        Ok(()) => ServiceExitCode::Win32(0),
        Err(_) => ServiceExitCode::ServiceSpecific(SERVICE_SPECIFIC_FAILURE),
    };
    let stopped = reporter.report_with_exit_code(ServiceStatus::Stopped, exit_code);
    outcome?;
    stopped?;
    Ok(())
}

/// Context attached to forwarded requests.
///
/// `windows-service` hands the handler a decoded [`ServiceControl`] and keeps
/// the raw event type and data to itself. Stop, shutdown, pause, continue and
/// interrogate carry no event data, so the shutdown message always ends in 0.
const SCM_REQUEST_CONTEXT: u32 = 0;

fn control_handler(
    sender: Sender<ControlRequest>,
    current: Arc<Mutex<ServiceStatus>>,
) -> impl Fn(ServiceControl) -> ServiceControlHandlerResult + Send + 'static {
    move |control| {
        let command = match control {
            ServiceControl::Interrogate => ControlCommand::Interrogate,
            ServiceControl::Stop => ControlCommand::Stop,
            ServiceControl::Shutdown => ControlCommand::Shutdown,
            ServiceControl::Pause => ControlCommand::Pause,
            ServiceControl::Continue => ControlCommand::Continue,
            other => ControlCommand::Unknown(other.raw_service_control_type()),
        };
        let status = *current.lock().unwrap_or_else(PoisonError::into_inner);
        if sender.send(ControlRequest::new(command, SCM_REQUEST_CONTEXT, status)).is_err() {
            tracing::warn!(target: HOST_TARGET, %command, "control request after controller exit");
        }
        match command {
            ControlCommand::Unknown(_) => ServiceControlHandlerResult::NotImplemented,
            _ => ServiceControlHandlerResult::NoError,
        }
    }
}

struct ScmStatusReporter {
    handle: ServiceStatusHandle,
    current: Arc<Mutex<ServiceStatus>>,
}

impl ScmStatusReporter {
    fn report_with_exit_code(
        &self,
        status: ServiceStatus,
        exit_code: ServiceExitCode,
    ) -> Result<(), StatusReportError> {
        let controls_accepted = match status {
            ServiceStatus::Running | ServiceStatus::Paused => {
                ServiceControlAccept::STOP
                    | ServiceControlAccept::SHUTDOWN
                    | ServiceControlAccept::PAUSE_CONTINUE
            }
            _ => ServiceControlAccept::empty(),
        };
        let next = ScmStatus {
            service_type: ServiceType::OWN_PROCESS,
            current_state: scm_state(status),
            controls_accepted,
            exit_code,
            checkpoint: 0,
            wait_hint: Duration::default(),
            process_id: None,
        };
        self.handle
            .set_service_status(next)
            .map_err(|error| StatusReportError::Rejected {
                status,
                source: io::Error::other(error),
            })?;
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = status;
        Ok(())
    }
}

impl StatusReporter for ScmStatusReporter {
    fn report(&self, status: ServiceStatus) -> Result<(), StatusReportError> {
        self.report_with_exit_code(status, ServiceExitCode::Win32(0))
    }
}

const fn scm_state(status: ServiceStatus) -> ServiceState {
    match status {
        ServiceStatus::StartPending => ServiceState::StartPending,
        ServiceStatus::Running => ServiceState::Running,
        ServiceStatus::Paused => ServiceState::Paused,
        ServiceStatus::StopPending => ServiceState::StopPending,
        ServiceStatus::Stopped => ServiceState::Stopped,
    }
}

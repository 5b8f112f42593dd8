//! Status values, control requests, and the status reporting seam.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tickd_config::Config;

/// Lifecycle status reported to the service host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceStatus {
    /// The service is starting.
    StartPending,
    /// The worker is running.
    Running,
    /// The worker is stopped but the service stays resident.
    Paused,
    /// The control loop has exited and the service is shutting down.
    StopPending,
    /// The service has stopped. Only the host reports this status.
    Stopped,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartPending => formatter.write_str("start_pending"),
            Self::Running => formatter.write_str("running"),
            Self::Paused => formatter.write_str("paused"),
            Self::StopPending => formatter.write_str("stop_pending"),
            Self::Stopped => formatter.write_str("stopped"),
        }
    }
}

/// Raw control codes understood by the service manager.
pub mod raw {
    /// `SERVICE_CONTROL_STOP`.
    pub const STOP: u32 = 0x0000_0001;
    /// `SERVICE_CONTROL_PAUSE`.
    pub const PAUSE: u32 = 0x0000_0002;
    /// `SERVICE_CONTROL_CONTINUE`.
    pub const CONTINUE: u32 = 0x0000_0003;
    /// `SERVICE_CONTROL_INTERROGATE`.
    pub const INTERROGATE: u32 = 0x0000_0004;
    /// `SERVICE_CONTROL_SHUTDOWN`.
    pub const SHUTDOWN: u32 = 0x0000_0005;
}

/// Command carried by a control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Report the current status.
    Interrogate,
    /// Stop the service.
    Stop,
    /// The system is shutting down.
    Shutdown,
    /// Pause the worker.
    Pause,
    /// Resume the worker.
    Continue,
    /// A control code the controller does not model.
    Unknown(u32),
}

impl ControlCommand {
    /// Maps a raw service control code.
    #[must_use]
    pub const fn from_raw(code: u32) -> Self {
        match code {
            raw::STOP => Self::Stop,
            raw::PAUSE => Self::Pause,
            raw::CONTINUE => Self::Continue,
            raw::INTERROGATE => Self::Interrogate,
            raw::SHUTDOWN => Self::Shutdown,
            other => Self::Unknown(other),
        }
    }

    /// Raw service control code for this command.
    #[must_use]
    pub const fn raw(self) -> u32 {
        match self {
            Self::Stop => raw::STOP,
            Self::Pause => raw::PAUSE,
            Self::Continue => raw::CONTINUE,
            Self::Interrogate => raw::INTERROGATE,
            Self::Shutdown => raw::SHUTDOWN,
            Self::Unknown(code) => code,
        }
    }

    /// Parses a console verb or a numeric control code.
    ///
    /// Returns `None` for text that is neither.
    #[must_use]
    pub fn from_console(input: &str) -> Option<Self> {
        let word = input.trim().to_ascii_lowercase();
        match word.as_str() {
            "stop" => Some(Self::Stop),
            "shutdown" => Some(Self::Shutdown),
            "pause" => Some(Self::Pause),
            "continue" => Some(Self::Continue),
            "interrogate" => Some(Self::Interrogate),
            other => other.parse::<u32>().ok().map(Self::from_raw),
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrogate => formatter.write_str("interrogate"),
            Self::Stop => formatter.write_str("stop"),
            Self::Shutdown => formatter.write_str("shutdown"),
            Self::Pause => formatter.write_str("pause"),
            Self::Continue => formatter.write_str("continue"),
            Self::Unknown(code) => write!(formatter, "unknown({code})"),
        }
    }
}

/// One control request delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    /// Requested command.
    pub command: ControlCommand,
    /// Host supplied context value, used for shutdown diagnostics.
    pub context: u32,
    /// Status the host last saw, echoed back for interrogate.
    pub current_status: ServiceStatus,
}

impl ControlRequest {
    /// Builds a request.
    #[must_use]
    pub const fn new(command: ControlCommand, context: u32, current_status: ServiceStatus) -> Self {
        Self {
            command,
            context,
            current_status,
        }
    }
}

/// Timing knobs for the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Interval between worker ticks.
    pub tick_interval: Duration,
    /// Delay between the two status echoes of an interrogate request.
    pub interrogate_delay: Duration,
}

impl ControllerSettings {
    /// Derives settings from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            tick_interval: config.tick_interval(),
            interrogate_delay: config.interrogate_delay(),
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Errors raised while delivering a status to the host.
#[derive(Debug, Error)]
pub enum StatusReportError {
    /// The host is no longer accepting status updates.
    #[error("status channel closed before {status} could be reported")]
    Closed {
        /// Status that could not be delivered.
        status: ServiceStatus,
    },
    /// The host rejected the status.
    #[error("host rejected status {status}: {source}")]
    Rejected {
        /// Status that was rejected.
        status: ServiceStatus,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Outbound status channel to the service host.
pub trait StatusReporter {
    /// Delivers `status` to the host.
    fn report(&self, status: ServiceStatus) -> Result<(), StatusReportError>;
}

//! Registration and remote control of the service with the service manager.
//!
//! Every operation is written against [`ServiceRegistry`], so the sequencing
//! rules (existence checks, event source rollback, polling for a target
//! state) hold for any backend. [`WindowsRegistry`] talks to the Windows
//! Service Control Manager.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tickd_config::Config;
use tracing::{debug, info};

use crate::identity::ServiceIdentity;

#[cfg(windows)]
mod windows;

#[cfg(windows)]
pub use windows::WindowsRegistry;

pub(crate) const MANAGER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::manager");

/// Arguments the service manager passes when it starts the service on boot.
pub const AUTO_START_ARGUMENTS: [&str; 2] = ["is", "auto-started"];

/// Arguments passed when the `start` verb starts the service.
pub const MANUAL_START_ARGUMENTS: [&str; 2] = ["is", "manual-started"];

/// Interval between status queries while waiting for a target state.
pub const CONTROL_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Service state as observed through the service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedState {
    /// Not running.
    Stopped,
    /// Starting.
    StartPending,
    /// Stopping.
    StopPending,
    /// Running.
    Running,
    /// Resuming from pause.
    ContinuePending,
    /// Pausing.
    PausePending,
    /// Paused.
    Paused,
}

impl fmt::Display for ObservedState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Stopped => "stopped",
            Self::StartPending => "start_pending",
            Self::StopPending => "stop_pending",
            Self::Running => "running",
            Self::ContinuePending => "continue_pending",
            Self::PausePending => "pause_pending",
            Self::Paused => "paused",
        };
        formatter.write_str(text)
    }
}

/// Control sent to an installed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceCommand {
    /// Stop the service.
    Stop,
    /// Pause the service.
    Pause,
    /// Resume a paused service.
    Continue,
}

impl ServiceCommand {
    /// State the service settles in once the command has taken effect.
    #[must_use]
    pub const fn target_state(self) -> ObservedState {
        match self {
            Self::Stop => ObservedState::Stopped,
            Self::Pause => ObservedState::Paused,
            Self::Continue => ObservedState::Running,
        }
    }
}

impl fmt::Display for ServiceCommand {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stop => formatter.write_str("stop"),
            Self::Pause => formatter.write_str("pause"),
            Self::Continue => formatter.write_str("continue"),
        }
    }
}

/// Registration record for an automatically started, own-process service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    /// Registration name.
    pub name: String,
    /// Name shown by service management tools.
    pub display_name: String,
    /// Binary the service manager launches.
    pub executable: PathBuf,
    /// Arguments passed on every automatic launch.
    pub launch_arguments: Vec<String>,
}

impl ServiceSpec {
    /// Describes `identity` as an automatically started service.
    #[must_use]
    pub fn for_identity(identity: &ServiceIdentity) -> Self {
        Self {
            name: identity.name().to_owned(),
            display_name: identity.description().to_owned(),
            executable: identity.executable().to_path_buf(),
            launch_arguments: AUTO_START_ARGUMENTS.iter().map(|arg| (*arg).to_owned()).collect(),
        }
    }
}

/// Everything `install` needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    /// Service registration.
    pub spec: ServiceSpec,
    /// Delay before the service manager restarts a crashed service.
    pub restart_delay: Duration,
}

impl InstallPlan {
    /// Builds a plan from the process identity and configuration.
    #[must_use]
    pub fn new(identity: &ServiceIdentity, config: &Config) -> Self {
        Self {
            spec: ServiceSpec::for_identity(identity),
            restart_delay: config.restart_delay(),
        }
    }
}

/// How long to wait for a control to take effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlWait {
    /// Overall budget.
    pub timeout: Duration,
    /// Interval between status queries.
    pub poll_interval: Duration,
}

impl ControlWait {
    /// Uses the configured timeout and the standard poll interval.
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.control_timeout(),
            poll_interval: CONTROL_POLL_INTERVAL,
        }
    }
}

/// Failures reported by a [`ServiceRegistry`] backend.
#[derive(Debug, Error)]
#[error("{operation} failed for service {name}: {source}")]
pub struct RegistryError {
    /// Backend operation that failed.
    pub operation: &'static str,
    /// Service the operation targeted.
    pub name: String,
    /// Underlying error.
    #[source]
    pub source: io::Error,
}

impl RegistryError {
    /// Wraps `source` with the failing operation and service name.
    #[must_use]
    pub fn new(operation: &'static str, name: impl Into<String>, source: io::Error) -> Self {
        Self {
            operation,
            name: name.into(),
            source,
        }
    }
}

/// Errors raised by install, remove, start, and control.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// A service with this name is already registered.
    #[error("service {name} already exists")]
    AlreadyExists {
        /// Service name.
        name: String,
    },
    /// No service with this name is registered.
    #[error("service {name} is not installed")]
    NotInstalled {
        /// Service name.
        name: String,
    },
    /// The service did not reach the expected state in time.
    #[error(
        "timed out after {waited:?} waiting for service {name} to reach {target}; last observed {last}"
    )]
    Timeout {
        /// Service name.
        name: String,
        /// Expected state.
        target: ObservedState,
        /// Last state seen.
        last: ObservedState,
        /// Time spent waiting.
        waited: Duration,
    },
    /// Registering the event source failed and the service was removed again.
    #[error("failed to register event source for {name}: {source}")]
    EventSource {
        /// Service name.
        name: String,
        /// Underlying error.
        #[source]
        source: RegistryError,
    },
    /// An install step failed and undoing the earlier steps failed too.
    #[error(
        "failed to {stage} for {name}: {source}; rolling back the registration also failed: {rollback}"
    )]
    Rollback {
        /// Service name.
        name: String,
        /// Install step that failed.
        stage: &'static str,
        /// Install step failure.
        #[source]
        source: RegistryError,
        /// Rollback failure.
        rollback: RegistryError,
    },
    /// Configuring the restart-on-failure action failed and the service and
    /// its event source were removed again.
    #[error("failed to configure recovery actions for {name}: {source}")]
    RecoveryActions {
        /// Service name.
        name: String,
        /// Underlying error.
        #[source]
        source: RegistryError,
    },
    /// The service was deleted but its event source could not be removed.
    #[error("failed to remove event source for {name}: {source}")]
    RemoveEventSource {
        /// Service name.
        name: String,
        /// Underlying error.
        #[source]
        source: RegistryError,
    },
    /// Any other backend failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Backend operations needed to manage the service.
pub trait ServiceRegistry {
    /// Reports whether `name` is registered.
    fn is_installed(&self, name: &str) -> Result<bool, RegistryError>;
    /// Registers the service described by `spec`.
    fn create(&self, spec: &ServiceSpec) -> Result<(), RegistryError>;
    /// Marks `name` for deletion.
    fn delete(&self, name: &str) -> Result<(), RegistryError>;
    /// Restarts the service after `delay` whenever it crashes; the failure
    /// count never resets.
    fn set_restart_on_failure(&self, name: &str, delay: Duration) -> Result<(), RegistryError>;
    /// Registers the event log source for `name`.
    fn install_event_source(&self, name: &str) -> Result<(), RegistryError>;
    /// Removes the event log source for `name`.
    fn remove_event_source(&self, name: &str) -> Result<(), RegistryError>;
    /// Starts `name` with `arguments`.
    fn start(&self, name: &str, arguments: &[String]) -> Result<(), RegistryError>;
    /// Sends `command` and returns the state reported in response.
    fn send_control(
        &self,
        name: &str,
        command: ServiceCommand,
    ) -> Result<ObservedState, RegistryError>;
    /// Queries the current state.
    fn query_state(&self, name: &str) -> Result<ObservedState, RegistryError>;
}

/// Registers the service, its event source, and its recovery action.
///
/// A failure after the service was created undoes the earlier steps, so a
/// failed install leaves nothing registered.
pub fn install(registry: &dyn ServiceRegistry, plan: &InstallPlan) -> Result<(), ManagerError> {
    let name = plan.spec.name.as_str();
    if registry.is_installed(name)? {
        return Err(ManagerError::AlreadyExists {
            name: name.to_owned(),
        });
    }
    registry.create(&plan.spec)?;
    debug!(target: MANAGER_TARGET, service = name, "service registered");

    if let Err(source) = registry.install_event_source(name) {
        return Err(match registry.delete(name) {
            Ok(()) => ManagerError::EventSource {
                name: name.to_owned(),
                source,
            },
            Err(rollback) => ManagerError::Rollback {
                name: name.to_owned(),
                stage: "register event source",
                source,
                rollback,
            },
        });
    }

    if let Err(source) = registry.set_restart_on_failure(name, plan.restart_delay) {
        let undone = registry
            .delete(name)
            .and_then(|()| registry.remove_event_source(name));
        return Err(match undone {
            Ok(()) => ManagerError::RecoveryActions {
                name: name.to_owned(),
                source,
            },
            Err(rollback) => ManagerError::Rollback {
                name: name.to_owned(),
                stage: "configure recovery actions",
                source,
                rollback,
            },
        });
    }
    info!(
        target: MANAGER_TARGET,
        service = name,
        restart_delay_ms = plan.restart_delay.as_millis(),
        "service installed"
    );
    Ok(())
}

/// Deletes the service and then its event source.
pub fn remove(registry: &dyn ServiceRegistry, name: &str) -> Result<(), ManagerError> {
    ensure_installed(registry, name)?;
    registry.delete(name)?;
    registry
        .remove_event_source(name)
        .map_err(|source| ManagerError::RemoveEventSource {
            name: name.to_owned(),
            source,
        })?;
    info!(target: MANAGER_TARGET, service = name, "service removed");
    Ok(())
}

/// Starts the service with [`MANUAL_START_ARGUMENTS`].
pub fn start(registry: &dyn ServiceRegistry, name: &str) -> Result<(), ManagerError> {
    ensure_installed(registry, name)?;
    let arguments: Vec<String> = MANUAL_START_ARGUMENTS
        .iter()
        .map(|arg| (*arg).to_owned())
        .collect();
    registry.start(name, &arguments)?;
    info!(target: MANAGER_TARGET, service = name, "service start requested");
    Ok(())
}

/// Sends `command` and polls until the service reaches the command's target
/// state or `wait.timeout` elapses.
pub fn control(
    registry: &dyn ServiceRegistry,
    name: &str,
    command: ServiceCommand,
    wait: ControlWait,
) -> Result<ObservedState, ManagerError> {
    ensure_installed(registry, name)?;
    let target = command.target_state();
    let started = Instant::now();
    let mut state = registry.send_control(name, command)?;
    while state != target {
        let waited = started.elapsed();
        if waited >= wait.timeout {
            return Err(ManagerError::Timeout {
                name: name.to_owned(),
                target,
                last: state,
                waited,
            });
        }
        thread::sleep(wait.poll_interval);
        state = registry.query_state(name)?;
        debug!(target: MANAGER_TARGET, service = name, %state, %target, "polled service state");
    }
    info!(target: MANAGER_TARGET, service = name, %command, %state, "service control completed");
    Ok(state)
}

fn ensure_installed(registry: &dyn ServiceRegistry, name: &str) -> Result<(), ManagerError> {
    if registry.is_installed(name)? {
        Ok(())
    } else {
        Err(ManagerError::NotInstalled {
            name: name.to_owned(),
        })
    }
}

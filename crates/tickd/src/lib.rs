//! Service runtime for the `tickd` periodic tick service.
//!
//! The crate hosts a background worker that emits a tick on a fixed interval
//! for as long as the service is running. The [`ServiceController`] state
//! machine consumes control requests from the operating system's service
//! manager (stop, shutdown, pause, continue, interrogate), starts and stops
//! the worker so its lifetime matches the `Running` state, and reports every
//! status transition back to the host.
//!
//! Two hosts drive the controller: [`DebugHost`] reads control verbs from the
//! console, and on Windows the service dispatcher host forwards controls from
//! the Service Control Manager. The [`manager`] module installs, removes,
//! starts, and controls the registered service, and [`run`] wires it all to
//! the `tickd` command line.

mod cli;
mod config;
mod controller;
pub mod eventlog;
mod host;
mod identity;
pub mod manager;
mod runner;
mod telemetry;
mod update;
mod worker;

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

pub use config::{ConfigLoader, OrthoConfigLoader};
pub use controller::{
    ControlCommand, ControlRequest, ControllerError, ControllerSettings, LifecycleReporter,
    ServiceController, ServiceStatus, StatusReportError, StatusReporter,
    StructuredLifecycleReporter, raw,
};
pub use host::{
    ConsoleStatusReporter, DebugHost, HostError, RunMode, ServiceHost, run_controller,
    run_service, run_service_with,
};
#[cfg(windows)]
pub use host::WindowsServiceHost;
pub use identity::{SERVICE_VERSION, ServiceIdentity};
pub use runner::{CliError, CliRunner, CommandHandler, SystemCommands, UPDATED_EXIT_CODE};
pub use telemetry::{LogDestination, TelemetryError, TelemetryHandle};
pub use update::{PinnedRelease, SelfUpdate, UpdateError, UpdateOutcome};
pub use worker::{
    CancellationToken, PeriodicWorker, StructuredTickSink, Tick, TickSink, TickSinkError,
    WorkerError, WorkerHandle,
};

/// Runs the CLI with the process's real collaborators.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    CliRunner::new(stdout, stderr, &OrthoConfigLoader, &SystemCommands::default()).run(args)
}

#[cfg(test)]
mod tests;

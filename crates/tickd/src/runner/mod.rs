//! Verb dispatch and exit-code mapping.
//!
//! [`CliRunner`] parses the command line, loads configuration, installs
//! telemetry, consults the self-update boundary, and hands the verb to a
//! [`CommandHandler`]. Tests substitute the loader and the handler.

use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::error::ErrorKind;
use thiserror::Error;
use tickd_config::Config;
use tracing::{error, info, warn};

use crate::cli::{Cli, Verb};
use crate::config::{ConfigLoader, split_config_arguments};
use crate::controller::ControllerSettings;
use crate::host::{self, HostError, RunMode};
use crate::identity::ServiceIdentity;
use crate::manager::{
    self, ControlWait, InstallPlan, ManagerError, RegistryError, ServiceCommand, ServiceRegistry,
};
use crate::telemetry::{self, TelemetryError};
use crate::update::{PinnedRelease, SelfUpdate, UpdateOutcome};

pub(crate) const CLI_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::cli");

/// Exit code used when the binary replaced itself with a newer release.
pub const UPDATED_EXIT_CODE: u8 = 2;

/// Errors surfaced by the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded.
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    /// The command line could not be parsed.
    #[error("{0}")]
    Usage(clap::Error),
    /// The executable path could not be resolved.
    #[error("failed to resolve executable path: {0}")]
    Executable(#[source] io::Error),
    /// Telemetry could not be configured.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// The service host failed.
    #[error(transparent)]
    Host(#[from] HostError),
    /// A service manager operation failed.
    #[error(transparent)]
    Manager(#[from] ManagerError),
    /// Connecting to the service manager failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Service management is unavailable on this platform.
    #[error("service management is only supported on Windows")]
    UnsupportedPlatform,
    /// Writing to the console failed.
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
}

/// Side-effecting operations behind each verb.
pub trait CommandHandler {
    /// Resolves the identity of the running binary.
    fn identity(&self, config: &Config) -> Result<ServiceIdentity, CliError>;

    /// Installs the process-wide tracing subscriber.
    fn initialise_telemetry(
        &self,
        config: &Config,
        identity: &ServiceIdentity,
    ) -> Result<(), CliError>;

    /// Self-update boundary consulted before dispatch.
    fn updater(&self) -> &dyn SelfUpdate;

    /// Connects to the service manager.
    fn registry(&self) -> Result<Box<dyn ServiceRegistry>, CliError>;

    /// Runs the service until it stops.
    fn run_service(
        &self,
        identity: ServiceIdentity,
        settings: ControllerSettings,
        mode: RunMode,
    ) -> Result<(), CliError>;
}

/// Handler wired to the real process, service manager, and console.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommands {
    updater: PinnedRelease,
}

impl CommandHandler for SystemCommands {
    fn identity(&self, config: &Config) -> Result<ServiceIdentity, CliError> {
        ServiceIdentity::current(config).map_err(CliError::Executable)
    }

    fn initialise_telemetry(
        &self,
        config: &Config,
        identity: &ServiceIdentity,
    ) -> Result<(), CliError> {
        telemetry::initialise(config, identity.executable())?;
        Ok(())
    }

    fn updater(&self) -> &dyn SelfUpdate {
        &self.updater
    }

    #[cfg(windows)]
    fn registry(&self) -> Result<Box<dyn ServiceRegistry>, CliError> {
        Ok(Box::new(manager::WindowsRegistry::connect()?))
    }

    #[cfg(not(windows))]
    fn registry(&self) -> Result<Box<dyn ServiceRegistry>, CliError> {
        Err(CliError::UnsupportedPlatform)
    }

    fn run_service(
        &self,
        identity: ServiceIdentity,
        settings: ControllerSettings,
        mode: RunMode,
    ) -> Result<(), CliError> {
        host::run_service(identity, settings, mode)?;
        Ok(())
    }
}

enum Completion {
    Done,
    Updated,
}

/// Parses and dispatches one invocation.
pub struct CliRunner<'a, W: Write, E: Write, L: ConfigLoader, H: CommandHandler> {
    stdout: &'a mut W,
    stderr: &'a mut E,
    loader: &'a L,
    handler: &'a H,
}

impl<'a, W, E, L, H> CliRunner<'a, W, E, L, H>
where
    W: Write,
    E: Write,
    L: ConfigLoader,
    H: CommandHandler,
{
    /// Builds a runner over the given streams and collaborators.
    #[must_use]
    pub fn new(stdout: &'a mut W, stderr: &'a mut E, loader: &'a L, handler: &'a H) -> Self {
        Self {
            stdout,
            stderr,
            loader,
            handler,
        }
    }

    /// Runs the invocation described by `args` and maps the outcome to an
    /// exit code: 0 on success, 1 on any error, 2 after a self-update.
    pub fn run<I>(&mut self, args: I) -> ExitCode
    where
        I: IntoIterator<Item = OsString>,
    {
        let args: Vec<OsString> = args.into_iter().collect();
        match self.dispatch(&args) {
            Ok(Completion::Done) => ExitCode::SUCCESS,
            Ok(Completion::Updated) => ExitCode::from(UPDATED_EXIT_CODE),
            Err(CliError::Usage(usage)) => self.report_usage(&usage),
            Err(failure) => {
                error!(target: CLI_TARGET, error = %failure, "command failed");
                let _ = writeln!(self.stderr, "service error: {failure}");
                ExitCode::FAILURE
            }
        }
    }

    fn report_usage(&mut self, usage: &clap::Error) -> ExitCode {
        match usage.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                let _ = write!(self.stdout, "{usage}");
                ExitCode::SUCCESS
            }
            _ => {
                let _ = write!(self.stderr, "{usage}");
                ExitCode::FAILURE
            }
        }
    }

    fn dispatch(&mut self, args: &[OsString]) -> Result<Completion, CliError> {
        let split = split_config_arguments(args);
        let cli = Cli::try_parse_from(lowercase_verb(split.command_arguments))
            .map_err(CliError::Usage)?;
        let config = self.loader.load(&split.config_arguments)?;
        let identity = self.handler.identity(&config)?;
        self.handler.initialise_telemetry(&config, &identity)?;
        info!(target: CLI_TARGET, verb = %cli.verb, ?args, "process started");

        match self.handler.updater().check(&identity) {
            Ok(UpdateOutcome::UpToDate) => {}
            Ok(UpdateOutcome::Updated { version }) => {
                info!(
                    target: CLI_TARGET,
                    current = identity.version(),
                    latest = %version,
                    "successfully updated; exiting"
                );
                writeln!(self.stdout, "updated to version {version}").map_err(CliError::Output)?;
                return Ok(Completion::Updated);
            }
            Err(failure) => {
                warn!(target: CLI_TARGET, error = %failure, "binary update failed");
            }
        }

        self.execute(cli.verb, &config, identity)?;
        Ok(Completion::Done)
    }

    fn execute(
        &mut self,
        verb: Verb,
        config: &Config,
        identity: ServiceIdentity,
    ) -> Result<(), CliError> {
        let settings = ControllerSettings::from_config(config);
        match &verb {
            Verb::Version => {
                return writeln!(
                    self.stdout,
                    "service: {}\nversion: {}",
                    identity.name(),
                    identity.version()
                )
                .map_err(CliError::Output);
            }
            Verb::Debug => return self.handler.run_service(identity, settings, RunMode::Debug),
            Verb::Is { launch } => {
                info!(target: CLI_TARGET, launch = %launch.join(" "), "launched by the service manager");
                return self.handler.run_service(identity, settings, RunMode::Service);
            }
            Verb::Install => {
                let registry = self.handler.registry()?;
                manager::install(registry.as_ref(), &InstallPlan::new(&identity, config))?;
            }
            Verb::Remove => manager::remove(self.handler.registry()?.as_ref(), identity.name())?,
            Verb::Start => manager::start(self.handler.registry()?.as_ref(), identity.name())?,
            Verb::Stop => self.control(config, &identity, ServiceCommand::Stop)?,
            Verb::Pause => self.control(config, &identity, ServiceCommand::Pause)?,
            Verb::Continue => self.control(config, &identity, ServiceCommand::Continue)?,
        }
        writeln!(self.stdout, "command `{verb}` success").map_err(CliError::Output)
    }

    fn control(
        &self,
        config: &Config,
        identity: &ServiceIdentity,
        command: ServiceCommand,
    ) -> Result<(), CliError> {
        let registry = self.handler.registry()?;
        manager::control(
            registry.as_ref(),
            identity.name(),
            command,
            ControlWait::from_config(config),
        )?;
        Ok(())
    }
}

fn lowercase_verb(mut arguments: Vec<OsString>) -> Vec<OsString> {
    if let Some(verb) = arguments.get_mut(1) {
        *verb = OsString::from(verb.to_string_lossy().to_lowercase());
    }
    arguments
}

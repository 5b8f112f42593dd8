//! Command-line verbs.

use std::fmt;

use clap::{Parser, Subcommand};

/// Command-line interface for the tick service.
#[derive(Parser, Debug)]
#[command(name = "tickd", disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// Verb to run.
    #[command(subcommand)]
    pub(crate) verb: Verb,
}

/// Verbs accepted by the binary.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum Verb {
    /// Registers the service with the service manager.
    Install,
    /// Removes the service registration.
    Remove,
    /// Starts the installed service.
    Start,
    /// Stops the running service.
    Stop,
    /// Pauses the running service.
    Pause,
    /// Resumes the paused service.
    Continue,
    /// Runs the service in this console until stopped.
    Debug,
    /// Prints the service name and version.
    Version,
    /// Entry point used by the service manager.
    #[command(hide = true)]
    Is {
        /// Launch reason recorded at install or start time, such as
        /// `auto-started`.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        launch: Vec<String>,
    },
}

impl Verb {
    pub(crate) const fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Remove => "remove",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Pause => "pause",
            Self::Continue => "continue",
            Self::Debug => "debug",
            Self::Version => "version",
            Self::Is { .. } => "is",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

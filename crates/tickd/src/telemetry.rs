//! Structured telemetry initialisation.
//!
//! Events are written to `logs/<log_file>` beside the executable. When the
//! directory or file cannot be prepared the subscriber falls back to stderr
//! and records why once it is installed.

use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use once_cell::sync::OnceCell;
use thiserror::Error;
use tickd_config::{Config, LogFormat, LogPaths, LogPathsError};
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, writer::BoxMakeWriter};

pub(crate) const TELEMETRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::telemetry");

static TELEMETRY_GUARD: OnceCell<LogDestination> = OnceCell::new();

/// Where log events are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    /// The log file beside the executable.
    File(PathBuf),
    /// Standard error.
    Stderr,
}

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryHandle {
    destination: LogDestination,
}

impl TelemetryHandle {
    /// Destination chosen by the first initialisation.
    #[must_use]
    pub const fn destination(&self) -> &LogDestination {
        &self.destination
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to derive or create the log directory.
    #[error(transparent)]
    Paths(#[from] LogPathsError),
    /// Failed to open the log file.
    #[error("failed to open log file '{path}': {source}")]
    OpenFile {
        /// Log file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Configures the global tracing subscriber when invoked for the first time.
///
/// Repeated calls are idempotent and report the destination chosen by the
/// first call. Only an invalid filter or a second global subscriber make
/// this fail; log file problems degrade to stderr.
pub fn initialise(config: &Config, executable: &Path) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config, executable))
        .map(|destination| TelemetryHandle {
            destination: destination.clone(),
        })
}

/// Creates the log directory beside `executable` and opens the log file for
/// appending.
pub fn open_log_file(config: &Config, executable: &Path) -> Result<(PathBuf, File), TelemetryError> {
    let paths = LogPaths::beside(executable, config)?;
    paths.prepare()?;
    let path = paths.log_file().to_path_buf();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| TelemetryError::OpenFile {
            path: path.clone(),
            source,
        })?;
    Ok((path, file))
}

fn install_subscriber(config: &Config, executable: &Path) -> Result<LogDestination, TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let (destination, writer, ansi, fallback) = match open_log_file(config, executable) {
        Ok((path, file)) => (
            LogDestination::File(path),
            BoxMakeWriter::new(Mutex::new(file)),
            false,
            None,
        ),
        Err(error) => (
            LogDestination::Stderr,
            BoxMakeWriter::new(io::stderr),
            io::stderr().is_terminal(),
            Some(error),
        ),
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(true)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)?;
    if let Some(error) = fallback {
        tracing::warn!(
            target: TELEMETRY_TARGET,
            error = %error,
            "log file unavailable; logging to stderr"
        );
    }
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    #[rstest]
    fn log_file_is_created_beside_the_executable() {
        let dir = TempDir::new().expect("temp dir");
        let executable = dir.path().join("tickd.exe");

        let (path, _file) =
            open_log_file(&Config::default(), &executable).expect("log file should open");

        assert_eq!(path, dir.path().join("logs").join("tickd.log"));
        assert!(path.is_file());
    }

    #[rstest]
    fn blocked_log_directory_is_reported() {
        let dir = TempDir::new().expect("temp dir");
        fs::write(dir.path().join("logs"), b"not a directory").expect("write blocker");
        let executable = dir.path().join("tickd.exe");

        let error = open_log_file(&Config::default(), &executable)
            .expect_err("a file named logs must block the directory");
        assert!(matches!(
            error,
            TelemetryError::Paths(LogPathsError::Directory { .. })
        ));
    }

    #[rstest]
    fn invalid_filter_is_rejected_before_installation() {
        let config = Config {
            log_filter: String::from("tickd=notalevel"),
            ..Config::default()
        };
        let error = install_subscriber(&config, Path::new("/nonexistent/tickd"))
            .expect_err("filter must be rejected");
        assert!(matches!(error, TelemetryError::Filter(_)));
    }
}

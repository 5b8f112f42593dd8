//! Append-only event log sinks for service lifecycle messages.
//!
//! The controller and host adapter write human-readable lifecycle messages
//! (start, stop reasons, unexpected control requests) to an [`EventLog`]. In
//! debug mode the sink is the console; when running under the service
//! manager it is the Windows Event Log. Sinks are opened once per run, shared
//! by `Arc`, and closed when the last reference drops.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::warn;

#[cfg(windows)]
mod windows;

#[cfg(windows)]
pub use windows::WindowsEventLog;
#[cfg(windows)]
pub(crate) use windows::{install_event_source, remove_event_source};

pub(crate) const EVENTLOG_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::eventlog");

/// Event identifier used for host lifecycle messages.
pub const HOST_EVENT_ID: u32 = 0;

/// Event identifier used for controller messages.
pub const CONTROL_EVENT_ID: u32 = 1;

/// Severity of an event log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    /// Informational entry.
    Info,
    /// Warning entry.
    Warning,
    /// Error entry.
    Error,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => formatter.write_str("info"),
            Self::Warning => formatter.write_str("warning"),
            Self::Error => formatter.write_str("error"),
        }
    }
}

/// Errors raised by event log sinks.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// Opening the sink failed.
    #[error("failed to open event log for source '{source_name}': {source}")]
    Open {
        /// Event source name.
        source_name: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Writing an entry failed.
    #[error("failed to write event log entry: {source}")]
    Write {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Destination for lifecycle messages.
pub trait EventLog: Send + Sync {
    /// Appends one entry.
    fn write(&self, level: EventLevel, event_id: u32, message: &str) -> Result<(), EventLogError>;

    /// Appends an informational entry.
    fn info(&self, event_id: u32, message: &str) -> Result<(), EventLogError> {
        self.write(EventLevel::Info, event_id, message)
    }

    /// Appends a warning entry.
    fn warning(&self, event_id: u32, message: &str) -> Result<(), EventLogError> {
        self.write(EventLevel::Warning, event_id, message)
    }

    /// Appends an error entry.
    fn error(&self, event_id: u32, message: &str) -> Result<(), EventLogError> {
        self.write(EventLevel::Error, event_id, message)
    }
}

impl<T> EventLog for Arc<T>
where
    T: EventLog + ?Sized,
{
    fn write(&self, level: EventLevel, event_id: u32, message: &str) -> Result<(), EventLogError> {
        (**self).write(level, event_id, message)
    }
}

/// Writes an entry, reporting failures through `tracing` instead of
/// propagating them.
pub(crate) fn emit(log: &dyn EventLog, level: EventLevel, event_id: u32, message: &str) {
    if let Err(error) = log.write(level, event_id, message) {
        warn!(
            target: EVENTLOG_TARGET,
            %level,
            event_id,
            entry = message,
            error = %error,
            "event log write failed"
        );
    }
}

/// Console-backed sink used by debug runs.
pub struct ConsoleEventLog {
    source: String,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl fmt::Debug for ConsoleEventLog {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ConsoleEventLog")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl ConsoleEventLog {
    /// Builds a sink writing to standard error.
    #[must_use]
    pub fn stderr(source: impl Into<String>) -> Self {
        Self::with_writer(source, Box::new(io::stderr()))
    }

    /// Builds a sink writing to `writer`.
    #[must_use]
    pub fn with_writer(source: impl Into<String>, writer: Box<dyn Write + Send>) -> Self {
        Self {
            source: source.into(),
            writer: Mutex::new(writer),
        }
    }
}

impl EventLog for ConsoleEventLog {
    fn write(&self, level: EventLevel, event_id: u32, message: &str) -> Result<(), EventLogError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{} {level} {event_id}: {message}", self.source)
            .and_then(|()| writer.flush())
            .map_err(|source| EventLogError::Write { source })
    }
}

/// Opens the event log for a service run.
///
/// Service runs use the Windows Event Log. When it cannot be opened the
/// failure is logged and the console sink is used instead, so the run can
/// still proceed.
#[must_use]
pub fn open(source: &str, console: bool) -> Arc<dyn EventLog> {
    if console {
        return Arc::new(ConsoleEventLog::stderr(source));
    }
    open_system(source)
}

#[cfg(windows)]
fn open_system(source: &str) -> Arc<dyn EventLog> {
    match WindowsEventLog::open(source) {
        Ok(log) => Arc::new(log),
        Err(error) => {
            tracing::error!(
                target: EVENTLOG_TARGET,
                error = %error,
                "open eventlog"
            );
            Arc::new(ConsoleEventLog::stderr(source))
        }
    }
}

#[cfg(not(windows))]
fn open_system(source: &str) -> Arc<dyn EventLog> {
    warn!(
        target: EVENTLOG_TARGET,
        source,
        "system event log unavailable on this platform; using console"
    );
    Arc::new(ConsoleEventLog::stderr(source))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::tests::support::{BrokenWriter, SharedBuffer};

    #[rstest]
    fn console_sink_prefixes_source_level_and_id() {
        let buffer = SharedBuffer::default();
        let log = ConsoleEventLog::with_writer("tickd", Box::new(buffer.clone()));

        log.info(HOST_EVENT_ID, "starting tickd service")
            .expect("write should succeed");
        log.error(CONTROL_EVENT_ID, "unexpected control request: #200")
            .expect("write should succeed");

        assert_eq!(
            buffer.contents(),
            "tickd info 0: starting tickd service\ntickd error 1: unexpected control request: #200\n"
        );
    }

    #[rstest]
    fn emit_swallows_write_failures() {
        let log = ConsoleEventLog::with_writer("tickd", Box::new(BrokenWriter));
        assert!(log.warning(HOST_EVENT_ID, "lost").is_err());
        emit(&log, EventLevel::Warning, HOST_EVENT_ID, "lost");
    }
}

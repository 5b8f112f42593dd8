//! Tick observations and the sinks that record them.

use std::sync::Arc;
use std::time::SystemTime;

use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::WORKER_TARGET;

/// One periodic observation emitted by a running worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    /// Generation of the worker that emitted the tick.
    pub generation: u64,
    /// Wall-clock time the tick fired.
    pub timestamp: SystemTime,
    /// Version tag of the emitting binary.
    pub version: Arc<str>,
}

impl Tick {
    /// Formats the timestamp as RFC 3339 in UTC.
    pub fn formatted_timestamp(&self) -> Result<String, TickSinkError> {
        Ok(OffsetDateTime::from(self.timestamp).format(&Rfc3339)?)
    }
}

/// Errors a sink may report while recording a tick.
///
/// The worker never propagates these: they are reported as warnings and the
/// loop carries on.
#[derive(Debug, Error)]
pub enum TickSinkError {
    /// The timestamp could not be formatted.
    #[error("failed to format tick timestamp: {0}")]
    Format(#[from] time::error::Format),
    /// The sink refused the observation.
    #[error("tick sink unavailable: {message}")]
    Unavailable {
        /// Human readable reason.
        message: String,
    },
}

/// Destination for tick observations.
pub trait TickSink: Send + Sync {
    /// Records one tick.
    fn record(&self, tick: &Tick) -> Result<(), TickSinkError>;
}

impl<T> TickSink for Arc<T>
where
    T: TickSink + ?Sized,
{
    fn record(&self, tick: &Tick) -> Result<(), TickSinkError> {
        (**self).record(tick)
    }
}

/// Default sink that records ticks using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredTickSink;

impl TickSink for StructuredTickSink {
    fn record(&self, tick: &Tick) -> Result<(), TickSinkError> {
        let datetime = tick.formatted_timestamp()?;
        tracing::info!(
            target: WORKER_TARGET,
            event = "tick",
            generation = tick.generation,
            version = %tick.version,
            datetime = %datetime,
            "tick"
        );
        Ok(())
    }
}

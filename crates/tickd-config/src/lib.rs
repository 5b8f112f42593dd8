//! Shared configuration for the `tickd` service binary.
//!
//! Configuration is layered by [`ortho_config`]: built-in defaults, then
//! configuration files, then `TICKD_*` environment variables, then command
//! line flags. The service control manager launches the registered binary
//! with no configuration flags, so defaults and the environment carry the
//! production values while flags exist for `debug` runs and administration.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

mod defaults;
mod logging;
mod paths;

pub use defaults::{
    DEFAULT_CONTROL_TIMEOUT_SECS, DEFAULT_INTERROGATE_DELAY_SECS, DEFAULT_LOG_FILE,
    DEFAULT_LOG_FILTER, DEFAULT_RESTART_DELAY_SECS, DEFAULT_SERVICE_DESCRIPTION,
    DEFAULT_SERVICE_NAME, DEFAULT_TICK_INTERVAL_MS, default_log_file_string,
    default_log_filter_string, default_log_format, default_service_description_string,
    default_service_name_string,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use paths::{LOG_DIRECTORY_NAME, LogPaths, LogPathsError};

/// Resolved configuration for a single `tickd` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "TICKD")]
pub struct Config {
    /// Name the service is registered under with the service manager.
    #[ortho_config(default = default_service_name_string())]
    pub service_name: String,
    /// Display name shown by the service manager.
    #[ortho_config(default = default_service_description_string())]
    pub service_description: String,
    /// `tracing` filter expression applied to the log file.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for the log file.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// File name written inside the `logs` directory beside the executable.
    #[ortho_config(default = default_log_file_string())]
    pub log_file: String,
    /// Interval between worker ticks, in milliseconds.
    #[ortho_config(default = DEFAULT_TICK_INTERVAL_MS)]
    pub tick_interval_ms: u64,
    /// Delay before the second status echo of an interrogate request.
    #[ortho_config(default = DEFAULT_INTERROGATE_DELAY_SECS)]
    pub interrogate_delay_secs: u64,
    /// Delay the service manager waits before restarting a crashed process.
    #[ortho_config(default = DEFAULT_RESTART_DELAY_SECS)]
    pub restart_delay_secs: u64,
    /// Budget for a control command to reach its target state.
    #[ortho_config(default = DEFAULT_CONTROL_TIMEOUT_SECS)]
    pub control_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: default_service_name_string(),
            service_description: default_service_description_string(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            log_file: default_log_file_string(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            interrogate_delay_secs: DEFAULT_INTERROGATE_DELAY_SECS,
            restart_delay_secs: DEFAULT_RESTART_DELAY_SECS,
            control_timeout_secs: DEFAULT_CONTROL_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Service name used for registration and the event log source.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Display description registered with the service manager.
    #[must_use]
    pub fn service_description(&self) -> &str {
        &self.service_description
    }

    /// Filter expression for the `tracing` subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Selected log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Log file name inside the `logs` directory.
    #[must_use]
    pub fn log_file(&self) -> &str {
        &self.log_file
    }

    /// Worker tick interval. Zero is clamped to one millisecond so the
    /// worker never spins.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Delay between the two status echoes of an interrogate request.
    #[must_use]
    pub const fn interrogate_delay(&self) -> Duration {
        Duration::from_secs(self.interrogate_delay_secs)
    }

    /// Restart delay configured as the recovery action at install time.
    #[must_use]
    pub const fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }

    /// Time allowed for `stop`, `pause`, and `continue` to settle.
    #[must_use]
    pub const fn control_timeout(&self) -> Duration {
        Duration::from_secs(self.control_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::*;

    #[rstest]
    fn defaults_match_reference_deployment() {
        let config = Config::default();
        assert_eq!(config.service_name(), "tickd");
        assert_eq!(config.tick_interval(), Duration::from_secs(3));
        assert_eq!(config.interrogate_delay(), Duration::from_secs(100));
        assert_eq!(config.restart_delay(), Duration::from_secs(1));
        assert_eq!(config.control_timeout(), Duration::from_secs(10));
        assert_eq!(config.log_format(), LogFormat::Json);
    }

    #[rstest]
    fn zero_tick_interval_is_clamped() {
        let config = Config {
            tick_interval_ms: 0,
            ..Config::default()
        };
        assert_eq!(config.tick_interval(), Duration::from_millis(1));
    }
}

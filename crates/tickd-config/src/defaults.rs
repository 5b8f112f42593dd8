/// Default service registration name.
pub const DEFAULT_SERVICE_NAME: &str = "tickd";

/// Default display description shown by the service manager.
pub const DEFAULT_SERVICE_DESCRIPTION: &str = "Periodic tick service";

/// Default log filter expression used by the binary.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log file name inside the `logs` directory.
pub const DEFAULT_LOG_FILE: &str = "tickd.log";

/// Default interval between worker ticks.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 3_000;

/// Default delay between the two interrogate status echoes.
pub const DEFAULT_INTERROGATE_DELAY_SECS: u64 = 100;

/// Default restart-on-failure delay registered at install time.
pub const DEFAULT_RESTART_DELAY_SECS: u64 = 1;

/// Default budget for control commands to reach their target state.
pub const DEFAULT_CONTROL_TIMEOUT_SECS: u64 = 10;

/// Owned service name used where allocation is required.
#[must_use]
pub fn default_service_name_string() -> String {
    DEFAULT_SERVICE_NAME.to_owned()
}

/// Owned service description used where allocation is required.
#[must_use]
pub fn default_service_description_string() -> String {
    DEFAULT_SERVICE_DESCRIPTION.to_owned()
}

/// Owned log filter value used where allocation is required.
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Owned log file name used where allocation is required.
#[must_use]
pub fn default_log_file_string() -> String {
    DEFAULT_LOG_FILE.to_owned()
}

/// Default logging format for the binary.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

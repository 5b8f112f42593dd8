//! Output format of the service log file.
//!
//! The format is chosen with `--log-format`, `TICKD_LOG_FORMAT`, or the
//! `log_format` key of a configuration file. Parsing ignores case, so the
//! value can be written the same way on every layer.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Line format written to the log file beside the executable.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event with the fields flattened to the top level.
    #[default]
    Json,
    /// Terse single-line text for reading the file by hand.
    Compact,
}

/// Error returned when a log format name is not recognised.
pub type LogFormatParseError = strum::ParseError;

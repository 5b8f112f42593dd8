//! Derives the log directory and log file paths used by the binary.
//!
//! Logs live in a `logs` directory beside the executable so an installed
//! service writes next to its own binary regardless of the working directory
//! the service manager launches it from.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::Config;

/// Directory name created beside the executable.
pub const LOG_DIRECTORY_NAME: &str = "logs";

/// Canonical paths for log artefacts written by the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPaths {
    log_dir: PathBuf,
    log_file: PathBuf,
}

impl LogPaths {
    /// Derives log paths for `executable` without touching the filesystem.
    pub fn beside(executable: &Path, config: &Config) -> Result<Self, LogPathsError> {
        let parent = executable
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .ok_or_else(|| LogPathsError::MissingParent {
                path: executable.to_path_buf(),
            })?;
        let log_dir = parent.join(LOG_DIRECTORY_NAME);
        Ok(Self {
            log_file: log_dir.join(config.log_file()),
            log_dir,
        })
    }

    /// Creates the log directory if it does not already exist.
    pub fn prepare(&self) -> Result<(), LogPathsError> {
        fs::create_dir_all(&self.log_dir).map_err(|source| LogPathsError::Directory {
            path: self.log_dir.clone(),
            source,
        })
    }

    /// Directory holding log files.
    #[must_use]
    pub fn log_dir(&self) -> &Path {
        self.log_dir.as_path()
    }

    /// Path to the log file.
    #[must_use]
    pub fn log_file(&self) -> &Path {
        self.log_file.as_path()
    }
}

/// Errors raised while deriving or preparing log paths.
#[derive(Debug, Error)]
pub enum LogPathsError {
    /// The executable path had no parent directory.
    #[error("executable path '{path}' has no parent directory")]
    MissingParent {
        /// Executable path that was supplied.
        path: PathBuf,
    },
    /// Creating the log directory failed.
    #[error("failed to create log directory '{path}': {source}")]
    Directory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    #[rstest]
    fn derives_logs_directory_beside_executable() {
        let dir = TempDir::new().expect("temp dir");
        let executable = dir.path().join("tickd.exe");
        let paths = LogPaths::beside(&executable, &Config::default()).expect("paths derive");
        assert_eq!(paths.log_dir(), dir.path().join("logs"));
        assert!(paths.log_file().ends_with("logs/tickd.log"));
        assert!(!paths.log_dir().exists(), "derivation must not create dirs");

        paths.prepare().expect("prepare should create the directory");
        assert!(paths.log_dir().is_dir());
        paths.prepare().expect("prepare should be idempotent");
    }

    #[rstest]
    fn rejects_bare_executable_name() {
        let error = LogPaths::beside(Path::new("tickd"), &Config::default())
            .expect_err("bare names have no parent");
        assert!(matches!(error, LogPathsError::MissingParent { .. }));
    }

    #[rstest]
    fn reports_unwritable_log_directory() {
        let dir = TempDir::new().expect("temp dir");
        let blocker = dir.path().join("bin");
        std::fs::write(&blocker, b"not a directory").expect("write blocker");
        let paths = LogPaths::beside(&blocker.join("tickd"), &Config::default())
            .expect("paths derive");
        let error = paths.prepare().expect_err("file in the way should fail");
        assert!(matches!(error, LogPathsError::Directory { .. }));
    }
}

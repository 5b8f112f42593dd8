//! Self-update boundary consulted before any verb runs.
//!
//! Fetching and verifying release packages is not part of this binary; the
//! shipped [`PinnedRelease`] always reports that the running build is current.

use thiserror::Error;
use tracing::info;

use crate::identity::ServiceIdentity;

const UPDATE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::update");

/// Result of an update check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The running binary is the latest release.
    UpToDate,
    /// The binary on disk was replaced; the process must exit.
    Updated {
        /// Version now installed.
        version: String,
    },
}

/// Errors reported by an update check.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The release source could not be consulted.
    #[error("update check failed: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },
}

/// Checks for and applies a newer release of the running binary.
pub trait SelfUpdate {
    /// Checks for a newer release than `identity`'s version.
    fn check(&self, identity: &ServiceIdentity) -> Result<UpdateOutcome, UpdateError>;
}

/// Update source that treats the running build as the latest release.
#[derive(Debug, Default, Clone, Copy)]
pub struct PinnedRelease;

impl SelfUpdate for PinnedRelease {
    fn check(&self, identity: &ServiceIdentity) -> Result<UpdateOutcome, UpdateError> {
        info!(
            target: UPDATE_TARGET,
            version = identity.version(),
            "current binary is the latest version"
        );
        Ok(UpdateOutcome::UpToDate)
    }
}

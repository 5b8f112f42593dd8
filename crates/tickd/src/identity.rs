//! Immutable identity of the service process.

use std::env;
use std::io;
use std::path::{Path, PathBuf};

use tickd_config::Config;

/// Version tag reported by ticks and the `version` verb.
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name, description, executable path, and version fixed at process start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    name: String,
    description: String,
    executable: PathBuf,
    version: String,
}

impl ServiceIdentity {
    /// Builds an identity from explicit parts.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        executable: impl Into<PathBuf>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            executable: executable.into(),
            version: version.into(),
        }
    }

    /// Resolves the identity of the running executable.
    pub fn current(config: &Config) -> io::Result<Self> {
        let executable = env::current_exe()?;
        Ok(Self::new(
            config.service_name(),
            config.service_description(),
            executable,
            SERVICE_VERSION,
        ))
    }

    /// Service registration name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Absolute path of the executable registered with the service manager.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Version string of this build.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }
}

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error_handling::types::ConfigError;

pub const ENV_CONFIG: &str = "TESTUTILS_CONFIG";
pub const ENV_DOCKER_BIN: &str = "TESTUTILS_DOCKER_BIN";
pub const ENV_CONTAINER_HOST: &str = "TESTUTILS_CONTAINER_HOST";
pub const ENV_STARTUP_TIMEOUT_SECS: &str = "TESTUTILS_STARTUP_TIMEOUT_SECS";

/// When `docker run` should pull the image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullPolicy {
    #[default]
    Missing,
    Always,
    Never,
}

impl PullPolicy {
    /// Value for `docker run --pull=<value>`.
    pub fn as_arg(&self) -> &'static str {
        match self {
            PullPolicy::Missing => "missing",
            PullPolicy::Always => "always",
            PullPolicy::Never => "never",
        }
    }
}

impl fmt::Display for PullPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// Settings shared by every service container.
///
/// Every field has a default, so an empty TOML file is a valid configuration:
///
/// ```toml
/// docker_bin = "podman"
/// container_host = "127.0.0.1"
/// startup_timeout_secs = 120
/// pull_policy = "always"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Container CLI to invoke. Anything accepting docker's arguments works.
    pub docker_bin: String,
    /// Address mapped ports are published on and clients connect to.
    pub container_host: String,
    /// Upper bound for a container to become ready.
    pub startup_timeout_secs: u64,
    pub pull_policy: PullPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            docker_bin: "docker".to_string(),
            container_host: "127.0.0.1".to_string(),
            startup_timeout_secs: 60,
            pull_policy: PullPolicy::Missing,
        }
    }
}

impl Settings {
    /// Reads and validates a TOML settings file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let settings = Self::from_toml_str(&content)?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings =
            toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults, then the file named by `TESTUTILS_CONFIG` (if set), then the
    /// individual `TESTUTILS_*` overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with variables read through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = match lookup(ENV_CONFIG).filter(|p| !p.is_empty()) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(bin) = lookup(ENV_DOCKER_BIN) {
            debug!("{} overrides docker_bin with {}", ENV_DOCKER_BIN, bin);
            settings.docker_bin = bin;
        }
        if let Some(host) = lookup(ENV_CONTAINER_HOST) {
            debug!("{} overrides container_host with {}", ENV_CONTAINER_HOST, host);
            settings.container_host = host;
        }
        if let Some(secs) = lookup(ENV_STARTUP_TIMEOUT_SECS) {
            settings.startup_timeout_secs = secs.trim().parse().map_err(|_| {
                ConfigError::InvalidValue(format!(
                    "{} must be a whole number of seconds, got '{}'",
                    ENV_STARTUP_TIMEOUT_SECS, secs
                ))
            })?;
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.docker_bin.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "docker_bin must not be empty".to_string(),
            ));
        }
        if self.container_host.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "container_host must not be empty".to_string(),
            ));
        }
        if self.startup_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "startup_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

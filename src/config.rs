/*!
 * Configuration for the auth service client
 */

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Connection settings for [`crate::AuthServiceClient`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// `host:port` of the auth service, optionally with a scheme
    pub address: String,

    /// Dial timeout, also applied to every attempt of a call
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after the first attempt for transient failures
    #[serde(default = "default_retries_count")]
    pub retries_count: u32,

    /// Defer the dial until the first call
    #[serde(default)]
    pub lazy_connect: bool,
}

impl ClientConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout_ms: default_timeout_ms(),
            retries_count: default_retries_count(),
            lazy_connect: false,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::Invalid("sso.address must not be empty".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "sso.timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Log level names accepted in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevelName {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevelName {
    /// Convert to tracing Level
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevelName::Error => tracing::Level::ERROR,
            LogLevelName::Warn => tracing::Level::WARN,
            LogLevelName::Info => tracing::Level::INFO,
            LogLevelName::Debug => tracing::Level::DEBUG,
            LogLevelName::Trace => tracing::Level::TRACE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevelName,

    /// Write JSON logs to this file instead of stdout
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Force debug level
    #[serde(default)]
    pub verbose: bool,
}

/// Top-level configuration file
///
/// ```toml
/// [sso]
/// address = "localhost:44044"
/// timeout_ms = 5000
/// retries_count = 3
///
/// [logging]
/// level = "info"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub sso: ClientConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Read and validate a TOML configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.sso.validate()?;
        Ok(config)
    }
}

// Default value functions for serde
fn default_timeout_ms() -> u64 {
    5000
}

fn default_retries_count() -> u32 {
    3
}

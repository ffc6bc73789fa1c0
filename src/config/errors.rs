//! # Config Errors

use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for the expected shape
    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Semantically invalid value
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Configuration is well-formed but not acceptable
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

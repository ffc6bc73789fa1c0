//! CLI-specific error types
//!
//! Every CLI error ends the process with a non-zero exit code.

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::engine::EngineError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Mesh configuration could not be loaded or is invalid
    ConfigError,
    /// stdout or output file
    IoError,
    /// `--node` names no node in the mesh
    UnknownNode,
    /// `--where` could not be parsed
    InvalidPredicate,
    /// The engine rejected or failed the query
    QueryFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "MESH_CLI_CONFIG_ERROR",
            Self::IoError => "MESH_CLI_IO_ERROR",
            Self::UnknownNode => "MESH_CLI_UNKNOWN_NODE",
            Self::InvalidPredicate => "MESH_CLI_INVALID_PREDICATE",
            Self::QueryFailed => "MESH_CLI_QUERY_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Error with an explicit code
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Mesh file could not be loaded or validated
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    /// Reading or writing a local file failed
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    /// No node with this id in the mesh file
    pub fn unknown_node(node: &str) -> Self {
        Self::new(
            CliErrorCode::UnknownNode,
            format!("node '{}' is not part of the mesh", node),
        )
    }

    /// A `--where` predicate could not be parsed
    pub fn invalid_predicate(text: &str, reason: impl Into<String>) -> Self {
        Self::new(
            CliErrorCode::InvalidPredicate,
            format!("'{}': {}", text, reason.into()),
        )
    }

    /// Error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Stable string form of the code
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Human-readable detail
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<EngineError> for CliError {
    fn from(e: EngineError) -> Self {
        Self::new(CliErrorCode::QueryFailed, e.to_string())
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

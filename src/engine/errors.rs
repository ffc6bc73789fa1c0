//! Engine error types
//!
//! Error codes:
//! - MESH_CONFIGURATION (ERROR)
//! - MESH_SCHEMA (ERROR)
//! - MESH_ACCESS_RESTRICTED (ERROR)
//! - MESH_SOURCE_FAILED (ERROR)
//! - MESH_PEER_UNAVAILABLE (ERROR)
//! - MESH_INVALID_PREDICATE (ERROR)
//! - MESH_CURSOR_CLOSED (ERROR)
//! - MESH_RESCAN_UNSUPPORTED (ERROR)
//! - MESH_EXPLAIN_OUTPUT (ERROR)
//! - MESH_RESOURCE_EXHAUSTED (FATAL)
//!
//! A loop rejection is not an error: it yields an empty result.

use std::fmt;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::schema::SchemaError;
use crate::source::SourceError;

/// Severity levels for engine errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The invocation failed; the node is healthy
    Error,
    /// The node must shut down
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Engine error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorCode {
    Configuration,
    Schema,
    AccessRestricted,
    SourceFailed,
    PeerUnavailable,
    InvalidPredicate,
    CursorClosed,
    RescanUnsupported,
    ExplainOutput,
    ResourceExhausted,
}

impl EngineErrorCode {
    /// Stable string form of the code
    pub fn code(&self) -> &'static str {
        match self {
            EngineErrorCode::Configuration => "MESH_CONFIGURATION",
            EngineErrorCode::Schema => "MESH_SCHEMA",
            EngineErrorCode::AccessRestricted => "MESH_ACCESS_RESTRICTED",
            EngineErrorCode::SourceFailed => "MESH_SOURCE_FAILED",
            EngineErrorCode::PeerUnavailable => "MESH_PEER_UNAVAILABLE",
            EngineErrorCode::InvalidPredicate => "MESH_INVALID_PREDICATE",
            EngineErrorCode::CursorClosed => "MESH_CURSOR_CLOSED",
            EngineErrorCode::RescanUnsupported => "MESH_RESCAN_UNSUPPORTED",
            EngineErrorCode::ExplainOutput => "MESH_EXPLAIN_OUTPUT",
            EngineErrorCode::ResourceExhausted => "MESH_RESOURCE_EXHAUSTED",
        }
    }

    /// Whether the error ends the query
    pub fn severity(&self) -> Severity {
        match self {
            EngineErrorCode::ResourceExhausted => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for EngineErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Engine error with code and message
#[derive(Debug)]
pub struct EngineError {
    code: EngineErrorCode,
    message: String,
}

impl EngineError {
    /// Error with an explicit code
    pub fn new(code: EngineErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Invalid node or query setup
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::new(EngineErrorCode::Configuration, reason)
    }

    /// Refused by an access policy
    pub fn access_restricted(reason: impl Into<String>) -> Self {
        Self::new(EngineErrorCode::AccessRestricted, reason)
    }

    /// A peer could not be reached
    pub fn peer_unavailable(peer: &str, reason: impl Into<String>) -> Self {
        Self::new(
            EngineErrorCode::PeerUnavailable,
            format!("peer {}: {}", peer, reason.into()),
        )
    }

    /// A predicate or projection names an unknown column
    pub fn invalid_predicate(reason: impl Into<String>) -> Self {
        Self::new(EngineErrorCode::InvalidPredicate, reason)
    }

    /// The cursor was already closed
    pub fn cursor_closed(query_id: &str) -> Self {
        Self::new(
            EngineErrorCode::CursorClosed,
            format!("cursor for query {} is closed", query_id),
        )
    }

    /// The cursor cannot start over
    pub fn rescan_unsupported(query_id: &str) -> Self {
        Self::new(
            EngineErrorCode::RescanUnsupported,
            format!("cursor for query {} cannot be re-executed", query_id),
        )
    }

    /// Explain output could not be written
    pub fn explain_output(reason: impl Into<String>) -> Self {
        Self::new(EngineErrorCode::ExplainOutput, reason)
    }

    /// The node refuses new queries until cursors close
    pub fn resource_exhausted(reason: impl Into<String>) -> Self {
        Self::new(EngineErrorCode::ResourceExhausted, reason)
    }

    /// Error code
    pub fn code(&self) -> EngineErrorCode {
        self.code
    }

    /// Severity of the code
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Human-readable detail
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the query cannot continue
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )
    }
}

impl std::error::Error for EngineError {}

impl From<SchemaError> for EngineError {
    fn from(e: SchemaError) -> Self {
        Self::new(EngineErrorCode::Schema, e.to_string())
    }
}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        Self::configuration(e.to_string())
    }
}

impl From<SourceError> for EngineError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Schema(schema) => schema.into(),
            other => Self::new(EngineErrorCode::SourceFailed, other.to_string()),
        }
    }
}

impl From<CacheError> for EngineError {
    fn from(e: CacheError) -> Self {
        Self::new(EngineErrorCode::SourceFailed, e.to_string())
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_format() {
        let err = EngineError::access_restricted("node X not allowed");
        assert_eq!(
            err.to_string(),
            "[ERROR] MESH_ACCESS_RESTRICTED: node X not allowed"
        );
    }

    #[test]
    fn test_only_resource_exhaustion_is_fatal() {
        assert!(EngineError::resource_exhausted("out of memory").is_fatal());
        assert!(!EngineError::configuration("bad").is_fatal());
    }

    #[test]
    fn test_schema_error_conversion() {
        let err: EngineError = SchemaError::undefined_logical_table("LT9").into();
        assert_eq!(err.code(), EngineErrorCode::Schema);
        assert!(err.message().contains("LT9"));
    }

    #[test]
    fn test_source_schema_error_keeps_schema_code() {
        let err: EngineError = SourceError::Schema(SchemaError::undefined_logical_table("X")).into();
        assert_eq!(err.code(), EngineErrorCode::Schema);
        let err: EngineError = SourceError::unavailable("S", "down").into();
        assert_eq!(err.code(), EngineErrorCode::SourceFailed);
    }
}

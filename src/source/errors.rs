//! Source error types

use thiserror::Error;

use crate::cache::CacheError;
use crate::schema::SchemaError;

/// Result type for leaf adapters
pub type SourceResult<T> = Result<T, SourceError>;

/// Failure reading a leaf source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source {source_id} unavailable: {reason}")]
    Unavailable { source_id: String, reason: String },

    #[error("source {source_id} has no instance {instance}")]
    UnknownInstance { source_id: String, instance: String },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl SourceError {
    /// The source could not be read
    pub fn unavailable(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        SourceError::Unavailable {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }
}

//! Cache error types
//!
//! Cache errors never fail a query: callers disable caching for the
//! invocation and fall back to the uncached path. The codes exist so the
//! error map can count failures by kind.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Failure in a cache store or cache table
#[derive(Debug, Error)]
pub enum CacheError {
    // ==================
    // Store errors
    // ==================
    #[error("cache I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt cache record in table {table} at offset {offset}")]
    Corrupt { table: String, offset: u64 },

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ==================
    // Table errors
    // ==================
    #[error("cache table {0} does not exist")]
    TableNotFound(String),

    #[error("duplicate key in cache table {table}")]
    DuplicateKey { table: String },

    #[error("row width {actual} does not match cache table {table} width {expected}")]
    WidthMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },
}

impl CacheError {
    /// I/O failure on `path`
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable code used as the error map key
    pub fn code(&self) -> &'static str {
        match self {
            CacheError::Io { .. } => "MESH_CACHE_IO",
            CacheError::Corrupt { .. } => "MESH_CACHE_CORRUPT",
            CacheError::Serialization(_) => "MESH_CACHE_SERIALIZATION",
            CacheError::TableNotFound(_) => "MESH_CACHE_TABLE_NOT_FOUND",
            CacheError::DuplicateKey { .. } => "MESH_CACHE_DUPLICATE_KEY",
            CacheError::WidthMismatch { .. } => "MESH_CACHE_WIDTH_MISMATCH",
        }
    }

    /// Duplicate keys are expected when several writers race to populate
    pub fn is_benign(&self) -> bool {
        matches!(self, CacheError::DuplicateKey { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            CacheError::io("/x", io::Error::new(io::ErrorKind::Other, "x")),
            CacheError::Corrupt {
                table: "T".into(),
                offset: 0,
            },
            CacheError::TableNotFound("T".into()),
            CacheError::DuplicateKey { table: "T".into() },
            CacheError::WidthMismatch {
                table: "T".into(),
                expected: 1,
                actual: 2,
            },
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_only_duplicates_are_benign() {
        assert!(CacheError::DuplicateKey { table: "T".into() }.is_benign());
        assert!(!CacheError::TableNotFound("T".into()).is_benign());
    }
}

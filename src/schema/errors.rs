//! Schema error types
//!
//! Error codes:
//! - MESH_UNDEFINED_LOGICAL_TABLE (ERROR)
//! - MESH_INVALID_TABLE_DEFINITION (ERROR)
//! - MESH_UNKNOWN_COLUMN (ERROR)

use std::fmt;

/// Schema-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorCode {
    /// No local definition and nothing propagated to fall back on
    UndefinedLogicalTable,
    /// Definition text could not be parsed
    InvalidTableDefinition,
    /// A column name was referenced that the schema does not carry
    UnknownColumn,
}

impl SchemaErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaErrorCode::UndefinedLogicalTable => "MESH_UNDEFINED_LOGICAL_TABLE",
            SchemaErrorCode::InvalidTableDefinition => "MESH_INVALID_TABLE_DEFINITION",
            SchemaErrorCode::UnknownColumn => "MESH_UNKNOWN_COLUMN",
        }
    }
}

impl fmt::Display for SchemaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Schema error with context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    code: SchemaErrorCode,
    message: String,
}

impl SchemaError {
    /// Logical table has no definition on this node
    pub fn undefined_logical_table(table: &str) -> Self {
        Self {
            code: SchemaErrorCode::UndefinedLogicalTable,
            message: format!("Undefined logical table: {}", table),
        }
    }

    /// Definition text is malformed
    pub fn invalid_definition(definition: &str, reason: impl Into<String>) -> Self {
        Self {
            code: SchemaErrorCode::InvalidTableDefinition,
            message: format!("Invalid table definition '{}': {}", definition, reason.into()),
        }
    }

    /// Column not present in schema
    pub fn unknown_column(column: &str) -> Self {
        Self {
            code: SchemaErrorCode::UnknownColumn,
            message: format!("Unknown column: {}", column),
        }
    }

    /// Error code
    pub fn code(&self) -> SchemaErrorCode {
        self.code
    }

    /// Human-readable detail
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for SchemaError {}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            SchemaErrorCode::UndefinedLogicalTable.code(),
            "MESH_UNDEFINED_LOGICAL_TABLE"
        );
        assert_eq!(
            SchemaErrorCode::InvalidTableDefinition.code(),
            "MESH_INVALID_TABLE_DEFINITION"
        );
    }

    #[test]
    fn test_error_display() {
        let err = SchemaError::undefined_logical_table("LT0");
        let display = format!("{}", err);
        assert!(display.contains("MESH_UNDEFINED_LOGICAL_TABLE"));
        assert!(display.contains("LT0"));
    }
}

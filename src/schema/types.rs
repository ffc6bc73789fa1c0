//! Logical table schema types
//!
//! A `LogicalSchema` is an immutable snapshot of the columns exposed for one
//! invocation against a logical table. Layout, left to right:
//!
//! ```text
//! +--------------------+-----------------------+-------------------+---------------------+
//! | physical columns   | null-valued columns   | provenance (2)    | explain (5)         |
//! | (local definition) | (propagated-only)     | GDB_NODE,GDB_LEAF | GDBX_* columns      |
//! +--------------------+-----------------------+-------------------+---------------------+
//! ```
//!
//! Provenance and explain columns are only present when the invocation
//! requests them. Explain columns force provenance columns on.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A single row of cell values, positionally aligned with a schema.
pub type Row = Vec<Value>;

/// Provenance column: node that executed the source
pub const GDB_NODE: &str = "GDB_NODE";
/// Provenance column: description of the leaf source
pub const GDB_LEAF: &str = "GDB_LEAF";

/// Explain column: node that forwarded the query
pub const GDBX_FROM_NODE: &str = "GDBX_FROM_NODE";
/// Explain column: node that received it
pub const GDBX_TO_NODE: &str = "GDBX_TO_NODE";
/// Explain column: hop count at the receiving node
pub const GDBX_DEPTH: &str = "GDBX_DEPTH";
/// Explain column: path precedence (F, S or L)
pub const GDBX_PRECEDENCE: &str = "GDBX_PRECEDENCE";
/// Explain column: local row count at the receiving node
pub const GDBX_COUNT: &str = "GDBX_COUNT";

/// Supported column types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ColumnType {
    Smallint,
    Integer,
    Bigint,
    Real,
    Double,
    /// Fixed-point number
    Decimal { precision: u8, scale: u8 },
    /// Fixed-width string
    Char { width: u32 },
    /// Variable-width string
    Varchar { width: u32 },
    Boolean,
    Date,
    Timestamp,
}

impl ColumnType {
    /// Returns the type name for messages
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnType::Smallint => "SMALLINT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Bigint => "BIGINT",
            ColumnType::Real => "REAL",
            ColumnType::Double => "DOUBLE",
            ColumnType::Decimal { .. } => "DECIMAL",
            ColumnType::Char { .. } => "CHAR",
            ColumnType::Varchar { .. } => "VARCHAR",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date => "DATE",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }

    /// True for numeric types, whose cells compare numerically
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::Smallint
                | ColumnType::Integer
                | ColumnType::Bigint
                | ColumnType::Real
                | ColumnType::Double
                | ColumnType::Decimal { .. }
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Decimal { precision, scale } => {
                write!(f, "DECIMAL({},{})", precision, scale)
            }
            ColumnType::Char { width } => write!(f, "CHAR({})", width),
            ColumnType::Varchar { width } => write!(f, "VARCHAR({})", width),
            other => write!(f, "{}", other.type_name()),
        }
    }
}

/// Column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(flatten)]
    pub column_type: ColumnType,
    /// Provenance and explain columns are hidden
    #[serde(default)]
    pub hidden: bool,
}

impl ColumnDef {
    /// Visible column
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into().to_uppercase(),
            column_type,
            hidden: false,
        }
    }

    fn hidden(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            hidden: true,
        }
    }

    /// Exact match on name and type, including width/precision/scale
    pub fn matches(&self, other: &ColumnDef) -> bool {
        self.name.eq_ignore_ascii_case(&other.name) && self.column_type == other.column_type
    }
}

impl fmt::Display for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.column_type)
    }
}

/// Provenance column definitions, in exposed order
pub fn provenance_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::hidden(GDB_NODE, ColumnType::Varchar { width: 20 }),
        ColumnDef::hidden(GDB_LEAF, ColumnType::Varchar { width: 50 }),
    ]
}

/// Explain column definitions, in exposed order
pub fn explain_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::hidden(GDBX_FROM_NODE, ColumnType::Varchar { width: 20 }),
        ColumnDef::hidden(GDBX_TO_NODE, ColumnType::Varchar { width: 20 }),
        ColumnDef::hidden(GDBX_DEPTH, ColumnType::Integer),
        ColumnDef::hidden(GDBX_PRECEDENCE, ColumnType::Char { width: 1 }),
        ColumnDef::hidden(GDBX_COUNT, ColumnType::Bigint),
    ]
}

/// Per-invocation options that shape the exposed column layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemaOptions {
    pub with_provenance: bool,
    pub explain: bool,
}

impl SchemaOptions {
    /// Which hidden column groups to expose
    pub fn new(with_provenance: bool, explain: bool) -> Self {
        Self {
            with_provenance: with_provenance || explain,
            explain,
        }
    }
}

/// Immutable column layout for one invocation against a logical table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalSchema {
    table: String,
    columns: Vec<ColumnDef>,
    physical_count: usize,
    data_count: usize,
    options: SchemaOptions,
}

impl LogicalSchema {
    /// Create a schema whose columns are all physical
    pub fn new(table: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        let count = columns.len();
        Self {
            table: table.into().to_uppercase(),
            columns,
            physical_count: count,
            data_count: count,
            options: SchemaOptions::default(),
        }
    }

    /// Append propagated-only columns that carry NULL for this invocation.
    ///
    /// Must be called before `with_options`.
    pub fn with_null_columns(&self, extra: Vec<ColumnDef>) -> Self {
        let mut columns = self.data_columns().to_vec();
        columns.extend(extra);
        let data_count = columns.len();
        Self {
            table: self.table.clone(),
            columns,
            physical_count: self.physical_count,
            data_count,
            options: SchemaOptions::default(),
        }
    }

    /// Recompute the exposed layout for the given options
    pub fn with_options(&self, options: SchemaOptions) -> Self {
        let options = SchemaOptions::new(options.with_provenance, options.explain);
        let mut columns = self.data_columns().to_vec();
        if options.with_provenance {
            columns.extend(provenance_columns());
        }
        if options.explain {
            columns.extend(explain_columns());
        }
        Self {
            table: self.table.clone(),
            columns,
            physical_count: self.physical_count,
            data_count: self.data_count,
            options,
        }
    }

    /// Logical table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Exposed columns, data columns first
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Column at `index`
    pub fn column(&self, index: usize) -> Option<&ColumnDef> {
        self.columns.get(index)
    }

    /// Physical and null-valued columns, without provenance/explain
    pub fn data_columns(&self) -> &[ColumnDef] {
        &self.columns[..self.data_count]
    }

    /// Columns backed by real source data
    pub fn physical_count(&self) -> usize {
        self.physical_count
    }

    /// Physical plus propagated-only null columns
    pub fn data_count(&self) -> usize {
        self.data_count
    }

    /// Every column exposed for this invocation
    pub fn exposed_count(&self) -> usize {
        self.columns.len()
    }

    /// Hidden column groups this schema exposes
    pub fn options(&self) -> SchemaOptions {
        self.options
    }

    /// Case-insensitive column lookup
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Names of the exposed columns
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Position of `GDB_NODE`, when provenance is exposed
    pub fn provenance_offset(&self) -> Option<usize> {
        self.options.with_provenance.then_some(self.data_count)
    }

    /// Position of `GDBX_FROM_NODE`, when explain columns are exposed
    pub fn explain_offset(&self) -> Option<usize> {
        self.options.explain.then_some(self.data_count + 2)
    }

    /// Render the data columns as definition text, e.g. `A INTEGER, B VARCHAR(20)`
    pub fn definition(&self) -> String {
        self.data_columns()
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// A row of NULLs matching the exposed layout
    pub fn null_row(&self) -> Row {
        vec![Value::Null; self.exposed_count()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LogicalSchema {
        LogicalSchema::new(
            "lt0",
            vec![
                ColumnDef::new("loc", ColumnType::Varchar { width: 20 }),
                ColumnDef::new("amount", ColumnType::Integer),
            ],
        )
    }

    #[test]
    fn test_counts_without_options() {
        let schema = sample();
        assert_eq!(schema.table(), "LT0");
        assert_eq!(schema.physical_count(), 2);
        assert_eq!(schema.exposed_count(), 2);
        assert_eq!(schema.provenance_offset(), None);
    }

    #[test]
    fn test_explain_forces_provenance() {
        let schema = sample().with_options(SchemaOptions::new(false, true));
        assert!(schema.options().with_provenance);
        assert_eq!(schema.exposed_count(), 2 + 2 + 5);
        assert_eq!(schema.column_index(GDB_NODE), Some(2));
        assert_eq!(schema.column_index(GDBX_FROM_NODE), Some(4));
        assert_eq!(schema.explain_offset(), Some(4));
    }

    #[test]
    fn test_null_columns_sit_before_provenance() {
        let schema = sample()
            .with_null_columns(vec![ColumnDef::new("extra", ColumnType::Bigint)])
            .with_options(SchemaOptions::new(true, false));
        assert_eq!(schema.physical_count(), 2);
        assert_eq!(schema.data_count(), 3);
        assert_eq!(schema.column_index("EXTRA"), Some(2));
        assert_eq!(schema.provenance_offset(), Some(3));
    }

    #[test]
    fn test_definition_text() {
        assert_eq!(sample().definition(), "LOC VARCHAR(20), AMOUNT INTEGER");
    }

    #[test]
    fn test_options_recomputed_from_base() {
        let with = sample().with_options(SchemaOptions::new(true, false));
        let without = with.with_options(SchemaOptions::default());
        assert_eq!(without.exposed_count(), 2);
    }
}

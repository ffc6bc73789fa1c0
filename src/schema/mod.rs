//! Schema reconciliation subsystem
//!
//! Resolves the column layout a logical table exposes for a single
//! invocation, matching propagated definitions against local ones.
//!
//! # Design Principles
//!
//! - Schemas are immutable snapshots shared behind `Arc`
//! - Type conflicts are never resolved by casting
//! - Drift between executions is absorbed by an explicit column mapping

mod definition;
mod errors;
mod reconciler;
mod types;

pub use definition::parse_definition;
pub use errors::{SchemaError, SchemaErrorCode, SchemaResult};
pub use reconciler::{ColumnMapping, NodeRole, Reconciled, SchemaReconciler};
pub use types::{
    explain_columns, provenance_columns, ColumnDef, ColumnType, LogicalSchema, Row,
    SchemaOptions, GDBX_COUNT, GDBX_DEPTH, GDBX_FROM_NODE, GDBX_PRECEDENCE, GDBX_TO_NODE,
    GDB_LEAF, GDB_NODE,
};

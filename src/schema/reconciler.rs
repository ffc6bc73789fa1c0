//! Schema reconciliation between local and propagated definitions
//!
//! An originating node always uses its own definition. A node receiving a
//! forwarded query matches the propagated definition against its local one:
//!
//! - every column present on both sides must agree exactly on type, width,
//!   precision and scale
//! - columns only in the propagated definition are exposed as NULL
//! - local-only columns are kept
//!
//! Any type conflict (or a missing local definition) demotes the node to a
//! gateway for that logical table: it relays the query but runs no local
//! sources.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::observability::Event;

use super::definition::parse_definition;
use super::errors::{SchemaError, SchemaResult};
use super::types::{ColumnDef, LogicalSchema, Row, SchemaOptions};

/// Role this node plays for one invocation on a logical table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Local sources run against the reconciled definition
    Participant,
    /// Query is relayed only
    Gateway,
}

impl NodeRole {
    /// Name used in log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Participant => "participant",
            NodeRole::Gateway => "gateway",
        }
    }
}

/// Outcome of reconciling one invocation's schema
#[derive(Debug, Clone)]
pub struct Reconciled {
    /// Exposed layout for this invocation
    pub schema: Arc<LogicalSchema>,
    pub role: NodeRole,
    /// Version of the local definition used, if any
    pub definition_version: Option<u64>,
}

/// Positional mapping from a target layout to a source layout.
///
/// `sources[i]` is the index in the source row that feeds target column `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    sources: Vec<Option<usize>>,
}

impl ColumnMapping {
    /// Mapping of `width` columns onto themselves
    pub fn identity(width: usize) -> Self {
        Self {
            sources: (0..width).map(Some).collect(),
        }
    }

    /// Mapping from explicit source positions, None for missing columns
    pub fn from_sources(sources: Vec<Option<usize>>) -> Self {
        Self { sources }
    }

    /// Map target names onto source names, case-insensitively
    pub fn by_name(target: &[String], source: &[String]) -> Self {
        let sources = target
            .iter()
            .map(|t| source.iter().position(|s| s.eq_ignore_ascii_case(t)))
            .collect();
        Self { sources }
    }

    /// Derive the old-index to new-index mapping after a definition change
    pub fn derive(old: &LogicalSchema, new: &LogicalSchema) -> Self {
        Self::by_name(&old.column_names(), &new.column_names())
    }

    /// Source position of target column `target`
    pub fn get(&self, target: usize) -> Option<usize> {
        self.sources.get(target).copied().flatten()
    }

    /// Number of target columns
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether there are no target columns
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Whether every column maps to its own position
    pub fn is_identity(&self) -> bool {
        self.sources
            .iter()
            .enumerate()
            .all(|(i, s)| *s == Some(i))
    }

    /// Build a target row from a source row; unmapped columns are NULL
    pub fn apply(&self, source_row: &[Value]) -> Row {
        self.sources
            .iter()
            .map(|s| {
                s.and_then(|i| source_row.get(i).cloned())
                    .unwrap_or(Value::Null)
            })
            .collect()
    }

    /// Source position of each target column
    pub fn as_slice(&self) -> &[Option<usize>] {
        &self.sources
    }
}

#[derive(Debug, Clone)]
struct LocalDefinition {
    schema: Arc<LogicalSchema>,
    version: u64,
}

/// Holds local logical table definitions and reconciles them per invocation.
#[derive(Debug, Default)]
pub struct SchemaReconciler {
    definitions: RwLock<HashMap<String, LocalDefinition>>,
    versions: AtomicU64,
}

impl SchemaReconciler {
    /// Reconciler with no tables defined
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or replace a logical table from definition text
    pub fn define(&self, table: &str, definition: &str) -> SchemaResult<u64> {
        let schema = parse_definition(table, definition)?;
        Ok(self.define_schema(schema))
    }

    /// Define or replace a logical table; returns the new version
    pub fn define_schema(&self, schema: LogicalSchema) -> u64 {
        let version = self.versions.fetch_add(1, Ordering::SeqCst) + 1;
        let key = schema.table().to_uppercase();
        info!(
            target: "schema",
            event = Event::SchemaDefined.as_str(),
            table = %key,
            version,
            definition = %schema.definition(),
            "logical table defined"
        );
        self.definitions.write().insert(
            key,
            LocalDefinition {
                schema: Arc::new(schema),
                version,
            },
        );
        version
    }

    /// Forget the local definition of `table`
    pub fn remove(&self, table: &str) -> bool {
        self.definitions
            .write()
            .remove(&table.to_uppercase())
            .is_some()
    }

    /// Current local definition of `table`
    pub fn local_definition(&self, table: &str) -> Option<Arc<LogicalSchema>> {
        self.definitions
            .read()
            .get(&table.to_uppercase())
            .map(|d| d.schema.clone())
    }

    /// Version stamp of the current definition of `table`
    pub fn version(&self, table: &str) -> Option<u64> {
        self.definitions
            .read()
            .get(&table.to_uppercase())
            .map(|d| d.version)
    }

    /// Defined table names, sorted
    pub fn tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.definitions.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve the exposed schema and role for one invocation
    pub fn resolve(
        &self,
        table: &str,
        propagated: Option<&str>,
        options: SchemaOptions,
    ) -> SchemaResult<Reconciled> {
        let local = self
            .definitions
            .read()
            .get(&table.to_uppercase())
            .cloned();

        let propagated = match propagated {
            None => {
                let local = local.ok_or_else(|| SchemaError::undefined_logical_table(table))?;
                return Ok(Reconciled {
                    schema: Arc::new(local.schema.with_options(options)),
                    role: NodeRole::Participant,
                    definition_version: Some(local.version),
                });
            }
            Some(text) => parse_definition(table, text)?,
        };

        let local = match local {
            Some(local) => local,
            None => {
                info!(
                    target: "schema",
                    event = Event::GatewayRole.as_str(),
                    table,
                    "no local definition, node acting as gateway"
                );
                return Ok(gateway(propagated, options));
            }
        };

        match match_up(&local.schema, &propagated) {
            Ok(extra) => {
                debug!(
                    target: "schema",
                    table,
                    extra_columns = extra.len(),
                    "propagated definition matched local definition"
                );
                let schema = if extra.is_empty() {
                    local.schema.with_options(options)
                } else {
                    local.schema.with_null_columns(extra).with_options(options)
                };
                Ok(Reconciled {
                    schema: Arc::new(schema),
                    role: NodeRole::Participant,
                    definition_version: Some(local.version),
                })
            }
            Err((local_col, propagated_col)) => {
                warn!(
                    target: "schema",
                    event = Event::SchemaTypeMismatch.as_str(),
                    table,
                    local = %local_col,
                    propagated = %propagated_col,
                    "local and propagated definitions have non matching types, node acting as gateway"
                );
                Ok(gateway(propagated, options))
            }
        }
    }
}

fn gateway(propagated: LogicalSchema, options: SchemaOptions) -> Reconciled {
    Reconciled {
        schema: Arc::new(propagated.with_options(options)),
        role: NodeRole::Gateway,
        definition_version: None,
    }
}

/// Returns the propagated-only columns, or the first conflicting pair
fn match_up(
    local: &LogicalSchema,
    propagated: &LogicalSchema,
) -> Result<Vec<ColumnDef>, (ColumnDef, ColumnDef)> {
    let mut extra = Vec::new();
    for column in propagated.data_columns() {
        match local.column_index(&column.name) {
            Some(i) => {
                let local_col = &local.columns()[i];
                if !local_col.matches(column) {
                    return Err((local_col.clone(), column.clone()));
                }
            }
            None => extra.push(column.clone()),
        }
    }
    Ok(extra)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::GDB_NODE;
    use serde_json::json;

    fn reconciler() -> SchemaReconciler {
        let r = SchemaReconciler::new();
        r.define("LT0", "LOC VARCHAR(20), AMOUNT INTEGER").unwrap();
        r
    }

    #[test]
    fn test_origin_uses_local_definition() {
        let r = reconciler();
        let res = r.resolve("lt0", None, SchemaOptions::default()).unwrap();
        assert_eq!(res.role, NodeRole::Participant);
        assert_eq!(res.schema.exposed_count(), 2);
        assert!(res.definition_version.is_some());
    }

    #[test]
    fn test_origin_undefined_table_fails() {
        let r = reconciler();
        let err = r.resolve("NOPE", None, SchemaOptions::default()).unwrap_err();
        assert_eq!(
            err.code(),
            crate::schema::SchemaErrorCode::UndefinedLogicalTable
        );
    }

    #[test]
    fn test_matching_propagated_definition_extends_with_nulls() {
        let r = reconciler();
        let res = r
            .resolve(
                "LT0",
                Some("AMOUNT INTEGER, NOTE VARCHAR(10)"),
                SchemaOptions::new(true, false),
            )
            .unwrap();
        assert_eq!(res.role, NodeRole::Participant);
        assert_eq!(res.schema.physical_count(), 2);
        assert_eq!(res.schema.data_count(), 3);
        assert_eq!(res.schema.column_index("NOTE"), Some(2));
        assert_eq!(res.schema.column_index(GDB_NODE), Some(3));
    }

    #[test]
    fn test_width_mismatch_makes_gateway() {
        let r = reconciler();
        let res = r
            .resolve(
                "LT0",
                Some("LOC VARCHAR(30), AMOUNT INTEGER"),
                SchemaOptions::default(),
            )
            .unwrap();
        assert_eq!(res.role, NodeRole::Gateway);
        assert_eq!(res.schema.definition(), "LOC VARCHAR(30), AMOUNT INTEGER");
        assert!(res.definition_version.is_none());
    }

    #[test]
    fn test_missing_local_definition_makes_gateway() {
        let r = reconciler();
        let res = r
            .resolve("OTHER", Some("X INTEGER"), SchemaOptions::default())
            .unwrap();
        assert_eq!(res.role, NodeRole::Gateway);
    }

    #[test]
    fn test_redefinition_bumps_version() {
        let r = reconciler();
        let v1 = r.version("LT0").unwrap();
        r.define("LT0", "AMOUNT INTEGER, LOC VARCHAR(20)").unwrap();
        assert!(r.version("LT0").unwrap() > v1);
    }

    #[test]
    fn test_derived_mapping_follows_names() {
        let old = parse_definition("T", "A INTEGER, B INTEGER, C INTEGER").unwrap();
        let new = parse_definition("T", "C INTEGER, A INTEGER").unwrap();
        let mapping = ColumnMapping::derive(&old, &new);
        assert_eq!(mapping.as_slice(), &[Some(1), None, Some(0)]);
        let row = mapping.apply(&[json!(3), json!(1)]);
        assert_eq!(row, vec![json!(1), Value::Null, json!(3)]);
        assert!(!mapping.is_identity());
        assert!(ColumnMapping::identity(3).is_identity());
    }
}

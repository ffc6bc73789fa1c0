//! Source descriptors and the leaf adapter interface

use serde_json::Value;
use std::collections::BTreeMap;

use super::errors::SourceResult;
use crate::qualifier::Qualifiers;
use crate::schema::{ColumnMapping, LogicalSchema, Row};

/// One endpoint of a pluralized source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInstance {
    pub id: String,
    /// Logical column name (uppercase) -> constant value at this endpoint
    pub constants: BTreeMap<String, Value>,
}

impl SourceInstance {
    /// Endpoint instance with no constant columns
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            constants: BTreeMap::new(),
        }
    }

    /// Fix `column` to `value` for every row of this instance
    pub fn with_constant(mut self, column: &str, value: Value) -> Self {
        self.constants.insert(column.to_uppercase(), value);
        self
    }
}

/// Closed set of source kinds backing a logical table
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    /// Another node in the mesh
    Peer { node_id: String },
    /// A single local adapter
    Leaf,
    /// A local adapter fanning out to several endpoints
    Pluralized { instances: Vec<SourceInstance> },
}

/// Identity, kind and column naming of one candidate source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    pub id: String,
    pub kind: SourceKind,
    /// Logical column name -> physical column name, where they differ
    pub renames: BTreeMap<String, String>,
}

impl SourceDescriptor {
    /// Descriptor of a plain leaf source
    pub fn leaf(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: SourceKind::Leaf,
            renames: BTreeMap::new(),
        }
    }

    /// Descriptor of a peer node
    pub fn peer(node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        Self {
            id: node_id.clone(),
            kind: SourceKind::Peer { node_id },
            renames: BTreeMap::new(),
        }
    }

    /// Descriptor of a source split over endpoint instances
    pub fn pluralized(id: impl Into<String>, instances: Vec<SourceInstance>) -> Self {
        Self {
            id: id.into(),
            kind: SourceKind::Pluralized { instances },
            renames: BTreeMap::new(),
        }
    }

    /// Read logical column `logical` from physical column `physical`
    pub fn with_rename(mut self, logical: &str, physical: &str) -> Self {
        self.renames
            .insert(logical.to_uppercase(), physical.to_uppercase());
        self
    }

    /// Whether this stands for a peer node
    pub fn is_peer(&self) -> bool {
        matches!(self.kind, SourceKind::Peer { .. })
    }

    /// Endpoint instances; empty for a plain source
    pub fn instances(&self) -> &[SourceInstance] {
        match &self.kind {
            SourceKind::Pluralized { instances } => instances,
            _ => &[],
        }
    }

    /// Logical data column -> physical column of `physical`, by name after renames
    pub fn mapping_for(&self, logical: &LogicalSchema, physical: &LogicalSchema) -> ColumnMapping {
        let targets: Vec<String> = logical
            .data_columns()
            .iter()
            .map(|c| {
                self.renames
                    .get(&c.name)
                    .cloned()
                    .unwrap_or_else(|| c.name.clone())
            })
            .collect();
        ColumnMapping::by_name(&targets, &physical.column_names())
    }
}

/// What a leaf adapter is asked to return, in physical column ids
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanRequest {
    /// Columns that must be populated; all when absent
    pub projection: Option<Vec<usize>>,
    /// Residual predicate the adapter applies
    pub qualifiers: Qualifiers,
    pub order_by: Vec<usize>,
    pub max_rows: Option<u64>,
    /// Endpoint of a pluralized source
    pub instance: Option<String>,
    /// Custom `_VTIARG` arguments
    pub arguments: Vec<(String, String)>,
}

impl ScanRequest {
    /// Same endpoint and arguments, no filtering or projection
    pub fn unfiltered(&self) -> Self {
        Self {
            instance: self.instance.clone(),
            arguments: self.arguments.clone(),
            ..Self::default()
        }
    }
}

/// Rows produced by a scan
pub type RowStream = Box<dyn Iterator<Item = Row> + Send>;

/// A local leaf adapter
///
/// Returned rows are positional against `physical_schema`; columns outside
/// the projection may be NULL.
pub trait RowSource: Send + Sync {
    fn descriptor(&self) -> &SourceDescriptor;

    fn physical_schema(&self) -> &LogicalSchema;

    fn open(&self, request: &ScanRequest) -> SourceResult<RowStream>;

    fn estimated_rows(&self, instance: Option<&str>) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse_definition;

    #[test]
    fn test_mapping_by_name_with_rename() {
        let logical = parse_definition("LT0", "LOC VARCHAR(20), AMOUNT INTEGER").unwrap();
        let physical = parse_definition("S", "AMT INTEGER, LOC VARCHAR(20)").unwrap();
        let descriptor = SourceDescriptor::leaf("S").with_rename("amount", "amt");
        let mapping = descriptor.mapping_for(&logical, &physical);
        assert_eq!(mapping.as_slice(), &[Some(1), Some(0)]);
    }

    #[test]
    fn test_unknown_columns_unmapped() {
        let logical = parse_definition("LT0", "A INTEGER, B INTEGER").unwrap();
        let physical = parse_definition("S", "A INTEGER").unwrap();
        let mapping = SourceDescriptor::leaf("S").mapping_for(&logical, &physical);
        assert_eq!(mapping.as_slice(), &[Some(0), None]);
    }

    #[test]
    fn test_kinds() {
        assert!(SourceDescriptor::peer("B").is_peer());
        let p = SourceDescriptor::pluralized("S", vec![SourceInstance::new("e1")]);
        assert_eq!(p.instances().len(), 1);
        assert!(SourceDescriptor::leaf("S").instances().is_empty());
    }
}

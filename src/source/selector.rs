//! Source selection for one invocation
//!
//! Two pruning points:
//!
//! 1. Node level: the predicate is tested once against this node's
//!    constants (`GDB_NODE`, and the explain constants in explain mode).
//!    Failure skips every local source but never stops propagation.
//! 2. Leaf level: the node-level residual is tested per source and per
//!    pluralized endpoint against `GDB_LEAF` and the endpoint constants.
//!    Logical columns the source cannot supply are tested as NULL.
//!
//! Each surviving scan receives its residual predicate and projection in
//! physical column ids.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

use super::types::{RowSource, ScanRequest, SourceDescriptor, SourceInstance};
use crate::observability::Event;
use crate::propagation::{PropagationTracker, TableArguments};
use crate::qualifier::{
    columns_involved, map_columns, physical_projection, test_and_prune, Pruned, Qualifiers,
};
use crate::schema::{ColumnMapping, LogicalSchema, Row, GDB_LEAF, GDB_NODE};

/// One local source, or one endpoint of a pluralized source, to be scanned
pub struct LocalScan {
    pub source: Arc<dyn RowSource>,
    /// Value of `GDB_LEAF` for rows from this scan
    pub leaf: String,
    pub request: ScanRequest,
    /// Logical data column -> physical column
    pub mapping: ColumnMapping,
    /// Logical column -> endpoint constant
    pub constants: Vec<(usize, Value)>,
}

impl LocalScan {
    /// Build the exposed row for one physical row
    pub fn to_logical(&self, physical: &[Value], schema: &LogicalSchema, node_id: &str) -> Row {
        let mut row = schema.null_row();
        for (i, cell) in row.iter_mut().enumerate().take(schema.data_count()) {
            if let Some(p) = self.mapping.get(i) {
                *cell = physical.get(p).cloned().unwrap_or(Value::Null);
            }
        }
        for (i, value) in &self.constants {
            if let Some(cell) = row.get_mut(*i) {
                *cell = value.clone();
            }
        }
        if let Some(offset) = schema.provenance_offset() {
            row[offset] = Value::from(node_id);
            row[offset + 1] = Value::from(self.leaf.as_str());
        }
        row
    }

    /// Rows the source expects to return for this scan
    pub fn estimated_rows(&self) -> u64 {
        self.source.estimated_rows(self.request.instance.as_deref())
    }
}

impl std::fmt::Debug for LocalScan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalScan")
            .field("leaf", &self.leaf)
            .field("request", &self.request)
            .finish()
    }
}

/// Scans that survived pruning, and the leaves that did not
#[derive(Debug, Default)]
pub struct LocalSelection {
    pub scans: Vec<LocalScan>,
    pub pruned: Vec<String>,
}

/// Decides which sources take part in one invocation
pub struct SourceSelector<'a> {
    node_id: &'a str,
    schema: &'a LogicalSchema,
}

impl<'a> SourceSelector<'a> {
    /// Selector filling provenance for `node_id`
    pub fn new(node_id: &'a str, schema: &'a LogicalSchema) -> Self {
        Self { node_id, schema }
    }

    fn set(&self, template: &mut Row, column: &str, value: Value) -> Option<usize> {
        let index = self.schema.column_index(column)?;
        template[index] = value;
        Some(index)
    }

    /// Row of node-level constants; every other cell is NULL
    pub fn node_template(&self, constants: &[(&str, Value)]) -> Row {
        let mut template = self.schema.null_row();
        if self.schema.provenance_offset().is_some() {
            self.set(&mut template, GDB_NODE, Value::from(self.node_id));
        }
        for (column, value) in constants {
            self.set(&mut template, column, value.clone());
        }
        template
    }

    /// Node-level test; the residual drops every leaf decided by constants
    pub fn test_node(&self, qualifiers: &Qualifiers, constants: &[(&str, Value)]) -> Pruned {
        let pruned = test_and_prune(&self.node_template(constants), qualifiers, true);
        if pruned.is_unsatisfiable() {
            debug!(
                target: "qualifier",
                event = Event::NodeQualifiersFailed.as_str(),
                node = self.node_id,
                "node constants fail the predicate, local sources skipped"
            );
        }
        pruned
    }

    /// Leaf-level test and pushdown over every local source
    pub fn select_local(
        &self,
        sources: &[Arc<dyn RowSource>],
        residual: &Qualifiers,
        projection: Option<&[usize]>,
        arguments: &TableArguments,
    ) -> LocalSelection {
        let mut selection = LocalSelection::default();

        for source in sources {
            let descriptor = source.descriptor();
            let mapping = descriptor.mapping_for(self.schema, source.physical_schema());
            let instances: Vec<Option<&SourceInstance>> = if descriptor.instances().is_empty() {
                vec![None]
            } else {
                descriptor.instances().iter().map(Some).collect()
            };

            for instance in instances {
                match self.select_one(source, descriptor, &mapping, instance, residual, projection, arguments) {
                    Some(scan) => selection.scans.push(scan),
                    None => {
                        let leaf = leaf_label(descriptor, instance);
                        trace!(
                            target: "qualifier",
                            event = Event::SourcePruned.as_str(),
                            node = self.node_id,
                            leaf = %leaf,
                            "source pruned by constants"
                        );
                        selection.pruned.push(leaf);
                    }
                }
            }
        }
        selection
    }

    #[allow(clippy::too_many_arguments)]
    fn select_one(
        &self,
        source: &Arc<dyn RowSource>,
        descriptor: &SourceDescriptor,
        mapping: &ColumnMapping,
        instance: Option<&SourceInstance>,
        residual: &Qualifiers,
        projection: Option<&[usize]>,
        arguments: &TableArguments,
    ) -> Option<LocalScan> {
        let leaf = leaf_label(descriptor, instance);
        let data_count = self.schema.data_count();

        let mut template = self.schema.null_row();
        let mut constants = Vec::new();
        if let Some(i) = self.set(&mut template, GDB_NODE, Value::from(self.node_id)) {
            constants.push(i);
        }
        if let Some(i) = self.set(&mut template, GDB_LEAF, Value::from(leaf.as_str())) {
            constants.push(i);
        }
        let mut endpoint_constants = Vec::new();
        if let Some(instance) = instance {
            for (column, value) in &instance.constants {
                if let Some(i) = self.set(&mut template, column, value.clone()) {
                    constants.push(i);
                    endpoint_constants.push((i, value.clone()));
                }
            }
        }

        // Columns neither constant nor backed by the source can only be NULL
        let testable = ColumnMapping::from_sources(
            (0..self.schema.exposed_count())
                .map(|i| {
                    let supplied =
                        i >= data_count || constants.contains(&i) || mapping.get(i).is_some();
                    supplied.then_some(i)
                })
                .collect(),
        );
        let remaining = test_and_prune(&template, &map_columns(residual, &testable), true).remaining()?;

        let requested: Vec<usize> = match projection {
            Some(columns) => columns.iter().copied().filter(|c| *c < data_count).collect(),
            None => (0..data_count).collect(),
        };
        let involved: Vec<usize> = columns_involved(&requested, &remaining)
            .into_iter()
            .filter(|c| *c < data_count)
            .collect();

        let order_by: Vec<usize> = arguments
            .order_by
            .iter()
            .filter_map(|name| self.schema.column_index(name))
            .filter_map(|c| mapping.get(c))
            .collect();

        let request = ScanRequest {
            projection: Some(physical_projection(&involved, mapping)),
            qualifiers: map_columns(&remaining, mapping),
            order_by,
            max_rows: arguments.max_source_rows,
            instance: instance.map(|i| i.id.clone()),
            arguments: arguments.custom.clone(),
        };

        Some(LocalScan {
            source: Arc::clone(source),
            leaf,
            request,
            mapping: mapping.clone(),
            constants: endpoint_constants,
        })
    }
}

/// `GDB_LEAF` value: the source id, suffixed with the endpoint when pluralized
pub fn leaf_label(descriptor: &SourceDescriptor, instance: Option<&SourceInstance>) -> String {
    match instance {
        Some(instance) => format!("{}:{}", descriptor.id, instance.id),
        None => descriptor.id.clone(),
    }
}

/// Peers the query may be forwarded to
pub fn select_peers(
    tracker: &PropagationTracker,
    query_id: &str,
    peers: &[String],
    forwarding_node: Option<&str>,
) -> Vec<SourceDescriptor> {
    tracker
        .eligible_peers(query_id, peers, forwarding_node)
        .into_iter()
        .map(SourceDescriptor::peer)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qualifier::Qualifier;
    use crate::schema::{parse_definition, SchemaOptions};
    use crate::source::MemoryTable;
    use serde_json::json;

    fn schema() -> LogicalSchema {
        parse_definition("LT0", "LOC VARCHAR(20), AMOUNT INTEGER, EXTRA INTEGER")
            .unwrap()
            .with_options(SchemaOptions::new(true, false))
    }

    fn source() -> Arc<dyn RowSource> {
        Arc::new(MemoryTable::new(
            SourceDescriptor::leaf("DS0"),
            parse_definition("DS0", "AMOUNT INTEGER, LOC VARCHAR(20)").unwrap(),
            vec![vec![json!(5), json!("x")]],
        ))
    }

    #[test]
    fn test_node_test_on_gdb_node() {
        let schema = schema();
        let selector = SourceSelector::new("A", &schema);
        let node_col = schema.column_index(GDB_NODE).unwrap();

        let other = Qualifiers::all(vec![Qualifier::eq(node_col, json!("B"))]);
        assert!(selector.test_node(&other, &[]).is_unsatisfiable());

        let mine = Qualifiers::all(vec![Qualifier::eq(node_col, json!("A")), Qualifier::gt(1, json!(1))]);
        let residual = selector.test_node(&mine, &[]).remaining().unwrap();
        assert_eq!(residual, Qualifiers::all(vec![Qualifier::gt(1, json!(1))]));
    }

    #[test]
    fn test_residual_pushed_in_physical_ids() {
        let schema = schema();
        let selector = SourceSelector::new("A", &schema);
        let q = Qualifiers::all(vec![Qualifier::gt(1, json!(1))]);
        let selection = selector.select_local(&[source()], &q, Some(&[0]), &TableArguments::default());
        assert_eq!(selection.scans.len(), 1);
        let request = &selection.scans[0].request;
        // logical AMOUNT(1) is physical 0, logical LOC(0) is physical 1
        assert_eq!(request.qualifiers, Qualifiers::all(vec![Qualifier::gt(0, json!(1))]));
        assert_eq!(request.projection, Some(vec![0, 1]));
    }

    #[test]
    fn test_unsupplied_column_tested_as_null() {
        let schema = schema();
        let selector = SourceSelector::new("A", &schema);
        // EXTRA is not provided by DS0, so EXTRA = 3 can never hold
        let q = Qualifiers::all(vec![Qualifier::eq(2, json!(3))]);
        let selection = selector.select_local(&[source()], &q, None, &TableArguments::default());
        assert!(selection.scans.is_empty());
        assert_eq!(selection.pruned, vec!["DS0"]);

        let is_null = Qualifiers::all(vec![Qualifier::is_null(2)]);
        let selection = selector.select_local(&[source()], &is_null, None, &TableArguments::default());
        assert_eq!(selection.scans.len(), 1);
        assert!(selection.scans[0].request.qualifiers.is_empty());
    }

    #[test]
    fn test_leaf_constant_prunes() {
        let schema = schema();
        let selector = SourceSelector::new("A", &schema);
        let leaf_col = schema.column_index(GDB_LEAF).unwrap();
        let q = Qualifiers::all(vec![Qualifier::eq(leaf_col, json!("DS9"))]);
        assert!(selector
            .select_local(&[source()], &q, None, &TableArguments::default())
            .scans
            .is_empty());
    }

    #[test]
    fn test_pluralized_instances_pruned_individually() {
        let schema = parse_definition("LT0", "REGION VARCHAR(5), V INTEGER").unwrap();
        let physical = parse_definition("P", "V INTEGER").unwrap();
        let plural: Arc<dyn RowSource> = Arc::new(MemoryTable::pluralized(
            "P",
            physical,
            vec![
                (SourceInstance::new("e1").with_constant("region", json!("EU")), vec![vec![json!(1)]]),
                (SourceInstance::new("e2").with_constant("region", json!("US")), vec![vec![json!(2)]]),
            ],
        ));
        let selector = SourceSelector::new("A", &schema);
        let q = Qualifiers::all(vec![Qualifier::eq(0, json!("US"))]);
        let selection = selector.select_local(&[plural], &q, None, &TableArguments::default());
        assert_eq!(selection.pruned, vec!["P:e1"]);
        assert_eq!(selection.scans.len(), 1);
        let scan = &selection.scans[0];
        assert_eq!(scan.request.instance.as_deref(), Some("e2"));
        let row = scan.to_logical(&[json!(2)], &schema, "A");
        assert_eq!(row, vec![json!("US"), json!(2)]);
    }

    #[test]
    fn test_to_logical_fills_provenance() {
        let schema = schema();
        let selector = SourceSelector::new("A", &schema);
        let selection = selector.select_local(&[source()], &Qualifiers::none(), None, &TableArguments::default());
        let row = selection.scans[0].to_logical(&[json!(5), json!("x")], &schema, "A");
        assert_eq!(
            row,
            vec![json!("x"), json!(5), Value::Null, json!("A"), json!("DS0")]
        );
    }

    #[test]
    fn test_order_by_and_row_cap() {
        let schema = schema();
        let selector = SourceSelector::new("A", &schema);
        let args = TableArguments::parse("maxSourceRows=7, order by loc");
        let selection = selector.select_local(&[source()], &Qualifiers::none(), None, &args);
        let request = &selection.scans[0].request;
        assert_eq!(request.order_by, vec![1]);
        assert_eq!(request.max_rows, Some(7));
    }
}

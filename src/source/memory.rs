//! In-memory leaf adapter
//!
//! Stands in for a local table or file: rows are held inline and the
//! pushed-down predicate, ordering, row cap and projection are applied here,
//! the way a local SQL engine would.

use serde_json::Value;
use std::collections::HashMap;

use super::errors::{SourceError, SourceResult};
use super::types::{RowSource, RowStream, ScanRequest, SourceDescriptor, SourceInstance};
use crate::qualifier::{sort_order, RowFilter};
use crate::schema::{LogicalSchema, Row};

/// Filter, order, cap and project rows per the request
pub(crate) fn apply_request(rows: Vec<Row>, request: &ScanRequest) -> Vec<Row> {
    let mut rows: Vec<Row> = rows
        .into_iter()
        .filter(|r| RowFilter::matches(r, &request.qualifiers))
        .collect();

    if !request.order_by.is_empty() {
        rows.sort_by(|a, b| {
            request
                .order_by
                .iter()
                .map(|c| {
                    sort_order(
                        a.get(*c).unwrap_or(&Value::Null),
                        b.get(*c).unwrap_or(&Value::Null),
                    )
                })
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    if let Some(max) = request.max_rows {
        rows.truncate(usize::try_from(max).unwrap_or(usize::MAX));
    }

    if let Some(projection) = &request.projection {
        for row in rows.iter_mut() {
            for (i, cell) in row.iter_mut().enumerate() {
                if !projection.contains(&i) {
                    *cell = Value::Null;
                }
            }
        }
    }
    rows
}

/// Leaf adapter over inline rows
#[derive(Debug, Clone)]
pub struct MemoryTable {
    descriptor: SourceDescriptor,
    schema: LogicalSchema,
    rows: Vec<Row>,
    instance_rows: HashMap<String, Vec<Row>>,
}

impl MemoryTable {
    /// Table holding `rows` in the physical layout `schema`
    pub fn new(descriptor: SourceDescriptor, schema: LogicalSchema, rows: Vec<Row>) -> Self {
        Self {
            descriptor,
            schema,
            rows,
            instance_rows: HashMap::new(),
        }
    }

    /// A pluralized table; each instance has its own rows
    pub fn pluralized(
        id: impl Into<String>,
        schema: LogicalSchema,
        instances: Vec<(SourceInstance, Vec<Row>)>,
    ) -> Self {
        let mut instance_rows = HashMap::new();
        let mut descriptors = Vec::new();
        for (instance, rows) in instances {
            instance_rows.insert(instance.id.clone(), rows);
            descriptors.push(instance);
        }
        Self {
            descriptor: SourceDescriptor::pluralized(id, descriptors),
            schema,
            rows: Vec::new(),
            instance_rows,
        }
    }

    /// Logical column name -> physical column name, where they differ
    pub fn with_renames<'a>(mut self, renames: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        for (logical, physical) in renames {
            self.descriptor = self.descriptor.with_rename(logical, physical);
        }
        self
    }

    fn rows_for(&self, instance: Option<&str>) -> SourceResult<&[Row]> {
        match instance {
            None => Ok(&self.rows),
            Some(id) => self
                .instance_rows
                .get(id)
                .map(Vec::as_slice)
                .ok_or_else(|| SourceError::UnknownInstance {
                    source_id: self.descriptor.id.clone(),
                    instance: id.to_string(),
                }),
        }
    }
}

impl RowSource for MemoryTable {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn physical_schema(&self) -> &LogicalSchema {
        &self.schema
    }

    fn open(&self, request: &ScanRequest) -> SourceResult<RowStream> {
        let rows = self.rows_for(request.instance.as_deref())?.to_vec();
        Ok(Box::new(apply_request(rows, request).into_iter()))
    }

    fn estimated_rows(&self, instance: Option<&str>) -> u64 {
        self.rows_for(instance).map_or(0, |r| r.len() as u64)
    }
}

//! Explain rows and DOT rendering
//!
//! In explain mode every node answers with one row per hop it knows about:
//! who forwarded the query, to whom, at what depth, whether the visit was
//! first, shorter or longer than an earlier one, and how many local rows
//! the node would have returned.

use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use super::errors::{EngineError, EngineResult};
use crate::observability::Event;
use crate::propagation::PathPrecedence;
use crate::schema::{LogicalSchema, Row};

/// `GDBX_FROM_NODE` at the originating node
pub const ORIGIN_LABEL: &str = "<SQL QUERY>";

/// One edge of the propagation graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainRow {
    pub from: String,
    pub to: String,
    pub depth: u32,
    pub precedence: PathPrecedence,
    pub count: u64,
}

impl ExplainRow {
    /// Explain cells in exposed order
    pub fn cells(&self) -> [Value; 5] {
        [
            Value::from(self.from.as_str()),
            Value::from(self.to.as_str()),
            Value::from(self.depth),
            Value::from(self.precedence.as_char().to_string()),
            Value::from(self.count),
        ]
    }

    /// Full exposed row: NULL data, provenance naming this node, explain cells
    pub fn to_row(&self, schema: &LogicalSchema) -> Row {
        let mut row = schema.null_row();
        if let Some(offset) = schema.provenance_offset() {
            row[offset] = Value::from(self.to.as_str());
        }
        if let Some(offset) = schema.explain_offset() {
            for (i, cell) in self.cells().into_iter().enumerate() {
                row[offset + i] = cell;
            }
        }
        row
    }

    /// Read an explain row laid out as `schema`
    pub fn from_row(row: &[Value], schema: &LogicalSchema) -> Option<Self> {
        let offset = schema.explain_offset()?;
        let cells = row.get(offset..offset + 5)?;
        let precedence = cells[3]
            .as_str()
            .and_then(|s| s.chars().next())
            .and_then(PathPrecedence::from_char)?;
        Some(Self {
            from: cells[0].as_str()?.to_string(),
            to: cells[1].as_str()?.to_string(),
            depth: u32::try_from(cells[2].as_u64()?).ok()?,
            precedence,
            count: cells[4].as_u64()?,
        })
    }

    fn dot_line(&self, table: &str) -> String {
        let from = if self.from == ORIGIN_LABEL {
            format!("SQL Query on {}", table)
        } else {
            self.from.clone()
        };
        let attributes = match self.precedence {
            PathPrecedence::First => format!("label={}", self.count),
            PathPrecedence::Shorter => format!("label={}, color=red", self.count),
            PathPrecedence::Longer => "style=dotted".to_string(),
        };
        format!("\"{}\" -> \"{}\" [{}];\n", from, self.to, attributes)
    }
}

/// Render explain rows as a GraphViz digraph; the originating edge comes first
pub fn to_dot(rows: &[ExplainRow], table: &str) -> String {
    let mut out = String::from("digraph G {\n");
    let (origin, rest): (Vec<&ExplainRow>, Vec<&ExplainRow>) =
        rows.iter().partition(|r| r.from == ORIGIN_LABEL);
    for row in origin.into_iter().chain(rest) {
        out.push_str(&row.dot_line(table));
    }
    out.push_str("}\n");
    out
}

/// Extract explain rows from result rows and write the graph to `path`
pub fn write_dot(path: &Path, rows: &[Row], schema: &LogicalSchema) -> EngineResult<usize> {
    let mut explain = Vec::with_capacity(rows.len());
    for row in rows {
        match ExplainRow::from_row(row, schema) {
            Some(r) => explain.push(r),
            None => warn!(
                target: "engine",
                table = schema.table(),
                "row without explain columns skipped"
            ),
        }
    }

    let dot = to_dot(&explain, schema.table());
    fs::write(path, dot).map_err(|e| {
        EngineError::explain_output(format!("cannot write {}: {}", path.display(), e))
    })?;
    info!(
        target: "engine",
        event = Event::ExplainWritten.as_str(),
        path = %path.display(),
        edges = explain.len(),
        "explain graph written"
    );
    Ok(explain.len())
}

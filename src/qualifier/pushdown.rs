//! Predicate and projection pushdown helpers

use serde_json::Value;
use std::collections::BTreeSet;

use crate::schema::ColumnMapping;

use super::types::{Qualifier, Qualifiers, UNMAPPED_COLUMN};

/// Deep copy with every column id translated logical -> physical.
///
/// `mapping.get(logical)` yields the physical index. Leaves on columns the
/// source does not expose get `UNMAPPED_COLUMN` and evaluate against NULL.
pub fn map_columns(qualifiers: &Qualifiers, mapping: &ColumnMapping) -> Qualifiers {
    let groups = qualifiers
        .groups()
        .iter()
        .map(|group| {
            group
                .iter()
                .map(|q| q.on_column(mapping.get(q.column).unwrap_or(UNMAPPED_COLUMN)))
                .collect()
        })
        .collect();
    Qualifiers::new(groups)
}

/// Every column id referenced by the qualifiers
pub fn referenced_columns(qualifiers: &Qualifiers) -> BTreeSet<usize> {
    qualifiers.iter().map(|q| q.column).collect()
}

/// Sorted union of projected columns and columns tested by qualifiers
pub fn columns_involved(projection: &[usize], qualifiers: &Qualifiers) -> Vec<usize> {
    let mut all: BTreeSet<usize> = projection.iter().copied().collect();
    all.extend(referenced_columns(qualifiers));
    all.remove(&UNMAPPED_COLUMN);
    all.into_iter().collect()
}

/// Physical columns a source must return for the logical columns involved
pub fn physical_projection(logical_columns: &[usize], mapping: &ColumnMapping) -> Vec<usize> {
    let physical: BTreeSet<usize> = logical_columns
        .iter()
        .filter_map(|c| mapping.get(*c))
        .collect();
    physical.into_iter().collect()
}

/// Render the predicate as SQL where-clause text.
///
/// Columns are named from `names` where available, otherwise `C<n>` (1-based).
/// Leaves on `UNMAPPED_COLUMN` are decided against NULL: a group holding a
/// true one is left out, false ones are dropped from their group, and a
/// group with nothing left renders as `FALSE`.
pub fn to_where_clause(qualifiers: &Qualifiers, names: Option<&[String]>) -> String {
    let groups: Vec<Vec<String>> = qualifiers
        .groups()
        .iter()
        .filter_map(|group| render_group(group, names))
        .collect();
    let bracket = groups.len() > 1;
    groups
        .into_iter()
        .map(|parts| match parts.len() {
            0 => "FALSE".to_string(),
            1 => parts.join(""),
            _ if bracket => format!("({})", parts.join(" OR ")),
            _ => parts.join(" OR "),
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Rendered leaves of one disjunct group, or None when it always holds
fn render_group(group: &[Qualifier], names: Option<&[String]>) -> Option<Vec<String>> {
    let mut parts = Vec::with_capacity(group.len());
    for q in group {
        if q.column == UNMAPPED_COLUMN {
            if q.evaluate(&Value::Null) {
                return None;
            }
            continue;
        }
        parts.push(render_leaf(q, names));
    }
    Some(parts)
}

fn render_leaf(q: &Qualifier, names: Option<&[String]>) -> String {
    let column = names
        .and_then(|n| n.get(q.column))
        .cloned()
        .unwrap_or_else(|| format!("C{}", q.column + 1));

    match q.op {
        super::types::CompareOp::IsNull | super::types::CompareOp::IsNotNull => {
            format!("{} {}", column, q.op.sql(q.negate))
        }
        _ if q.operand.is_null() => {
            let text = if q.negate { "IS NOT NULL" } else { "IS NULL" };
            format!("{} {}", column, text)
        }
        _ => format!("{}{}{}", column, q.op.sql(q.negate), render_value(&q.operand)),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        other => other.to_string(),
    }
}

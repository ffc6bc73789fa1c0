//! Testing and pruning qualifiers against constant column values
//!
//! A row template holds the values known ahead of execution (node id, leaf
//! description, endpoint constants). Cells that are NULL are not known and
//! their qualifiers are kept for per-row evaluation. Columns beyond the end
//! of the template can never carry a value and are tested as NULL.
//!
//! Rules, per group:
//! 1. a leaf that tests true satisfies its group, and the group is dropped
//! 2. a leaf that tests false is dropped from its group
//! 3. a group left with no leaves after rule 2 makes the predicate
//!    unsatisfiable

use serde_json::Value;
use tracing::trace;

use super::types::{Pruned, Qualifier, Qualifiers};

enum LeafOutcome {
    True,
    False,
    Unknown,
}

fn test_leaf(template: &[Value], q: &Qualifier) -> LeafOutcome {
    let cell = match template.get(q.column) {
        Some(cell) if cell.is_null() => return LeafOutcome::Unknown,
        Some(cell) => cell,
        None => &Value::Null,
    };
    if q.evaluate(cell) {
        LeafOutcome::True
    } else {
        LeafOutcome::False
    }
}

/// Test qualifiers against the template.
///
/// With `prune` set, the returned qualifiers are the residual predicate with
/// every decided leaf removed. Without it the original qualifiers are
/// returned untouched whenever they remain satisfiable.
pub fn test_and_prune(template: &[Value], qualifiers: &Qualifiers, prune: bool) -> Pruned {
    let mut residual = Vec::with_capacity(qualifiers.groups().len());

    for (i, group) in qualifiers.groups().iter().enumerate() {
        let mut kept = Vec::new();
        let mut satisfied = false;

        for q in group {
            match test_leaf(template, q) {
                LeafOutcome::True => {
                    satisfied = true;
                    break;
                }
                LeafOutcome::False => {}
                LeafOutcome::Unknown => kept.push(q.clone()),
            }
        }

        trace!(
            target: "qualifier",
            group = i,
            satisfied,
            undecided = kept.len(),
            "tested qualifier group against constants"
        );

        if satisfied {
            continue;
        }
        if kept.is_empty() {
            return Pruned::Unsatisfiable;
        }
        residual.push(kept);
    }

    if prune {
        Pruned::Remaining(Qualifiers::from_groups_unchecked(residual))
    } else {
        Pruned::Remaining(qualifiers.clone())
    }
}

/// Remove every leaf that targets one of `columns`, collecting the operand
/// of the first such leaf found for each column.
///
/// Groups emptied this way are dropped. The result is therefore weaker than
/// the input and the removed conditions must be enforced elsewhere.
pub fn factor_out_columns(
    qualifiers: &Qualifiers,
    columns: &[usize],
) -> (Qualifiers, Vec<Option<Value>>) {
    let mut collected: Vec<Option<Value>> = vec![None; columns.len()];
    let mut groups = Vec::with_capacity(qualifiers.groups().len());

    for group in qualifiers.groups() {
        let mut kept = Vec::with_capacity(group.len());
        for q in group {
            match columns.iter().position(|c| *c == q.column) {
                Some(slot) => {
                    if collected[slot].is_none() {
                        collected[slot] = Some(q.operand.clone());
                    }
                }
                None => kept.push(q.clone()),
            }
        }
        // An OR-group that lost members no longer means the same thing
        if kept.len() == group.len() {
            groups.push(kept);
        }
    }

    (Qualifiers::new(groups), collected)
}

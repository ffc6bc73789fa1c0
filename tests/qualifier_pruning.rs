//! Qualifier Pruning Tests
//!
//! Pruning against constant templates must never change which rows match:
//! - An unsatisfiable verdict means no row consistent with the template matches
//! - A residual predicate accepts exactly the consistent rows the original does
//! - Factoring columns out only ever weakens a predicate
//!
//! Checked exhaustively over a small value domain.

use serde_json::{json, Value};

use meshquery::qualifier::{
    factor_out_columns, test_and_prune, CompareOp, Pruned, Qualifier, Qualifiers, RowFilter,
};

const WIDTH: usize = 2;

fn domain() -> Vec<Value> {
    vec![Value::Null, json!(1), json!(2), json!(3)]
}

/// Every template: each column unknown (NULL) or one non-null constant
fn templates() -> Vec<Vec<Value>> {
    let mut out = Vec::new();
    for a in domain() {
        for b in domain() {
            out.push(vec![a.clone(), b.clone()]);
        }
    }
    out
}

/// Rows that agree with the template on every known column
fn consistent_rows(template: &[Value]) -> Vec<Vec<Value>> {
    templates()
        .into_iter()
        .filter(|row| {
            template
                .iter()
                .zip(row)
                .all(|(known, cell)| known.is_null() || known == cell)
        })
        .collect()
}

/// Single leaves over the template columns plus one column past its end
fn leaves() -> Vec<Qualifier> {
    let mut out = Vec::new();
    for column in 0..=WIDTH {
        for op in [CompareOp::Lt, CompareOp::Eq, CompareOp::Gt, CompareOp::Ne] {
            out.push(Qualifier::new(column, op, json!(2)));
        }
        out.push(Qualifier::is_null(column));
        out.push(Qualifier::is_not_null(column));
    }
    out.push(Qualifier::eq(0, json!(2)).negated());
    out.push(Qualifier::lt(1, json!(2)).with_unknown_result(true));
    out
}

/// Single leaves, two-leaf conjunctions and two-leaf disjunctions
fn predicates() -> Vec<Qualifiers> {
    let leaves = leaves();
    let mut out: Vec<Qualifiers> = leaves
        .iter()
        .map(|q| Qualifiers::all(vec![q.clone()]))
        .collect();
    for (i, a) in leaves.iter().enumerate() {
        for b in &leaves[i + 1..] {
            out.push(Qualifiers::all(vec![a.clone(), b.clone()]));
            out.push(Qualifiers::new(vec![vec![a.clone(), b.clone()]]));
        }
    }
    out
}

// =============================================================================
// Soundness
// =============================================================================

#[test]
fn test_unsatisfiable_means_no_consistent_row_matches() {
    for template in templates() {
        let rows = consistent_rows(&template);
        for predicate in predicates() {
            if test_and_prune(&template, &predicate, true).is_unsatisfiable() {
                for row in &rows {
                    assert!(
                        !RowFilter::matches(row, &predicate),
                        "template {:?} pruned {:?} but row {:?} matches",
                        template,
                        predicate,
                        row
                    );
                }
            }
        }
    }
}

#[test]
fn test_residual_agrees_with_original_on_consistent_rows() {
    for template in templates() {
        let rows = consistent_rows(&template);
        for predicate in predicates() {
            let Pruned::Remaining(residual) = test_and_prune(&template, &predicate, true) else {
                continue;
            };
            assert!(residual.leaf_count() <= predicate.leaf_count());
            for row in &rows {
                assert_eq!(
                    RowFilter::matches(row, &predicate),
                    RowFilter::matches(row, &residual),
                    "template {:?} predicate {:?} residual {:?} row {:?}",
                    template,
                    predicate,
                    residual,
                    row
                );
            }
        }
    }
}

#[test]
fn test_without_prune_qualifiers_are_returned_untouched() {
    for template in templates() {
        for predicate in predicates() {
            match test_and_prune(&template, &predicate, false) {
                Pruned::Remaining(q) => assert_eq!(q, predicate),
                Pruned::Unsatisfiable => {
                    assert!(test_and_prune(&template, &predicate, true).is_unsatisfiable())
                }
            }
        }
    }
}

/// With nothing known, only leaves past the end of the row can be decided.
#[test]
fn test_unknown_template_keeps_in_range_leaves() {
    let template = vec![Value::Null; WIDTH];
    for predicate in predicates() {
        let in_range = predicate.iter().all(|q| q.column < WIDTH);
        if in_range {
            assert_eq!(
                test_and_prune(&template, &predicate, true),
                Pruned::Remaining(predicate.clone())
            );
        }
    }
}

// =============================================================================
// Factoring
// =============================================================================

#[test]
fn test_factoring_only_weakens() {
    for predicate in predicates() {
        for column in 0..WIDTH {
            let (factored, _) = factor_out_columns(&predicate, &[column]);
            assert!(factored.iter().all(|q| q.column != column));
            for row in templates() {
                if RowFilter::matches(&row, &predicate) {
                    assert!(RowFilter::matches(&row, &factored));
                }
            }
        }
    }
}

#[test]
fn test_factoring_collects_first_operand() {
    let predicate = Qualifiers::all(vec![
        Qualifier::eq(1, json!(7)),
        Qualifier::gt(0, json!(1)),
        Qualifier::eq(1, json!(9)),
    ]);
    let (factored, collected) = factor_out_columns(&predicate, &[1]);
    assert_eq!(collected, vec![Some(json!(7))]);
    assert_eq!(factored, Qualifiers::all(vec![Qualifier::gt(0, json!(1))]));
}

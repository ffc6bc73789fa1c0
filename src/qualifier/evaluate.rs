//! Per-row qualifier evaluation
//!
//! Comparison rules:
//! - numbers compare numerically (integers exactly, otherwise as f64)
//! - strings compare lexicographically, booleans false < true
//! - values of different kinds are incomparable and yield the unknown result
//! - NULL yields the unknown result unless nulls sort high

use serde_json::Value;
use std::cmp::Ordering;

use super::types::{CompareOp, Qualifier, Qualifiers};

/// Compare two non-null cells. `None` when the kinds differ.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(xi), Some(yi)) = (x.as_i64(), y.as_i64()) {
                return Some(xi.cmp(&yi));
            }
            match (x.as_f64(), y.as_f64()) {
                (Some(xf), Some(yf)) => xf.partial_cmp(&yf),
                _ => None,
            }
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Total order used for sorting rows: NULL sorts high, mismatched kinds by kind
pub fn sort_order(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => compare_values(a, b).unwrap_or_else(|| kind_rank(a).cmp(&kind_rank(b))),
    }
}

fn kind_rank(v: &Value) -> u8 {
    match v {
        Value::Bool(_) => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Array(_) => 3,
        Value::Object(_) => 4,
        Value::Null => 5,
    }
}

impl Qualifier {
    /// Evaluate this leaf against a cell value
    pub fn evaluate(&self, cell: &Value) -> bool {
        let raw = match self.op {
            CompareOp::IsNull => cell.is_null(),
            CompareOp::IsNotNull => !cell.is_null(),
            op => match (cell.is_null(), self.operand.is_null()) {
                (false, false) => match compare_values(cell, &self.operand) {
                    Some(ordering) => op.accepts(ordering),
                    None => self.unknown_result,
                },
                _ if !self.nulls_sort_high => self.unknown_result,
                (true, true) => op.accepts(Ordering::Equal),
                (true, false) => op.accepts(Ordering::Greater),
                (false, true) => op.accepts(Ordering::Less),
            },
        };
        raw ^ self.negate
    }
}

/// Evaluates qualifiers against full rows
pub struct RowFilter;

impl RowFilter {
    /// Checks if a row satisfies every group of the predicate.
    ///
    /// Columns beyond the end of the row are read as NULL.
    pub fn matches(row: &[Value], qualifiers: &Qualifiers) -> bool {
        qualifiers.groups().iter().all(|group| {
            group
                .iter()
                .any(|q| q.evaluate(row.get(q.column).unwrap_or(&Value::Null)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_comparison_mixed_int_float() {
        assert_eq!(compare_values(&json!(2), &json!(2.5)), Some(Ordering::Less));
        assert_eq!(compare_values(&json!(3), &json!(3)), Some(Ordering::Equal));
    }

    #[test]
    fn test_no_cross_kind_comparison() {
        assert_eq!(compare_values(&json!("3"), &json!(3)), None);
        assert!(!Qualifier::eq(0, json!(3)).evaluate(&json!("3")));
        assert!(Qualifier::eq(0, json!(3))
            .with_unknown_result(true)
            .evaluate(&json!("3")));
    }

    #[test]
    fn test_null_uses_unknown_result() {
        let q = Qualifier::gt(0, json!(10));
        assert!(!q.evaluate(&Value::Null));
        assert!(q.clone().with_unknown_result(true).evaluate(&Value::Null));
    }

    #[test]
    fn test_nulls_sort_high() {
        let q = Qualifier::gt(0, json!(10)).with_nulls_sort_high(true);
        assert!(q.evaluate(&Value::Null));
        let q = Qualifier::lt(0, json!(10)).with_nulls_sort_high(true);
        assert!(!q.evaluate(&Value::Null));
        let q = Qualifier::eq(0, Value::Null).with_nulls_sort_high(true);
        assert!(q.evaluate(&Value::Null));
    }

    #[test]
    fn test_negate_applies_after_unknown() {
        let q = Qualifier::eq(0, json!(1)).negated();
        assert!(q.evaluate(&Value::Null));
        assert!(!q.evaluate(&json!(1)));
    }

    #[test]
    fn test_is_null_operators() {
        assert!(Qualifier::is_null(0).evaluate(&Value::Null));
        assert!(!Qualifier::is_null(0).evaluate(&json!(0)));
        assert!(Qualifier::is_not_null(0).evaluate(&json!("x")));
    }

    #[test]
    fn test_row_filter_cnf() {
        // (c0 = 'a' OR c0 = 'b') AND c1 >= 5
        let q = Qualifiers::none()
            .and_any(vec![Qualifier::eq(0, json!("a")), Qualifier::eq(0, json!("b"))])
            .and(Qualifier::ge(1, json!(5)));
        assert!(RowFilter::matches(&[json!("b"), json!(7)], &q));
        assert!(!RowFilter::matches(&[json!("c"), json!(7)], &q));
        assert!(!RowFilter::matches(&[json!("a"), json!(4)], &q));
    }

    #[test]
    fn test_row_filter_out_of_range_is_null() {
        let q = Qualifiers::all(vec![Qualifier::is_null(5)]);
        assert!(RowFilter::matches(&[json!(1)], &q));
    }

    #[test]
    fn test_empty_predicate_matches() {
        assert!(RowFilter::matches(&[json!(1)], &Qualifiers::none()));
    }

    #[test]
    fn test_sort_order_nulls_last() {
        let mut v = vec![Value::Null, json!(3), json!(1)];
        v.sort_by(sort_order);
        assert_eq!(v, vec![json!(1), json!(3), Value::Null]);
    }
}

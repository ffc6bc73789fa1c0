//! Qualifier structures
//!
//! A predicate is held in conjunctive normal form: the AND of one or more
//! groups, each group being the OR of its qualifiers. An empty set of groups
//! accepts every row.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Column id given to a qualifier whose column a source does not expose.
///
/// Always out of range, so the qualifier is evaluated against NULL.
pub const UNMAPPED_COLUMN: usize = usize::MAX;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
    Ne,
    IsNull,
    IsNotNull,
}

impl CompareOp {
    /// Returns true if the ordering satisfies this operator
    pub fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ge => ordering != Ordering::Less,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::IsNull | CompareOp::IsNotNull => false,
        }
    }

    /// SQL operator text, taking negation into account
    pub fn sql(&self, negate: bool) -> &'static str {
        match (self, negate) {
            (CompareOp::Lt, false) | (CompareOp::Ge, true) => "<",
            (CompareOp::Le, false) | (CompareOp::Gt, true) => "<=",
            (CompareOp::Eq, false) | (CompareOp::Ne, true) => "=",
            (CompareOp::Ge, false) | (CompareOp::Lt, true) => ">=",
            (CompareOp::Gt, false) | (CompareOp::Le, true) => ">",
            (CompareOp::Ne, false) | (CompareOp::Eq, true) => "!=",
            (CompareOp::IsNull, false) | (CompareOp::IsNotNull, true) => "IS NULL",
            (CompareOp::IsNull, true) | (CompareOp::IsNotNull, false) => "IS NOT NULL",
        }
    }

    /// Parse the textual operators accepted on the command line
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            "=" | "==" => Some(CompareOp::Eq),
            ">=" => Some(CompareOp::Ge),
            ">" => Some(CompareOp::Gt),
            "<>" | "!=" => Some(CompareOp::Ne),
            "ISNULL" | "IS NULL" => Some(CompareOp::IsNull),
            "ISNOTNULL" | "IS NOT NULL" => Some(CompareOp::IsNotNull),
            _ => None,
        }
    }
}

/// A single predicate leaf on one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Qualifier {
    /// 0-based column id, logical until remapped
    pub column: usize,
    pub op: CompareOp,
    /// Constant operand (ignored by ISNULL / ISNOTNULL)
    #[serde(default)]
    pub operand: Value,
    /// Invert the comparison result
    #[serde(default)]
    pub negate: bool,
    /// Treat NULL as greater than every value instead of unknown
    #[serde(default)]
    pub nulls_sort_high: bool,
    /// Result of a comparison involving NULL when nulls are not ordered
    #[serde(default)]
    pub unknown_result: bool,
}

impl Qualifier {
    /// Create a qualifier with default null handling (unknown is false)
    pub fn new(column: usize, op: CompareOp, operand: Value) -> Self {
        Self {
            column,
            op,
            operand,
            negate: false,
            nulls_sort_high: false,
            unknown_result: false,
        }
    }

    /// `column = operand`
    pub fn eq(column: usize, operand: Value) -> Self {
        Self::new(column, CompareOp::Eq, operand)
    }

    /// `column != operand`
    pub fn ne(column: usize, operand: Value) -> Self {
        Self::new(column, CompareOp::Ne, operand)
    }

    /// `column < operand`
    pub fn lt(column: usize, operand: Value) -> Self {
        Self::new(column, CompareOp::Lt, operand)
    }

    /// `column <= operand`
    pub fn le(column: usize, operand: Value) -> Self {
        Self::new(column, CompareOp::Le, operand)
    }

    /// `column > operand`
    pub fn gt(column: usize, operand: Value) -> Self {
        Self::new(column, CompareOp::Gt, operand)
    }

    /// `column >= operand`
    pub fn ge(column: usize, operand: Value) -> Self {
        Self::new(column, CompareOp::Ge, operand)
    }

    /// `column IS NULL`
    pub fn is_null(column: usize) -> Self {
        Self::new(column, CompareOp::IsNull, Value::Null)
    }

    /// `column IS NOT NULL`
    pub fn is_not_null(column: usize) -> Self {
        Self::new(column, CompareOp::IsNotNull, Value::Null)
    }

    /// Invert the leaf
    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    /// Order NULL above every value instead of treating it as unknown
    pub fn with_nulls_sort_high(mut self, on: bool) -> Self {
        self.nulls_sort_high = on;
        self
    }

    /// Result of a comparison with NULL when it is unknown
    pub fn with_unknown_result(mut self, value: bool) -> Self {
        self.unknown_result = value;
        self
    }

    /// Same leaf on a different column
    pub fn on_column(&self, column: usize) -> Self {
        Self {
            column,
            ..self.clone()
        }
    }
}

/// Predicate in conjunctive normal form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Qualifiers {
    groups: Vec<Vec<Qualifier>>,
}

impl Qualifiers {
    /// Accepts every row
    pub fn none() -> Self {
        Self::default()
    }

    /// Build from OR-groups; empty groups are discarded
    pub fn new(groups: Vec<Vec<Qualifier>>) -> Self {
        Self {
            groups: groups.into_iter().filter(|g| !g.is_empty()).collect(),
        }
    }

    /// A plain conjunction: every qualifier in its own group
    pub fn all(qualifiers: Vec<Qualifier>) -> Self {
        Self {
            groups: qualifiers.into_iter().map(|q| vec![q]).collect(),
        }
    }

    /// AND another OR-group onto the predicate
    pub fn and_any(mut self, group: Vec<Qualifier>) -> Self {
        if !group.is_empty() {
            self.groups.push(group);
        }
        self
    }

    /// Add a single-leaf group
    pub fn and(self, qualifier: Qualifier) -> Self {
        self.and_any(vec![qualifier])
    }

    /// Disjunct groups, all of which must hold
    pub fn groups(&self) -> &[Vec<Qualifier>] {
        &self.groups
    }

    /// Whether there is no group, so every row matches
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of leaves across all groups
    pub fn leaf_count(&self) -> usize {
        self.groups.iter().map(|g| g.len()).sum()
    }

    /// Every leaf, group by group
    pub fn iter(&self) -> impl Iterator<Item = &Qualifier> {
        self.groups.iter().flatten()
    }

    pub(crate) fn from_groups_unchecked(groups: Vec<Vec<Qualifier>>) -> Self {
        Self { groups }
    }
}

/// Result of testing qualifiers against constants
#[derive(Debug, Clone, PartialEq)]
pub enum Pruned {
    /// Qualifiers still to be evaluated per row (possibly none)
    Remaining(Qualifiers),
    /// Some group can never be satisfied
    Unsatisfiable,
}

impl Pruned {
    /// Whether pruning proved no row can match
    pub fn is_unsatisfiable(&self) -> bool {
        matches!(self, Pruned::Unsatisfiable)
    }

    /// The residual predicate, or None when unsatisfiable
    pub fn remaining(self) -> Option<Qualifiers> {
        match self {
            Pruned::Remaining(q) => Some(q),
            Pruned::Unsatisfiable => None,
        }
    }
}

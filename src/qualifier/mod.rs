//! Qualifier rewriting subsystem
//!
//! Copies, remaps, tests and prunes CNF predicate trees. Used both to decide
//! whether a node or source can contribute rows at all and to compute the
//! residual predicate pushed down to each source.
//!
//! # Design Principles
//!
//! - Unsatisfiable predicates are a value (`Pruned::Unsatisfiable`), not an error
//! - Pruning only ever removes leaves whose outcome is decided by constants
//! - Columns a source cannot supply are tested as NULL, never skipped

mod evaluate;
mod prune;
mod pushdown;
mod types;

pub use evaluate::{compare_values, sort_order, RowFilter};
pub use prune::{factor_out_columns, test_and_prune};
pub use pushdown::{
    columns_involved, map_columns, physical_projection, referenced_columns, to_where_clause,
};
pub use types::{CompareOp, Pruned, Qualifier, Qualifiers, UNMAPPED_COLUMN};

//! Query propagation subsystem
//!
//! Gives every query a mesh-wide identity, tracks the hop count at which it
//! reached this node and decides whether to execute and whether to flood on.
//!
//! # Invariants
//!
//! - A node executes a given query at most once
//! - A query is never sent to a node it has already come through
//! - A revisit over a strictly shorter path is re-propagated, never re-executed

mod args;
mod context;
mod tracker;

pub use args::TableArguments;
pub use context::QueryContext;
pub use tracker::{PathPrecedence, PropagationDecision, PropagationTracker};

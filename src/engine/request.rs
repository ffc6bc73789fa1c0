//! Query requests issued at a node

use std::sync::Arc;

use super::errors::EngineResult;
use super::node::Node;
use crate::cursor::QueryCursor;
use crate::qualifier::Qualifiers;

/// A query against one logical table, as issued by a local caller.
///
/// Qualifier and projection column ids index the exposed layout of the
/// table at this node (see `Node::exposed_schema`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRequest {
    pub table: String,
    /// Raw table argument string
    pub arguments: String,
    pub qualifiers: Qualifiers,
    pub projection: Option<Vec<usize>>,
    /// Hint: the cursor is the inner side of a join and will be re-scanned
    pub join_inner: bool,
    pub credentials: Option<String>,
}

impl QueryRequest {
    /// Query on `table` with no arguments, predicate or projection
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Table arguments, e.g. `maxDepth=2, with_provenance`
    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = arguments.into();
        self
    }

    /// Predicate in conjunctive normal form
    pub fn with_qualifiers(mut self, qualifiers: Qualifiers) -> Self {
        self.qualifiers = qualifiers;
        self
    }

    /// Exposed columns to return
    pub fn with_projection(mut self, columns: Vec<usize>) -> Self {
        self.projection = Some(columns);
        self
    }

    /// Hint that the result will be scanned again
    pub fn join_inner(mut self) -> Self {
        self.join_inner = true;
        self
    }

    /// Credentials forwarded with the query
    pub fn with_credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }
}

/// Scan protocol front end: configure, then `open` a cursor
#[derive(Debug)]
pub struct PreparedQuery {
    node: Arc<Node>,
    request: QueryRequest,
}

impl PreparedQuery {
    pub(crate) fn new(node: Arc<Node>, request: QueryRequest) -> Self {
        Self { node, request }
    }

    /// Restrict the returned columns
    pub fn set_projection(&mut self, columns: Vec<usize>) {
        self.request.projection = Some(columns);
    }

    /// Replace the predicate
    pub fn set_predicate(&mut self, qualifiers: Qualifiers) {
        self.request.qualifiers = qualifiers;
    }

    /// Set or clear the re-scan hint
    pub fn set_join_inner(&mut self, join_inner: bool) {
        self.request.join_inner = join_inner;
    }

    /// Request as configured so far
    pub fn request(&self) -> &QueryRequest {
        &self.request
    }

    /// Execute the request and open a cursor
    pub fn open(&self) -> EngineResult<QueryCursor> {
        self.node.execute(self.request.clone())
    }
}

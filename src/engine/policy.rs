//! Access policy hook
//!
//! Consulted for every forwarded query before anything executes. A denial
//! fails the invocation with `MESH_ACCESS_RESTRICTED`.

use std::collections::HashSet;

/// Decides whether forwarded queries may run on this node
pub trait AccessPolicy: Send + Sync {
    /// May a query forwarded by `node` run here
    fn allow_forwarding_node(&self, node: &str) -> bool;

    /// May a query that travelled along `path` run here
    fn allow_query_path(&self, path: &[String]) -> bool;
}

/// Default policy
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn allow_forwarding_node(&self, _node: &str) -> bool {
        true
    }

    fn allow_query_path(&self, _path: &[String]) -> bool {
        true
    }
}

/// Rejects queries forwarded by, or routed through, the listed nodes
#[derive(Debug, Default, Clone)]
pub struct DenyNodes {
    denied: HashSet<String>,
}

impl DenyNodes {
    /// Deny the listed node ids
    pub fn new<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            denied: nodes.into_iter().map(Into::into).collect(),
        }
    }
}

impl AccessPolicy for DenyNodes {
    fn allow_forwarding_node(&self, node: &str) -> bool {
        !self.denied.contains(node)
    }

    fn allow_query_path(&self, path: &[String]) -> bool {
        !path.iter().any(|n| self.denied.contains(n))
    }
}

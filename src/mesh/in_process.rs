//! Nodes wired together inside one process

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

use crate::cache::{Clock, SystemClock};
use crate::config::MeshConfig;
use crate::engine::{EngineError, EngineResult, ForwardedQuery, Node, PeerResult, PeerTransport};
use crate::observability::Event;

/// Delivers forwarded queries by calling the peer node directly
#[derive(Default)]
struct LocalTransport {
    nodes: RwLock<HashMap<String, Weak<Node>>>,
    /// Severed links, stored both ways round
    down: RwLock<HashSet<(String, String)>>,
}

impl PeerTransport for LocalTransport {
    fn forward(&self, peer: &str, query: ForwardedQuery) -> EngineResult<PeerResult> {
        let link = (query.forwarding_node.clone(), peer.to_string());
        if self.down.read().contains(&link) {
            return Err(EngineError::peer_unavailable(peer, "link is down"));
        }
        let node = self
            .nodes
            .read()
            .get(peer)
            .and_then(Weak::upgrade)
            .ok_or_else(|| EngineError::peer_unavailable(peer, "no such node"))?;
        debug!(
            target: "engine",
            from = %query.forwarding_node,
            to = %peer,
            hop = query.hop_count,
            "delivering forwarded query"
        );
        node.receive(query)
    }
}

/// An in-process mesh built from a `MeshConfig`
pub struct Mesh {
    nodes: BTreeMap<String, Arc<Node>>,
    transport: Arc<LocalTransport>,
}

impl Mesh {
    /// Mesh with no nodes
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            transport: Arc::new(LocalTransport::default()),
        }
    }

    /// Build every node of `config` and link them
    pub fn from_config(config: &MeshConfig) -> EngineResult<Self> {
        Self::from_config_with_clock(config, Arc::new(SystemClock))
    }

    /// Build every node of `config` on a shared clock
    pub fn from_config_with_clock(config: &MeshConfig, clock: Arc<dyn Clock>) -> EngineResult<Self> {
        config.validate()?;
        let mut mesh = Self::new();
        for node in &config.nodes {
            mesh.add_node(Node::with_clock(node.clone(), Arc::clone(&clock))?);
        }
        info!(
            target: "engine",
            event = Event::ConfigLoaded.as_str(),
            nodes = mesh.nodes.len(),
            "mesh assembled"
        );
        Ok(mesh)
    }

    /// Register a node and connect it to the mesh transport
    pub fn add_node(&mut self, node: Node) -> Arc<Node> {
        let node = Arc::new(node);
        let transport: Arc<dyn PeerTransport> = self.transport.clone();
        node.set_transport(transport);
        self.transport
            .nodes
            .write()
            .insert(node.node_id().to_string(), Arc::downgrade(&node));
        self.nodes.insert(node.node_id().to_string(), Arc::clone(&node));
        node
    }

    /// Node with this id
    pub fn node(&self, id: &str) -> Option<&Arc<Node>> {
        self.nodes.get(id)
    }

    /// Ids of every node, sorted
    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    /// Every node, in id order
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<Node>> {
        self.nodes.values()
    }

    /// Make forwarding between `a` and `b` fail in both directions
    pub fn disconnect(&self, a: &str, b: &str) {
        let mut down = self.transport.down.write();
        down.insert((a.to_string(), b.to_string()));
        down.insert((b.to_string(), a.to_string()));
    }

    /// Restore a link taken down by `disconnect`
    pub fn reconnect(&self, a: &str, b: &str) {
        let mut down = self.transport.down.write();
        down.remove(&(a.to_string(), b.to_string()));
        down.remove(&(b.to_string(), a.to_string()));
    }

    /// Cancel a query's cursors on every node
    pub fn cancel_query(&self, query_id: &str) -> usize {
        self.nodes.values().map(|n| n.cancel_query(query_id)).sum()
    }
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Mesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mesh")
            .field("nodes", &self.node_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::engine::QueryRequest;

    fn line() -> MeshConfig {
        let mut a = NodeConfig::new("A");
        a.peers = vec!["B".into()];
        a.logical_tables.insert("LT0".into(), "V INTEGER".into());
        let mut b = NodeConfig::new("B");
        b.peers = vec!["A".into()];
        b.logical_tables.insert("LT0".into(), "V INTEGER".into());
        MeshConfig { nodes: vec![a, b] }
    }

    #[test]
    fn test_from_config_wires_nodes() {
        let mesh = Mesh::from_config(&line()).unwrap();
        assert_eq!(mesh.node_ids(), vec!["A", "B"]);
        mesh.node("A")
            .unwrap()
            .execute(QueryRequest::new("LT0"))
            .unwrap()
            .collect_rows()
            .unwrap();
        assert_eq!(mesh.node("B").unwrap().metrics().local_executions(), 1);
    }

    #[test]
    fn test_down_link_is_skipped() {
        let mesh = Mesh::from_config(&line()).unwrap();
        mesh.disconnect("A", "B");
        let mut cursor = mesh.node("A").unwrap().execute(QueryRequest::new("LT0")).unwrap();
        assert!(cursor.collect_rows().unwrap().is_empty());
        assert_eq!(mesh.node("B").unwrap().metrics().local_executions(), 0);

        mesh.reconnect("A", "B");
        mesh.node("A").unwrap().execute(QueryRequest::new("LT0")).unwrap();
        assert_eq!(mesh.node("B").unwrap().metrics().local_executions(), 1);
    }
}

//! Query identity and hop tracking
//!
//! Every node remembers, per query id, the smallest hop count at which the
//! query has reached it and the set of nodes it has already come through.
//! The first decides whether a revisit is worth re-propagating; the second
//! keeps the flood from being sent back where it came from.
//!
//! State is split into independently locked shards keyed by a hash of the
//! query id, so unrelated queries never wait on each other for long.

use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use tracing::{debug, info};
use uuid::Uuid;

use super::context::QueryContext;
use crate::config::PropagationConfig;
use crate::observability::Event;

/// How a visit compares with earlier visits of the same query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathPrecedence {
    /// First time the query reached this node
    First,
    /// Reached again over a strictly shorter path
    Shorter,
    /// Reached again over an equal or longer path
    Longer,
}

impl PathPrecedence {
    /// Letter used in the explain precedence column
    pub fn as_char(&self) -> char {
        match self {
            PathPrecedence::First => 'F',
            PathPrecedence::Shorter => 'S',
            PathPrecedence::Longer => 'L',
        }
    }

    /// Parse an explain precedence letter
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'F' => Some(PathPrecedence::First),
            'S' => Some(PathPrecedence::Shorter),
            'L' => Some(PathPrecedence::Longer),
            _ => None,
        }
    }
}

/// Outcome of resolving one visit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationDecision {
    pub query_id: String,
    pub hop_count: u32,
    pub execute_local: bool,
    pub propagate: bool,
    pub precedence: PathPrecedence,
}

impl PropagationDecision {
    /// Neither executes nor propagates: the invocation returns no rows
    pub fn is_rejected(&self) -> bool {
        !self.execute_local && !self.propagate
    }
}

#[derive(Debug, Default)]
struct Shard {
    min_hops: HashMap<String, u32>,
    senders: HashMap<String, HashSet<String>>,
    /// Insertion order, for eviction
    order: VecDeque<String>,
}

impl Shard {
    fn track(&mut self, query_id: &str, hop: u32, capacity: usize) {
        while self.order.len() >= capacity {
            match self.order.pop_front() {
                Some(old) => {
                    self.min_hops.remove(&old);
                    self.senders.remove(&old);
                }
                None => break,
            }
        }
        self.min_hops.insert(query_id.to_string(), hop);
        self.order.push_back(query_id.to_string());
    }

    fn merge_senders(&mut self, query_id: &str, path: &[String]) {
        let seen = self.senders.entry(query_id.to_string()).or_default();
        seen.extend(path.iter().cloned());
    }
}

/// Sharded per-query propagation state for one node
pub struct PropagationTracker {
    node_id: String,
    shards: Vec<Mutex<Shard>>,
    capacity_per_shard: usize,
}

impl PropagationTracker {
    /// Tracker for `node_id`
    pub fn new(node_id: impl Into<String>, config: &PropagationConfig) -> Self {
        let shard_count = config.shards.max(1);
        let capacity_per_shard = (config.tracked_queries / shard_count).max(1);
        Self {
            node_id: node_id.into(),
            shards: (0..shard_count).map(|_| Mutex::new(Shard::default())).collect(),
            capacity_per_shard,
        }
    }

    fn shard(&self, query_id: &str) -> &Mutex<Shard> {
        let mut hasher = DefaultHasher::new();
        query_id.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }

    /// Decide whether to execute locally and whether to propagate.
    ///
    /// At the origin (empty query id) a fresh id is minted into `ctx`.
    /// The visited path is merged into the senders seen in every case.
    pub fn resolve(&self, ctx: &mut QueryContext, max_depth: Option<u32>) -> PropagationDecision {
        if ctx.query_id.is_empty() {
            ctx.query_id = Uuid::new_v4().to_string();
            ctx.hop_count = 0;
            if !ctx.visited_path.iter().any(|n| n == &self.node_id) {
                ctx.visited_path.push(self.node_id.clone());
            }

            let mut shard = self.shard(&ctx.query_id).lock();
            shard.track(&ctx.query_id, 0, self.capacity_per_shard);
            shard.merge_senders(&ctx.query_id, &ctx.visited_path);

            info!(
                target: "propagation",
                event = Event::QueryOriginated.as_str(),
                node = %self.node_id,
                query_id = %ctx.query_id,
                "query originated"
            );
            let propagate = max_depth.map_or(true, |d| d > 0);
            return PropagationDecision {
                query_id: ctx.query_id.clone(),
                hop_count: 0,
                execute_local: true,
                propagate,
                precedence: PathPrecedence::First,
            };
        }

        let hop = ctx.hop_count;
        let mut shard = self.shard(&ctx.query_id).lock();
        shard.merge_senders(&ctx.query_id, &ctx.visited_path);
        if let Some(forwarder) = &ctx.forwarding_node {
            shard.merge_senders(&ctx.query_id, std::slice::from_ref(forwarder));
        }

        let previous = shard.min_hops.get(&ctx.query_id).copied();
        match previous {
            None => {
                shard.track(&ctx.query_id, hop, self.capacity_per_shard);
                let depth_reached = max_depth.map_or(false, |d| hop >= d);
                if depth_reached {
                    debug!(
                        target: "propagation",
                        event = Event::DepthLimitReached.as_str(),
                        node = %self.node_id,
                        query_id = %ctx.query_id,
                        hop,
                        "depth limit reached, peers pruned"
                    );
                }
                PropagationDecision {
                    query_id: ctx.query_id.clone(),
                    hop_count: hop,
                    execute_local: true,
                    propagate: !depth_reached,
                    precedence: PathPrecedence::First,
                }
            }
            Some(prev) if hop < prev => {
                shard.min_hops.insert(ctx.query_id.clone(), hop);
                info!(
                    target: "propagation",
                    event = Event::ShorterPathFound.as_str(),
                    node = %self.node_id,
                    query_id = %ctx.query_id,
                    previous = prev,
                    hop,
                    "shorter path found, re-propagating"
                );
                PropagationDecision {
                    query_id: ctx.query_id.clone(),
                    hop_count: hop,
                    execute_local: false,
                    propagate: max_depth.map_or(true, |d| hop < d),
                    precedence: PathPrecedence::Shorter,
                }
            }
            Some(prev) => {
                info!(
                    target: "propagation",
                    event = Event::LoopRejected.as_str(),
                    node = %self.node_id,
                    query_id = %ctx.query_id,
                    previous = prev,
                    hop,
                    "loop rejected"
                );
                PropagationDecision {
                    query_id: ctx.query_id.clone(),
                    hop_count: hop,
                    execute_local: false,
                    propagate: false,
                    precedence: PathPrecedence::Longer,
                }
            }
        }
    }

    /// Whether `peer` may receive the query from this node
    pub fn should_forward_to(&self, query_id: &str, peer: &str, forwarding_node: Option<&str>) -> bool {
        if peer == self.node_id || forwarding_node == Some(peer) {
            return false;
        }
        let shard = self.shard(query_id).lock();
        !shard
            .senders
            .get(query_id)
            .map_or(false, |seen| seen.contains(peer))
    }

    /// Filter `peers` down to the ones the query may be sent to
    pub fn eligible_peers(
        &self,
        query_id: &str,
        peers: &[String],
        forwarding_node: Option<&str>,
    ) -> Vec<String> {
        peers
            .iter()
            .filter(|p| self.should_forward_to(query_id, p, forwarding_node))
            .cloned()
            .collect()
    }

    /// Record nodes the query is known to have reached
    pub fn record_senders(&self, query_id: &str, nodes: &[String]) {
        self.shard(query_id).lock().merge_senders(query_id, nodes);
    }

    /// Nodes that have forwarded this query here
    pub fn senders_seen(&self, query_id: &str) -> HashSet<String> {
        self.shard(query_id)
            .lock()
            .senders
            .get(query_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Fewest hops this query has arrived with
    pub fn min_hops(&self, query_id: &str) -> Option<u32> {
        self.shard(query_id).lock().min_hops.get(query_id).copied()
    }

    /// Number of query ids currently tracked
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().min_hops.len()).sum()
    }

    /// Whether no query is tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Id of the owning node
    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}

impl std::fmt::Debug for PropagationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropagationTracker")
            .field("node_id", &self.node_id)
            .field("shards", &self.shards.len())
            .finish()
    }
}

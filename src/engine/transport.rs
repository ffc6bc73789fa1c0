//! Peer transport seam
//!
//! The engine hands a forwarded query to a `PeerTransport` and merges
//! whatever rows come back. Columns travel by name: the receiver resolves
//! qualifier and projection columns against its own layout, and the sender
//! maps result rows back into its exposed layout.

use serde::{Deserialize, Serialize};

use super::errors::EngineResult;
use crate::qualifier::Qualifiers;
use crate::source::RowStream;

/// A query as received by the next hop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardedQuery {
    pub table: String,
    pub query_id: String,
    /// Hop count at the receiver
    pub hop_count: u32,
    pub forwarding_node: String,
    /// Data column definition of the sender
    pub definition: String,
    /// Sender's exposed column names; qualifier ids index into these
    pub column_names: Vec<String>,
    pub qualifiers: Qualifiers,
    /// Requested column names; all columns when absent
    pub projection: Option<Vec<String>>,
    /// Rendered table arguments for the next hop
    pub arguments: String,
    pub credentials: Option<String>,
}

/// Rows returned by a peer
pub struct PeerResult {
    /// Peer's exposed column names, positional against `rows`
    pub column_names: Vec<String>,
    pub rows: RowStream,
}

impl std::fmt::Debug for PeerResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerResult")
            .field("column_names", &self.column_names)
            .finish()
    }
}

/// Delivers forwarded queries to peer nodes
pub trait PeerTransport: Send + Sync {
    fn forward(&self, peer: &str, query: ForwardedQuery) -> EngineResult<PeerResult>;
}

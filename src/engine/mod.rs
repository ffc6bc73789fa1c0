//! Query engine
//!
//! A `Node` ties the subsystems together for one member of the mesh:
//! it reconciles schemas, tracks propagation, prunes and scans local
//! sources, forwards to peers and hands back a cursor over the merged rows.
//!
//! # Error Model
//!
//! - Configuration and schema errors fail the invocation
//! - A loop rejection is an empty result
//! - An access restriction anywhere downstream fails the whole query
//! - Other failing sources and peers are logged and skipped

mod errors;
mod explain;
mod node;
mod policy;
mod request;
mod transport;

pub use errors::{EngineError, EngineErrorCode, EngineResult, Severity};
pub use explain::{to_dot, write_dot, ExplainRow, ORIGIN_LABEL};
pub use node::Node;
pub use policy::{AccessPolicy, AllowAll, DenyNodes};
pub use request::{PreparedQuery, QueryRequest};
pub use transport::{ForwardedQuery, PeerResult, PeerTransport};

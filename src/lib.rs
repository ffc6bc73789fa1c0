//! meshquery - per-node query execution and propagation for a federated
//! logical-table mesh
//!
//! Every node exposes logical tables backed by local sources and by its
//! peers. A query issued at one node floods through the mesh, each node
//! executing it at most once, and the merged rows come back through a
//! cursor at the origin.

pub mod cache;
pub mod cli;
pub mod config;
pub mod cursor;
pub mod engine;
pub mod mesh;
pub mod observability;
pub mod propagation;
pub mod qualifier;
pub mod schema;
pub mod source;

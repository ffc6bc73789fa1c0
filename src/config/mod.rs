//! Configuration for nodes and in-process meshes
//!
//! Loaded from JSON. Every section has defaults so a node needs little more
//! than an id; `validate()` runs before anything is constructed from it.

mod errors;
mod node;
mod settings;

pub use errors::{ConfigError, ConfigResult};
pub use node::{InstanceConfig, MeshConfig, NodeConfig, SourceConfig};
pub use settings::{CacheConfig, CursorConfig, PropagationConfig};

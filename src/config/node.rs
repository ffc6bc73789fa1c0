//! Node and mesh configuration files
//!
//! A mesh file lists nodes; each node declares its logical tables, the
//! local sources backing them and the peers it is connected to.
//!
//! ```json
//! {
//!   "nodes": [
//!     {
//!       "node_id": "A",
//!       "max_propagation": 2,
//!       "logical_tables": { "LT0": "LOC VARCHAR(20), AMOUNT INTEGER" },
//!       "sources": [
//!         { "id": "A_DS0", "table": "LT0", "definition": "LOC VARCHAR(20), AMOUNT INTEGER",
//!           "rows": [["x", 1]] }
//!       ],
//!       "peers": ["B"]
//!     }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use super::errors::{ConfigError, ConfigResult};
use super::settings::{CacheConfig, CursorConfig, PropagationConfig};
use crate::schema::parse_definition;

fn default_max_propagation() -> i32 {
    -1
}

/// One endpoint of a pluralized source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub id: String,
    /// Logical column name -> constant value for this endpoint
    #[serde(default)]
    pub constants: BTreeMap<String, Value>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

/// A local leaf source backing a logical table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    /// Logical table this source contributes to
    pub table: String,
    /// Physical column definition of the source
    pub definition: String,
    /// Inline rows, positional against `definition`
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
    /// Logical column name -> physical column name; by name when absent
    #[serde(default)]
    pub column_mapping: BTreeMap<String, String>,
    /// Endpoint instances; a non-empty list makes the source pluralized
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,
    /// Serve repeated scans from the durable cache
    #[serde(default)]
    pub cached: bool,
    /// Extra discriminator for the cache signature
    #[serde(default)]
    pub cache_extension: Option<String>,
}

/// Configuration of a single node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node_id: String,

    /// Maximum hop count; negative means unlimited
    #[serde(default = "default_max_propagation")]
    pub max_propagation: i32,

    #[serde(default)]
    pub propagation: PropagationConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub cursor: CursorConfig,

    /// Logical table name -> definition text
    #[serde(default)]
    pub logical_tables: BTreeMap<String, String>,

    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Directly connected peer node ids
    #[serde(default)]
    pub peers: Vec<String>,
}

impl NodeConfig {
    /// Minimal config with defaults for everything but the id
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            max_propagation: default_max_propagation(),
            propagation: PropagationConfig::default(),
            cache: CacheConfig::default(),
            cursor: CursorConfig::default(),
            logical_tables: BTreeMap::new(),
            sources: Vec::new(),
            peers: Vec::new(),
        }
    }

    /// Depth limit as an option
    pub fn max_depth(&self) -> Option<u32> {
        u32::try_from(self.max_propagation).ok()
    }

    /// Validate the node in isolation
    pub fn validate(&self) -> ConfigResult<()> {
        if self.node_id.trim().is_empty() {
            return Err(ConfigError::invalid("node_id must not be empty"));
        }
        if self.node_id.contains(char::is_whitespace) {
            return Err(ConfigError::invalid(format!(
                "node_id '{}' must not contain whitespace",
                self.node_id
            )));
        }
        if self.propagation.shards == 0 {
            return Err(ConfigError::invalid("propagation.shards must be > 0"));
        }
        if self.propagation.tracked_queries == 0 {
            return Err(ConfigError::invalid("propagation.tracked_queries must be > 0"));
        }
        if self.cache.batch_size == 0 {
            return Err(ConfigError::invalid("cache.batch_size must be > 0"));
        }
        if self.cursor.spill_threshold_rows == 0 {
            return Err(ConfigError::invalid("cursor.spill_threshold_rows must be > 0"));
        }
        if self.cursor.max_live_cursors == Some(0) {
            return Err(ConfigError::invalid("cursor.max_live_cursors must be > 0"));
        }

        for (table, definition) in &self.logical_tables {
            parse_definition(table, definition)
                .map_err(|e| ConfigError::invalid(format!("logical table {}: {}", table, e)))?;
        }

        let mut ids = HashSet::new();
        for source in &self.sources {
            if !ids.insert(source.id.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate source id '{}' on node {}",
                    source.id, self.node_id
                )));
            }
            if !self
                .logical_tables
                .keys()
                .any(|t| t.eq_ignore_ascii_case(&source.table))
            {
                return Err(ConfigError::invalid(format!(
                    "source '{}' backs undefined logical table '{}'",
                    source.id, source.table
                )));
            }
            let physical = parse_definition(&source.id, &source.definition)
                .map_err(|e| ConfigError::invalid(format!("source {}: {}", source.id, e)))?;
            let width = physical.exposed_count();
            let all_rows = source
                .rows
                .iter()
                .chain(source.instances.iter().flat_map(|i| i.rows.iter()));
            for row in all_rows {
                if row.len() != width {
                    return Err(ConfigError::invalid(format!(
                        "source '{}' has a row of width {} but {} columns",
                        source.id,
                        row.len(),
                        width
                    )));
                }
            }
        }

        if self.peers.iter().any(|p| p == &self.node_id) {
            return Err(ConfigError::invalid(format!(
                "node {} lists itself as a peer",
                self.node_id
            )));
        }
        Ok(())
    }
}

/// A set of nodes run in one process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    pub nodes: Vec<NodeConfig>,
}

impl MeshConfig {
    /// Load and validate a mesh file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse a mesh file from JSON text and validate it
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: MeshConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every node, and that node ids are unique
    pub fn validate(&self) -> ConfigResult<()> {
        if self.nodes.is_empty() {
            return Err(ConfigError::invalid("mesh has no nodes"));
        }
        let mut ids = HashSet::new();
        for node in &self.nodes {
            node.validate()?;
            if !ids.insert(node.node_id.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate node id '{}'",
                    node.node_id
                )));
            }
        }
        for node in &self.nodes {
            if let Some(unknown) = node.peers.iter().find(|p| !ids.contains(p.as_str())) {
                return Err(ConfigError::invalid(format!(
                    "node {} links to unknown peer '{}'",
                    node.node_id, unknown
                )));
            }
        }
        Ok(())
    }

    /// Configuration of the node with this id
    pub fn node(&self, id: &str) -> Option<&NodeConfig> {
        self.nodes.iter().find(|n| n.node_id == id)
    }
}

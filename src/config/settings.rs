//! Tunables for propagation tracking, caching and cursors
//!
//! Each section can be deserialized independently and falls back to its
//! `Default` when omitted from the config file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Propagation tracker sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    /// Query ids remembered before the oldest are forgotten
    pub tracked_queries: usize,
    /// Lock shards for the tracker maps
    pub shards: usize,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            tracked_queries: 1000,
            shards: 16,
        }
    }
}

/// Durable cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether caching adapters may use the durable cache
    pub enabled: bool,
    /// Freshness window for adapter cache tables
    pub expiry_seconds: u64,
    /// Directory for file-backed cache tables; in-memory when absent
    pub directory: Option<PathBuf>,
    /// Rows per insert batch
    pub batch_size: usize,
    /// Prefix shared by every cache table name
    pub table_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            expiry_seconds: 60,
            directory: None,
            batch_size: 500,
            table_prefix: "MESH_CACHE".to_string(),
        }
    }
}

impl CacheConfig {
    /// Defaults, with caching switched on
    pub fn enabled() -> Self {
        Self::default()
    }

    /// Defaults, with caching switched off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Freshness window in milliseconds
    pub fn expiry_ms(&self) -> i64 {
        (self.expiry_seconds as i64).saturating_mul(1000)
    }
}

/// Query cursor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CursorConfig {
    /// Allow buffering for join re-scans at the originating node
    pub buffering_enabled: bool,
    /// Buffered rows kept in memory before spilling to a cache table
    pub spill_threshold_rows: usize,
    /// Freshness window for spilled cursor tables
    pub spill_expiry_seconds: u64,
    /// Cancel cursors older than this; no timeout when absent
    pub query_timeout_ms: Option<u64>,
    /// Refuse new cursors beyond this many live ones; unbounded when absent
    pub max_live_cursors: Option<usize>,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            buffering_enabled: true,
            spill_threshold_rows: 1000,
            spill_expiry_seconds: 10,
            query_timeout_ms: None,
            max_live_cursors: None,
        }
    }
}

impl CursorConfig {
    /// Defaults, with join-inner buffering switched on
    pub fn enabled() -> Self {
        Self::default()
    }

    /// Defaults, with buffering switched off
    pub fn disabled() -> Self {
        Self {
            buffering_enabled: false,
            ..Self::default()
        }
    }

    /// Spill table lifetime in milliseconds
    pub fn spill_expiry_ms(&self) -> i64 {
        (self.spill_expiry_seconds as i64).saturating_mul(1000)
    }
}

//! Engine counters
//!
//! - Counters only, monotonic
//! - Reset only when the node is constructed
//! - Relaxed atomics; metrics never influence execution

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-node operational counters
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    queries_received: AtomicU64,
    loops_rejected: AtomicU64,
    local_executions: AtomicU64,
    queries_forwarded: AtomicU64,
    sources_pruned: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    rows_spilled: AtomicU64,
    cursors_cancelled: AtomicU64,
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub queries_received: u64,
    pub loops_rejected: u64,
    pub local_executions: u64,
    pub queries_forwarded: u64,
    pub sources_pruned: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub rows_spilled: u64,
    pub cursors_cancelled: u64,
}

impl MetricsRegistry {
    /// Registry with every counter at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// A query arrived, from a client or a peer
    pub fn increment_queries_received(&self) {
        self.queries_received.fetch_add(1, Ordering::Relaxed);
    }

    /// A visit was rejected as a loop
    pub fn increment_loops_rejected(&self) {
        self.loops_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Local sources were scanned for a query
    pub fn increment_local_executions(&self) {
        self.local_executions.fetch_add(1, Ordering::Relaxed);
    }

    /// A query was handed to a peer
    pub fn increment_queries_forwarded(&self) {
        self.queries_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Sources or instances removed by constant pruning
    pub fn add_sources_pruned(&self, count: u64) {
        self.sources_pruned.fetch_add(count, Ordering::Relaxed);
    }

    /// A scan was served from a cache table
    pub fn increment_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// A scan was fetched from its source and cached
    pub fn increment_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Rows moved from a cursor buffer to a cache table
    pub fn add_rows_spilled(&self, rows: u64) {
        self.rows_spilled.fetch_add(rows, Ordering::Relaxed);
    }

    /// A cursor was cancelled or timed out
    pub fn increment_cursors_cancelled(&self) {
        self.cursors_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of local executions so far
    pub fn local_executions(&self) -> u64 {
        self.local_executions.load(Ordering::Relaxed)
    }

    /// Number of rejected loops so far
    pub fn loops_rejected(&self) -> u64 {
        self.loops_rejected.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries_received: self.queries_received.load(Ordering::Relaxed),
            loops_rejected: self.loops_rejected.load(Ordering::Relaxed),
            local_executions: self.local_executions.load(Ordering::Relaxed),
            queries_forwarded: self.queries_forwarded.load(Ordering::Relaxed),
            sources_pruned: self.sources_pruned.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            rows_spilled: self.rows_spilled.load(Ordering::Relaxed),
            cursors_cancelled: self.cursors_cancelled.load(Ordering::Relaxed),
        }
    }
}

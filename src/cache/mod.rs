//! Durable cache subsystem
//!
//! Cache tables outlive a single invocation. Adapters use them to avoid
//! re-fetching slow sources; cursors use them to spill buffered rows.
//!
//! # Invariants
//!
//! - A table is read only while fresh
//! - Rows are inserted, deleted or dropped only under the table's lock
//! - The sweep never blocks and never touches a table in use
//! - Every table carrying the cache prefix is dropped at startup

mod clock;
mod durable;
mod errors;
mod file_store;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use durable::{CacheEntry, DurableCache, SweepReport, TableLock};
pub use errors::{CacheError, CacheResult};
pub use file_store::FileCacheStore;
pub use store::{CacheStore, InsertReport, MemoryCacheStore, TableLayout};

use std::sync::Arc;

use crate::config::CacheConfig;

/// Build the cache for a node: file-backed when a directory is configured
pub fn open_cache(config: &CacheConfig, clock: Arc<dyn Clock>) -> CacheResult<DurableCache> {
    let store: Arc<dyn CacheStore> = match &config.directory {
        Some(dir) => Arc::new(FileCacheStore::open(dir)?),
        None => Arc::new(MemoryCacheStore::new()),
    };
    DurableCache::open(store, clock, config)
}

//! Durable cache tables with expiry, use counts and per-table locks
//!
//! The registry is itself a table in the store: one row per cache table
//! holding `[name, last_reset_ms, expiry_ms]`. Registry mutation is guarded
//! by the creation lock; row mutation in a cache table is guarded by that
//! table's re-entrant lock.
//!
//! A table is fresh while `now < last_reset + expiry`. A `last_reset` of -1
//! means the table has never been populated or was invalidated.
//!
//! Within a fresh table, rows are grouped by a caller-chosen key. A key is
//! only served once it is marked complete; markers are cleared whenever the
//! table is reset, invalidated, swept or dropped.
//!
//! Lock entries outlive the table they guard for as long as any caller still
//! holds them, so a table never has two live locks.

use parking_lot::{Mutex, ReentrantMutex};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::errors::{CacheError, CacheResult};
use super::store::{CacheStore, InsertReport, TableLayout};
use crate::config::CacheConfig;
use crate::observability::Event;
use crate::qualifier::{Qualifiers, RowFilter};
use crate::schema::Row;

const REGISTRY_SUFFIX: &str = "EXPIRES";
const NEVER_RESET: i64 = -1;

/// Lock guarding row mutation in one cache table
pub type TableLock = Arc<ReentrantMutex<()>>;

/// Registry row for one cache table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    pub last_reset_ms: i64,
    pub expiry_ms: i64,
}

impl CacheEntry {
    /// Whether a table reset at `last_reset_ms` is still fresh at `now_ms`
    pub fn is_fresh_at(&self, now_ms: i64, expiry_ms: i64) -> bool {
        self.last_reset_ms >= 0 && now_ms < self.last_reset_ms.saturating_add(expiry_ms)
    }
}

/// Tables emptied by one sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub swept: Vec<String>,
    /// In use, locked by someone else or still fresh
    pub skipped: usize,
}

/// Process-wide cache table manager
pub struct DurableCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    prefix: String,
    registry: String,
    batch_size: usize,
    creation_lock: Mutex<()>,
    locks: Mutex<HashMap<String, TableLock>>,
    in_use: Mutex<HashMap<String, u64>>,
    populated: Mutex<HashMap<String, HashSet<i64>>>,
    suffix: AtomicU64,
    errors: Mutex<BTreeMap<&'static str, u64>>,
}

impl DurableCache {
    /// Open the cache, dropping every table left over from a previous run
    pub fn open(
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        config: &CacheConfig,
    ) -> CacheResult<Self> {
        let prefix = config.table_prefix.clone();
        let registry = format!("{}_{}", prefix, REGISTRY_SUFFIX);

        let mut dropped = 0usize;
        for table in store.list_tables()? {
            if table.starts_with(&format!("{}_", prefix)) && store.drop_table(&table)? {
                dropped += 1;
            }
        }
        store.create_table(&registry, &TableLayout::new(3, vec![0]))?;
        info!(
            target: "cache",
            event = Event::CacheSweep.as_str(),
            prefix = %prefix,
            dropped,
            "cache tables dropped at startup"
        );

        Ok(Self {
            store,
            clock,
            prefix,
            registry,
            batch_size: config.batch_size.max(1),
            creation_lock: Mutex::new(()),
            locks: Mutex::new(HashMap::new()),
            in_use: Mutex::new(HashMap::new()),
            populated: Mutex::new(HashMap::new()),
            suffix: AtomicU64::new(0),
            errors: Mutex::new(BTreeMap::new()),
        })
    }

    /// Current time on the cache clock
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Name prefix shared by every table this cache owns
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Next unused table name, `<prefix>_<N>`
    pub fn next_table_name(&self) -> String {
        let n = self.suffix.fetch_add(1, Ordering::SeqCst);
        format!("{}_{}", self.prefix, n)
    }

    /// Hex sha256 over the parts, used to key cached schemas
    pub fn signature(parts: &[&str]) -> String {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }

    /// Numeric row discriminator derived from a key, for `CACHEID` columns
    pub fn cache_id(key: &str) -> i64 {
        let digest = Sha256::digest(key.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        i64::from_be_bytes(bytes) & i64::MAX
    }

    // ==================
    // Registry
    // ==================

    fn registry_entry(&self, table: &str) -> CacheResult<Option<CacheEntry>> {
        let rows = self.store.scan(&self.registry)?;
        Ok(rows
            .iter()
            .find(|r| r.first().and_then(Value::as_str) == Some(table))
            .map(|r| CacheEntry {
                last_reset_ms: r.get(1).and_then(Value::as_i64).unwrap_or(NEVER_RESET),
                expiry_ms: r.get(2).and_then(Value::as_i64).unwrap_or(0),
            }))
    }

    fn write_registry(&self, table: &str, entry: CacheEntry) -> CacheResult<()> {
        let _guard = self.creation_lock.lock();
        self.store
            .delete_where(&self.registry, &|r: &Row| r.first().and_then(Value::as_str) == Some(table))?;
        let report = self.store.insert_rows(
            &self.registry,
            &[vec![json!(table), json!(entry.last_reset_ms), json!(entry.expiry_ms)]],
        )?;
        match report.errors.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn remove_registry(&self, table: &str) -> CacheResult<()> {
        let _guard = self.creation_lock.lock();
        self.store
            .delete_where(&self.registry, &|r: &Row| r.first().and_then(Value::as_str) == Some(table))?;
        Ok(())
    }

    /// Registry row for `table`, if it is registered
    pub fn entry(&self, table: &str) -> CacheResult<Option<CacheEntry>> {
        self.registry_entry(table)
    }

    /// Registered table names
    pub fn tables(&self) -> CacheResult<Vec<String>> {
        let rows = self.store.scan(&self.registry)?;
        Ok(rows
            .iter()
            .filter_map(|r| r.first().and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    // ==================
    // Table lifecycle
    // ==================

    /// Create the backing table and its registry row if missing.
    ///
    /// Returns whether both already existed. New tables start stale.
    pub fn ensure_table(&self, table: &str, layout: &TableLayout, expiry_ms: i64) -> CacheResult<bool> {
        let _guard = self.creation_lock.lock();
        let created = self.store.create_table(table, layout)?;
        let registered = self.registry_entry(table)?.is_some();
        if !registered {
            self.store.insert_rows(
                &self.registry,
                &[vec![json!(table), json!(NEVER_RESET), json!(expiry_ms)]],
            )?;
        }
        if created {
            debug!(
                target: "cache",
                event = Event::CacheTableCreated.as_str(),
                table,
                width = layout.width,
                "cache table created"
            );
        }
        self.in_use.lock().entry(table.to_string()).or_insert(0);
        Ok(!created && registered)
    }

    /// Whether `table` was reset less than `expiry_ms` ago
    pub fn is_fresh(&self, table: &str, expiry_ms: i64) -> CacheResult<bool> {
        let now = self.clock.now_ms();
        Ok(self
            .registry_entry(table)?
            .map_or(false, |e| e.is_fresh_at(now, expiry_ms)))
    }

    /// Adjust the use count; never drops below zero. Returns the new count.
    pub fn mark_in_use(&self, table: &str, delta: i64) -> u64 {
        let mut in_use = self.in_use.lock();
        let count = in_use.entry(table.to_string()).or_insert(0);
        *count = if delta >= 0 {
            count.saturating_add(delta as u64)
        } else {
            count.saturating_sub(delta.unsigned_abs())
        };
        *count
    }

    /// Current use count of `table`
    pub fn in_use(&self, table: &str) -> u64 {
        self.in_use.lock().get(table).copied().unwrap_or(0)
    }

    /// The name-keyed re-entrant lock for `table`
    pub fn lock_for(&self, table: &str) -> TableLock {
        self.locks
            .lock()
            .entry(table.to_string())
            .or_insert_with(|| Arc::new(ReentrantMutex::new(())))
            .clone()
    }

    /// Forget the lock for `table` unless a caller still holds it.
    ///
    /// The count is checked under the map lock, which `lock_for` also takes,
    /// so no new holder can appear between the check and the removal.
    fn release_lock(&self, table: &str) {
        let mut locks = self.locks.lock();
        if locks.get(table).map_or(false, |l| Arc::strong_count(l) == 1) {
            locks.remove(table);
        }
    }

    /// Number of tracked table locks
    pub fn lock_count(&self) -> usize {
        self.locks.lock().len()
    }

    // ==================
    // Completion markers
    // ==================

    /// Record that every row for `key` is in the table
    pub fn mark_populated(&self, table: &str, key: i64) {
        self.populated
            .lock()
            .entry(table.to_string())
            .or_default()
            .insert(key);
    }

    /// Whether `key` was fully populated since the last reset of `table`
    pub fn is_populated(&self, table: &str, key: i64) -> bool {
        self.populated
            .lock()
            .get(table)
            .map_or(false, |keys| keys.contains(&key))
    }

    fn clear_populated(&self, table: &str) {
        self.populated.lock().remove(table);
    }

    /// Delete the rows matching `constraints`; returns the number deleted
    pub fn delete_matching(&self, table: &str, constraints: &Qualifiers) -> CacheResult<usize> {
        let lock = self.lock_for(table);
        let _guard = lock.lock();
        self.store
            .delete_where(table, &|r: &Row| RowFilter::matches(r, constraints))
    }

    /// Rows matching `constraints`, or None when the table is stale
    pub fn read(
        &self,
        table: &str,
        expiry_ms: i64,
        constraints: &Qualifiers,
    ) -> CacheResult<Option<Vec<Row>>> {
        if !self.is_fresh(table, expiry_ms)? {
            debug!(target: "cache", event = Event::CacheMiss.as_str(), table, "cache table stale");
            return Ok(None);
        }
        let rows: Vec<Row> = self
            .store
            .scan(table)?
            .into_iter()
            .filter(|r| RowFilter::matches(r, constraints))
            .collect();
        debug!(
            target: "cache",
            event = Event::CacheHit.as_str(),
            table,
            rows = rows.len(),
            "cache hit"
        );
        Ok(Some(rows))
    }

    /// Empty the table and restart its freshness window
    pub fn reset(&self, table: &str) -> CacheResult<()> {
        let lock = self.lock_for(table);
        let _guard = lock.lock();
        let deleted = self.store.delete_where(table, &|_: &Row| true)?;
        self.clear_populated(table);
        let expiry_ms = self.registry_entry(table)?.map_or(0, |e| e.expiry_ms);
        self.write_registry(
            table,
            CacheEntry {
                last_reset_ms: self.clock.now_ms(),
                expiry_ms,
            },
        )?;
        debug!(target: "cache", event = Event::CacheReset.as_str(), table, deleted, "cache table reset");
        Ok(())
    }

    /// Keep the contents but restart the freshness window
    pub fn touch(&self, table: &str) -> CacheResult<()> {
        let lock = self.lock_for(table);
        let _guard = lock.lock();
        let expiry_ms = self.registry_entry(table)?.map_or(0, |e| e.expiry_ms);
        self.write_registry(
            table,
            CacheEntry {
                last_reset_ms: self.clock.now_ms(),
                expiry_ms,
            },
        )
    }

    /// Never fresh again until the next reset
    pub fn invalidate(&self, table: &str) -> CacheResult<()> {
        let lock = self.lock_for(table);
        let _guard = lock.lock();
        self.clear_populated(table);
        let expiry_ms = self.registry_entry(table)?.map_or(0, |e| e.expiry_ms);
        self.write_registry(
            table,
            CacheEntry {
                last_reset_ms: NEVER_RESET,
                expiry_ms,
            },
        )?;
        info!(target: "cache", event = Event::CacheInvalidated.as_str(), table, "cache table invalidated");
        Ok(())
    }

    /// Insert rows in batches under the table lock.
    ///
    /// Duplicate keys are swallowed. Other row failures and failed batches
    /// are counted in the error map and never abort the populate.
    pub fn insert_batch(&self, table: &str, rows: &[Row]) -> InsertReport {
        let lock = self.lock_for(table);
        let _guard = lock.lock();

        let mut total = InsertReport::default();
        for chunk in rows.chunks(self.batch_size) {
            match self.store.insert_rows(table, chunk) {
                Ok(report) => total.merge(report),
                Err(e) => total.errors.push(e),
            }
        }
        if !total.errors.is_empty() {
            let mut errors = self.errors.lock();
            for e in &total.errors {
                *errors.entry(e.code()).or_insert(0) += 1;
            }
            warn!(
                target: "cache",
                table,
                failures = total.errors.len(),
                first = %total.errors[0],
                "cache insert failures recorded"
            );
        }
        total
    }

    /// Failure counts by error code since startup
    pub fn error_counts(&self) -> BTreeMap<&'static str, u64> {
        self.errors.lock().clone()
    }

    /// Record a failure observed outside `insert_batch`
    pub fn record_error(&self, error: &CacheError) {
        *self.errors.lock().entry(error.code()).or_insert(0) += 1;
    }

    /// Every row of `table`, fresh or not
    pub fn scan_all(&self, table: &str) -> CacheResult<Vec<Row>> {
        self.store.scan(table)
    }

    /// Drop the table, its registry row and its bookkeeping
    pub fn drop_table(&self, table: &str) -> CacheResult<bool> {
        let lock = self.lock_for(table);
        let dropped = {
            let _guard = lock.lock();
            let dropped = self.store.drop_table(table)?;
            self.remove_registry(table)?;
            self.clear_populated(table);
            dropped
        };
        drop(lock);
        self.in_use.lock().remove(table);
        self.release_lock(table);
        Ok(dropped)
    }

    /// Empty and untrack expired tables nobody is using.
    ///
    /// Tables whose lock is held elsewhere are skipped, never waited on.
    pub fn sweep(&self) -> CacheResult<SweepReport> {
        let now = self.clock.now_ms();
        let mut report = SweepReport::default();

        for table in self.tables()? {
            if self.in_use(&table) > 0 {
                report.skipped += 1;
                continue;
            }
            let lock = self.lock_for(&table);
            let guard = match lock.try_lock() {
                Some(guard) => guard,
                None => {
                    report.skipped += 1;
                    continue;
                }
            };
            let expired = match self.registry_entry(&table)? {
                Some(entry) => !entry.is_fresh_at(now, entry.expiry_ms),
                None => false,
            };
            if !expired || self.in_use(&table) > 0 {
                report.skipped += 1;
                continue;
            }
            if self.store.table_exists(&table) {
                self.store.delete_where(&table, &|_: &Row| true)?;
            }
            self.remove_registry(&table)?;
            self.clear_populated(&table);
            drop(guard);
            drop(lock);
            self.in_use.lock().remove(&table);
            self.release_lock(&table);
            report.swept.push(table);
        }

        if !report.swept.is_empty() {
            info!(
                target: "cache",
                event = Event::CacheSweep.as_str(),
                swept = report.swept.len(),
                skipped = report.skipped,
                "cache sweep complete"
            );
        }
        Ok(report)
    }
}

impl std::fmt::Debug for DurableCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableCache")
            .field("prefix", &self.prefix)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ManualClock, MemoryCacheStore};
    use crate::qualifier::Qualifier;

    fn cache(clock: Arc<ManualClock>) -> DurableCache {
        DurableCache::open(Arc::new(MemoryCacheStore::new()), clock, &CacheConfig::default()).unwrap()
    }

    #[test]
    fn test_new_table_is_stale_until_reset() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(clock.clone());
        let t = cache.next_table_name();
        assert!(!cache.ensure_table(&t, &TableLayout::unkeyed(1), 1_000).unwrap());
        assert!(cache.ensure_table(&t, &TableLayout::unkeyed(1), 1_000).unwrap());
        assert!(!cache.is_fresh(&t, 1_000).unwrap());

        cache.reset(&t).unwrap();
        assert!(cache.is_fresh(&t, 1_000).unwrap());
        clock.advance(1_000);
        assert!(!cache.is_fresh(&t, 1_000).unwrap());
    }

    #[test]
    fn test_read_filters_and_respects_expiry() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(clock.clone());
        let t = cache.next_table_name();
        cache.ensure_table(&t, &TableLayout::unkeyed(1), 100).unwrap();
        assert_eq!(cache.read(&t, 100, &Qualifiers::none()).unwrap(), None);

        cache.reset(&t).unwrap();
        cache.insert_batch(&t, &[vec![json!(1)], vec![json!(2)]]);
        let only_two = Qualifiers::all(vec![Qualifier::eq(0, json!(2))]);
        assert_eq!(cache.read(&t, 100, &only_two).unwrap(), Some(vec![vec![json!(2)]]));

        clock.advance(100);
        assert_eq!(cache.read(&t, 100, &only_two).unwrap(), None);
    }

    #[test]
    fn test_invalidate() {
        let cache = cache(Arc::new(ManualClock::new(0)));
        let t = cache.next_table_name();
        cache.ensure_table(&t, &TableLayout::unkeyed(1), 1_000).unwrap();
        cache.reset(&t).unwrap();
        cache.invalidate(&t).unwrap();
        assert!(!cache.is_fresh(&t, 1_000).unwrap());
        assert_eq!(cache.entry(&t).unwrap().unwrap().last_reset_ms, -1);
    }

    #[test]
    fn test_use_count_saturates() {
        let cache = cache(Arc::new(ManualClock::new(0)));
        assert_eq!(cache.mark_in_use("T", -1), 0);
        assert_eq!(cache.mark_in_use("T", 2), 2);
        assert_eq!(cache.mark_in_use("T", -5), 0);
    }

    #[test]
    fn test_insert_batch_counts_errors() {
        let cache = cache(Arc::new(ManualClock::new(0)));
        let t = cache.next_table_name();
        cache.ensure_table(&t, &TableLayout::new(1, vec![0]), 1_000).unwrap();
        let report = cache.insert_batch(&t, &[vec![json!(1)], vec![json!(1)], vec![json!(1), json!(2)]]);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(cache.error_counts().get("MESH_CACHE_WIDTH_MISMATCH"), Some(&1));
        assert_eq!(cache.error_counts().get("MESH_CACHE_DUPLICATE_KEY"), None);
    }

    #[test]
    fn test_sweep_skips_in_use_and_locked() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = Arc::new(cache(clock.clone()));
        let busy = cache.next_table_name();
        let locked = cache.next_table_name();
        let idle = cache.next_table_name();
        for t in [&busy, &locked, &idle] {
            cache.ensure_table(t, &TableLayout::unkeyed(1), 10).unwrap();
            cache.reset(t).unwrap();
        }
        cache.mark_in_use(&busy, 1);
        clock.advance(10);

        let lock = cache.lock_for(&locked);
        let other = Arc::clone(&cache);
        let report = {
            let _held = lock.lock();
            // The sweep runs on another thread so the re-entrant lock is contended
            std::thread::spawn(move || other.sweep().unwrap()).join().unwrap()
        };
        assert_eq!(report.swept, vec![idle.clone()]);
        assert_eq!(report.skipped, 2);
        assert!(cache.entry(&idle).unwrap().is_none());
        assert!(cache.entry(&busy).unwrap().is_some());
    }

    #[test]
    fn test_sweep_keeps_fresh_tables() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(clock);
        let t = cache.next_table_name();
        cache.ensure_table(&t, &TableLayout::unkeyed(1), 1_000).unwrap();
        cache.reset(&t).unwrap();
        assert!(cache.sweep().unwrap().swept.is_empty());
    }

    #[test]
    fn test_startup_drops_prefixed_tables() {
        let store = Arc::new(MemoryCacheStore::new());
        store.create_table("MESH_CACHE_7", &TableLayout::unkeyed(1)).unwrap();
        store.create_table("OTHER", &TableLayout::unkeyed(1)).unwrap();
        let _cache = DurableCache::open(
            store.clone(),
            Arc::new(ManualClock::new(0)),
            &CacheConfig::default(),
        )
        .unwrap();
        assert!(!store.table_exists("MESH_CACHE_7"));
        assert!(store.table_exists("OTHER"));
        assert!(store.table_exists("MESH_CACHE_EXPIRES"));
    }

    #[test]
    fn test_drop_table_untracks() {
        let cache = cache(Arc::new(ManualClock::new(0)));
        let t = cache.next_table_name();
        cache.ensure_table(&t, &TableLayout::unkeyed(1), 1_000).unwrap();
        assert!(cache.drop_table(&t).unwrap());
        assert!(cache.entry(&t).unwrap().is_none());
        assert!(!cache.tables().unwrap().contains(&t));
    }

    #[test]
    fn test_held_lock_survives_sweep() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = Arc::new(cache(clock.clone()));
        let t = cache.next_table_name();
        cache.ensure_table(&t, &TableLayout::unkeyed(1), 10).unwrap();
        cache.reset(&t).unwrap();
        clock.advance(10);

        let held = cache.lock_for(&t);
        assert_eq!(cache.sweep().unwrap().swept, vec![t.clone()]);
        let _guard = held.lock();

        let other = Arc::clone(&cache);
        let name = t.clone();
        let acquired = std::thread::spawn(move || other.lock_for(&name).try_lock().is_some())
            .join()
            .unwrap();
        assert!(!acquired);
    }

    #[test]
    fn test_unheld_lock_released_on_drop() {
        let cache = cache(Arc::new(ManualClock::new(0)));
        let t = cache.next_table_name();
        cache.ensure_table(&t, &TableLayout::unkeyed(1), 1_000).unwrap();
        cache.reset(&t).unwrap();
        assert_eq!(cache.lock_count(), 1);
        cache.drop_table(&t).unwrap();
        assert_eq!(cache.lock_count(), 0);
    }

    #[test]
    fn test_markers_cleared_by_reset_and_invalidate() {
        let cache = cache(Arc::new(ManualClock::new(0)));
        let t = cache.next_table_name();
        cache.ensure_table(&t, &TableLayout::unkeyed(1), 1_000).unwrap();
        cache.reset(&t).unwrap();

        cache.mark_populated(&t, 7);
        assert!(cache.is_populated(&t, 7));
        assert!(!cache.is_populated(&t, 8));
        cache.touch(&t).unwrap();
        assert!(cache.is_populated(&t, 7));

        cache.invalidate(&t).unwrap();
        assert!(!cache.is_populated(&t, 7));
        cache.mark_populated(&t, 7);
        cache.reset(&t).unwrap();
        assert!(!cache.is_populated(&t, 7));
    }

    #[test]
    fn test_delete_matching() {
        let cache = cache(Arc::new(ManualClock::new(0)));
        let t = cache.next_table_name();
        cache.ensure_table(&t, &TableLayout::unkeyed(1), 1_000).unwrap();
        cache.insert_batch(&t, &[vec![json!(1)], vec![json!(2)], vec![json!(1)]]);
        let ones = Qualifiers::all(vec![Qualifier::eq(0, json!(1))]);
        assert_eq!(cache.delete_matching(&t, &ones).unwrap(), 2);
        assert_eq!(cache.scan_all(&t).unwrap(), vec![vec![json!(2)]]);
    }

    #[test]
    fn test_signature_and_cache_id_stable() {
        let a = DurableCache::signature(&["src", "A INTEGER"]);
        assert_eq!(a, DurableCache::signature(&["src", "A INTEGER"]));
        assert_ne!(a, DurableCache::signature(&["srcA", " INTEGER"]));
        assert_eq!(DurableCache::cache_id("q1"), DurableCache::cache_id("q1"));
        assert!(DurableCache::cache_id("q1") >= 0);
    }
}

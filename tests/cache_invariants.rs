//! Durable Cache Invariant Tests
//!
//! - A cache table is read only while fresh
//! - Concurrent scans populate a table at most once per freshness window
//! - The sweep empties expired tables and never touches tables in use
//! - Leftover tables are dropped when the cache is reopened
//! - A failing store never changes what a scan returns

use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use serde_json::json;

use meshquery::cache::{
    CacheError, CacheResult, CacheStore, DurableCache, FileCacheStore, InsertReport, ManualClock,
    MemoryCacheStore, TableLayout,
};
use meshquery::config::{CacheConfig, NodeConfig, SourceConfig};
use meshquery::engine::{Node, QueryRequest};
use meshquery::observability::MetricsRegistry;
use meshquery::qualifier::{Qualifier, Qualifiers};
use meshquery::schema::{parse_definition, LogicalSchema, Row};
use meshquery::source::{
    CachingSource, MemoryTable, RowSource, RowStream, ScanRequest, SourceDescriptor, SourceInstance,
    SourceResult,
};

const EXPIRY_MS: i64 = 60_000;

// =============================================================================
// Helpers
// =============================================================================

/// Counts reads that reach the wrapped table
struct Counting {
    inner: MemoryTable,
    opens: AtomicUsize,
}

impl Counting {
    fn new() -> Self {
        Self::with_rows(vec![vec![json!("x"), json!(1)], vec![json!("y"), json!(2)]])
    }

    fn with_rows(rows: Vec<Row>) -> Self {
        let schema = parse_definition("DS0", "LOC VARCHAR(10), AMOUNT INTEGER").unwrap();
        Self {
            inner: MemoryTable::new(SourceDescriptor::leaf("DS0"), schema, rows),
            opens: AtomicUsize::new(0),
        }
    }

    /// What the adapter returns with no cache in front of it
    fn uncached(&self, request: &ScanRequest) -> Vec<Row> {
        self.inner.open(request).unwrap().collect()
    }

    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl RowSource for Counting {
    fn descriptor(&self) -> &SourceDescriptor {
        self.inner.descriptor()
    }

    fn physical_schema(&self) -> &LogicalSchema {
        self.inner.physical_schema()
    }

    fn open(&self, request: &ScanRequest) -> SourceResult<RowStream> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        // Widen the race window for the concurrency test
        thread::sleep(std::time::Duration::from_millis(5));
        self.inner.open(request)
    }

    fn estimated_rows(&self, instance: Option<&str>) -> u64 {
        self.inner.estimated_rows(instance)
    }
}

/// Memory store whose cache tables can be made to fail.
///
/// The registry table always works; only tables holding cached rows fail.
struct FlakyStore {
    inner: MemoryCacheStore,
    unavailable: AtomicBool,
    inserts: AtomicUsize,
    /// 1-based index of the one row insert that fails
    fail_insert: Option<usize>,
}

impl FlakyStore {
    fn new(fail_insert: Option<usize>) -> Self {
        Self {
            inner: MemoryCacheStore::new(),
            unavailable: AtomicBool::new(false),
            inserts: AtomicUsize::new(0),
            fail_insert,
        }
    }

    fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn fails(&self, table: &str) -> bool {
        !table.ends_with("EXPIRES") && self.unavailable.load(Ordering::SeqCst)
    }

    fn disk_full() -> CacheError {
        CacheError::io("flaky", io::Error::new(io::ErrorKind::Other, "disk full"))
    }
}

impl CacheStore for FlakyStore {
    fn create_table(&self, table: &str, layout: &TableLayout) -> CacheResult<bool> {
        self.inner.create_table(table, layout)
    }

    fn table_exists(&self, table: &str) -> bool {
        self.inner.table_exists(table)
    }

    fn drop_table(&self, table: &str) -> CacheResult<bool> {
        self.inner.drop_table(table)
    }

    fn insert_rows(&self, table: &str, rows: &[Row]) -> CacheResult<InsertReport> {
        if self.fails(table) {
            return Err(Self::disk_full());
        }
        if !table.ends_with("EXPIRES") {
            let n = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_insert == Some(n) {
                return Err(Self::disk_full());
            }
        }
        self.inner.insert_rows(table, rows)
    }

    fn scan(&self, table: &str) -> CacheResult<Vec<Row>> {
        if self.fails(table) {
            return Err(Self::disk_full());
        }
        self.inner.scan(table)
    }

    fn delete_where(&self, table: &str, predicate: &dyn Fn(&Row) -> bool) -> CacheResult<usize> {
        if self.fails(table) {
            return Err(Self::disk_full());
        }
        self.inner.delete_where(table, predicate)
    }

    fn list_tables(&self) -> CacheResult<Vec<String>> {
        self.inner.list_tables()
    }
}

struct Fixture {
    clock: Arc<ManualClock>,
    cache: Arc<DurableCache>,
    source: Arc<Counting>,
    caching: Arc<CachingSource>,
    metrics: Arc<MetricsRegistry>,
}

fn fixture() -> Fixture {
    let clock = Arc::new(ManualClock::new(1_000));
    let cache = Arc::new(
        DurableCache::open(
            Arc::new(MemoryCacheStore::new()),
            clock.clone(),
            &CacheConfig::enabled(),
        )
        .unwrap(),
    );
    let source = Arc::new(Counting::new());
    let metrics = Arc::new(MetricsRegistry::new());
    let caching = Arc::new(CachingSource::new(
        source.clone(),
        Arc::clone(&cache),
        Arc::clone(&metrics),
        EXPIRY_MS,
        None,
    ));
    Fixture {
        clock,
        cache,
        source,
        caching,
        metrics,
    }
}

fn scan(source: &CachingSource) -> usize {
    source.open(&ScanRequest::default()).unwrap().count()
}

// =============================================================================
// Freshness
// =============================================================================

#[test]
fn test_fresh_table_serves_repeated_scans() {
    let f = fixture();
    assert_eq!(scan(&f.caching), 2);
    assert_eq!(scan(&f.caching), 2);
    assert_eq!(f.source.opens(), 1);

    let snapshot = f.metrics.snapshot();
    assert_eq!(snapshot.cache_misses, 1);
    assert_eq!(snapshot.cache_hits, 1);
}

#[test]
fn test_expired_table_is_refetched() {
    let f = fixture();
    scan(&f.caching);
    f.clock.advance(EXPIRY_MS - 1);
    scan(&f.caching);
    assert_eq!(f.source.opens(), 1);

    f.clock.advance(1);
    assert_eq!(scan(&f.caching), 2);
    assert_eq!(f.source.opens(), 2);
    // The stale rows were replaced, not appended to
    assert_eq!(f.cache.scan_all(f.caching.table_name()).unwrap().len(), 2);
}

#[test]
fn test_invalidated_table_is_refetched() {
    let f = fixture();
    scan(&f.caching);
    f.cache.invalidate(f.caching.table_name()).unwrap();
    scan(&f.caching);
    assert_eq!(f.source.opens(), 2);
}

#[test]
fn test_endpoints_are_cached_separately() {
    let clock = Arc::new(ManualClock::new(0));
    let cache = Arc::new(
        DurableCache::open(
            Arc::new(MemoryCacheStore::new()),
            clock,
            &CacheConfig::enabled(),
        )
        .unwrap(),
    );
    let schema = parse_definition("PDS", "V INTEGER").unwrap();
    let inner: Arc<dyn RowSource> = Arc::new(MemoryTable::pluralized(
        "PDS",
        schema,
        vec![
            (SourceInstance::new("e1"), vec![vec![json!(1)]]),
            (SourceInstance::new("e2"), vec![vec![json!(2)], vec![json!(3)]]),
        ],
    ));
    let metrics = Arc::new(MetricsRegistry::new());
    let caching = CachingSource::new(inner, cache, Arc::clone(&metrics), EXPIRY_MS, None);

    let request = |instance: &str| ScanRequest {
        instance: Some(instance.to_string()),
        ..ScanRequest::default()
    };
    assert_eq!(caching.open(&request("e1")).unwrap().count(), 1);
    assert_eq!(caching.open(&request("e2")).unwrap().count(), 2);
    assert_eq!(caching.open(&request("e1")).unwrap().count(), 1);
    assert_eq!(caching.open(&request("e2")).unwrap().count(), 2);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.cache_misses, 2);
    assert_eq!(snapshot.cache_hits, 2);
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_scans_populate_once() {
    let f = fixture();
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let caching = Arc::clone(&f.caching);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                scan(&caching)
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 2);
    }
    assert_eq!(f.source.opens(), 1);
    assert_eq!(f.cache.scan_all(f.caching.table_name()).unwrap().len(), 2);
    assert_eq!(f.cache.in_use(f.caching.table_name()), 0);
}

// =============================================================================
// Sweep
// =============================================================================

#[test]
fn test_sweep_empties_expired_tables_only() {
    let f = fixture();
    scan(&f.caching);

    let report = f.cache.sweep().unwrap();
    assert!(report.swept.is_empty());
    assert_eq!(report.skipped, 1);

    f.clock.advance(EXPIRY_MS);
    let report = f.cache.sweep().unwrap();
    assert_eq!(report.swept, vec![f.caching.table_name().to_string()]);
    assert!(f.cache.tables().unwrap().is_empty());

    // The next scan recreates and repopulates the table
    assert_eq!(scan(&f.caching), 2);
    assert_eq!(f.source.opens(), 2);
}

#[test]
fn test_sweep_skips_tables_in_use() {
    let f = fixture();
    scan(&f.caching);
    f.clock.advance(EXPIRY_MS);

    f.cache.mark_in_use(f.caching.table_name(), 1);
    let report = f.cache.sweep().unwrap();
    assert!(report.swept.is_empty());
    assert_eq!(f.cache.scan_all(f.caching.table_name()).unwrap().len(), 2);

    f.cache.mark_in_use(f.caching.table_name(), -1);
    assert_eq!(f.cache.sweep().unwrap().swept.len(), 1);
}

#[test]
fn test_sweep_skips_locked_tables() {
    let f = fixture();
    scan(&f.caching);
    f.clock.advance(EXPIRY_MS);

    let table = f.caching.table_name().to_string();
    let lock = f.cache.lock_for(&table);
    let cache = Arc::clone(&f.cache);
    let guard = lock.lock();
    let report = thread::spawn(move || cache.sweep().unwrap()).join().unwrap();
    drop(guard);

    assert!(report.swept.is_empty());
    assert_eq!(report.skipped, 1);
}

// =============================================================================
// Startup
// =============================================================================

#[test]
fn test_reopen_drops_leftover_tables() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(0));
    let config = CacheConfig::enabled();

    {
        let store = Arc::new(FileCacheStore::open(dir.path()).unwrap());
        let cache = DurableCache::open(store, clock.clone(), &config).unwrap();
        let table = cache.next_table_name();
        cache
            .ensure_table(&table, &TableLayout::unkeyed(1), EXPIRY_MS)
            .unwrap();
        cache.insert_batch(&table, &[vec![json!(1)]]);
        assert_eq!(cache.tables().unwrap(), vec![table]);
    }

    let store = Arc::new(FileCacheStore::open(dir.path()).unwrap());
    let leftovers = store.list_tables().unwrap();
    assert!(leftovers.iter().any(|t| t.starts_with("MESH_CACHE_") && !t.ends_with("EXPIRES")));

    let cache = DurableCache::open(store.clone(), clock, &config).unwrap();
    assert!(cache.tables().unwrap().is_empty());
    let remaining = store.list_tables().unwrap();
    assert_eq!(remaining, vec!["MESH_CACHE_EXPIRES".to_string()]);
}

// =============================================================================
// Through a node
// =============================================================================

#[test]
fn test_cached_source_through_node() {
    let mut config = NodeConfig::new("A");
    config
        .logical_tables
        .insert("LT0".into(), "LOC VARCHAR(10), AMOUNT INTEGER".into());
    config.sources.push(SourceConfig {
        id: "DS0".into(),
        table: "LT0".into(),
        definition: "LOC VARCHAR(10), AMOUNT INTEGER".into(),
        rows: vec![vec![json!("x"), json!(1)]],
        column_mapping: BTreeMap::new(),
        instances: Vec::new(),
        cached: true,
        cache_extension: None,
    });
    let clock = Arc::new(ManualClock::new(0));
    let node = Arc::new(Node::with_clock(config, clock.clone()).unwrap());

    for _ in 0..3 {
        let rows = node
            .execute(QueryRequest::new("LT0"))
            .unwrap()
            .collect_rows()
            .unwrap();
        assert_eq!(rows.len(), 1);
    }
    clock.advance(CacheConfig::default().expiry_ms());
    node.execute(QueryRequest::new("LT0"))
        .unwrap()
        .collect_rows()
        .unwrap();

    let snapshot = node.metrics().snapshot();
    assert_eq!(snapshot.cache_misses, 2);
    assert_eq!(snapshot.cache_hits, 2);
}

// =============================================================================
// Store failures
// =============================================================================

fn flaky_fixture(
    store: Arc<FlakyStore>,
    source: Counting,
    batch_size: usize,
) -> (Arc<DurableCache>, Arc<Counting>, CachingSource) {
    let config = CacheConfig {
        batch_size,
        ..CacheConfig::enabled()
    };
    let cache = Arc::new(DurableCache::open(store, Arc::new(ManualClock::new(0)), &config).unwrap());
    let source = Arc::new(source);
    let caching = CachingSource::new(
        source.clone(),
        Arc::clone(&cache),
        Arc::new(MetricsRegistry::new()),
        EXPIRY_MS,
        None,
    );
    (cache, source, caching)
}

#[test]
fn test_partial_populate_is_never_served() {
    let store = Arc::new(FlakyStore::new(Some(2)));
    let rows = vec![
        vec![json!("x"), json!(1)],
        vec![json!("y"), json!(2)],
        vec![json!("z"), json!(3)],
    ];
    let (cache, source, caching) = flaky_fixture(store, Counting::with_rows(rows.clone()), 1);
    let request = ScanRequest::default();

    // The second one-row batch fails while populating
    let first: Vec<Row> = caching.open(&request).unwrap().collect();
    assert_eq!(first, rows);
    assert_eq!(cache.error_counts().get("MESH_CACHE_IO"), Some(&1));

    let second: Vec<Row> = caching.open(&request).unwrap().collect();
    assert_eq!(second, rows);
    assert_eq!(source.opens(), 2);

    // Repopulated completely, now served from the table
    let third: Vec<Row> = caching.open(&request).unwrap().collect();
    assert_eq!(third, rows);
    assert_eq!(source.opens(), 2);
}

#[test]
fn test_unavailable_store_falls_through_to_source() {
    let store = Arc::new(FlakyStore::new(None));
    let (cache, source, caching) = flaky_fixture(store.clone(), Counting::new(), 500);
    let request = ScanRequest {
        qualifiers: Qualifiers::all(vec![Qualifier::gt(1, json!(1))]),
        ..ScanRequest::default()
    };
    let expected = source.uncached(&request);
    assert_eq!(expected, vec![vec![json!("y"), json!(2)]]);
    let reads_before = source.opens();

    store.set_unavailable(true);
    for _ in 0..2 {
        let rows: Vec<Row> = caching.open(&request).unwrap().collect();
        assert_eq!(rows, expected);
    }
    assert_eq!(source.opens(), reads_before + 2);
    assert_eq!(cache.error_counts().get("MESH_CACHE_IO"), Some(&2));
    assert_eq!(cache.in_use(caching.table_name()), 0);

    // Once the store recovers the cache is used again
    store.set_unavailable(false);
    for _ in 0..2 {
        let rows: Vec<Row> = caching.open(&request).unwrap().collect();
        assert_eq!(rows, expected);
    }
    assert_eq!(source.opens(), reads_before + 3);
}

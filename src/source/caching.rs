//! Durable-cache wrapper for leaf adapters
//!
//! Rows fetched from the wrapped adapter are stored in one cache table per
//! adapter schema, tagged with a `CACHEID` column identifying the endpoint and
//! arguments they were fetched for. A repeated scan with the same endpoint
//! and arguments is served from the table while it is fresh.
//!
//! Check-and-populate runs under the table lock, so concurrent scans fetch
//! from the adapter at most once per freshness window. A key is served from
//! the table only after its populate completed; a populate with any failed
//! insert invalidates the table and returns the fetched rows directly.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use super::errors::{SourceError, SourceResult};
use super::memory::apply_request;
use super::types::{RowSource, RowStream, ScanRequest, SourceDescriptor};
use crate::cache::{DurableCache, TableLayout};
use crate::observability::{Event, MetricsRegistry};
use crate::qualifier::{Qualifier, Qualifiers};
use crate::schema::{LogicalSchema, Row};

/// A leaf adapter whose scans are served from a durable cache table
pub struct CachingSource {
    inner: Arc<dyn RowSource>,
    cache: Arc<DurableCache>,
    metrics: Arc<MetricsRegistry>,
    table: String,
    signature: String,
    expiry_ms: i64,
}

impl CachingSource {
    /// Wrap `inner`, claiming a fresh cache table for its rows.
    ///
    /// `extension` distinguishes adapters that share an id and schema but
    /// read different data.
    pub fn new(
        inner: Arc<dyn RowSource>,
        cache: Arc<DurableCache>,
        metrics: Arc<MetricsRegistry>,
        expiry_ms: i64,
        extension: Option<&str>,
    ) -> Self {
        let definition = inner.physical_schema().definition();
        let signature = DurableCache::signature(&[
            &inner.descriptor().id,
            &definition,
            extension.unwrap_or(""),
        ]);
        let table = cache.next_table_name();
        Self {
            inner,
            cache,
            metrics,
            table,
            signature,
            expiry_ms,
        }
    }

    /// Cache table backing this adapter
    pub fn table_name(&self) -> &str {
        &self.table
    }

    fn width(&self) -> usize {
        self.inner.physical_schema().exposed_count()
    }

    /// Key of the rows a request would fetch
    fn cache_id(&self, request: &ScanRequest) -> i64 {
        let arguments: Vec<String> = request
            .arguments
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        let key = DurableCache::signature(&[
            &self.signature,
            request.instance.as_deref().unwrap_or(""),
            &arguments.join(","),
        ]);
        DurableCache::cache_id(&key)
    }

    fn cached_rows(&self, request: &ScanRequest) -> SourceResult<Vec<Row>> {
        let width = self.width();
        let lock = self.cache.lock_for(&self.table);
        let _guard = lock.lock();

        self.cache.ensure_table(
            &self.table,
            &TableLayout::unkeyed(width + 1),
            self.expiry_ms,
        )?;
        self.cache.mark_in_use(&self.table, 1);
        let result = self.read_or_populate(request, width);
        self.cache.mark_in_use(&self.table, -1);
        result
    }

    fn read_or_populate(&self, request: &ScanRequest, width: usize) -> SourceResult<Vec<Row>> {
        let cache_id = self.cache_id(request);
        let constraint = Qualifiers::all(vec![Qualifier::eq(width, json!(cache_id))]);

        match self.cache.read(&self.table, self.expiry_ms, &constraint)? {
            Some(rows) if self.cache.is_populated(&self.table, cache_id) => {
                self.metrics.increment_cache_hits();
                let rows = rows
                    .into_iter()
                    .map(|mut r| {
                        r.truncate(width);
                        r
                    })
                    .collect();
                return Ok(rows);
            }
            Some(_) => {
                // Fresh table, but this key never finished populating
                self.cache.delete_matching(&self.table, &constraint)?;
            }
            None => self.cache.reset(&self.table)?,
        }

        self.metrics.increment_cache_misses();
        let fetched: Vec<Row> = self.inner.open(&request.unfiltered())?.collect();
        let tagged: Vec<Row> = fetched
            .iter()
            .map(|r| {
                let mut row = r.clone();
                row.push(json!(cache_id));
                row
            })
            .collect();
        let report = self.cache.insert_batch(&self.table, &tagged);
        if let Some(first) = report.errors.first() {
            warn!(
                target: "cache",
                event = Event::CacheDisabled.as_str(),
                table = %self.table,
                source = %self.inner.descriptor().id,
                failures = report.errors.len(),
                error = %first,
                "cache populate incomplete, table invalidated"
            );
            if let Err(e) = self.cache.invalidate(&self.table) {
                self.cache.record_error(&e);
            }
            return Ok(fetched);
        }
        self.cache.mark_populated(&self.table, cache_id);
        debug!(
            target: "cache",
            table = %self.table,
            source = %self.inner.descriptor().id,
            inserted = report.inserted,
            "cache populated from source"
        );
        Ok(fetched)
    }
}

impl RowSource for CachingSource {
    fn descriptor(&self) -> &SourceDescriptor {
        self.inner.descriptor()
    }

    fn physical_schema(&self) -> &LogicalSchema {
        self.inner.physical_schema()
    }

    fn open(&self, request: &ScanRequest) -> SourceResult<RowStream> {
        match self.cached_rows(request) {
            Ok(rows) => Ok(Box::new(apply_request(rows, request).into_iter())),
            Err(SourceError::Cache(e)) => {
                self.cache.record_error(&e);
                warn!(
                    target: "cache",
                    event = Event::CacheDisabled.as_str(),
                    source = %self.inner.descriptor().id,
                    error = %e,
                    "cache unavailable, reading source directly"
                );
                self.inner.open(request)
            }
            Err(e) => Err(e),
        }
    }

    fn estimated_rows(&self, instance: Option<&str>) -> u64 {
        self.inner.estimated_rows(instance)
    }
}

impl std::fmt::Debug for CachingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingSource")
            .field("source", &self.inner.descriptor().id)
            .field("table", &self.table)
            .finish()
    }
}

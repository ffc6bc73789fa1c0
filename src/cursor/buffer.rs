//! Row buffer for join re-scans
//!
//! Rows are held in memory up to the spill threshold. Past it, everything
//! buffered so far moves to a cache table owned by the cursor and later
//! rows are flushed in threshold-sized chunks, so memory stays bounded.
//!
//! Spilled rows carry a trailing `CACHEID` cell derived from the query id.
//! The table is marked in use for its whole life, so the cache sweep never
//! touches it; it is dropped when the buffer is released.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, CacheResult, DurableCache, TableLayout};
use crate::observability::{Event, MetricsRegistry};
use crate::qualifier::{Qualifier, Qualifiers};
use crate::schema::Row;

/// Where rows go once the in-memory threshold is passed
#[derive(Clone)]
pub struct SpillTarget {
    pub cache: Arc<DurableCache>,
    pub threshold: usize,
    pub expiry_ms: i64,
}

impl std::fmt::Debug for SpillTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpillTarget")
            .field("threshold", &self.threshold)
            .field("expiry_ms", &self.expiry_ms)
            .finish()
    }
}

#[derive(Debug)]
struct SpilledTable {
    name: String,
    rows: u64,
    /// An insert failed; the table no longer holds the full result
    broken: bool,
}

/// Rows of one completed scan, kept for re-scans
#[derive(Debug)]
pub struct RowBuffer {
    query_id: String,
    width: usize,
    cache_id: i64,
    target: Option<SpillTarget>,
    rows: Vec<Row>,
    spilled: Option<SpilledTable>,
    complete: bool,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl RowBuffer {
    /// Buffer for rows `width` cells wide; memory only without a target
    pub fn new(query_id: &str, width: usize, target: Option<SpillTarget>) -> Self {
        Self {
            query_id: query_id.to_string(),
            width,
            cache_id: DurableCache::cache_id(query_id),
            target,
            rows: Vec::new(),
            spilled: None,
            complete: false,
            metrics: None,
        }
    }

    /// Count spilled rows in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Whether the scan that fills the buffer has finished
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Whether rows have moved to a cache table
    pub fn is_spilled(&self) -> bool {
        self.spilled.is_some()
    }

    /// Name of the spill table, once created
    pub fn spill_table(&self) -> Option<&str> {
        self.spilled.as_ref().map(|s| s.name.as_str())
    }

    /// Rows buffered so far, in memory and spilled
    pub fn len(&self) -> u64 {
        self.rows.len() as u64 + self.spilled.as_ref().map_or(0, |s| s.rows)
    }

    /// Whether no row has been buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffer one row, spilling once past the threshold
    pub fn push(&mut self, row: Row) {
        if self.complete {
            return;
        }
        self.rows.push(row);
        let over = self
            .target
            .as_ref()
            .map_or(false, |t| self.rows.len() > t.threshold);
        if over {
            self.flush();
        }
    }

    /// End of the first pass: flush whatever a spilled buffer still holds
    pub fn finish(&mut self) {
        if self.complete {
            return;
        }
        if self.spilled.is_some() && !self.rows.is_empty() {
            self.flush();
        }
        let touched = match (&self.spilled, &self.target) {
            (Some(spilled), Some(target)) => target.cache.touch(&spilled.name),
            _ => Ok(()),
        };
        if let Err(e) = touched {
            self.spill_failed(e);
        }
        self.complete = true;
    }

    fn flush(&mut self) {
        let Some(target) = self.target.clone() else {
            return;
        };
        if self.spilled.is_none() {
            match self.create_table(&target) {
                Ok(name) => {
                    self.spilled = Some(SpilledTable {
                        name,
                        rows: 0,
                        broken: false,
                    });
                }
                Err(e) => {
                    self.spill_failed(e);
                    // Keep everything in memory from here on
                    self.target = None;
                    return;
                }
            }
        }

        let cache_id = self.cache_id;
        let tagged: Vec<Row> = self
            .rows
            .drain(..)
            .map(|mut r| {
                r.push(json!(cache_id));
                r
            })
            .collect();
        let Some(spilled) = self.spilled.as_mut() else {
            return;
        };
        let report = target.cache.insert_batch(&spilled.name, &tagged);
        spilled.rows += report.inserted as u64;
        if !report.errors.is_empty() {
            spilled.broken = true;
        }
        if let Some(metrics) = &self.metrics {
            metrics.add_rows_spilled(report.inserted as u64);
        }
        debug!(
            target: "cursor",
            event = Event::CursorSpilled.as_str(),
            query_id = %self.query_id,
            table = %spilled.name,
            rows = report.inserted,
            "buffered rows spilled"
        );
    }

    fn create_table(&self, target: &SpillTarget) -> CacheResult<String> {
        let name = target.cache.next_table_name();
        target
            .cache
            .ensure_table(&name, &TableLayout::unkeyed(self.width + 1), target.expiry_ms)?;
        target.cache.reset(&name)?;
        target.cache.mark_in_use(&name, 1);
        info!(
            target: "cursor",
            event = Event::CursorSpilled.as_str(),
            query_id = %self.query_id,
            table = %name,
            "cursor buffer spilling to cache table"
        );
        Ok(name)
    }

    fn spill_failed(&mut self, error: CacheError) {
        if let Some(spilled) = self.spilled.as_mut() {
            spilled.broken = true;
        }
        if let Some(target) = &self.target {
            target.cache.record_error(&error);
        }
        warn!(
            target: "cursor",
            event = Event::CacheDisabled.as_str(),
            query_id = %self.query_id,
            error = %error,
            "cursor spill failed"
        );
    }

    /// Buffered rows for a re-scan, or None when they can no longer be
    /// trusted (stale or broken spill table)
    pub fn replay(&mut self) -> Option<Vec<Row>> {
        let Some(spilled) = &self.spilled else {
            return Some(self.rows.clone());
        };
        if spilled.broken {
            return None;
        }
        let target = self.target.as_ref()?;
        let constraint = Qualifiers::all(vec![Qualifier::eq(self.width, json!(self.cache_id))]);

        let read = target
            .cache
            .read(&spilled.name, target.expiry_ms, &constraint)
            .and_then(|rows| {
                if rows.is_some() {
                    target.cache.touch(&spilled.name)?;
                }
                Ok(rows)
            });
        match read {
            Ok(Some(rows)) => Some(
                rows.into_iter()
                    .map(|mut r| {
                        r.truncate(self.width);
                        r
                    })
                    .collect(),
            ),
            Ok(None) => None,
            Err(e) => {
                self.spill_failed(e);
                None
            }
        }
    }

    /// Drop the spill table and forget every buffered row
    pub fn release(&mut self) {
        self.rows.clear();
        let Some(spilled) = self.spilled.take() else {
            return;
        };
        let Some(target) = &self.target else {
            return;
        };
        target.cache.mark_in_use(&spilled.name, -1);
        if let Err(e) = target.cache.drop_table(&spilled.name) {
            target.cache.record_error(&e);
            warn!(
                target: "cursor",
                query_id = %self.query_id,
                table = %spilled.name,
                error = %e,
                "failed to drop cursor spill table"
            );
        }
    }
}

impl Drop for RowBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ManualClock, MemoryCacheStore};
    use crate::config::CacheConfig;

    fn cache(clock: Arc<ManualClock>) -> Arc<DurableCache> {
        Arc::new(
            DurableCache::open(Arc::new(MemoryCacheStore::new()), clock, &CacheConfig::default())
                .unwrap(),
        )
    }

    fn rows(n: i64) -> Vec<Row> {
        (0..n).map(|i| vec![json!(i), json!(format!("r{}", i))]).collect()
    }

    #[test]
    fn test_memory_only_buffer_replays() {
        let mut buffer = RowBuffer::new("q", 2, None);
        for row in rows(5) {
            buffer.push(row);
        }
        buffer.finish();
        assert!(!buffer.is_spilled());
        assert_eq!(buffer.replay().unwrap(), rows(5));
    }

    #[test]
    fn test_spill_past_threshold() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(clock);
        let target = SpillTarget {
            cache: Arc::clone(&cache),
            threshold: 2,
            expiry_ms: 10_000,
        };
        let mut buffer = RowBuffer::new("q", 2, Some(target));
        for row in rows(7) {
            buffer.push(row);
        }
        buffer.finish();

        assert!(buffer.is_spilled());
        assert_eq!(buffer.len(), 7);
        let table = buffer.spill_table().unwrap().to_string();
        assert_eq!(cache.in_use(&table), 1);
        assert_eq!(buffer.replay().unwrap(), rows(7));

        buffer.release();
        assert!(!cache.tables().unwrap().contains(&table));
    }

    #[test]
    fn test_stale_spill_is_not_replayed() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(clock.clone());
        let target = SpillTarget {
            cache,
            threshold: 1,
            expiry_ms: 100,
        };
        let mut buffer = RowBuffer::new("q", 2, Some(target));
        for row in rows(3) {
            buffer.push(row);
        }
        buffer.finish();
        clock.advance(100);
        assert!(buffer.replay().is_none());
    }

    #[test]
    fn test_under_threshold_stays_in_memory() {
        let clock = Arc::new(ManualClock::new(0));
        let target = SpillTarget {
            cache: cache(clock),
            threshold: 10,
            expiry_ms: 100,
        };
        let mut buffer = RowBuffer::new("q", 2, Some(target));
        for row in rows(10) {
            buffer.push(row);
        }
        buffer.finish();
        assert!(!buffer.is_spilled());
        assert_eq!(buffer.replay().unwrap().len(), 10);
    }
}

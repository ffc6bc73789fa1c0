//! Backing stores for cache tables
//!
//! A store holds named tables of positional rows. It knows nothing about
//! expiry or reference counts; those live in `DurableCache`.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::errors::{CacheError, CacheResult};
use crate::schema::Row;

/// Shape of a cache table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLayout {
    pub width: usize,
    /// Columns forming the unique key; no key when empty
    #[serde(default)]
    pub key_columns: Vec<usize>,
}

impl TableLayout {
    /// Layout of `width` columns keyed on `key_columns`
    pub fn new(width: usize, key_columns: Vec<usize>) -> Self {
        Self { width, key_columns }
    }

    /// Layout of `width` columns without a unique key
    pub fn unkeyed(width: usize) -> Self {
        Self::new(width, Vec::new())
    }

    /// Encoded key of a row, or None for unkeyed tables
    pub fn key_of(&self, row: &Row) -> Option<String> {
        if self.key_columns.is_empty() {
            return None;
        }
        let cells: Vec<&serde_json::Value> = self
            .key_columns
            .iter()
            .filter_map(|c| row.get(*c))
            .collect();
        serde_json::to_string(&cells).ok()
    }

    pub(crate) fn check_width(&self, table: &str, row: &Row) -> CacheResult<()> {
        if row.len() != self.width {
            return Err(CacheError::WidthMismatch {
                table: table.to_string(),
                expected: self.width,
                actual: row.len(),
            });
        }
        Ok(())
    }
}

/// Per-batch insert outcome
#[derive(Debug, Default)]
pub struct InsertReport {
    pub inserted: usize,
    pub duplicates: usize,
    /// Row-level failures other than duplicate keys
    pub errors: Vec<CacheError>,
}

impl InsertReport {
    /// Add the counts and failures of another batch
    pub fn merge(&mut self, other: InsertReport) {
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.errors.extend(other.errors);
    }
}

/// Storage for cache tables
pub trait CacheStore: Send + Sync {
    /// Create a table; returns false when it already existed
    fn create_table(&self, table: &str, layout: &TableLayout) -> CacheResult<bool>;

    fn table_exists(&self, table: &str) -> bool;

    /// Returns false when there was nothing to drop
    fn drop_table(&self, table: &str) -> CacheResult<bool>;

    /// Insert rows, reporting duplicates and bad rows without failing the batch
    fn insert_rows(&self, table: &str, rows: &[Row]) -> CacheResult<InsertReport>;

    fn scan(&self, table: &str) -> CacheResult<Vec<Row>>;

    /// Delete matching rows; returns the number deleted
    fn delete_where(&self, table: &str, predicate: &dyn Fn(&Row) -> bool) -> CacheResult<usize>;

    fn list_tables(&self) -> CacheResult<Vec<String>>;
}

#[derive(Debug)]
struct MemoryTable {
    layout: TableLayout,
    rows: Vec<Row>,
    keys: HashSet<String>,
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    tables: RwLock<HashMap<String, MemoryTable>>,
}

impl MemoryCacheStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn create_table(&self, table: &str, layout: &TableLayout) -> CacheResult<bool> {
        let mut tables = self.tables.write();
        if tables.contains_key(table) {
            return Ok(false);
        }
        tables.insert(
            table.to_string(),
            MemoryTable {
                layout: layout.clone(),
                rows: Vec::new(),
                keys: HashSet::new(),
            },
        );
        Ok(true)
    }

    fn table_exists(&self, table: &str) -> bool {
        self.tables.read().contains_key(table)
    }

    fn drop_table(&self, table: &str) -> CacheResult<bool> {
        Ok(self.tables.write().remove(table).is_some())
    }

    fn insert_rows(&self, table: &str, rows: &[Row]) -> CacheResult<InsertReport> {
        let mut tables = self.tables.write();
        let entry = tables
            .get_mut(table)
            .ok_or_else(|| CacheError::TableNotFound(table.to_string()))?;

        let mut report = InsertReport::default();
        for row in rows {
            if let Err(e) = entry.layout.check_width(table, row) {
                report.errors.push(e);
                continue;
            }
            if let Some(key) = entry.layout.key_of(row) {
                if !entry.keys.insert(key) {
                    report.duplicates += 1;
                    continue;
                }
            }
            entry.rows.push(row.clone());
            report.inserted += 1;
        }
        Ok(report)
    }

    fn scan(&self, table: &str) -> CacheResult<Vec<Row>> {
        self.tables
            .read()
            .get(table)
            .map(|t| t.rows.clone())
            .ok_or_else(|| CacheError::TableNotFound(table.to_string()))
    }

    fn delete_where(&self, table: &str, predicate: &dyn Fn(&Row) -> bool) -> CacheResult<usize> {
        let mut tables = self.tables.write();
        let entry = tables
            .get_mut(table)
            .ok_or_else(|| CacheError::TableNotFound(table.to_string()))?;

        let before = entry.rows.len();
        entry.rows.retain(|row| !predicate(row));
        let layout = &entry.layout;
        entry.keys = entry.rows.iter().filter_map(|r| layout.key_of(r)).collect();
        Ok(before - entry.rows.len())
    }

    fn list_tables(&self) -> CacheResult<Vec<String>> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

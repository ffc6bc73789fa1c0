//! File-backed cache store
//!
//! One file per table, `<dir>/<table>.tbl`. The file is a sequence of
//! framed records:
//!
//! ```text
//! +------------------+
//! | Payload Length   | (u32 LE)
//! +------------------+
//! | JSON Payload     | (length bytes)
//! +------------------+
//! | Checksum         | (u32 LE, CRC32 over length + payload)
//! +------------------+
//! ```
//!
//! The first record is the table layout, every following record is a row.
//! Appends go to the end of the file. Deletes rewrite the file to a
//! temporary sibling and rename it over the original.

use crc32fast::Hasher;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use super::errors::{CacheError, CacheResult};
use super::store::{CacheStore, InsertReport, TableLayout};
use crate::schema::Row;

const TABLE_EXTENSION: &str = "tbl";
const FRAME_OVERHEAD: usize = 8;

fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let length = (payload.len() as u32).to_le_bytes();
    let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    frame.extend_from_slice(&length);
    frame.extend_from_slice(payload);
    let checksum = compute_checksum(&frame);
    frame.extend_from_slice(&checksum.to_le_bytes());
    frame
}

/// Split a file image into verified payloads
fn decode_frames<'a>(table: &str, data: &'a [u8]) -> CacheResult<Vec<&'a [u8]>> {
    let mut frames = Vec::new();
    let mut offset = 0usize;
    while offset < data.len() {
        let corrupt = || CacheError::Corrupt {
            table: table.to_string(),
            offset: offset as u64,
        };
        if data.len() - offset < FRAME_OVERHEAD {
            return Err(corrupt());
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&data[offset..offset + 4]);
        let length = u32::from_le_bytes(len_bytes) as usize;
        let end = offset + 4 + length;
        if end + 4 > data.len() {
            return Err(corrupt());
        }
        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(&data[end..end + 4]);
        if compute_checksum(&data[offset..end]) != u32::from_le_bytes(crc_bytes) {
            return Err(corrupt());
        }
        frames.push(&data[offset + 4..end]);
        offset = end + 4;
    }
    Ok(frames)
}

/// Cache tables persisted under a directory
#[derive(Debug)]
pub struct FileCacheStore {
    dir: PathBuf,
    /// Serialises file mutation
    io_lock: Mutex<()>,
}

impl FileCacheStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> CacheResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;
        Ok(Self {
            dir,
            io_lock: Mutex::new(()),
        })
    }

    /// Directory holding the table files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", table, TABLE_EXTENSION))
    }

    fn load(&self, table: &str) -> CacheResult<(TableLayout, Vec<Row>)> {
        let path = self.table_path(table);
        let mut data = Vec::new();
        File::open(&path)
            .and_then(|mut f| f.read_to_end(&mut data))
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CacheError::TableNotFound(table.to_string())
                } else {
                    CacheError::io(&path, e)
                }
            })?;

        let frames = decode_frames(table, &data)?;
        let (header, body) = frames.split_first().ok_or_else(|| CacheError::Corrupt {
            table: table.to_string(),
            offset: 0,
        })?;
        let layout: TableLayout = serde_json::from_slice(header)?;
        let rows = body
            .iter()
            .map(|frame| serde_json::from_slice::<Row>(frame))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((layout, rows))
    }

    /// Write the whole table to a temporary file and rename it into place
    fn rewrite(&self, table: &str, layout: &TableLayout, rows: &[Row]) -> CacheResult<()> {
        let path = self.table_path(table);
        let tmp = path.with_extension(format!("{}.tmp", TABLE_EXTENSION));
        {
            let file = File::create(&tmp).map_err(|e| CacheError::io(&tmp, e))?;
            let mut writer = BufWriter::new(file);
            writer
                .write_all(&encode_frame(&serde_json::to_vec(layout)?))
                .map_err(|e| CacheError::io(&tmp, e))?;
            for row in rows {
                writer
                    .write_all(&encode_frame(&serde_json::to_vec(row)?))
                    .map_err(|e| CacheError::io(&tmp, e))?;
            }
            let file = writer
                .into_inner()
                .map_err(|e| CacheError::io(&tmp, e.into_error()))?;
            file.sync_all().map_err(|e| CacheError::io(&tmp, e))?;
        }
        fs::rename(&tmp, &path).map_err(|e| CacheError::io(&path, e))
    }
}

impl CacheStore for FileCacheStore {
    fn create_table(&self, table: &str, layout: &TableLayout) -> CacheResult<bool> {
        let _guard = self.io_lock.lock();
        if self.table_path(table).exists() {
            return Ok(false);
        }
        self.rewrite(table, layout, &[])?;
        Ok(true)
    }

    fn table_exists(&self, table: &str) -> bool {
        self.table_path(table).exists()
    }

    fn drop_table(&self, table: &str) -> CacheResult<bool> {
        let _guard = self.io_lock.lock();
        let path = self.table_path(table);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }

    fn insert_rows(&self, table: &str, rows: &[Row]) -> CacheResult<InsertReport> {
        let _guard = self.io_lock.lock();
        let (layout, existing) = self.load(table)?;
        let mut keys: HashSet<String> = existing.iter().filter_map(|r| layout.key_of(r)).collect();

        let mut report = InsertReport::default();
        let mut encoded = Vec::new();
        for row in rows {
            if let Err(e) = layout.check_width(table, row) {
                report.errors.push(e);
                continue;
            }
            if let Some(key) = layout.key_of(row) {
                if !keys.insert(key) {
                    report.duplicates += 1;
                    continue;
                }
            }
            encoded.extend_from_slice(&encode_frame(&serde_json::to_vec(row)?));
            report.inserted += 1;
        }

        if !encoded.is_empty() {
            let path = self.table_path(table);
            let mut file = OpenOptions::new()
                .append(true)
                .open(&path)
                .map_err(|e| CacheError::io(&path, e))?;
            file.write_all(&encoded).map_err(|e| CacheError::io(&path, e))?;
            file.sync_data().map_err(|e| CacheError::io(&path, e))?;
        }
        Ok(report)
    }

    fn scan(&self, table: &str) -> CacheResult<Vec<Row>> {
        let _guard = self.io_lock.lock();
        Ok(self.load(table)?.1)
    }

    fn delete_where(&self, table: &str, predicate: &dyn Fn(&Row) -> bool) -> CacheResult<usize> {
        let _guard = self.io_lock.lock();
        let (layout, rows) = self.load(table)?;
        let before = rows.len();
        let kept: Vec<Row> = rows.into_iter().filter(|r| !predicate(r)).collect();
        let deleted = before - kept.len();
        if deleted > 0 {
            self.rewrite(table, &layout, &kept)?;
        }
        Ok(deleted)
    }

    fn list_tables(&self) -> CacheResult<Vec<String>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| CacheError::io(&self.dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TABLE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileCacheStore) {
        let dir = TempDir::new().unwrap();
        let store = FileCacheStore::open(dir.path().join("cache")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_rows_survive_reopen() {
        let (dir, store) = store();
        store.create_table("T", &TableLayout::new(2, vec![0])).unwrap();
        store
            .insert_rows("T", &[vec![json!(1), json!("a")], vec![json!(2), json!("b")]])
            .unwrap();
        drop(store);

        let reopened = FileCacheStore::open(dir.path().join("cache")).unwrap();
        let rows = reopened.scan("T").unwrap();
        assert_eq!(rows, vec![vec![json!(1), json!("a")], vec![json!(2), json!("b")]]);
        assert_eq!(reopened.list_tables().unwrap(), vec!["T"]);
    }

    #[test]
    fn test_duplicate_key_across_batches() {
        let (_dir, store) = store();
        store.create_table("T", &TableLayout::new(1, vec![0])).unwrap();
        store.insert_rows("T", &[vec![json!(1)]]).unwrap();
        let report = store.insert_rows("T", &[vec![json!(1)], vec![json!(3)]]).unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.duplicates, 1);
    }

    #[test]
    fn test_delete_rewrites_file() {
        let (_dir, store) = store();
        store.create_table("T", &TableLayout::unkeyed(1)).unwrap();
        store
            .insert_rows("T", &[vec![json!(1)], vec![json!(2)], vec![json!(3)]])
            .unwrap();
        let deleted = store.delete_where("T", &|r: &Row| r[0] != json!(2)).unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.scan("T").unwrap(), vec![vec![json!(2)]]);
        assert_eq!(store.list_tables().unwrap(), vec!["T"]);
    }

    #[test]
    fn test_corruption_detected() {
        let (_dir, store) = store();
        store.create_table("T", &TableLayout::unkeyed(1)).unwrap();
        store.insert_rows("T", &[vec![json!("payload")]]).unwrap();

        let path = store.table_path("T");
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 6;
        bytes[last] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(store.scan("T"), Err(CacheError::Corrupt { .. })));
    }

    #[test]
    fn test_drop_table() {
        let (_dir, store) = store();
        store.create_table("T", &TableLayout::unkeyed(1)).unwrap();
        assert!(store.drop_table("T").unwrap());
        assert!(!store.table_exists("T"));
        assert!(!store.drop_table("T").unwrap());
        assert!(matches!(store.scan("T"), Err(CacheError::TableNotFound(_))));
    }
}

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::{now_text, timestamp_column};
use crate::db::ConnectionCache;

/// Bookkeeping row for one indexed source file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileIndexEntry {
    pub path: String,
    pub layer: String,
    pub source: String,
    pub content_hash: String,
    pub item_count: u64,
    pub indexed_at: DateTime<Utc>,
}

pub struct FileIndex<'a> {
    cache: &'a ConnectionCache,
}

impl<'a> FileIndex<'a> {
    pub(super) fn new(cache: &'a ConnectionCache) -> Self {
        Self { cache }
    }

    pub fn record(
        &self,
        project_key: &str,
        path: &str,
        layer: &str,
        source: &str,
        content_hash: &str,
        item_count: u64,
    ) -> Result<()> {
        self.cache.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO file_index
                    (project_key, path, layer, source, content_hash, item_count, indexed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    project_key,
                    path,
                    layer,
                    source,
                    content_hash,
                    item_count as i64,
                    now_text()
                ],
            )?;
            Ok(())
        })
    }

    pub fn get(&self, project_key: &str, path: &str) -> Result<Option<FileIndexEntry>> {
        self.cache.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT path, layer, source, content_hash, item_count, indexed_at
                     FROM file_index WHERE project_key = ?1 AND path = ?2",
                    params![project_key, path],
                    row_to_entry,
                )
                .optional()?)
        })
    }

    pub fn list(&self, project_key: &str) -> Result<Vec<FileIndexEntry>> {
        self.cache.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT path, layer, source, content_hash, item_count, indexed_at
                 FROM file_index WHERE project_key = ?1 ORDER BY path",
            )?;
            let rows = stmt.query_map(params![project_key], row_to_entry)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn clear(&self, project_key: &str) -> Result<usize> {
        self.cache.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM file_index WHERE project_key = ?1",
                params![project_key],
            )?)
        })
    }
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<FileIndexEntry> {
    let item_count: i64 = row.get(4)?;
    Ok(FileIndexEntry {
        path: row.get(0)?,
        layer: row.get(1)?,
        source: row.get(2)?,
        content_hash: row.get(3)?,
        item_count: item_count.max(0) as u64,
        indexed_at: timestamp_column(5, row.get(5)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::MetadataDb;
    use tempfile::TempDir;

    #[test]
    fn record_replaces_by_path() {
        let tmp = TempDir::new().unwrap();
        let db = MetadataDb::open(tmp.path().join("m.db")).unwrap();
        let index = db.file_index();

        index.record("p", "knowledge/faq.md", "knowledge", "faq", "h1", 3).unwrap();
        index.record("p", "knowledge/faq.md", "knowledge", "faq", "h2", 4).unwrap();
        index.record("p", "knowledge/rules.md", "knowledge", "rules", "h3", 1).unwrap();

        let faq = index.get("p", "knowledge/faq.md").unwrap().unwrap();
        assert_eq!(faq.content_hash, "h2");
        assert_eq!(faq.item_count, 4);
        assert_eq!(index.list("p").unwrap().len(), 2);
        assert!(index.get("p", "missing.md").unwrap().is_none());

        assert_eq!(index.clear("p").unwrap(), 2);
        assert!(index.list("p").unwrap().is_empty());
    }
}

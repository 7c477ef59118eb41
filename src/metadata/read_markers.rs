use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::{source_column, timestamp_column, to_text};
use crate::db::ConnectionCache;
use crate::memory::types::Source;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadMarker {
    pub source: Source,
    pub last_read_at: DateTime<Utc>,
}

pub struct ReadMarkerManager<'a> {
    cache: &'a ConnectionCache,
}

impl<'a> ReadMarkerManager<'a> {
    pub(super) fn new(cache: &'a ConnectionCache) -> Self {
        Self { cache }
    }

    /// Upsert the read mark for (project, source); `at` defaults to now.
    pub fn mark_as_read(&self, project_key: &str, source: Source, at: Option<DateTime<Utc>>) -> Result<()> {
        let at = to_text(&at.unwrap_or_else(Utc::now));
        self.cache.with_conn(|conn| {
            conn.execute(
                "INSERT INTO read_markers (project_key, source, last_read_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(project_key, source) DO UPDATE SET
                    last_read_at = excluded.last_read_at",
                params![project_key, source.as_str(), at],
            )?;
            Ok(())
        })
    }

    /// Mark every given source read at the same instant.
    pub fn mark_all_as_read(&self, project_key: &str, sources: &[Source]) -> Result<()> {
        let now = Utc::now();
        for source in sources {
            self.mark_as_read(project_key, *source, Some(now))?;
        }
        Ok(())
    }

    /// `None` when the source was never marked read.
    pub fn get_last_read(&self, project_key: &str, source: Source) -> Result<Option<DateTime<Utc>>> {
        self.cache.with_conn(|conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT last_read_at FROM read_markers WHERE project_key = ?1 AND source = ?2",
                    params![project_key, source.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(raw.map(|s| timestamp_column(0, s)).transpose()?)
        })
    }

    pub fn list(&self, project_key: &str) -> Result<Vec<ReadMarker>> {
        self.cache.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT source, last_read_at FROM read_markers
                 WHERE project_key = ?1 ORDER BY source",
            )?;
            let rows = stmt.query_map(params![project_key], |row| {
                Ok(ReadMarker {
                    source: source_column(0, row.get(0)?)?,
                    last_read_at: timestamp_column(1, row.get(1)?)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn clear(&self, project_key: &str) -> Result<usize> {
        self.cache.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM read_markers WHERE project_key = ?1",
                params![project_key],
            )?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::MetadataDb;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn mark_overwrites_and_never_is_none() {
        let tmp = TempDir::new().unwrap();
        let db = MetadataDb::open(tmp.path().join("m.db")).unwrap();
        let markers = db.read_markers();
        assert!(markers.get_last_read("p", Source::Slack).unwrap().is_none());

        let first: DateTime<Utc> = "2026-01-20T08:00:00Z".parse().unwrap();
        let second: DateTime<Utc> = "2026-01-21T08:00:00Z".parse().unwrap();
        markers.mark_as_read("p", Source::Slack, Some(first)).unwrap();
        markers.mark_as_read("p", Source::Slack, Some(second)).unwrap();
        assert_eq!(markers.get_last_read("p", Source::Slack).unwrap(), Some(second));
    }

    #[test]
    fn mark_all_list_and_clear() {
        let tmp = TempDir::new().unwrap();
        let db = MetadataDb::open(tmp.path().join("m.db")).unwrap();
        let markers = db.read_markers();

        markers.mark_all_as_read("p", &Source::ALL).unwrap();
        let listed = markers.list("p").unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed.windows(2).all(|w| w[0].last_read_at == w[1].last_read_at));

        assert_eq!(markers.clear("p").unwrap(), 3);
        assert!(markers.list("p").unwrap().is_empty());
    }
}

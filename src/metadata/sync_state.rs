use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::{json_column, now_text, source_column, timestamp_column, to_text};
use crate::db::ConnectionCache;
use crate::memory::types::Source;

/// Incremental-pull cursor for one (project, source).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncState {
    pub project_key: String,
    pub source: Source,
    pub last_synced: Option<DateTime<Utc>>,
    pub last_item_id: Option<String>,
    pub config: Option<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

pub struct SyncStateManager<'a> {
    cache: &'a ConnectionCache,
}

impl<'a> SyncStateManager<'a> {
    pub(super) fn new(cache: &'a ConnectionCache) -> Self {
        Self { cache }
    }

    /// Upsert the cursor. Fields passed as `None` keep their stored value.
    pub fn update_sync(
        &self,
        project_key: &str,
        source: Source,
        last_synced: Option<DateTime<Utc>>,
        last_item_id: Option<&str>,
        config: Option<&serde_json::Value>,
    ) -> Result<()> {
        let last_synced = last_synced.as_ref().map(to_text);
        let config = config.map(serde_json::to_string).transpose()?;
        self.cache.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sync_state
                    (project_key, source, last_synced, last_item_id, config, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(project_key, source) DO UPDATE SET
                    last_synced = COALESCE(excluded.last_synced, sync_state.last_synced),
                    last_item_id = COALESCE(excluded.last_item_id, sync_state.last_item_id),
                    config = COALESCE(excluded.config, sync_state.config),
                    updated_at = excluded.updated_at",
                params![
                    project_key,
                    source.as_str(),
                    last_synced,
                    last_item_id,
                    config,
                    now_text()
                ],
            )?;
            Ok(())
        })
    }

    /// Record a completed sync at the current time.
    pub fn mark_synced(&self, project_key: &str, source: Source, last_item_id: Option<&str>) -> Result<()> {
        self.update_sync(project_key, source, Some(Utc::now()), last_item_id, None)?;
        tracing::info!(project = project_key, %source, "sync recorded");
        Ok(())
    }

    /// `None` when the source has never synced.
    pub fn get_last_sync(&self, project_key: &str, source: Source) -> Result<Option<DateTime<Utc>>> {
        Ok(self.get_state(project_key, source)?.and_then(|s| s.last_synced))
    }

    pub fn get_last_item_id(&self, project_key: &str, source: Source) -> Result<Option<String>> {
        Ok(self.get_state(project_key, source)?.and_then(|s| s.last_item_id))
    }

    pub fn get_state(&self, project_key: &str, source: Source) -> Result<Option<SyncState>> {
        self.cache.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT project_key, source, last_synced, last_item_id, config, updated_at
                     FROM sync_state WHERE project_key = ?1 AND source = ?2",
                    params![project_key, source.as_str()],
                    row_to_state,
                )
                .optional()?)
        })
    }

    pub fn list_states(&self, project_key: &str) -> Result<Vec<SyncState>> {
        self.cache.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT project_key, source, last_synced, last_item_id, config, updated_at
                 FROM sync_state WHERE project_key = ?1 ORDER BY source",
            )?;
            let rows = stmt.query_map(params![project_key], row_to_state)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// Delete all cursors for a project. Returns rows removed.
    pub fn clear(&self, project_key: &str) -> Result<usize> {
        self.cache.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM sync_state WHERE project_key = ?1",
                params![project_key],
            )?)
        })
    }
}

fn row_to_state(row: &Row<'_>) -> rusqlite::Result<SyncState> {
    let last_synced: Option<String> = row.get(2)?;
    Ok(SyncState {
        project_key: row.get(0)?,
        source: source_column(1, row.get(1)?)?,
        last_synced: last_synced.map(|s| timestamp_column(2, s)).transpose()?,
        last_item_id: row.get(3)?,
        config: json_column(row.get(4)?),
        updated_at: timestamp_column(5, row.get(5)?)?,
    })
}

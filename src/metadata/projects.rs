use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::{json_column, now_text, timestamp_column};
use crate::db::ConnectionCache;
use crate::layout::validate_project_key;

/// One row of the project registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectRecord {
    pub project_key: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub config: Option<serde_json::Value>,
}

pub struct ProjectRegistry<'a> {
    cache: &'a ConnectionCache,
}

const SELECT_COLUMNS: &str = "SELECT project_key, name, created_at, config FROM projects";

impl<'a> ProjectRegistry<'a> {
    pub(super) fn new(cache: &'a ConnectionCache) -> Self {
        Self { cache }
    }

    /// Insert or update a project. A `None` name or config never overwrites a
    /// stored value; `created_at` is set only on first registration.
    pub fn register(
        &self,
        project_key: &str,
        name: Option<&str>,
        config: Option<&serde_json::Value>,
    ) -> Result<()> {
        validate_project_key(project_key)?;
        let config = config.map(serde_json::to_string).transpose()?;
        self.cache.with_conn(|conn| {
            conn.execute(
                "INSERT INTO projects (project_key, name, created_at, config)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(project_key) DO UPDATE SET
                    name = COALESCE(excluded.name, projects.name),
                    config = COALESCE(excluded.config, projects.config)",
                params![project_key, name, now_text(), config],
            )?;
            Ok(())
        })?;
        tracing::debug!(project = project_key, "project registered");
        Ok(())
    }

    pub fn get(&self, project_key: &str) -> Result<Option<ProjectRecord>> {
        self.cache.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("{SELECT_COLUMNS} WHERE project_key = ?1"),
                    params![project_key],
                    row_to_record,
                )
                .optional()?)
        })
    }

    pub fn exists(&self, project_key: &str) -> Result<bool> {
        self.cache.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT 1 FROM projects WHERE project_key = ?1",
                    params![project_key],
                    |_| Ok(()),
                )
                .optional()?
                .is_some())
        })
    }

    /// All registered projects ordered by key.
    pub fn list(&self) -> Result<Vec<ProjectRecord>> {
        self.cache.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY project_key"))?;
            let rows = stmt.query_map([], row_to_record)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// Replace a project's config. Returns `false` if the project is unknown.
    pub fn update_config(&self, project_key: &str, config: &serde_json::Value) -> Result<bool> {
        let config = serde_json::to_string(config)?;
        self.cache.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE projects SET config = ?2 WHERE project_key = ?1",
                params![project_key, config],
            )?;
            Ok(n > 0)
        })
    }

    /// Remove a project's registry row. Returns whether a row existed.
    pub fn unregister(&self, project_key: &str) -> Result<bool> {
        self.cache.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM projects WHERE project_key = ?1",
                params![project_key],
            )?;
            Ok(n > 0)
        })
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ProjectRecord> {
    Ok(ProjectRecord {
        project_key: row.get(0)?,
        name: row.get(1)?,
        created_at: timestamp_column(2, row.get(2)?)?,
        config: json_column(row.get(3)?),
    })
}

//! Shared metadata database: project registry, sync cursors, read markers and
//! knowledge-file bookkeeping, all in `db/metadata.db`.
//!
//! [`MetadataDb`] owns one [`ConnectionCache`]; the manager types borrow it and
//! carry no state of their own. Timestamps are stored as RFC 3339 UTC text
//! with microsecond precision so they sort lexicographically.

pub mod file_index;
pub mod projects;
pub mod read_markers;
pub mod sync_state;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;
use std::sync::Arc;

use crate::db::schema::init_metadata_schema;
use crate::db::{check_database_health, ConnectionCache, HealthReport};
use crate::memory::types::{parse_utc, Source};

pub use file_index::{FileIndex, FileIndexEntry};
pub use projects::{ProjectRecord, ProjectRegistry};
pub use read_markers::{ReadMarker, ReadMarkerManager};
pub use sync_state::{SyncState, SyncStateManager};

const TABLES: [&str; 4] = ["projects", "sync_state", "read_markers", "file_index"];

/// Handle to the shared metadata database. Cheap to clone; clones share the
/// same per-thread connection cache.
#[derive(Clone)]
pub struct MetadataDb {
    cache: Arc<ConnectionCache>,
}

impl MetadataDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let cache = ConnectionCache::new(path.as_ref(), init_metadata_schema)?;
        // Open eagerly so schema errors surface here rather than on first query.
        cache.with_conn(|_| Ok(()))?;
        tracing::info!(path = %path.as_ref().display(), "metadata database ready");
        Ok(Self {
            cache: Arc::new(cache),
        })
    }

    pub fn path(&self) -> &Path {
        self.cache.path()
    }

    pub fn projects(&self) -> ProjectRegistry<'_> {
        ProjectRegistry::new(&self.cache)
    }

    pub fn sync_state(&self) -> SyncStateManager<'_> {
        SyncStateManager::new(&self.cache)
    }

    pub fn read_markers(&self) -> ReadMarkerManager<'_> {
        ReadMarkerManager::new(&self.cache)
    }

    pub fn file_index(&self) -> FileIndex<'_> {
        FileIndex::new(&self.cache)
    }

    /// Integrity check plus row counts for every metadata table.
    pub fn check_health(&self) -> Result<HealthReport> {
        self.cache
            .with_conn(|conn| check_database_health(conn, &TABLES))
    }
}

pub(crate) fn now_text() -> String {
    to_text(&Utc::now())
}

pub(crate) fn to_text(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decode a stored timestamp column.
pub(crate) fn timestamp_column(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    parse_utc(&raw).ok_or_else(|| conversion_error(idx, format!("invalid timestamp: {raw}")))
}

pub(crate) fn source_column(idx: usize, raw: String) -> rusqlite::Result<Source> {
    raw.parse::<Source>().map_err(|e| conversion_error(idx, e))
}

/// Decode a JSON config column, treating malformed JSON as absent.
pub(crate) fn json_column(raw: Option<String>) -> Option<serde_json::Value> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::<dyn std::error::Error + Send + Sync>::from(message),
    )
}

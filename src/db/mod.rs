//! SQLite connection handling shared by the metadata and embedding databases.
//!
//! [`ConnectionCache`] gives every thread its own connection to one database
//! file. Connections are owned by the cache instance (one per store object),
//! never handed to another thread, and opened lazily on first use.

pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

/// Schema initializer run on every freshly opened connection. Must be idempotent.
pub type SchemaInit = fn(&Connection) -> rusqlite::Result<()>;

/// Per-thread connection cache for a single database file.
pub struct ConnectionCache {
    path: PathBuf,
    init: SchemaInit,
    conns: Mutex<HashMap<ThreadId, Connection>>,
}

impl ConnectionCache {
    /// Create a cache for `path`. No connection is opened until first use,
    /// but the parent directory is created eagerly.
    pub fn new(path: impl Into<PathBuf>, init: SchemaInit) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        Ok(Self {
            path,
            init,
            conns: Mutex::new(HashMap::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` with the calling thread's connection.
    ///
    /// The connection is checked out of the map for the duration of the call,
    /// so the map lock is never held while SQL runs. Do not nest calls on the
    /// same cache: the inner call would open a second connection.
    pub fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let id = thread::current().id();
        let cached = self.lock().remove(&id);
        let mut conn = match cached {
            Some(conn) => conn,
            None => open_database(&self.path, self.init)?,
        };
        let out = f(&mut conn);
        self.lock().insert(id, conn);
        out
    }

    /// Drop the calling thread's connection, if any.
    pub fn close_current_thread(&self) {
        let id = thread::current().id();
        self.lock().remove(&id);
    }

    /// Number of threads currently holding a cached connection.
    pub fn connection_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ThreadId, Connection>> {
        self.conns.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Open (or create) a database at the given path with pragmas set and
/// schema initialized.
pub fn open_database(path: impl AsRef<Path>, init: SchemaInit) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    // Enable WAL mode for better concurrent read performance
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_millis(5000))?;

    init(&conn).context("failed to initialize schema")?;

    tracing::debug!(path = %path.display(), "database connection opened");
    Ok(conn)
}

/// Result of a database health check.
#[derive(Debug, serde::Serialize)]
pub struct HealthReport {
    pub integrity_ok: bool,
    pub integrity_details: String,
    pub table_counts: Vec<(String, u64)>,
}

/// Run `PRAGMA integrity_check` and count rows in the given tables.
pub fn check_database_health(conn: &Connection, tables: &[&str]) -> Result<HealthReport> {
    let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;

    let mut table_counts = Vec::with_capacity(tables.len());
    for table in tables {
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .with_context(|| format!("failed to count rows in {table}"))?;
        table_counts.push((table.to_string(), count as u64));
    }

    Ok(HealthReport {
        integrity_ok: integrity == "ok",
        integrity_details: integrity,
        table_counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn noop_init(_: &Connection) -> rusqlite::Result<()> {
        Ok(())
    }

    #[test]
    fn open_sets_busy_timeout_and_wal() {
        let tmp = TempDir::new().unwrap();
        let conn = open_database(tmp.path().join("a.db"), noop_init).unwrap();

        let timeout: i64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .unwrap();
        assert_eq!(timeout, 5000);

        let mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn cache_reuses_connection_on_same_thread() {
        let tmp = TempDir::new().unwrap();
        let cache = ConnectionCache::new(tmp.path().join("nested/b.db"), noop_init).unwrap();

        cache
            .with_conn(|conn| {
                conn.execute_batch("CREATE TEMP TABLE marker (x INTEGER)")?;
                Ok(())
            })
            .unwrap();

        // TEMP tables are per-connection; seeing it again proves reuse.
        let n: i64 = cache
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM temp.marker", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(n, 0);
        assert_eq!(cache.connection_count(), 1);
    }

    #[test]
    fn cache_opens_one_connection_per_thread() {
        let tmp = TempDir::new().unwrap();
        let cache = Arc::new(ConnectionCache::new(tmp.path().join("c.db"), noop_init).unwrap());

        cache.with_conn(|_| Ok(())).unwrap();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.with_conn(|_| Ok(())).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(cache.connection_count(), 4);
        cache.close_current_thread();
        assert_eq!(cache.connection_count(), 3);
    }

    #[test]
    fn error_from_closure_keeps_connection_cached() {
        let tmp = TempDir::new().unwrap();
        let cache = ConnectionCache::new(tmp.path().join("d.db"), noop_init).unwrap();

        let result: Result<()> = cache.with_conn(|_| anyhow::bail!("boom"));
        assert!(result.is_err());
        assert_eq!(cache.connection_count(), 1);
    }

    #[test]
    fn health_check_reports_counts() {
        let tmp = TempDir::new().unwrap();
        let conn = open_database(tmp.path().join("e.db"), |c| {
            c.execute_batch("CREATE TABLE IF NOT EXISTS t (x INTEGER); INSERT INTO t VALUES (1);")
        })
        .unwrap();

        let report = check_database_health(&conn, &["t"]).unwrap();
        assert!(report.integrity_ok);
        assert_eq!(report.table_counts, vec![("t".to_string(), 1)]);
    }
}

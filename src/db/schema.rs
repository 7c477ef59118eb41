//! SQL DDL for the shared metadata database and the per-project embedding
//! databases. All DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

/// Shared metadata store: project registry, sync cursors, read markers and
/// knowledge-file bookkeeping.
const METADATA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    project_key TEXT PRIMARY KEY,
    name TEXT,
    created_at TEXT NOT NULL,
    config TEXT
);

CREATE TABLE IF NOT EXISTS sync_state (
    project_key TEXT NOT NULL,
    source TEXT NOT NULL,
    last_synced TEXT,
    last_item_id TEXT,
    config TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (project_key, source)
);

CREATE TABLE IF NOT EXISTS read_markers (
    project_key TEXT NOT NULL,
    source TEXT NOT NULL,
    last_read_at TEXT NOT NULL,
    PRIMARY KEY (project_key, source)
);

CREATE TABLE IF NOT EXISTS file_index (
    project_key TEXT NOT NULL,
    path TEXT NOT NULL,
    layer TEXT NOT NULL,
    source TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    item_count INTEGER NOT NULL DEFAULT 0,
    indexed_at TEXT NOT NULL,
    PRIMARY KEY (project_key, path)
);
"#;

/// Per-project embedding index: base table, external-content FTS5 shadow
/// index, and the triggers that keep the two row sets identical.
const INDEX_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    item_id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    embedding BLOB,
    source TEXT,
    layer TEXT NOT NULL CHECK(layer IN ('knowledge','memory')),
    metadata TEXT,
    indexed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_layer ON items(layer);
CREATE INDEX IF NOT EXISTS idx_items_source ON items(source);

CREATE VIRTUAL TABLE IF NOT EXISTS items_fts USING fts5(
    content,
    item_id UNINDEXED,
    content='items',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS items_ai AFTER INSERT ON items BEGIN
    INSERT INTO items_fts(rowid, content, item_id)
    VALUES (new.rowid, new.content, new.item_id);
END;

CREATE TRIGGER IF NOT EXISTS items_ad AFTER DELETE ON items BEGIN
    INSERT INTO items_fts(items_fts, rowid, content, item_id)
    VALUES ('delete', old.rowid, old.content, old.item_id);
END;

CREATE TRIGGER IF NOT EXISTS items_au AFTER UPDATE ON items BEGIN
    INSERT INTO items_fts(items_fts, rowid, content, item_id)
    VALUES ('delete', old.rowid, old.content, old.item_id);
    INSERT INTO items_fts(rowid, content, item_id)
    VALUES (new.rowid, new.content, new.item_id);
END;

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize the metadata tables. Idempotent.
pub fn init_metadata_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(METADATA_SQL)
}

/// Initialize the embedding index tables and bring them to the current
/// schema version. Idempotent.
pub fn init_index_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(INDEX_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    super::migrations::run_migrations(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn metadata_schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_metadata_schema(&conn).unwrap();

        let tables = table_names(&conn);
        for t in ["projects", "sync_state", "read_markers", "file_index"] {
            assert!(tables.contains(&t.to_string()), "{t} table missing");
        }
    }

    #[test]
    fn index_schema_creates_base_and_shadow_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_index_schema(&conn).unwrap();

        let tables = table_names(&conn);
        assert!(tables.contains(&"items".to_string()));
        assert!(tables.contains(&"items_fts".to_string()));
        assert!(tables.contains(&"schema_meta".to_string()));
    }

    #[test]
    fn schemas_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_metadata_schema(&conn).unwrap();
        init_metadata_schema(&conn).unwrap();
        init_index_schema(&conn).unwrap();
        init_index_schema(&conn).unwrap();
    }

    #[test]
    fn triggers_mirror_base_table_into_fts() {
        let conn = Connection::open_in_memory().unwrap();
        init_index_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO items (item_id, content, layer, indexed_at) VALUES ('a', 'quantum computer', 'knowledge', 't')",
            [],
        )
        .unwrap();
        let hits: i64 = conn
            .query_row("SELECT COUNT(*) FROM items_fts WHERE items_fts MATCH 'quantum'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(hits, 1);

        conn.execute("UPDATE items SET content = 'classical machine' WHERE item_id = 'a'", [])
            .unwrap();
        let old: i64 = conn
            .query_row("SELECT COUNT(*) FROM items_fts WHERE items_fts MATCH 'quantum'", [], |r| r.get(0))
            .unwrap();
        let new: i64 = conn
            .query_row("SELECT COUNT(*) FROM items_fts WHERE items_fts MATCH 'classical'", [], |r| r.get(0))
            .unwrap();
        assert_eq!((old, new), (0, 1));

        conn.execute("DELETE FROM items WHERE item_id = 'a'", []).unwrap();
        let left: i64 = conn
            .query_row("SELECT COUNT(*) FROM items_fts WHERE items_fts MATCH 'classical'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(left, 0);
    }

    #[test]
    fn layer_check_constraint_rejects_unknown_layer() {
        let conn = Connection::open_in_memory().unwrap();
        init_index_schema(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO items (item_id, content, layer, indexed_at) VALUES ('x', 'y', 'bogus', 't')",
            [],
        );
        assert!(result.is_err());
    }
}

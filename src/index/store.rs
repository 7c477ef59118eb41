use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{EmbeddingItem, IndexStats, ItemInput, Layer, ScoredItem, SearchFilter};
use crate::config::{EmbeddingConfig, RetrievalConfig};
use crate::db::migrations::{get_embedding_model, set_embedding_model};
use crate::db::schema::init_index_schema;
use crate::db::{check_database_health, ConnectionCache, HealthReport};
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingProvider};

/// Characters with meaning in FTS5 query syntax. Replaced by spaces before
/// each remaining token is quoted.
const FTS_SPECIAL: &[char] = &['"', '*', '^', '(', ')', ':', '{', '}', '[', ']', '+', '\\'];

#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Most recently indexed rows considered by semantic search.
    pub candidate_cap: usize,
    /// Divisor mapping |bm25| into [0, 1].
    pub keyword_score_scale: f64,
    /// Sleep between provider calls in `index_batch`.
    pub request_pause: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            candidate_cap: 1000,
            keyword_score_scale: 10.0,
            request_pause: Duration::ZERO,
        }
    }
}

impl StoreOptions {
    pub fn from_config(retrieval: &RetrievalConfig, embedding: &EmbeddingConfig) -> Self {
        Self {
            candidate_cap: retrieval.candidate_cap,
            keyword_score_scale: retrieval.keyword_score_scale,
            request_pause: Duration::from_millis(embedding.request_pause_ms),
        }
    }
}

/// Per-project index database with semantic and keyword search.
pub struct EmbeddingStore {
    cache: ConnectionCache,
    provider: Arc<dyn EmbeddingProvider>,
    options: StoreOptions,
}

impl EmbeddingStore {
    pub fn open(
        path: impl AsRef<Path>,
        provider: Arc<dyn EmbeddingProvider>,
        options: StoreOptions,
    ) -> Result<Self> {
        let cache = ConnectionCache::new(path.as_ref(), init_index_schema)?;
        let model = provider.model_name().to_string();
        cache.with_conn(|conn| {
            if model == "none" {
                return Ok(());
            }
            match get_embedding_model(conn)? {
                Some(stored) if stored == model => {}
                Some(stored) => {
                    tracing::warn!(
                        stored = %stored,
                        configured = %model,
                        "embedding model changed; existing vectors score 0 until re-indexed"
                    );
                    set_embedding_model(conn, &model)?;
                }
                None => set_embedding_model(conn, &model)?,
            }
            Ok(())
        })?;

        Ok(Self {
            cache,
            provider,
            options,
        })
    }

    pub fn path(&self) -> &Path {
        self.cache.path()
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embed and upsert one item.
    ///
    /// Returns `Ok(false)` without writing when the id or content is blank or
    /// the layer is not `knowledge`/`memory` (default `knowledge`). A provider
    /// failure still stores the row, without a vector.
    pub fn index_item(
        &self,
        item_id: &str,
        content: &str,
        source: Option<&str>,
        layer: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<bool> {
        if item_id.trim().is_empty() || content.trim().is_empty() {
            tracing::debug!(item_id, "rejecting item with blank id or content");
            return Ok(false);
        }
        let layer = match layer.map(str::parse::<Layer>).transpose() {
            Ok(layer) => layer.unwrap_or(Layer::Knowledge),
            Err(e) => {
                tracing::debug!(item_id, error = %e, "rejecting item with invalid layer");
                return Ok(false);
            }
        };

        let embedding = match self.provider.embed(content) {
            Ok(v) if !v.is_empty() => Some(vec_to_blob(&v)),
            Ok(_) => {
                tracing::warn!(item_id, "provider returned an empty vector; storing keyword-only");
                None
            }
            Err(e) => {
                tracing::warn!(item_id, error = %e, "embedding failed; storing keyword-only");
                None
            }
        };
        let metadata = metadata.map(serde_json::to_string).transpose()?;
        let indexed_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        self.cache.with_conn(|conn| {
            conn.execute(
                "INSERT INTO items (item_id, content, embedding, source, layer, metadata, indexed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(item_id) DO UPDATE SET
                    content = excluded.content,
                    embedding = excluded.embedding,
                    source = excluded.source,
                    layer = excluded.layer,
                    metadata = excluded.metadata,
                    indexed_at = excluded.indexed_at",
                params![
                    item_id,
                    content,
                    embedding,
                    source,
                    layer.as_str(),
                    metadata,
                    indexed_at
                ],
            )
            .with_context(|| format!("failed to store item {item_id}"))?;
            Ok(())
        })?;
        Ok(true)
    }

    /// Index items one after another. Returns the number of rows stored;
    /// rows stored without a vector still count.
    pub fn index_batch(&self, items: &[ItemInput]) -> Result<usize> {
        let mut stored = 0;
        for (i, item) in items.iter().enumerate() {
            if i > 0 && !self.options.request_pause.is_zero() {
                std::thread::sleep(self.options.request_pause);
            }
            if self.index_item(
                &item.item_id,
                &item.content,
                item.source.as_deref(),
                item.layer.as_deref(),
                item.metadata.as_ref(),
            )? {
                stored += 1;
            }
        }
        tracing::debug!(stored, total = items.len(), "batch indexed");
        Ok(stored)
    }

    /// Returns whether a row existed.
    pub fn delete_item(&self, item_id: &str) -> Result<bool> {
        self.cache.with_conn(|conn| {
            let n = conn.execute("DELETE FROM items WHERE item_id = ?1", params![item_id])?;
            Ok(n > 0)
        })
    }

    /// Delete every item whose id starts with `prefix`. Returns rows removed.
    pub fn delete_by_prefix(&self, prefix: &str) -> Result<usize> {
        self.cache.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM items WHERE substr(item_id, 1, length(?1)) = ?1",
                params![prefix],
            )?)
        })
    }

    pub fn get_item(&self, item_id: &str) -> Result<Option<EmbeddingItem>> {
        self.cache.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT item_id, content, embedding, source, layer, metadata, indexed_at
                     FROM items WHERE item_id = ?1",
                    params![item_id],
                    |row| {
                        let blob: Option<Vec<u8>> = row.get(2)?;
                        let indexed_at: String = row.get(6)?;
                        Ok(EmbeddingItem {
                            item_id: row.get(0)?,
                            content: row.get(1)?,
                            embedding: blob.map(|b| blob_to_vec(&b)),
                            source: row.get(3)?,
                            layer: layer_column(4, row.get(4)?)?,
                            metadata: metadata_column(row.get(5)?),
                            indexed_at: crate::metadata::timestamp_column(6, indexed_at)?,
                        })
                    },
                )
                .optional()?)
        })
    }

    /// Brute-force cosine search over the `candidate_cap` most recently
    /// indexed rows that have a vector. Results with score below
    /// `min_score` are dropped; the rest are sorted descending.
    ///
    /// A failed query embedding yields no results rather than an error.
    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        min_score: f64,
        filter: SearchFilter<'_>,
    ) -> Result<Vec<ScoredItem>> {
        if query.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = match self.provider.embed_query(query) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed; no semantic results");
                return Ok(Vec::new());
            }
        };

        let cap = self.options.candidate_cap as i64;
        let mut results = self.cache.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT item_id, content, source, layer, metadata, embedding
                 FROM items
                 WHERE embedding IS NOT NULL
                   AND (?1 IS NULL OR source = ?1)
                   AND (?2 IS NULL OR layer = ?2)
                 ORDER BY indexed_at DESC
                 LIMIT ?3",
            )?;
            let rows = stmt.query_map(
                params![filter.source, filter.layer.map(|l| l.as_str()), cap],
                |row| {
                    let blob: Vec<u8> = row.get(5)?;
                    let score = cosine_similarity(&query_vec, &blob_to_vec(&blob)) as f64;
                    row_to_scored(row, score)
                },
            )?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })?;

        results.retain(|r| r.score >= min_score);
        sort_by_score(&mut results);
        results.truncate(top_k);
        Ok(results)
    }

    /// FTS5 search ranked by bm25, scores normalized to
    /// `min(1, |bm25| / keyword_score_scale)`.
    pub fn keyword_search(
        &self,
        query: &str,
        top_k: usize,
        filter: SearchFilter<'_>,
    ) -> Result<Vec<ScoredItem>> {
        let fts_query = sanitize_fts_query(query);
        if fts_query.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let scale = self.options.keyword_score_scale;
        self.cache.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT i.item_id, i.content, i.source, i.layer, i.metadata, bm25(items_fts) AS rank
                 FROM items_fts
                 JOIN items i ON i.rowid = items_fts.rowid
                 WHERE items_fts MATCH ?1
                   AND (?2 IS NULL OR i.source = ?2)
                   AND (?3 IS NULL OR i.layer = ?3)
                 ORDER BY rank
                 LIMIT ?4",
            )?;
            let rows = stmt.query_map(
                params![
                    fts_query,
                    filter.source,
                    filter.layer.map(|l| l.as_str()),
                    i64::try_from(top_k).unwrap_or(i64::MAX)
                ],
                |row| {
                    let raw: f64 = row.get(5)?;
                    row_to_scored(row, normalize_bm25(raw, scale))
                },
            )?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn get_stats(&self) -> Result<IndexStats> {
        self.cache.with_conn(|conn| {
            let (total, with_embedding, knowledge, memory, last): (i64, i64, i64, i64, Option<String>) =
                conn.query_row(
                    "SELECT COUNT(*),
                            COUNT(embedding),
                            COALESCE(SUM(layer = 'knowledge'), 0),
                            COALESCE(SUM(layer = 'memory'), 0),
                            MAX(indexed_at)
                     FROM items",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
                )?;

            let mut stmt = conn.prepare(
                "SELECT DISTINCT source FROM items WHERE source IS NOT NULL ORDER BY source",
            )?;
            let sources = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(IndexStats {
                total_items: total as u64,
                with_embedding: with_embedding as u64,
                knowledge_items: knowledge as u64,
                memory_items: memory as u64,
                sources,
                last_indexed: last.as_deref().and_then(crate::memory::types::parse_utc),
                embedding_model: get_embedding_model(conn)?,
            })
        })
    }

    pub fn check_health(&self) -> Result<HealthReport> {
        self.cache
            .with_conn(|conn| check_database_health(conn, &["items", "items_fts"]))
    }
}

/// Make arbitrary user text safe for FTS5 `MATCH`: strip syntax characters,
/// drop tokens with nothing searchable, and quote each remaining token so
/// operators such as `AND`/`NEAR` are taken literally. Tokens are implicitly
/// AND-ed.
pub fn sanitize_fts_query(query: &str) -> String {
    query
        .replace(|c: char| FTS_SPECIAL.contains(&c) || c.is_control(), " ")
        .split_whitespace()
        .filter(|token| token.chars().any(char::is_alphanumeric))
        .map(|token| format!("\"{token}\""))
        .collect::<Vec<_>>()
        .join(" ")
}

/// FTS5 bm25 is negative (more negative = better); map its magnitude into [0, 1].
pub fn normalize_bm25(raw: f64, scale: f64) -> f64 {
    if scale <= 0.0 || !raw.is_finite() {
        return 0.0;
    }
    (raw.abs() / scale).min(1.0)
}

fn sort_by_score(results: &mut [ScoredItem]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
}

/// Columns 0..=4 must be item_id, content, source, layer, metadata.
fn row_to_scored(row: &Row<'_>, score: f64) -> rusqlite::Result<ScoredItem> {
    Ok(ScoredItem {
        item_id: row.get(0)?,
        content: row.get(1)?,
        source: row.get(2)?,
        layer: layer_column(3, row.get(3)?)?,
        metadata: metadata_column(row.get(4)?),
        score,
    })
}

fn layer_column(idx: usize, raw: String) -> rusqlite::Result<Layer> {
    raw.parse::<Layer>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::<dyn std::error::Error + Send + Sync>::from(e),
        )
    })
}

fn metadata_column(raw: Option<String>) -> serde_json::Value {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_quotes_tokens_and_strips_syntax() {
        assert_eq!(sanitize_fts_query("login bug"), "\"login\" \"bug\"");
        assert_eq!(sanitize_fts_query("\"unbalanced"), "\"unbalanced\"");
        assert_eq!(sanitize_fts_query("title:foo* OR (bar)"), "\"title\" \"foo\" \"OR\" \"bar\"");
        assert_eq!(sanitize_fts_query("  -- ** "), "");
        assert_eq!(sanitize_fts_query(""), "");
        assert_eq!(sanitize_fts_query("\0login\u{1b}bug"), "\"login\" \"bug\"");
    }

    #[test]
    fn bm25_normalization_is_bounded() {
        assert_eq!(normalize_bm25(-5.0, 10.0), 0.5);
        assert_eq!(normalize_bm25(-25.0, 10.0), 1.0);
        assert_eq!(normalize_bm25(0.0, 10.0), 0.0);
        assert_eq!(normalize_bm25(-5.0, 0.0), 0.0);
        assert_eq!(normalize_bm25(f64::NAN, 10.0), 0.0);
    }
}

//! Query-time fusion of semantic and keyword results.
//!
//! ```text
//! combined(d) = w_sem * semantic(d) + w_kw * keyword(d)
//! ```
//!
//! Both signals are fetched with `2 * top_k` candidates and no score floor.
//! An item found by only one signal scores 0 on the other.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;

use super::{EmbeddingStore, Layer, ScoredItem, SearchFilter};
use crate::config::RetrievalConfig;
use crate::memory::types::parse_timestamp;

/// Extra candidates fetched per requested result when a date filter will
/// discard some of them afterwards.
const DATE_FILTER_WIDENING: usize = 4;
const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy)]
pub struct HybridWeights {
    pub semantic: f64,
    pub keyword: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            semantic: 0.7,
            keyword: 0.3,
        }
    }
}

impl From<&RetrievalConfig> for HybridWeights {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            semantic: config.semantic_weight,
            keyword: config.keyword_weight,
        }
    }
}

/// A fused result with the contribution of each signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HybridResult {
    pub item_id: String,
    pub content: String,
    pub source: Option<String>,
    pub layer: Layer,
    pub metadata: serde_json::Value,
    pub semantic_score: f64,
    pub keyword_score: f64,
    pub combined_score: f64,
}

pub struct HybridSearch {
    store: Arc<EmbeddingStore>,
    weights: HybridWeights,
}

impl HybridSearch {
    pub fn new(store: Arc<EmbeddingStore>, weights: HybridWeights) -> Self {
        Self { store, weights }
    }

    pub fn weights(&self) -> HybridWeights {
        self.weights
    }

    /// Ranked results with `combined_score >= min_score`, at most `top_k`.
    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        min_score: f64,
        filter: SearchFilter<'_>,
    ) -> Result<Vec<HybridResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let candidates = top_k.saturating_mul(2);
        let semantic = self.store.search(query, candidates, f64::NEG_INFINITY, filter)?;
        let keyword = self.store.keyword_search(query, candidates, filter)?;

        let mut results = fuse(semantic, keyword, self.weights);
        results.retain(|r| r.combined_score >= min_score);
        results.truncate(top_k);

        tracing::debug!(query, results = results.len(), "hybrid search");
        Ok(results)
    }

    pub fn search_knowledge(
        &self,
        query: &str,
        top_k: usize,
        min_score: f64,
        source: Option<&str>,
    ) -> Result<Vec<HybridResult>> {
        self.search(
            query,
            top_k,
            min_score,
            SearchFilter::layer(Layer::Knowledge).with_source(source),
        )
    }

    /// Memory-layer search, optionally limited to results whose metadata
    /// `timestamp` falls within `[start, end]` (local dates, inclusive).
    /// With a date bound set, results without a parseable timestamp are dropped.
    pub fn search_memory(
        &self,
        query: &str,
        top_k: usize,
        min_score: f64,
        source: Option<&str>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<HybridResult>> {
        let filter = SearchFilter::layer(Layer::Memory).with_source(source);
        if start.is_none() && end.is_none() {
            return self.search(query, top_k, min_score, filter);
        }

        let mut results = self.search(
            query,
            top_k.saturating_mul(DATE_FILTER_WIDENING),
            min_score,
            filter,
        )?;
        results.retain(|r| {
            let Some(date) = result_date(&r.metadata) else {
                return false;
            };
            start.map_or(true, |s| date >= s) && end.map_or(true, |e| date <= e)
        });
        results.truncate(top_k);
        Ok(results)
    }

    /// Items similar to `item_id`, using its stored content as the query.
    /// The item itself is excluded; an unknown id yields no results.
    pub fn get_related(
        &self,
        item_id: &str,
        top_k: usize,
        min_score: f64,
        filter: SearchFilter<'_>,
    ) -> Result<Vec<HybridResult>> {
        let Some(item) = self.store.get_item(item_id)? else {
            return Ok(Vec::new());
        };
        let mut results = self.search(&item.content, top_k.saturating_add(1), min_score, filter)?;
        results.retain(|r| r.item_id != item_id);
        results.truncate(top_k);
        Ok(results)
    }
}

/// Merge two signal lists by item id and rank by the weighted sum, highest
/// first. Ties break on item id.
pub fn fuse(semantic: Vec<ScoredItem>, keyword: Vec<ScoredItem>, weights: HybridWeights) -> Vec<HybridResult> {
    let mut merged: HashMap<String, HybridResult> = HashMap::new();

    for item in semantic {
        merged.insert(item.item_id.clone(), to_result(item, |r, s| r.semantic_score = s));
    }
    for item in keyword {
        match merged.get_mut(&item.item_id) {
            Some(existing) => existing.keyword_score = item.score,
            None => {
                merged.insert(item.item_id.clone(), to_result(item, |r, s| r.keyword_score = s));
            }
        }
    }

    let mut results: Vec<HybridResult> = merged
        .into_values()
        .map(|mut r| {
            r.combined_score = weights.semantic * r.semantic_score + weights.keyword * r.keyword_score;
            r
        })
        .collect();
    results.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
    results
}

fn to_result(item: ScoredItem, set: impl FnOnce(&mut HybridResult, f64)) -> HybridResult {
    let score = item.score;
    let mut result = HybridResult {
        item_id: item.item_id,
        content: item.content,
        source: item.source,
        layer: item.layer,
        metadata: item.metadata,
        semantic_score: 0.0,
        keyword_score: 0.0,
        combined_score: 0.0,
    };
    set(&mut result, score);
    result
}

fn result_date(metadata: &serde_json::Value) -> Option<NaiveDate> {
    let raw = metadata.get("timestamp")?.as_str()?;
    parse_timestamp(raw).map(|ts| ts.date_naive())
}

/// Render results as a markdown list. With `full_content` the whole item
/// text is included; otherwise a short preview.
pub fn format_results(results: &[HybridResult], full_content: bool) -> String {
    if results.is_empty() {
        return "No results.\n".to_string();
    }

    let mut out = format!("## Results ({})\n", results.len());
    for (i, r) in results.iter().enumerate() {
        let _ = writeln!(out, "\n### {}. `{}` (score {:.3})", i + 1, r.item_id, r.combined_score);
        let _ = writeln!(
            out,
            "- source: {} | layer: {}",
            r.source.as_deref().unwrap_or("-"),
            r.layer
        );
        let _ = writeln!(
            out,
            "- semantic: {:.3} | keyword: {:.3}",
            r.semantic_score, r.keyword_score
        );
        if r.metadata.as_object().is_some_and(|m| !m.is_empty()) {
            let _ = writeln!(out, "- metadata: `{}`", r.metadata);
        }

        let body = if full_content {
            r.content.clone()
        } else {
            truncate_preview(&r.content, PREVIEW_CHARS)
        };
        out.push('\n');
        for line in body.lines() {
            let _ = writeln!(out, "> {line}");
        }
    }
    out
}

/// Cut `content` to at most `max_chars` characters, appending "..." if cut.
fn truncate_preview(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &content[..end]),
        None => content.to_string(),
    }
}

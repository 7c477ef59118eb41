//! Derived, queryable view over knowledge files and the memory log.
//!
//! Each project gets its own SQLite database holding the `items` base table
//! (content, optional embedding, metadata) and an FTS5 shadow index kept in
//! step by triggers. [`EmbeddingStore`] owns that database; [`Indexer`] fills
//! it; [`HybridSearch`] queries it.

pub mod hybrid;
pub mod indexer;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use hybrid::{HybridResult, HybridSearch, HybridWeights};
pub use indexer::{IndexReport, Indexer};
pub use store::{EmbeddingStore, StoreOptions};

/// Partition of indexed content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// Human-curated, stable documents.
    Knowledge,
    /// Machine-synced, append-only events.
    Memory,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Knowledge => "knowledge",
            Self::Memory => "memory",
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "knowledge" => Ok(Self::Knowledge),
            "memory" => Ok(Self::Memory),
            _ => Err(format!("unknown layer: {s}")),
        }
    }
}

/// One row of the index, as stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingItem {
    pub item_id: String,
    pub content: String,
    #[serde(skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    pub source: Option<String>,
    pub layer: Layer,
    pub metadata: serde_json::Value,
    pub indexed_at: DateTime<Utc>,
}

/// Input to [`EmbeddingStore::index_batch`]. `layer` is validated on write.
#[derive(Debug, Clone, Default)]
pub struct ItemInput {
    pub item_id: String,
    pub content: String,
    pub source: Option<String>,
    pub layer: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl ItemInput {
    pub fn new(item_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn layer(mut self, layer: Layer) -> Self {
        self.layer = Some(layer.as_str().to_string());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A search hit from one signal (semantic or keyword), score in [0, 1]
/// for keyword and [-1, 1] for semantic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredItem {
    pub item_id: String,
    pub content: String,
    pub source: Option<String>,
    pub layer: Layer,
    pub metadata: serde_json::Value,
    pub score: f64,
}

/// Optional narrowing applied inside the SQL of both search signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchFilter<'a> {
    pub source: Option<&'a str>,
    pub layer: Option<Layer>,
}

impl<'a> SearchFilter<'a> {
    pub fn layer(layer: Layer) -> Self {
        Self {
            source: None,
            layer: Some(layer),
        }
    }

    pub fn with_source(mut self, source: Option<&'a str>) -> Self {
        self.source = source;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub total_items: u64,
    pub with_embedding: u64,
    pub knowledge_items: u64,
    pub memory_items: u64,
    pub sources: Vec<String>,
    pub last_indexed: Option<DateTime<Utc>>,
    pub embedding_model: Option<String>,
}

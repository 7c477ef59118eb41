#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Local, TimeZone};
use memlog::config::MemlogConfig;
use memlog::embedding::{EmbeddingError, EmbeddingProvider, HashingProvider};
use memlog::index::{EmbeddingStore, StoreOptions};
use memlog::workspace::Workspace;
use tempfile::TempDir;

/// Config rooted in `dir` with no pauses between provider calls.
pub fn test_config(dir: &TempDir) -> MemlogConfig {
    let mut config = MemlogConfig::default();
    config.storage.base_dir = dir.path().to_string_lossy().into_owned();
    config.embedding.provider = "hashing".into();
    config.embedding.request_pause_ms = 0;
    config
}

/// A workspace in a fresh temp dir using the offline hashing provider.
/// Keep the `TempDir` alive for the duration of the test.
pub fn test_workspace() -> (TempDir, Workspace) {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let ws = Workspace::with_provider(config, Arc::new(HashingProvider::new(256).unwrap())).unwrap();
    (tmp, ws)
}

/// Same as [`test_workspace`] but with a caller-chosen provider.
pub fn workspace_with(provider: Arc<dyn EmbeddingProvider>) -> (TempDir, Workspace) {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let ws = Workspace::with_provider(config, provider).unwrap();
    (tmp, ws)
}

/// Open a standalone index database inside `dir`.
pub fn open_store(dir: &TempDir, provider: Arc<dyn EmbeddingProvider>) -> EmbeddingStore {
    open_store_with(dir, provider, StoreOptions::default())
}

pub fn open_store_with(
    dir: &TempDir,
    provider: Arc<dyn EmbeddingProvider>,
    options: StoreOptions,
) -> EmbeddingStore {
    EmbeddingStore::open(dir.path().join("index.db"), provider, options).unwrap()
}

pub fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

/// Provider that always fails, as an unreachable remote API would.
pub struct FailingProvider;

impl EmbeddingProvider for FailingProvider {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Request("connection refused".into()))
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

/// Deterministic provider: one dimension per vocabulary word, set when the
/// lowercased text contains that word. Similarity is then exactly the
/// overlap of vocabulary words, which keeps rankings predictable.
pub struct KeywordProvider {
    vocab: Vec<&'static str>,
}

impl KeywordProvider {
    pub fn new(vocab: &[&'static str]) -> Self {
        Self {
            vocab: vocab.to_vec(),
        }
    }
}

impl EmbeddingProvider for KeywordProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let lower = text.to_lowercase();
        Ok(self
            .vocab
            .iter()
            .map(|word| if lower.contains(word) { 1.0 } else { 0.0 })
            .collect())
    }

    fn model_name(&self) -> &str {
        "keyword-test"
    }
}

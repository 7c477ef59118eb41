//! Text-to-vector embedding providers.
//!
//! The stores depend only on the [`EmbeddingProvider`] trait. Concrete
//! providers are built from configuration by [`create_provider`]:
//!
//! - `hashing`: deterministic local feature hashing, no network
//! - `openai`: any OpenAI-compatible `/v1/embeddings` endpoint, wrapped in
//!   [`RetryingProvider`] for rate-limit backoff
//! - `none`: every call fails, so all rows are stored keyword-only

pub mod hashing;
pub mod openai;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

pub use hashing::HashingProvider;
pub use openai::OpenAiProvider;
pub use retry::RetryingProvider;

/// Failure reported by an embedding provider.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// Quota or rate limit hit; the only error class that is retried.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },
    #[error("embedding request failed: {0}")]
    Request(String),
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
    #[error("embedding provider is disabled")]
    Disabled,
}

impl EmbeddingError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Trait for embedding text into vectors.
///
/// All methods are synchronous and may block on network I/O. Keeping the
/// dimensionality consistent across calls is the implementation's job; the
/// stores do not check it.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a document for storage.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a search query. Providers with asymmetric query/document models
    /// override this.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(text)
    }

    /// Identifier recorded alongside stored vectors.
    fn model_name(&self) -> &str;
}

impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for Arc<P> {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        (**self).embed(text)
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        (**self).embed_query(text)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Provider that always fails; rows are indexed without vectors.
pub struct DisabledProvider;

impl EmbeddingProvider for DisabledProvider {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Disabled)
    }

    fn model_name(&self) -> &str {
        "none"
    }
}

/// Create an embedding provider from config.
pub fn create_provider(
    config: &crate::config::EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "hashing" => Ok(Arc::new(HashingProvider::new(config.dimensions)?)),
        "openai" => {
            let inner = OpenAiProvider::from_config(config)?;
            Ok(Arc::new(RetryingProvider::new(
                inner,
                config.max_retries,
                Duration::from_millis(config.retry_base_ms),
            )))
        }
        "none" => Ok(Arc::new(DisabledProvider)),
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: hashing, openai, none"),
    }
}

/// Cosine similarity of two vectors.
///
/// Returns `0.0` for empty, zero-magnitude or mismatched-length inputs so a
/// single malformed row never aborts a search.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON || !denom.is_finite() {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}

/// Encode a vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`]. Trailing partial floats are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.3f32, -1.2, 4.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_opposite_vectors_is_minus_one() {
        let a = vec![1.0f32, 2.0];
        let b = vec![-1.0f32, -2.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_stays_in_bounds() {
        let vectors = [
            vec![1.0f32, 0.0, 0.0],
            vec![0.5, 0.5, 0.0],
            vec![-3.0, 1.0, 2.0],
            vec![1e-3, 1e3, -7.0],
        ];
        for a in &vectors {
            for b in &vectors {
                let s = cosine_similarity(a, b);
                assert!((-1.0..=1.0).contains(&s), "{s} out of bounds");
            }
        }
    }

    #[test]
    fn cosine_degenerate_inputs_return_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn blob_roundtrip_preserves_values() {
        let v = vec![1.0f32, -2.5, 3.125];
        let blob = vec_to_blob(&v);
        assert_eq!(blob.len(), 12);
        assert_eq!(blob_to_vec(&blob), v);
    }

    #[test]
    fn disabled_provider_always_fails() {
        let err = DisabledProvider.embed("anything").unwrap_err();
        assert!(matches!(err, EmbeddingError::Disabled));
        assert!(!err.is_rate_limited());
    }

    #[test]
    fn create_provider_rejects_unknown_name() {
        let mut config = crate::config::EmbeddingConfig::default();
        config.provider = "mystery".into();
        let err = create_provider(&config).err().unwrap();
        assert!(err.to_string().contains("unknown embedding provider"));
    }
}

//! Bounded exponential backoff around a provider, for rate-limit errors only.

use std::time::Duration;

use super::{EmbeddingError, EmbeddingProvider};

const MAX_DELAY: Duration = Duration::from_secs(30);

pub struct RetryingProvider<P> {
    inner: P,
    max_retries: u32,
    base_delay: Duration,
}

impl<P: EmbeddingProvider> RetryingProvider<P> {
    pub fn new(inner: P, max_retries: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    fn with_backoff(
        &self,
        op: impl Fn(&P) -> Result<Vec<f32>, EmbeddingError>,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let mut attempt = 0;
        loop {
            match op(&self.inner) {
                Err(EmbeddingError::RateLimited {
                    message,
                    retry_after,
                }) if attempt < self.max_retries => {
                    let delay = retry_after
                        .unwrap_or_else(|| backoff_delay(self.base_delay, attempt))
                        .min(MAX_DELAY);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        %message,
                        "embedding provider rate limited, backing off"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// `base * 2^attempt`, capped at [`MAX_DELAY`].
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt)).min(MAX_DELAY)
}

impl<P: EmbeddingProvider> EmbeddingProvider for RetryingProvider<P> {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.with_backoff(|p| p.embed(text))
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.with_backoff(|p| p.embed_query(text))
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

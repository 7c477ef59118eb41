//! Deterministic local embedding via feature hashing.
//!
//! Tokens are hashed into a fixed number of signed buckets and the result is
//! L2-normalized. There is no semantic generalization beyond shared tokens,
//! but it needs no model download or network and is stable across runs,
//! which makes it the offline default.

use super::{EmbeddingError, EmbeddingProvider};
use anyhow::Result;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

pub struct HashingProvider {
    dims: usize,
    name: String,
}

impl HashingProvider {
    pub fn new(dims: usize) -> Result<Self> {
        anyhow::ensure!(dims > 0, "hashing provider needs at least one dimension");
        Ok(Self {
            dims,
            name: format!("hashing-{dims}"),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dims
    }
}

impl EmbeddingProvider for HashingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut v = vec![0.0f32; self.dims];
        for token in tokenize(text) {
            let h = fnv1a(token.as_bytes());
            let bucket = (h % self.dims as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(v)
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Lowercased alphanumeric runs. Runs containing non-ASCII characters (CJK
/// text has no spaces) are emitted as character bigrams instead.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for run in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|r| !r.is_empty())
    {
        let lower = run.to_lowercase();
        if lower.is_ascii() {
            tokens.push(lower);
            continue;
        }
        let chars: Vec<char> = lower.chars().collect();
        if chars.len() == 1 {
            tokens.push(lower);
        } else {
            tokens.extend(chars.windows(2).map(|w| w.iter().collect::<String>()));
        }
    }
    tokens
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

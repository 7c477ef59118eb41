use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MemlogConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub lifecycle: LifecycleConfig,
    pub unread: UnreadConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the on-disk tree (`projects/`, `db/`).
    pub base_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `hashing` (offline), `openai` (any OpenAI-compatible endpoint) or `none`.
    pub provider: String,
    pub model: String,
    pub api_base: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub dimensions: usize,
    pub max_retries: u32,
    pub retry_base_ms: u64,
    /// Pause between consecutive provider calls during batch indexing.
    pub request_pause_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    pub semantic_weight: f64,
    pub keyword_weight: f64,
    /// Most-recently-indexed rows considered for brute-force similarity.
    pub candidate_cap: usize,
    /// Divisor mapping raw bm25 scores into [0, 1].
    pub keyword_score_scale: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LifecycleConfig {
    pub compress_after_days: u32,
    pub archive_after_days: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UnreadConfig {
    /// Local hour of "yesterday" used as the floor of the unread cutoff.
    pub daily_cutoff_hour: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_memlog_dir().to_string_lossy().into_owned(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hashing".into(),
            model: "text-embedding-3-small".into(),
            api_base: "https://api.openai.com".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            dimensions: 256,
            max_retries: 3,
            retry_base_ms: 500,
            request_pause_ms: 50,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 10,
            semantic_weight: 0.7,
            keyword_weight: 0.3,
            candidate_cap: 1000,
            keyword_score_scale: 10.0,
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            compress_after_days: 30,
            archive_after_days: 90,
        }
    }
}

impl Default for UnreadConfig {
    fn default() -> Self {
        Self {
            daily_cutoff_hour: 18,
        }
    }
}

/// Returns `~/.memlog/`, or `./.memlog` when no home directory is known.
pub fn default_memlog_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".memlog")
}

/// Returns the default config file path: `~/.memlog/config.toml`
pub fn default_config_path() -> PathBuf {
    default_memlog_dir().join("config.toml")
}

impl MemlogConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MemlogConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (MEMLOG_HOME, MEMLOG_LOG_LEVEL, MEMLOG_EMBEDDING_PROVIDER).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MEMLOG_HOME") {
            self.storage.base_dir = val;
        }
        if let Ok(val) = std::env::var("MEMLOG_LOG_LEVEL") {
            self.logging.log_level = val;
        }
        if let Ok(val) = std::env::var("MEMLOG_EMBEDDING_PROVIDER") {
            self.embedding.provider = val;
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.unread.daily_cutoff_hour < 24,
            "unread.daily_cutoff_hour must be in 0..24, got {}",
            self.unread.daily_cutoff_hour
        );
        anyhow::ensure!(
            self.lifecycle.archive_after_days > self.lifecycle.compress_after_days,
            "lifecycle.archive_after_days ({}) must exceed compress_after_days ({})",
            self.lifecycle.archive_after_days,
            self.lifecycle.compress_after_days
        );
        anyhow::ensure!(
            self.retrieval.keyword_score_scale > 0.0,
            "retrieval.keyword_score_scale must be positive"
        );
        Ok(())
    }

    /// Resolve the base directory, expanding `~` if needed.
    pub fn resolved_base_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.base_dir)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MemlogConfig::default();
        assert_eq!(config.logging.log_level, "info");
        assert_eq!(config.embedding.provider, "hashing");
        assert_eq!(config.retrieval.candidate_cap, 1000);
        assert_eq!(config.retrieval.semantic_weight, 0.7);
        assert_eq!(config.retrieval.keyword_weight, 0.3);
        assert_eq!(config.unread.daily_cutoff_hour, 18);
        assert!(config.storage.base_dir.ends_with(".memlog"));
        config.validate().unwrap();
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[logging]
log_level = "debug"

[storage]
base_dir = "/tmp/memlog-test"

[retrieval]
default_top_k = 20
semantic_weight = 0.5
"#;
        let config: MemlogConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.logging.log_level, "debug");
        assert_eq!(config.storage.base_dir, "/tmp/memlog-test");
        assert_eq!(config.retrieval.default_top_k, 20);
        assert_eq!(config.retrieval.semantic_weight, 0.5);
        // defaults still apply for unset fields
        assert_eq!(config.retrieval.keyword_weight, 0.3);
        assert_eq!(config.lifecycle.archive_after_days, 90);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = MemlogConfig::default();
        std::env::set_var("MEMLOG_HOME", "/tmp/override");
        std::env::set_var("MEMLOG_LOG_LEVEL", "trace");
        std::env::set_var("MEMLOG_EMBEDDING_PROVIDER", "none");

        config.apply_env_overrides();

        assert_eq!(config.storage.base_dir, "/tmp/override");
        assert_eq!(config.logging.log_level, "trace");
        assert_eq!(config.embedding.provider, "none");

        // Clean up
        std::env::remove_var("MEMLOG_HOME");
        std::env::remove_var("MEMLOG_LOG_LEVEL");
        std::env::remove_var("MEMLOG_EMBEDDING_PROVIDER");
    }

    #[test]
    fn archive_threshold_must_exceed_compress_threshold() {
        let mut config = MemlogConfig::default();
        config.lifecycle.compress_after_days = 30;
        config.lifecycle.archive_after_days = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn cutoff_hour_out_of_range_is_rejected() {
        let mut config = MemlogConfig::default();
        config.unread.daily_cutoff_hour = 24;
        assert!(config.validate().is_err());
    }
}

//! Wiring for one memlog home directory.
//!
//! The project registry is the source of truth for which projects exist.
//! Project directory trees are treated as a cache that can be recreated at
//! any time; [`Workspace::reconcile`] repairs drift between the two.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::MemlogConfig;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::index::{EmbeddingStore, HybridSearch, HybridWeights, Indexer, StoreOptions};
use crate::layout::{validate_project_key, DirectoryManager};
use crate::memory::maintenance::LifecycleResult;
use crate::memory::MemoryStore;
use crate::metadata::MetadataDb;
use crate::unread::UnreadDetector;

#[derive(Debug, Default, Serialize)]
pub struct ReconcileReport {
    /// Registered projects whose directory tree was missing and got recreated.
    pub recreated: Vec<String>,
    /// Directories under `projects/` with no registry row.
    pub orphans: Vec<String>,
    /// Orphans that were registered because adoption was requested.
    pub adopted: Vec<String>,
}

pub struct Workspace {
    config: MemlogConfig,
    dirs: DirectoryManager,
    metadata: MetadataDb,
    provider: Arc<dyn EmbeddingProvider>,
}

impl Workspace {
    /// Open the workspace at the configured base directory, building the
    /// embedding provider from config.
    pub fn open(config: MemlogConfig) -> Result<Self> {
        let provider = create_provider(&config.embedding)?;
        Self::with_provider(config, provider)
    }

    pub fn with_provider(config: MemlogConfig, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let dirs = DirectoryManager::new(config.resolved_base_dir());
        dirs.ensure_base_structure()?;
        let metadata = MetadataDb::open(dirs.metadata_db_path())?;
        tracing::debug!(
            base_dir = %dirs.base_dir().display(),
            provider = provider.model_name(),
            "workspace opened"
        );
        Ok(Self {
            config,
            dirs,
            metadata,
            provider,
        })
    }

    pub fn config(&self) -> &MemlogConfig {
        &self.config
    }

    pub fn dirs(&self) -> &DirectoryManager {
        &self.dirs
    }

    pub fn metadata(&self) -> &MetadataDb {
        &self.metadata
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Register a project and create its directory tree. Idempotent.
    pub fn create_project(
        &self,
        key: &str,
        name: Option<&str>,
        config: Option<&serde_json::Value>,
    ) -> Result<PathBuf> {
        validate_project_key(key)?;
        self.metadata.projects().register(key, name, config)?;
        let dir = self.dirs.ensure_project_structure(key)?;
        tracing::info!(project = key, dir = %dir.display(), "project ready");
        Ok(dir)
    }

    /// Remove everything belonging to a project: directory tree, registry
    /// row, sync cursors, read markers, file index rows and its embeddings
    /// database. Returns whether the project existed in any form.
    pub fn delete_project(&self, key: &str) -> Result<bool> {
        validate_project_key(key)?;
        let tree = self.dirs.delete_project(key)?;
        let registered = self.metadata.projects().unregister(key)?;
        self.metadata.sync_state().clear(key)?;
        self.metadata.read_markers().clear(key)?;
        self.metadata.file_index().clear(key)?;

        let db_path = self.dirs.embeddings_db_path(key);
        let mut index = false;
        for suffix in ["", "-wal", "-shm"] {
            let path = PathBuf::from(format!("{}{suffix}", db_path.display()));
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("failed to remove {}", path.display()))?;
                index = true;
            }
        }

        tracing::info!(project = key, tree, registered, index, "project deleted");
        Ok(tree || registered || index)
    }

    /// Bring directory trees in line with the registry.
    pub fn reconcile(&self, adopt_orphans: bool) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let registered: Vec<String> = self
            .metadata
            .projects()
            .list()?
            .into_iter()
            .map(|p| p.project_key)
            .collect();

        for key in &registered {
            if !self.dirs.project_exists(key) {
                self.dirs.ensure_project_structure(key)?;
                report.recreated.push(key.clone());
            } else {
                // Fill in any missing subdirectories.
                self.dirs.ensure_project_structure(key)?;
            }
        }

        for key in self.dirs.list_projects()? {
            if registered.contains(&key) {
                continue;
            }
            if adopt_orphans && validate_project_key(&key).is_ok() {
                self.metadata.projects().register(&key, None, None)?;
                self.dirs.ensure_project_structure(&key)?;
                report.adopted.push(key.clone());
            }
            report.orphans.push(key);
        }

        tracing::info!(
            recreated = report.recreated.len(),
            orphans = report.orphans.len(),
            adopted = report.adopted.len(),
            "reconcile complete"
        );
        Ok(report)
    }

    /// Fail unless `key` is registered; recreate its tree if missing.
    pub fn require_project(&self, key: &str) -> Result<()> {
        validate_project_key(key)?;
        anyhow::ensure!(
            self.metadata.projects().exists(key)?,
            "project '{key}' is not registered (run `memlog init {key}`)"
        );
        if !self.dirs.project_exists(key) {
            tracing::warn!(project = key, "project directory missing; recreating");
            self.dirs.ensure_project_structure(key)?;
        }
        Ok(())
    }

    pub fn memory_store(&self, key: &str) -> Result<MemoryStore> {
        self.require_project(key)?;
        Ok(MemoryStore::new(&self.dirs, key))
    }

    /// Open the project's embeddings database. Each call returns a store
    /// with its own connection cache.
    pub fn embedding_store(&self, key: &str) -> Result<Arc<EmbeddingStore>> {
        self.require_project(key)?;
        let options = StoreOptions::from_config(&self.config.retrieval, &self.config.embedding);
        let store = EmbeddingStore::open(
            self.dirs.embeddings_db_path(key),
            Arc::clone(&self.provider),
            options,
        )?;
        Ok(Arc::new(store))
    }

    pub fn indexer(&self, key: &str) -> Result<Indexer> {
        let store = self.embedding_store(key)?;
        Ok(Indexer::new(&self.dirs, key, store).with_metadata(self.metadata.clone()))
    }

    pub fn hybrid(&self, key: &str) -> Result<HybridSearch> {
        let store = self.embedding_store(key)?;
        Ok(HybridSearch::new(store, HybridWeights::from(&self.config.retrieval)))
    }

    /// Compress then archive old day-files. Index rows for days about to be
    /// archived are dropped first so search stops returning them.
    pub fn run_lifecycle(
        &self,
        key: &str,
        compress_after_days: u32,
        archive_after_days: u32,
    ) -> Result<LifecycleResult> {
        let memory = self.memory_store(key)?;
        let leaving = memory.archive_candidates(archive_after_days)?;
        if !leaving.is_empty() && self.dirs.embeddings_db_path(key).exists() {
            self.indexer(key)?.forget_memory_days(&leaving)?;
        }
        memory.run_lifecycle(compress_after_days, archive_after_days)
    }

    pub fn unread(&self) -> UnreadDetector {
        UnreadDetector::new(
            &self.dirs,
            self.metadata.clone(),
            self.config.unread.daily_cutoff_hour,
        )
    }
}

//! Deterministic on-disk layout.
//!
//! ```text
//! <base>/
//!   projects/<key>/
//!     knowledge/{glossary.json, faq.md, rules.md, specs/*.md}
//!     memory/<source>/<YYYY-MM-DD>.jsonl[.gz]
//!     templates/
//!     archive/<source>/
//!   db/metadata.db
//!   db/embeddings/<key>.db
//! ```
//!
//! Path accessors do no I/O. The `ensure_*` methods are idempotent.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::memory::types::Source;

#[derive(Debug, Clone)]
pub struct DirectoryManager {
    base_dir: PathBuf,
}

impl DirectoryManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.base_dir.join("projects")
    }

    pub fn db_dir(&self) -> PathBuf {
        self.base_dir.join("db")
    }

    pub fn metadata_db_path(&self) -> PathBuf {
        self.db_dir().join("metadata.db")
    }

    pub fn embeddings_dir(&self) -> PathBuf {
        self.db_dir().join("embeddings")
    }

    pub fn embeddings_db_path(&self, key: &str) -> PathBuf {
        self.embeddings_dir().join(format!("{key}.db"))
    }

    pub fn project_dir(&self, key: &str) -> PathBuf {
        self.projects_dir().join(key)
    }

    pub fn knowledge_dir(&self, key: &str) -> PathBuf {
        self.project_dir(key).join("knowledge")
    }

    pub fn specs_dir(&self, key: &str) -> PathBuf {
        self.knowledge_dir(key).join("specs")
    }

    pub fn glossary_path(&self, key: &str) -> PathBuf {
        self.knowledge_dir(key).join("glossary.json")
    }

    pub fn faq_path(&self, key: &str) -> PathBuf {
        self.knowledge_dir(key).join("faq.md")
    }

    pub fn rules_path(&self, key: &str) -> PathBuf {
        self.knowledge_dir(key).join("rules.md")
    }

    pub fn memory_dir(&self, key: &str) -> PathBuf {
        self.project_dir(key).join("memory")
    }

    pub fn source_dir(&self, key: &str, source: Source) -> PathBuf {
        self.memory_dir(key).join(source.as_str())
    }

    pub fn templates_dir(&self, key: &str) -> PathBuf {
        self.project_dir(key).join("templates")
    }

    pub fn archive_dir(&self, key: &str) -> PathBuf {
        self.project_dir(key).join("archive")
    }

    pub fn archive_source_dir(&self, key: &str, source: Source) -> PathBuf {
        self.archive_dir(key).join(source.as_str())
    }

    /// Create `projects/`, `db/` and `db/embeddings/`.
    pub fn ensure_base_structure(&self) -> Result<()> {
        for dir in [self.projects_dir(), self.db_dir(), self.embeddings_dir()] {
            create_dir(&dir)?;
        }
        Ok(())
    }

    /// Create the full tree for one project. Returns the project directory.
    pub fn ensure_project_structure(&self, key: &str) -> Result<PathBuf> {
        validate_project_key(key)?;
        self.ensure_base_structure()?;

        create_dir(&self.specs_dir(key))?;
        create_dir(&self.templates_dir(key))?;
        create_dir(&self.archive_dir(key))?;
        for source in Source::ALL {
            create_dir(&self.source_dir(key, source))?;
        }

        Ok(self.project_dir(key))
    }

    pub fn project_exists(&self, key: &str) -> bool {
        validate_project_key(key).is_ok() && self.project_dir(key).is_dir()
    }

    /// Project keys found under `projects/`, sorted. A missing `projects/`
    /// directory yields an empty list.
    pub fn list_projects(&self) -> Result<Vec<String>> {
        let dir = self.projects_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("failed to list {}", dir.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    keys.push(name.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Recursively remove a project tree. Irreversible. Returns whether the
    /// tree existed.
    pub fn delete_project(&self, key: &str) -> Result<bool> {
        validate_project_key(key)?;
        let dir = self.project_dir(key);
        if !dir.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir)
            .with_context(|| format!("failed to delete {}", dir.display()))?;
        tracing::info!(project = key, "project directory deleted");
        Ok(true)
    }
}

/// Reject keys that would escape `projects/` or be unusable as a file name.
pub fn validate_project_key(key: &str) -> Result<()> {
    anyhow::ensure!(!key.trim().is_empty(), "project key must not be empty");
    anyhow::ensure!(
        key != "." && key != "..",
        "project key must not be '.' or '..'"
    );
    anyhow::ensure!(
        !key.contains(['/', '\\']) && !key.chars().any(char::is_control),
        "project key contains invalid characters: {key:?}"
    );
    Ok(())
}

fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))
}

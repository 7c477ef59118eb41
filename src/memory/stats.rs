use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;

use super::store::{list_day_files, MemoryStore};
use super::types::Source;

/// File counts for one source of a project's memory log.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStats {
    pub source: Source,
    pub plain_files: usize,
    pub compressed_files: usize,
    pub archived_files: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub project_key: String,
    pub sources: Vec<SourceStats>,
}

impl MemoryStats {
    pub fn total_files(&self) -> usize {
        self.sources
            .iter()
            .map(|s| s.plain_files + s.compressed_files)
            .sum()
    }
}

impl MemoryStore {
    /// Per-source day-file counts. Oldest/newest cover queryable files only.
    pub fn get_stats(&self) -> Result<MemoryStats> {
        let mut sources = Vec::with_capacity(Source::ALL.len());
        for source in Source::ALL {
            let live = list_day_files(&self.source_dir(source))?;
            let archived = list_day_files(&self.archive_source_dir(source))?;

            let compressed_files = live.iter().filter(|f| f.compressed).count();
            sources.push(SourceStats {
                source,
                plain_files: live.len() - compressed_files,
                compressed_files,
                archived_files: archived.len(),
                oldest_date: live.iter().map(|f| f.date).min(),
                newest_date: live.iter().map(|f| f.date).max(),
            });
        }
        Ok(MemoryStats {
            project_key: self.project_key().to_string(),
            sources,
        })
    }
}

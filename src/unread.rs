//! "What's new since I last looked" counts per source.
//!
//! An entry is unread when its event timestamp is strictly after the
//! source's cutoff:
//!
//! ```text
//! cutoff = max(yesterday at <daily_cutoff_hour>:00 local, last sync, last read-mark)
//! ```

use anyhow::Result;
use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone};
use serde::Serialize;

use crate::layout::DirectoryManager;
use crate::memory::types::{MemoryEntry, Source};
use crate::memory::MemoryStore;
use crate::metadata::MetadataDb;

#[derive(Debug, Clone, Serialize)]
pub struct SourceUnread {
    pub source: Source,
    pub count: usize,
    pub cutoff: DateTime<Local>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnreadSummary {
    pub project_key: String,
    pub sources: Vec<SourceUnread>,
    pub total: usize,
}

pub struct UnreadDetector {
    dirs: DirectoryManager,
    metadata: MetadataDb,
    daily_cutoff_hour: u32,
}

impl UnreadDetector {
    pub fn new(dirs: &DirectoryManager, metadata: MetadataDb, daily_cutoff_hour: u32) -> Self {
        Self {
            dirs: dirs.clone(),
            metadata,
            daily_cutoff_hour: daily_cutoff_hour.min(23),
        }
    }

    pub fn cutoff_time(&self, project_key: &str, source: Source) -> Result<DateTime<Local>> {
        self.cutoff_time_at(project_key, source, Local::now())
    }

    pub fn cutoff_time_at(
        &self,
        project_key: &str,
        source: Source,
        now: DateTime<Local>,
    ) -> Result<DateTime<Local>> {
        let mut cutoff = daily_cutoff(now, self.daily_cutoff_hour);

        let last_sync = self.metadata.sync_state().get_last_sync(project_key, source)?;
        let last_read = self.metadata.read_markers().get_last_read(project_key, source)?;
        for candidate in [last_sync, last_read].into_iter().flatten() {
            let candidate = candidate.with_timezone(&Local);
            if candidate > cutoff {
                cutoff = candidate;
            }
        }
        Ok(cutoff)
    }

    pub fn get_unread_entries(&self, project_key: &str, source: Source) -> Result<Vec<MemoryEntry>> {
        self.get_unread_entries_at(project_key, source, Local::now())
    }

    /// Entries with a timestamp strictly after the cutoff, as of `now`.
    pub fn get_unread_entries_at(
        &self,
        project_key: &str,
        source: Source,
        now: DateTime<Local>,
    ) -> Result<Vec<MemoryEntry>> {
        let cutoff = self.cutoff_time_at(project_key, source, now)?;
        let store = MemoryStore::new(&self.dirs, project_key);
        let entries = store.read_entries(source, Some(cutoff.date_naive()), Some(now.date_naive()))?;
        Ok(entries.into_iter().filter(|e| e.timestamp > cutoff).collect())
    }

    pub fn get_unread_summary(&self, project_key: &str) -> Result<UnreadSummary> {
        self.get_unread_summary_at(project_key, Local::now())
    }

    pub fn get_unread_summary_at(&self, project_key: &str, now: DateTime<Local>) -> Result<UnreadSummary> {
        let mut sources = Vec::with_capacity(Source::ALL.len());
        for source in Source::ALL {
            let cutoff = self.cutoff_time_at(project_key, source, now)?;
            let count = self.get_unread_entries_at(project_key, source, now)?.len();
            sources.push(SourceUnread {
                source,
                count,
                cutoff,
            });
        }
        let total = sources.iter().map(|s| s.count).sum();
        Ok(UnreadSummary {
            project_key: project_key.to_string(),
            sources,
            total,
        })
    }

    /// Mark sources read as of now, moving their cutoff forward.
    pub fn mark_as_read(&self, project_key: &str, sources: &[Source]) -> Result<()> {
        self.metadata.read_markers().mark_all_as_read(project_key, sources)
    }
}

/// Yesterday at `hour`:00 local time, relative to `now`.
pub fn daily_cutoff(now: DateTime<Local>, hour: u32) -> DateTime<Local> {
    let yesterday = now.date_naive() - Duration::days(1);
    let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let naive = yesterday.and_time(time);
    Local
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(&naive))
}

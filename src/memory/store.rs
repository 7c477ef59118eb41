//! Append-only JSONL log, one file per (project, source, event date).
//!
//! Every write is read-existing → write temp file in the same directory →
//! rename over the target, so a crash leaves the day-file either untouched or
//! fully updated. The read-modify-rename sequence is not atomic across
//! concurrent writers to the same (source, date); callers must serialize
//! such writers themselves.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use flate2::read::GzDecoder;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use super::types::{MemoryEntry, Source};
use crate::layout::DirectoryManager;

pub(crate) const PLAIN_EXT: &str = "jsonl";
pub(crate) const GZ_EXT: &str = "jsonl.gz";

/// One project's memory log.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    project_key: String,
    memory_dir: PathBuf,
    archive_dir: PathBuf,
}

impl MemoryStore {
    pub fn new(dirs: &DirectoryManager, project_key: &str) -> Self {
        Self {
            project_key: project_key.to_string(),
            memory_dir: dirs.memory_dir(project_key),
            archive_dir: dirs.archive_dir(project_key),
        }
    }

    pub fn project_key(&self) -> &str {
        &self.project_key
    }

    pub fn source_dir(&self, source: Source) -> PathBuf {
        self.memory_dir.join(source.as_str())
    }

    pub fn archive_source_dir(&self, source: Source) -> PathBuf {
        self.archive_dir.join(source.as_str())
    }

    /// Path of the plain day-file for `date` (which may not exist).
    pub fn day_path(&self, source: Source, date: NaiveDate) -> PathBuf {
        self.source_dir(source).join(day_file_name(date, PLAIN_EXT))
    }

    /// Path of the compressed day-file for `date` (which may not exist).
    pub fn gz_path(&self, source: Source, date: NaiveDate) -> PathBuf {
        self.source_dir(source).join(day_file_name(date, GZ_EXT))
    }

    /// Append one entry to its day-file. `synced_at` defaults to now and the
    /// entry's source is set to `source`. Returns the day-file path.
    pub fn append(&self, source: Source, entry: MemoryEntry) -> Result<PathBuf> {
        let date = entry.event_date();
        let line = encode_line(source, entry)?;
        self.append_lines(source, date, &[line])
    }

    /// Append many entries with one read/temp/rename cycle per event date.
    /// Returns the number of entries written.
    pub fn append_batch(&self, source: Source, entries: Vec<MemoryEntry>) -> Result<usize> {
        let mut by_date: BTreeMap<NaiveDate, Vec<String>> = BTreeMap::new();
        for entry in entries {
            let date = entry.event_date();
            by_date.entry(date).or_default().push(encode_line(source, entry)?);
        }

        let mut written = 0;
        for (date, lines) in &by_date {
            self.append_lines(source, *date, lines)?;
            written += lines.len();
        }

        tracing::debug!(
            project = %self.project_key,
            %source,
            entries = written,
            files = by_date.len(),
            "appended batch"
        );
        Ok(written)
    }

    /// Entries for `source` between `start` and `end` inclusive, day by day.
    ///
    /// Without bounds, all dates present on disk are read. With only `start`
    /// the range ends today; with only `end` it starts at the earliest date
    /// on disk. Missing dates and malformed lines are skipped.
    pub fn read_entries(
        &self,
        source: Source,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<MemoryEntry>> {
        let dates = match (start, end) {
            (None, None) => self.list_dates(source)?,
            (start, end) => {
                let end = end.unwrap_or_else(|| Local::now().date_naive());
                let start = match start {
                    Some(s) => s,
                    None => match self.list_dates(source)?.first() {
                        Some(first) => *first,
                        None => return Ok(Vec::new()),
                    },
                };
                date_range(start, end)
            }
        };

        let mut entries = Vec::new();
        for date in dates {
            entries.extend(self.read_day(source, date)?);
        }
        Ok(entries)
    }

    /// Entries in one day-file (plain or compressed), in append order.
    pub fn read_day(&self, source: Source, date: NaiveDate) -> Result<Vec<MemoryEntry>> {
        let Some(text) = self.read_day_text(source, date)? else {
            return Ok(Vec::new());
        };
        Ok(parse_entries(&text, &self.day_path(source, date)))
    }

    /// Raw JSON records of one day-file with their zero-based line numbers.
    /// Lines that are not JSON objects are skipped; line numbers are kept.
    pub fn read_raw(&self, source: Source, date: NaiveDate) -> Result<Vec<(usize, serde_json::Value)>> {
        let Some(text) = self.read_day_text(source, date)? else {
            return Ok(Vec::new());
        };
        Ok(text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(n, line)| match serde_json::from_str::<serde_json::Value>(line) {
                Ok(v) if v.is_object() => Some((n, v)),
                _ => {
                    tracing::debug!(%source, %date, line = n, "skipping malformed memory line");
                    None
                }
            })
            .collect())
    }

    /// Replace the stored entry with the same id in its day-file by
    /// rewriting the whole file. Returns `false` if no such id exists there.
    pub fn update_entry(&self, source: Source, entry: MemoryEntry) -> Result<bool> {
        let date = entry.event_date();
        let Some(text) = self.read_day_text(source, date)? else {
            return Ok(false);
        };

        let id = entry.id.clone();
        let replacement = encode_line(source, entry)?;
        let mut found = false;
        let mut out = String::with_capacity(text.len() + replacement.len());
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let matches = !found
                && serde_json::from_str::<serde_json::Value>(line)
                    .ok()
                    .and_then(|v| v.get("id").and_then(|i| i.as_str()).map(|i| i == id))
                    .unwrap_or(false);
            if matches {
                out.push_str(&replacement);
                found = true;
            } else {
                out.push_str(line);
            }
            out.push('\n');
        }

        if found {
            self.replace_day(source, date, out.as_bytes())?;
        }
        Ok(found)
    }

    /// Dates with a plain or compressed day-file for `source`, ascending.
    pub fn list_dates(&self, source: Source) -> Result<Vec<NaiveDate>> {
        let mut dates: Vec<NaiveDate> = list_day_files(&self.source_dir(source))?
            .into_iter()
            .map(|f| f.date)
            .collect();
        dates.sort();
        dates.dedup();
        Ok(dates)
    }

    /// Append pre-encoded lines to the day-file for `date`.
    fn append_lines(&self, source: Source, date: NaiveDate, lines: &[String]) -> Result<PathBuf> {
        let mut content = self.read_day_text(source, date)?.unwrap_or_default();
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        for line in lines {
            content.push_str(line);
            content.push('\n');
        }
        self.replace_day(source, date, content.as_bytes())
    }

    /// Atomically install `content` as the plain day-file, dropping any
    /// compressed twin so the two forms stay mutually exclusive.
    fn replace_day(&self, source: Source, date: NaiveDate, content: &[u8]) -> Result<PathBuf> {
        let dir = self.source_dir(source);
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

        let target = self.day_path(source, date);
        write_atomic(&target, content)?;

        let gz = self.gz_path(source, date);
        if gz.exists() {
            fs::remove_file(&gz).with_context(|| format!("failed to remove {}", gz.display()))?;
        }
        Ok(target)
    }

    /// Full text of the day-file: the plain file if present, else the
    /// decompressed `.gz`, else `None`.
    fn read_day_text(&self, source: Source, date: NaiveDate) -> Result<Option<String>> {
        let plain = self.day_path(source, date);
        if plain.exists() {
            let text = fs::read_to_string(&plain)
                .with_context(|| format!("failed to read {}", plain.display()))?;
            return Ok(Some(text));
        }
        let gz = self.gz_path(source, date);
        if gz.exists() {
            return read_gz(&gz).map(Some);
        }
        Ok(None)
    }
}

/// A day-file found on disk.
#[derive(Debug, Clone)]
pub(crate) struct DayFile {
    pub path: PathBuf,
    pub date: NaiveDate,
    pub compressed: bool,
}

/// Day-files in `dir`. Files whose stem is not a `YYYY-MM-DD` date are
/// ignored; a missing directory yields nothing.
pub(crate) fn list_day_files(dir: &Path) -> Result<Vec<DayFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let (stem, compressed) = if let Some(stem) = name.strip_suffix(".jsonl.gz") {
            (stem, true)
        } else if let Some(stem) = name.strip_suffix(".jsonl") {
            (stem, false)
        } else {
            continue;
        };
        if let Ok(date) = NaiveDate::parse_from_str(stem, "%Y-%m-%d") {
            files.push(DayFile {
                path: entry.path(),
                date,
                compressed,
            });
        }
    }
    Ok(files)
}

pub(crate) fn day_file_name(date: NaiveDate, ext: &str) -> String {
    format!("{}.{ext}", date.format("%Y-%m-%d"))
}

pub(crate) fn read_gz(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut text = String::new();
    GzDecoder::new(file)
        .read_to_string(&mut text)
        .with_context(|| format!("failed to decompress {}", path.display()))?;
    Ok(text)
}

/// Write `content` to a temp file beside `target`, fsync, then rename over
/// `target`. The temp file is removed if any step fails.
pub(crate) fn write_atomic(target: &Path, content: &[u8]) -> Result<()> {
    let dir = target
        .parent()
        .with_context(|| format!("{} has no parent directory", target.display()))?;
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("day");
    let tmp = dir.join(format!(".{name}.{}.tmp", uuid::Uuid::now_v7()));

    let result = (|| -> Result<()> {
        let mut file =
            File::create(&tmp).with_context(|| format!("failed to create {}", tmp.display()))?;
        file.write_all(content)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, target)
            .with_context(|| format!("failed to rename onto {}", target.display()))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn encode_line(source: Source, mut entry: MemoryEntry) -> Result<String> {
    entry.source = source;
    if entry.synced_at.is_none() {
        entry.synced_at = Some(Local::now());
    }
    serde_json::to_string(&entry).context("failed to encode memory entry")
}

fn parse_entries(text: &str, path: &Path) -> Vec<MemoryEntry> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match serde_json::from_str::<MemoryEntry>(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!(file = %path.display(), line = n, error = %e, "skipping malformed memory line");
                None
            }
        })
        .collect()
}

fn date_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut day = start;
    while day <= end {
        dates.push(day);
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    dates
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> MemoryStore {
        let dirs = DirectoryManager::new(tmp.path());
        dirs.ensure_project_structure("p").unwrap();
        MemoryStore::new(&dirs, "p")
    }

    fn entry(id: &str, day: u32, hour: u32) -> MemoryEntry {
        let ts = Local.with_ymd_and_hms(2026, 1, day, hour, 0, 0).unwrap();
        MemoryEntry::new(id, Source::Backlog, ts, format!("content {id}"))
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, day).unwrap()
    }

    #[test]
    fn append_defaults_synced_at_and_source() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let mut e = entry("e1", 20, 10);
        e.source = Source::Slack;

        store.append(Source::Backlog, e).unwrap();
        let read = store.read_day(Source::Backlog, date(20)).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].source, Source::Backlog);
        assert!(read[0].synced_at.is_some());
    }

    #[test]
    fn append_preserves_append_order_within_a_file() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.append(Source::Backlog, entry("late", 20, 15)).unwrap();
        store.append(Source::Backlog, entry("early", 20, 9)).unwrap();

        let ids: Vec<String> = store
            .read_day(Source::Backlog, date(20))
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["late", "early"]);
    }

    #[test]
    fn no_temp_files_left_behind() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.append_batch(Source::Backlog, vec![entry("a", 1, 1), entry("b", 2, 1)]).unwrap();

        let leftovers: Vec<_> = fs::read_dir(store.source_dir(Source::Backlog))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.append(Source::Backlog, entry("ok1", 20, 10)).unwrap();

        let path = store.day_path(Source::Backlog, date(20));
        let mut text = fs::read_to_string(&path).unwrap();
        text.push_str("{not json\n\n[1,2,3]\n");
        fs::write(&path, text).unwrap();
        store.append(Source::Backlog, entry("ok2", 20, 11)).unwrap();

        let ids: Vec<String> = store
            .read_day(Source::Backlog, date(20))
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["ok1", "ok2"]);

        let raw = store.read_raw(Source::Backlog, date(20)).unwrap();
        let lines: Vec<usize> = raw.iter().map(|(n, _)| *n).collect();
        assert_eq!(lines, vec![0, 4]);
    }

    #[test]
    fn update_entry_rewrites_matching_line_only() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store
            .append_batch(Source::Backlog, vec![entry("a", 20, 10), entry("b", 20, 11)])
            .unwrap();

        let mut changed = entry("b", 20, 11);
        changed.content = "edited".into();
        assert!(store.update_entry(Source::Backlog, changed).unwrap());
        assert!(!store.update_entry(Source::Backlog, entry("zzz", 20, 11)).unwrap());
        assert!(!store.update_entry(Source::Backlog, entry("a", 25, 11)).unwrap());

        let entries = store.read_day(Source::Backlog, date(20)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].content, "content a");
        assert_eq!(entries[1].content, "edited");
    }

    #[test]
    fn read_range_bounds() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store
            .append_batch(
                Source::Backlog,
                vec![entry("a", 10, 1), entry("b", 12, 1), entry("c", 14, 1)],
            )
            .unwrap();

        assert_eq!(store.read_entries(Source::Backlog, None, None).unwrap().len(), 3);
        assert_eq!(store.read_entries(Source::Backlog, None, Some(date(12))).unwrap().len(), 2);
        assert_eq!(
            store.read_entries(Source::Backlog, Some(date(11)), Some(date(13))).unwrap().len(),
            1
        );
        assert!(store
            .read_entries(Source::Backlog, Some(date(14)), Some(date(10)))
            .unwrap()
            .is_empty());
        assert!(store.read_entries(Source::Slack, None, Some(date(12))).unwrap().is_empty());
    }

    #[test]
    fn list_day_files_ignores_foreign_names() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let dir = store.source_dir(Source::Gmail);
        fs::write(dir.join("notes.txt"), "x").unwrap();
        fs::write(dir.join("not-a-date.jsonl"), "x").unwrap();
        fs::write(dir.join("2026-01-05.jsonl"), "").unwrap();

        assert_eq!(store.list_dates(Source::Gmail).unwrap(), vec![date(5)]);
    }

    #[test]
    fn date_range_is_inclusive() {
        assert_eq!(date_range(date(1), date(3)), vec![date(1), date(2), date(3)]);
        assert!(date_range(date(3), date(1)).is_empty());
    }
}

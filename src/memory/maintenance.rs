//! Data lifecycle for the memory log: gzip old day-files, then move much
//! older ones out of the queryable tree into `archive/<source>/`.

use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

use super::store::{day_file_name, list_day_files, read_gz, write_atomic, DayFile, MemoryStore, GZ_EXT, PLAIN_EXT};
use super::types::Source;

#[derive(Debug, Default, Serialize)]
pub struct LifecycleResult {
    pub compressed: usize,
    pub archived: usize,
}

impl MemoryStore {
    /// Gzip plain day-files whose date is more than `days_threshold` days
    /// before today, removing the plain file. Returns files compressed.
    pub fn compress_old_files(&self, days_threshold: u32) -> Result<usize> {
        match cutoff_date(Local::now().date_naive(), days_threshold) {
            Some(cutoff) => self.compress_files_before(cutoff),
            None => Ok(0),
        }
    }

    /// Move day-files (plain or gz) whose date is more than
    /// `days_threshold` days before today into the archive. Returns files moved.
    pub fn archive_old_files(&self, days_threshold: u32) -> Result<usize> {
        match cutoff_date(Local::now().date_naive(), days_threshold) {
            Some(cutoff) => self.archive_files_before(cutoff),
            None => Ok(0),
        }
    }

    /// Live (source, date) pairs that `archive_old_files(days_threshold)`
    /// would move right now.
    pub fn archive_candidates(&self, days_threshold: u32) -> Result<Vec<(Source, NaiveDate)>> {
        let Some(cutoff) = cutoff_date(Local::now().date_naive(), days_threshold) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for source in Source::ALL {
            out.extend(
                self.list_dates(source)?
                    .into_iter()
                    .filter(|d| *d < cutoff)
                    .map(|d| (source, d)),
            );
        }
        Ok(out)
    }

    /// Compress then archive, per the configured thresholds.
    pub fn run_lifecycle(&self, compress_after_days: u32, archive_after_days: u32) -> Result<LifecycleResult> {
        let compressed = self.compress_old_files(compress_after_days)?;
        let archived = self.archive_old_files(archive_after_days)?;
        tracing::info!(
            project = %self.project_key(),
            compressed,
            archived,
            "memory lifecycle complete"
        );
        Ok(LifecycleResult { compressed, archived })
    }

    /// Compress every plain day-file dated strictly before `cutoff`.
    pub fn compress_files_before(&self, cutoff: NaiveDate) -> Result<usize> {
        let mut count = 0;
        for source in Source::ALL {
            for file in list_day_files(&self.source_dir(source))? {
                if file.compressed || file.date >= cutoff {
                    continue;
                }
                let plain = fs::read(&file.path)
                    .with_context(|| format!("failed to read {}", file.path.display()))?;

                write_atomic(&self.gz_path(source, file.date), &gzip(&plain)?)?;
                fs::remove_file(&file.path)
                    .with_context(|| format!("failed to remove {}", file.path.display()))?;
                tracing::debug!(%source, date = %file.date, "compressed day-file");
                count += 1;
            }
        }
        Ok(count)
    }

    /// Move every day-file dated strictly before `cutoff` to the archive.
    /// A date that is already archived gets the new lines appended to the
    /// archived file instead of being replaced.
    pub fn archive_files_before(&self, cutoff: NaiveDate) -> Result<usize> {
        let mut count = 0;
        for source in Source::ALL {
            let dest_dir = self.archive_source_dir(source);
            for file in list_day_files(&self.source_dir(source))? {
                if file.date >= cutoff {
                    continue;
                }
                fs::create_dir_all(&dest_dir)
                    .with_context(|| format!("failed to create {}", dest_dir.display()))?;

                let existing = [PLAIN_EXT, GZ_EXT]
                    .into_iter()
                    .map(|ext| dest_dir.join(day_file_name(file.date, ext)))
                    .find(|p| p.exists());
                match existing {
                    Some(dest) => merge_into_archive(&file, &dest)?,
                    None => {
                        let ext = if file.compressed { GZ_EXT } else { PLAIN_EXT };
                        let dest = dest_dir.join(day_file_name(file.date, ext));
                        fs::rename(&file.path, &dest).with_context(|| {
                            format!("failed to move {} to {}", file.path.display(), dest.display())
                        })?;
                    }
                }
                tracing::debug!(%source, date = %file.date, "archived day-file");
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Append the lines of a live day-file to the archived file for the same
/// date, keeping the archived file's form, then remove the live file.
fn merge_into_archive(file: &DayFile, dest: &Path) -> Result<()> {
    let dest_compressed = dest.to_string_lossy().ends_with(GZ_EXT);
    let mut merged = read_day_file(dest, dest_compressed)?;
    if !merged.is_empty() && !merged.ends_with('\n') {
        merged.push('\n');
    }
    merged.push_str(&read_day_file(&file.path, file.compressed)?);

    let bytes = if dest_compressed {
        gzip(merged.as_bytes())?
    } else {
        merged.into_bytes()
    };
    write_atomic(dest, &bytes)?;
    fs::remove_file(&file.path)
        .with_context(|| format!("failed to remove {}", file.path.display()))?;
    tracing::info!(date = %file.date, archive = %dest.display(), "merged day-file into existing archive");
    Ok(())
}

fn read_day_file(path: &Path, compressed: bool) -> Result<String> {
    if compressed {
        read_gz(path)
    } else {
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
    }
}

fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish().context("failed to gzip day-file")
}

/// First date that is *not* older than `days` days before `today`, or
/// `None` when the threshold reaches past the earliest representable date.
fn cutoff_date(today: NaiveDate, days: u32) -> Option<NaiveDate> {
    today.checked_sub_signed(Duration::days(i64::from(days)))
}

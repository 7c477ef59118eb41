//! CLI `maintain` command: memory log compression and archival.

use anyhow::Result;

use memlog::config::MemlogConfig;

use super::open_workspace;

/// Compress then archive old day-files for one project or all of them.
pub fn maintain(
    config: &MemlogConfig,
    project: Option<&str>,
    compress_days: Option<u32>,
    archive_days: Option<u32>,
) -> Result<()> {
    let compress_days = compress_days.unwrap_or(config.lifecycle.compress_after_days);
    let archive_days = archive_days.unwrap_or(config.lifecycle.archive_after_days);
    anyhow::ensure!(
        archive_days > compress_days,
        "archive threshold ({archive_days}d) must exceed compress threshold ({compress_days}d)"
    );

    let ws = open_workspace(config)?;
    let keys = match project {
        Some(key) => vec![key.to_string()],
        None => ws
            .metadata()
            .projects()
            .list()?
            .into_iter()
            .map(|p| p.project_key)
            .collect(),
    };

    if keys.is_empty() {
        println!("No projects to maintain.");
        return Ok(());
    }

    for key in keys {
        let result = ws.run_lifecycle(&key, compress_days, archive_days)?;
        println!(
            "{key}: compressed {} file(s) older than {compress_days}d, archived {} older than {archive_days}d.",
            result.compressed, result.archived
        );
    }
    Ok(())
}

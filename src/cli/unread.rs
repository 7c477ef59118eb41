use anyhow::Result;

use memlog::config::MemlogConfig;
use memlog::memory::Source;

use super::open_workspace;

pub fn unread(config: &MemlogConfig, project: &str, show: bool, mark_read: bool) -> Result<()> {
    let ws = open_workspace(config)?;
    ws.require_project(project)?;
    let detector = ws.unread();
    let summary = detector.get_unread_summary(project)?;

    println!("Unread in {project}: {}", summary.total);
    for s in &summary.sources {
        println!(
            "  {:<10} {:>5}  (since {})",
            s.source.as_str(),
            s.count,
            s.cutoff.format("%Y-%m-%d %H:%M")
        );
    }

    if show {
        for s in summary.sources.iter().filter(|s| s.count > 0) {
            println!();
            println!("[{}]", s.source);
            for entry in detector.get_unread_entries(project, s.source)? {
                let first_line = entry.content.lines().next().unwrap_or_default();
                println!("  {}  {}  {}", entry.timestamp.format("%m-%d %H:%M"), entry.id, first_line);
            }
        }
    }

    if mark_read {
        detector.mark_as_read(project, &Source::ALL)?;
        println!();
        println!("Marked all sources read.");
    }
    Ok(())
}

//! CLI `doctor` command: database diagnostics and workspace consistency.

use anyhow::{Context, Result};

use memlog::config::MemlogConfig;

use super::open_workspace;

/// Run diagnostics and print a health report.
pub fn doctor(config: &MemlogConfig) -> Result<()> {
    let ws = open_workspace(config)?;
    let metadata_path = ws.dirs().metadata_db_path();

    println!("memlog Health Report");
    println!("====================");
    println!();
    println!("Base directory:    {}", ws.dirs().base_dir().display());
    println!("Embedding:         {} ({})", config.embedding.provider, ws.provider().model_name());
    println!();

    let report = ws
        .metadata()
        .check_health()
        .context("failed to check metadata database")?;
    println!("Metadata database: {}", metadata_path.display());
    println!("  File size:       {}", format_bytes(file_size(&metadata_path)));
    for (table, count) in &report.table_counts {
        println!("  {table:<16} {count}");
    }
    print_integrity(report.integrity_ok, &report.integrity_details);

    let mut problems = 0usize;
    for project in ws.metadata().projects().list()? {
        let key = &project.project_key;
        println!();
        println!("Project {key}");
        if !ws.dirs().project_exists(key) {
            println!("  Directory:       MISSING (run `memlog reconcile`)");
            problems += 1;
            continue;
        }
        let db_path = ws.dirs().embeddings_db_path(key);
        if !db_path.exists() {
            println!("  Index:           not built (run `memlog index {key}`)");
            continue;
        }
        let store = ws.embedding_store(key)?;
        let health = store.check_health()?;
        let stats = store.get_stats()?;
        println!("  Index:           {} ({})", db_path.display(), format_bytes(file_size(&db_path)));
        println!("  Items:           {} ({} with embeddings)", stats.total_items, stats.with_embedding);
        let stored_model = stats.embedding_model.as_deref().unwrap_or("(not set)");
        println!("  Embedding model: {stored_model}");
        if stats.embedding_model.as_deref() != Some(ws.provider().model_name())
            && ws.provider().model_name() != "none"
        {
            println!("  WARNING: model mismatch; re-run `memlog index {key}` to refresh vectors.");
        }
        print_integrity(health.integrity_ok, &health.integrity_details);
        if !health.integrity_ok {
            problems += 1;
        }
    }

    let orphans: Vec<String> = ws
        .dirs()
        .list_projects()?
        .into_iter()
        .filter(|k| !matches!(ws.metadata().projects().exists(k), Ok(true)))
        .collect();
    if !orphans.is_empty() {
        println!();
        println!("Unregistered directories: {}", orphans.join(", "));
        println!("  Run `memlog reconcile --adopt` to register them.");
        problems += orphans.len();
    }

    println!();
    if problems == 0 {
        println!("No problems found.");
    } else {
        println!("{problems} problem(s) found.");
    }
    Ok(())
}

fn print_integrity(ok: bool, details: &str) {
    if ok {
        println!("  Integrity check: PASSED");
    } else {
        println!("  Integrity check: FAILED ({details})");
    }
}

fn file_size(path: &std::path::Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

use anyhow::Result;

use memlog::config::MemlogConfig;

use super::open_workspace;

/// Display memory log and index statistics in the terminal.
pub fn stats(config: &MemlogConfig, project: &str) -> Result<()> {
    let ws = open_workspace(config)?;
    let memory = ws.memory_store(project)?.get_stats()?;
    let index = ws.embedding_store(project)?.get_stats()?;

    println!("Memory log: {project}");
    println!("{}", "=".repeat(40));
    println!(
        "  {:<10} {:>6} {:>6} {:>9}  {}",
        "source", "plain", "gz", "archived", "range"
    );
    for s in &memory.sources {
        let range = match (s.oldest_date, s.newest_date) {
            (Some(a), Some(b)) => format!("{a} .. {b}"),
            _ => "-".to_string(),
        };
        println!(
            "  {:<10} {:>6} {:>6} {:>9}  {}",
            s.source.as_str(),
            s.plain_files,
            s.compressed_files,
            s.archived_files,
            range
        );
    }
    println!();

    println!("Index");
    println!("{}", "=".repeat(40));
    println!("  Total items:         {}", index.total_items);
    println!("  With embeddings:     {}", index.with_embedding);
    println!("  Knowledge:           {}", index.knowledge_items);
    println!("  Memory:              {}", index.memory_items);
    println!(
        "  Sources:             {}",
        if index.sources.is_empty() { "-".to_string() } else { index.sources.join(", ") }
    );
    println!(
        "  Embedding model:     {}",
        index.embedding_model.as_deref().unwrap_or("(not set)")
    );
    if let Some(last) = index.last_indexed {
        println!("  Last indexed:        {}", last.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    Ok(())
}

use anyhow::Result;
use chrono::{DateTime, Local};

use memlog::config::MemlogConfig;
use memlog::memory::Source;

use super::open_workspace;

/// Index knowledge and/or memory. With neither flag both are indexed.
pub fn index(
    config: &MemlogConfig,
    project: &str,
    knowledge: bool,
    memory: bool,
    source: Option<Source>,
    since: Option<DateTime<Local>>,
) -> Result<()> {
    let ws = open_workspace(config)?;
    let indexer = ws.indexer(project)?;
    let both = !knowledge && !memory;

    if knowledge || both {
        println!("Indexing knowledge...");
        let n = indexer.index_knowledge()?;
        println!("  {n} knowledge item(s) indexed.");
    }
    if memory || both {
        println!("Indexing memory...");
        let n = indexer.index_memory(source, since)?;
        println!("  {n} memory item(s) indexed.");
    }

    let stats = indexer.get_index_status()?;
    println!(
        "Index now holds {} item(s), {} with embeddings.",
        stats.total_items, stats.with_embedding
    );
    if stats.with_embedding < stats.total_items {
        println!("  Items without embeddings are searchable by keyword only.");
    }
    Ok(())
}

use anyhow::Result;
use chrono::NaiveDate;

use memlog::config::MemlogConfig;
use memlog::index::hybrid::format_results;
use memlog::index::{Layer, SearchFilter};

use super::open_workspace;

pub struct SearchArgs {
    pub top_k: Option<usize>,
    pub min_score: f64,
    pub layer: Option<Layer>,
    pub source: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub full: bool,
}

/// Run a hybrid search from the terminal. A date range implies the memory layer.
pub fn search(config: &MemlogConfig, project: &str, query: &str, args: SearchArgs) -> Result<()> {
    let ws = open_workspace(config)?;
    let hybrid = ws.hybrid(project)?;
    let top_k = args.top_k.unwrap_or(config.retrieval.default_top_k);
    let source = args.source.as_deref();

    let results = match (args.layer, args.from.is_some() || args.to.is_some()) {
        (Some(Layer::Knowledge), true) => {
            anyhow::bail!("--from/--to only apply to the memory layer")
        }
        (_, true) | (Some(Layer::Memory), false) => {
            hybrid.search_memory(query, top_k, args.min_score, source, args.from, args.to)?
        }
        (Some(Layer::Knowledge), false) => {
            hybrid.search_knowledge(query, top_k, args.min_score, source)?
        }
        (None, false) => hybrid.search(
            query,
            top_k,
            args.min_score,
            SearchFilter::default().with_source(source),
        )?,
    };

    print!("{}", format_results(&results, args.full));
    Ok(())
}

pub fn related(
    config: &MemlogConfig,
    project: &str,
    item_id: &str,
    top_k: Option<usize>,
    min_score: f64,
) -> Result<()> {
    let ws = open_workspace(config)?;
    let hybrid = ws.hybrid(project)?;
    let top_k = top_k.unwrap_or(config.retrieval.default_top_k);

    let results = hybrid.get_related(item_id, top_k, min_score, SearchFilter::default())?;
    if results.is_empty() {
        println!("No items related to '{item_id}'.");
        return Ok(());
    }
    print!("{}", format_results(&results, false));
    Ok(())
}

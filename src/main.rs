mod cli;

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use memlog::config::MemlogConfig;
use memlog::index::Layer;
use memlog::memory::Source;

#[derive(Parser)]
#[command(name = "memlog", version, about = "Per-project memory log with hybrid search")]
struct Cli {
    /// Config file (default: ~/.memlog/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a project and create its directory tree
    Init {
        project: String,
        #[arg(long)]
        name: Option<String>,
        /// Project config as a JSON object
        #[arg(long)]
        config_json: Option<String>,
    },
    /// List registered projects and orphaned directories
    Projects,
    /// Recreate missing project trees from the registry
    Reconcile {
        /// Register directories that have no registry row
        #[arg(long)]
        adopt: bool,
    },
    /// Delete a project: files, registry, cursors and index
    Delete {
        project: String,
        /// Required; deletion is irreversible
        #[arg(long)]
        yes: bool,
    },
    /// Append JSONL entries (from a file or stdin) to the memory log
    Append {
        project: String,
        source: Source,
        /// Input file; reads stdin when omitted
        file: Option<PathBuf>,
    },
    /// Index knowledge files and/or memory into the search index
    Index {
        project: String,
        #[arg(long)]
        knowledge: bool,
        #[arg(long)]
        memory: bool,
        #[arg(long)]
        source: Option<Source>,
        /// Only memory entries at or after this timestamp
        #[arg(long, value_parser = parse_since)]
        since: Option<DateTime<Local>>,
    },
    /// Hybrid search over a project's index
    Search {
        project: String,
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long, default_value_t = 0.0)]
        min_score: f64,
        #[arg(long)]
        layer: Option<Layer>,
        #[arg(long)]
        source: Option<String>,
        /// Memory results on or after this date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        from: Option<NaiveDate>,
        /// Memory results on or before this date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        to: Option<NaiveDate>,
        /// Print full content instead of previews
        #[arg(long)]
        full: bool,
    },
    /// Items similar to an indexed item
    Related {
        project: String,
        item_id: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long, default_value_t = 0.0)]
        min_score: f64,
    },
    /// Memory log and index statistics
    Stats { project: String },
    /// Compress and archive old day-files
    Maintain {
        /// Project to maintain; all registered projects when omitted
        project: Option<String>,
        #[arg(long)]
        compress_days: Option<u32>,
        #[arg(long)]
        archive_days: Option<u32>,
    },
    /// Unread counts since the cutoff
    Unread {
        project: String,
        /// Print the unread entries, not just counts
        #[arg(long)]
        show: bool,
        /// Mark all sources read afterwards
        #[arg(long)]
        mark_read: bool,
    },
    /// Check database health and workspace consistency
    Doctor,
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| format!("invalid date '{raw}': {e}"))
}

fn parse_since(raw: &str) -> Result<DateTime<Local>, String> {
    memlog::memory::types::parse_timestamp(raw).ok_or_else(|| format!("invalid timestamp '{raw}'"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MemlogConfig::load_from(path)?,
        None => MemlogConfig::load()?,
    };

    // Log to stderr so stdout carries only command output.
    let filter = EnvFilter::try_new(&config.logging.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Init {
            project,
            name,
            config_json,
        } => cli::projects::init(&config, &project, name.as_deref(), config_json.as_deref())?,
        Command::Projects => cli::projects::list(&config)?,
        Command::Reconcile { adopt } => cli::projects::reconcile(&config, adopt)?,
        Command::Delete { project, yes } => cli::projects::delete(&config, &project, yes)?,
        Command::Append {
            project,
            source,
            file,
        } => cli::append::append(&config, &project, source, file.as_deref())?,
        Command::Index {
            project,
            knowledge,
            memory,
            source,
            since,
        } => cli::index::index(&config, &project, knowledge, memory, source, since)?,
        Command::Search {
            project,
            query,
            top_k,
            min_score,
            layer,
            source,
            from,
            to,
            full,
        } => cli::search::search(
            &config,
            &project,
            &query,
            cli::search::SearchArgs {
                top_k,
                min_score,
                layer,
                source,
                from,
                to,
                full,
            },
        )?,
        Command::Related {
            project,
            item_id,
            top_k,
            min_score,
        } => cli::search::related(&config, &project, &item_id, top_k, min_score)?,
        Command::Stats { project } => cli::stats::stats(&config, &project)?,
        Command::Maintain {
            project,
            compress_days,
            archive_days,
        } => cli::maintenance::maintain(&config, project.as_deref(), compress_days, archive_days)?,
        Command::Unread {
            project,
            show,
            mark_read,
        } => cli::unread::unread(&config, &project, show, mark_read)?,
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}

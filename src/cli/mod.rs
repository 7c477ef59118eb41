//! Terminal front-end. Each submodule implements one group of commands and
//! prints a human-readable report to stdout.

pub mod append;
pub mod doctor;
pub mod index;
pub mod maintenance;
pub mod projects;
pub mod search;
pub mod stats;
pub mod unread;

use anyhow::Result;

use memlog::config::MemlogConfig;
use memlog::workspace::Workspace;

/// Open the workspace described by `config`.
pub fn open_workspace(config: &MemlogConfig) -> Result<Workspace> {
    Workspace::open(config.clone())
}

use anyhow::{Context, Result};

use memlog::config::MemlogConfig;

use super::open_workspace;

pub fn init(config: &MemlogConfig, project: &str, name: Option<&str>, config_json: Option<&str>) -> Result<()> {
    let project_config = config_json
        .map(|raw| serde_json::from_str::<serde_json::Value>(raw))
        .transpose()
        .context("--config-json is not valid JSON")?;

    let ws = open_workspace(config)?;
    let dir = ws.create_project(project, name, project_config.as_ref())?;
    println!("Project '{project}' ready at {}", dir.display());
    Ok(())
}

pub fn list(config: &MemlogConfig) -> Result<()> {
    let ws = open_workspace(config)?;
    let registered = ws.metadata().projects().list()?;
    let on_disk = ws.dirs().list_projects()?;

    if registered.is_empty() && on_disk.is_empty() {
        println!("No projects. Create one with `memlog init <key>`.");
        return Ok(());
    }

    println!("{:<24} {:<28} {:<10} {}", "KEY", "NAME", "ON DISK", "CREATED");
    println!("{}", "-".repeat(80));
    for p in &registered {
        println!(
            "{:<24} {:<28} {:<10} {}",
            p.project_key,
            p.name.as_deref().unwrap_or("-"),
            if on_disk.contains(&p.project_key) { "yes" } else { "MISSING" },
            p.created_at.format("%Y-%m-%d %H:%M"),
        );
    }

    let orphans: Vec<&String> = on_disk
        .iter()
        .filter(|k| !registered.iter().any(|p| &p.project_key == *k))
        .collect();
    if !orphans.is_empty() {
        println!();
        println!("Unregistered directories (run `memlog reconcile --adopt`):");
        for key in orphans {
            println!("  {key}");
        }
    }
    Ok(())
}

pub fn reconcile(config: &MemlogConfig, adopt: bool) -> Result<()> {
    let ws = open_workspace(config)?;
    let report = ws.reconcile(adopt)?;

    if report.recreated.is_empty() && report.orphans.is_empty() {
        println!("Registry and directories agree.");
        return Ok(());
    }
    for key in &report.recreated {
        println!("  recreated tree for '{key}'");
    }
    for key in &report.orphans {
        if report.adopted.contains(key) {
            println!("  adopted '{key}'");
        } else {
            println!("  orphan directory '{key}' (use --adopt to register)");
        }
    }
    Ok(())
}

pub fn delete(config: &MemlogConfig, project: &str, yes: bool) -> Result<()> {
    anyhow::ensure!(
        yes,
        "refusing to delete '{project}' without --yes (this removes its log and index permanently)"
    );
    let ws = open_workspace(config)?;
    if ws.delete_project(project)? {
        println!("Deleted project '{project}'.");
    } else {
        println!("No project '{project}' found.");
    }
    Ok(())
}

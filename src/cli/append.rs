use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};

use memlog::config::MemlogConfig;
use memlog::memory::{MemoryEntry, Source};

use super::open_workspace;

/// Append one JSON object per input line. A missing `source` field is filled
/// from the command line; lines that do not decode are reported and skipped.
pub fn append(config: &MemlogConfig, project: &str, source: Source, file: Option<&Path>) -> Result<()> {
    let reader: Box<dyn BufRead> = match file {
        Some(path) => Box::new(BufReader::new(
            std::fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    let mut entries = Vec::new();
    let mut skipped = 0usize;
    for (n, line) in reader.lines().enumerate() {
        let line = line.context("failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }
        match decode_line(&line, source) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                eprintln!("  line {}: skipped ({e})", n + 1);
                skipped += 1;
            }
        }
    }

    let ws = open_workspace(config)?;
    let store = ws.memory_store(project)?;
    let written = store.append_batch(source, entries)?;
    println!("Appended {written} entr{} to {project}/{source} ({skipped} skipped).", if written == 1 { "y" } else { "ies" });
    Ok(())
}

fn decode_line(line: &str, source: Source) -> Result<MemoryEntry> {
    let mut value: serde_json::Value = serde_json::from_str(line)?;
    let obj = value
        .as_object_mut()
        .context("expected a JSON object")?;
    obj.entry("source")
        .or_insert_with(|| serde_json::Value::String(source.as_str().to_string()));
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_fills_missing_source() {
        let entry = decode_line(
            r#"{"id":"e1","timestamp":"2026-01-20T10:00:00","content":"x"}"#,
            Source::Backlog,
        )
        .unwrap();
        assert_eq!(entry.source, Source::Backlog);
        assert_eq!(entry.id, "e1");
    }

    #[test]
    fn decode_rejects_non_objects_and_bad_timestamps() {
        assert!(decode_line("[1]", Source::Slack).is_err());
        assert!(decode_line(r#"{"id":"x","timestamp":"soon","content":"c"}"#, Source::Slack).is_err());
    }
}

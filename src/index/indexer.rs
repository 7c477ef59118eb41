//! Turns knowledge files and memory day-files into index rows.
//!
//! Knowledge: `glossary.json` entries become `glossary:<term>` items and
//! markdown files are split at headings into `<source>:<stem>:<n>` items.
//! Memory: every JSONL record becomes one item whose text is a
//! source-specific projection of its fields.
//!
//! All writes are upserts, so re-running any operation is idempotent.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use super::{EmbeddingStore, IndexStats, ItemInput, Layer};
use crate::layout::DirectoryManager;
use crate::memory::types::{parse_timestamp, Source};
use crate::memory::MemoryStore;
use crate::metadata::MetadataDb;

const GLOSSARY_SOURCE: &str = "glossary";

/// Totals from [`Indexer::reindex_all`].
#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub knowledge_items: usize,
    pub memory_items: usize,
    pub completed_at: DateTime<Utc>,
}

pub struct Indexer {
    project_key: String,
    dirs: DirectoryManager,
    memory: MemoryStore,
    store: Arc<EmbeddingStore>,
    metadata: Option<MetadataDb>,
}

impl Indexer {
    pub fn new(dirs: &DirectoryManager, project_key: &str, store: Arc<EmbeddingStore>) -> Self {
        Self {
            project_key: project_key.to_string(),
            dirs: dirs.clone(),
            memory: MemoryStore::new(dirs, project_key),
            store,
            metadata: None,
        }
    }

    /// Record indexed knowledge files in the metadata file index.
    pub fn with_metadata(mut self, metadata: MetadataDb) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn store(&self) -> &Arc<EmbeddingStore> {
        &self.store
    }

    /// Index the glossary and every markdown knowledge file. Returns the
    /// number of items stored.
    pub fn index_knowledge(&self) -> Result<usize> {
        let key = &self.project_key;
        let mut stored = self.index_glossary(&self.dirs.glossary_path(key))?;

        let mut markdown = vec![
            ("faq", self.dirs.faq_path(key)),
            ("rules", self.dirs.rules_path(key)),
        ];
        markdown.extend(list_markdown(&self.dirs.specs_dir(key))?.into_iter().map(|p| ("specs", p)));

        for (source, path) in markdown {
            if path.is_file() {
                stored += self.index_markdown(source, &path)?;
            }
        }

        tracing::info!(project = %key, items = stored, "knowledge indexed");
        Ok(stored)
    }

    /// Index memory records for one source (or all), optionally only those
    /// with a timestamp at or after `since`. Returns the number of items stored.
    pub fn index_memory(&self, source: Option<Source>, since: Option<DateTime<Local>>) -> Result<usize> {
        let sources = match source {
            Some(s) => vec![s],
            None => Source::ALL.to_vec(),
        };

        let mut stored = 0;
        for source in sources {
            for date in self.memory.list_dates(source)? {
                if since.is_some_and(|s| date < s.date_naive()) {
                    continue;
                }

                let mut items = Vec::new();
                for (line, record) in self.memory.read_raw(source, date)? {
                    let timestamp = record
                        .get("timestamp")
                        .and_then(Value::as_str)
                        .and_then(parse_timestamp);
                    if let Some(since) = since {
                        match timestamp {
                            Some(ts) if ts >= since => {}
                            _ => continue,
                        }
                    }

                    let item_id = memory_item_id(source, date, line, &record);
                    let content = project_record(source, &record);
                    let metadata = memory_metadata(&record, timestamp, date.to_string());

                    items.push(
                        ItemInput::new(item_id, content)
                            .source(source.as_str())
                            .layer(Layer::Memory)
                            .metadata(metadata),
                    );
                }
                stored += self.store.index_batch(&items)?;
            }
        }

        tracing::info!(project = %self.project_key, items = stored, "memory indexed");
        Ok(stored)
    }

    /// Drop the memory items projected from the given day-files, typically
    /// just before those files move to the archive. Items whose stored date
    /// differs (the id was re-used on a live day) are kept. Returns rows removed.
    pub fn forget_memory_days(&self, days: &[(Source, NaiveDate)]) -> Result<usize> {
        let mut removed = 0;
        for &(source, date) in days {
            let day = date.to_string();
            for (line, record) in self.memory.read_raw(source, date)? {
                let item_id = memory_item_id(source, date, line, &record);
                let Some(item) = self.store.get_item(&item_id)? else {
                    continue;
                };
                let stored_day = item.metadata.get("date").and_then(Value::as_str);
                if stored_day.is_some_and(|d| d != day) {
                    continue;
                }
                if self.store.delete_item(&item_id)? {
                    removed += 1;
                }
            }
        }
        tracing::info!(project = %self.project_key, days = days.len(), removed, "archived memory dropped from index");
        Ok(removed)
    }

    /// Knowledge then memory, in full.
    pub fn reindex_all(&self) -> Result<IndexReport> {
        let knowledge_items = self.index_knowledge()?;
        let memory_items = self.index_memory(None, None)?;
        Ok(IndexReport {
            knowledge_items,
            memory_items,
            completed_at: Utc::now(),
        })
    }

    pub fn get_index_status(&self) -> Result<IndexStats> {
        self.store.get_stats()
    }

    fn index_glossary(&self, path: &Path) -> Result<usize> {
        if !path.is_file() {
            return Ok(0);
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let value: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "glossary is not valid JSON; skipping");
                return Ok(0);
            }
        };

        let items: Vec<ItemInput> = parse_glossary(&value)
            .into_iter()
            .map(|entry| {
                ItemInput::new(format!("glossary:{}", normalize_term(&entry.term)), entry.content)
                    .source(GLOSSARY_SOURCE)
                    .layer(Layer::Knowledge)
                    .metadata(entry.metadata)
            })
            .collect();

        self.store.delete_by_prefix("glossary:")?;
        let stored = self.store.index_batch(&items)?;
        self.record_file(path, GLOSSARY_SOURCE, &text, stored)?;
        Ok(stored)
    }

    fn index_markdown(&self, source: &str, path: &Path) -> Result<usize> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let file = self.relative(path);

        let items: Vec<ItemInput> = split_sections(&text)
            .into_iter()
            .map(|section| {
                ItemInput::new(format!("{source}:{stem}:{}", section.index), section.content)
                    .source(source)
                    .layer(Layer::Knowledge)
                    .metadata(json!({
                        "file": file,
                        "heading": section.heading,
                        "section": section.index,
                    }))
            })
            .collect();

        // Sections removed since the last run must not linger.
        self.store.delete_by_prefix(&format!("{source}:{stem}:"))?;
        let stored = self.store.index_batch(&items)?;
        self.record_file(path, source, &text, stored)?;
        tracing::debug!(file = %file, sections = stored, "markdown indexed");
        Ok(stored)
    }

    fn record_file(&self, path: &Path, source: &str, text: &str, items: usize) -> Result<()> {
        let Some(db) = &self.metadata else {
            return Ok(());
        };
        db.file_index().record(
            &self.project_key,
            &self.relative(path),
            Layer::Knowledge.as_str(),
            source,
            &sha256_hex(text),
            items as u64,
        )
    }

    /// Path relative to the project directory, `/`-separated.
    fn relative(&self, path: &Path) -> String {
        let project_dir = self.dirs.project_dir(&self.project_key);
        path.strip_prefix(&project_dir)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Section {
    /// Position among all sections, counted before empty ones are dropped.
    pub index: usize,
    pub heading: Option<String>,
    pub content: String,
}

/// Split markdown at ATX headings (`#` .. `######`) outside fenced code.
/// Text before the first heading is section 0. Sections whose body is blank
/// are dropped but keep their index slot.
pub(crate) fn split_sections(text: &str) -> Vec<Section> {
    let mut raw: Vec<(Option<String>, Vec<&str>)> = vec![(None, Vec::new())];
    let mut in_fence = false;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        }
        if !in_fence {
            if let Some(heading) = heading_text(trimmed) {
                raw.push((Some(heading), Vec::new()));
                continue;
            }
        }
        if let Some((_, body)) = raw.last_mut() {
            body.push(line);
        }
    }

    raw.into_iter()
        .enumerate()
        .filter_map(|(index, (heading, body))| {
            let body = body.join("\n");
            let body = body.trim();
            if body.is_empty() {
                return None;
            }
            let content = match &heading {
                Some(h) => format!("{h}\n\n{body}"),
                None => body.to_string(),
            };
            Some(Section {
                index,
                heading,
                content,
            })
        })
        .collect()
}

fn heading_text(line: &str) -> Option<String> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }
    Some(rest.trim().trim_end_matches('#').trim().to_string())
}

#[derive(Debug, Clone)]
pub(crate) struct GlossaryEntry {
    pub term: String,
    pub content: String,
    pub metadata: Value,
}

/// Accepts `{ "term": "definition" | {..} }` or `[ { "term": .., .. } ]`.
pub(crate) fn parse_glossary(value: &Value) -> Vec<GlossaryEntry> {
    let pairs: Vec<(String, &Value)> = match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(list) => list
            .iter()
            .filter_map(|v| {
                let term = v.get("term")?.as_str()?;
                Some((term.to_string(), v))
            })
            .collect(),
        _ => Vec::new(),
    };

    pairs
        .into_iter()
        .filter(|(term, _)| !term.trim().is_empty())
        .filter_map(|(term, v)| glossary_entry(term.trim(), v))
        .collect()
}

fn glossary_entry(term: &str, value: &Value) -> Option<GlossaryEntry> {
    let mut metadata = Map::new();
    metadata.insert("term".into(), Value::String(term.to_string()));

    let content = match value {
        Value::String(def) => format!("{term}: {def}"),
        Value::Object(fields) => {
            let definition = ["definition", "description", "meaning"]
                .iter()
                .find_map(|k| fields.get(*k).and_then(Value::as_str))
                .unwrap_or_default();
            let mut content = format!("{term}: {definition}");
            for (k, v) in fields {
                if k == "term" {
                    continue;
                }
                if let Some(s) = v.as_str() {
                    if s != definition {
                        content.push_str(&format!("\n{k}: {s}"));
                    }
                }
                metadata.insert(k.clone(), v.clone());
            }
            content
        }
        Value::Null => return None,
        other => format!("{term}: {other}"),
    };

    Some(GlossaryEntry {
        term: term.to_string(),
        content,
        metadata: Value::Object(metadata),
    })
}

/// Lowercase, with whitespace runs collapsed to `_`.
pub(crate) fn normalize_term(term: &str) -> String {
    term.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// Searchable text for one memory record. Fields are looked up in
/// `metadata` first, then at the top level.
pub(crate) fn project_record(source: Source, record: &Value) -> String {
    let field = |names: &[&str]| -> Option<String> {
        names.iter().find_map(|name| {
            let v = record
                .get("metadata")
                .and_then(|m| m.get(*name))
                .or_else(|| record.get(*name))?;
            let s = match v {
                Value::String(s) => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            (!s.is_empty()).then_some(s)
        })
    };

    let projected = match source {
        Source::Backlog => {
            let title = [field(&["key", "issue_key"]), field(&["summary", "title"])]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            [Some(title), field(&["description", "content"]), field(&["comment"])]
                .into_iter()
                .flatten()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        }
        Source::Slack => {
            let speaker = match (field(&["channel_name", "channel"]), field(&["user_name", "user"])) {
                (Some(c), Some(u)) => format!("#{c} {u}:"),
                (Some(c), None) => format!("#{c}:"),
                (None, Some(u)) => format!("{u}:"),
                (None, None) => String::new(),
            };
            match field(&["text", "content"]) {
                Some(text) if speaker.is_empty() => text,
                Some(text) => format!("{speaker} {text}"),
                None => String::new(),
            }
        }
        Source::Gmail => {
            let mut parts = Vec::new();
            if let Some(subject) = field(&["subject"]) {
                parts.push(format!("Subject: {subject}"));
            }
            if let Some(from) = field(&["from", "sender"]) {
                parts.push(format!("From: {from}"));
            }
            if let Some(body) = field(&["body", "snippet", "content"]) {
                parts.push(body);
            }
            parts.join("\n")
        }
    };

    if !projected.trim().is_empty() {
        return projected;
    }
    ["content", "text"]
        .iter()
        .find_map(|k| record.get(*k).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

/// Record `id` when present, else a positional `<source>:<date>:<line>` id.
fn memory_item_id(source: Source, date: NaiveDate, line: usize, record: &Value) -> String {
    match record.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => format!("{source}:{date}:{line}"),
    }
}

fn memory_metadata(record: &Value, timestamp: Option<DateTime<Local>>, date: String) -> Value {
    let mut metadata = match record.get("metadata") {
        Some(Value::Object(m)) => m.clone(),
        _ => Map::new(),
    };
    metadata.insert("date".into(), Value::String(date));
    match timestamp {
        Some(ts) => {
            metadata.insert("timestamp".into(), Value::String(ts.to_rfc3339()));
        }
        None => {
            if let Some(raw) = record.get("timestamp") {
                metadata.insert("timestamp".into(), raw.clone());
            }
        }
    }
    Value::Object(metadata)
}

fn list_markdown(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "md" || e == "markdown") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_split_at_headings_and_keep_index_slots() {
        let md = "intro text\n\n# First\nbody one\n\n## Empty\n\n## Third\nbody three\n";
        let sections = split_sections(md);
        let summary: Vec<(usize, Option<&str>)> = sections
            .iter()
            .map(|s| (s.index, s.heading.as_deref()))
            .collect();
        assert_eq!(summary, vec![(0, None), (1, Some("First")), (3, Some("Third"))]);
        assert_eq!(sections[1].content, "First\n\nbody one");
    }

    #[test]
    fn headings_inside_code_fences_are_body() {
        let md = "# Setup\n```sh\n# not a heading\n```\n";
        let sections = split_sections(md);
        assert_eq!(sections.len(), 1);
        assert!(sections[0].content.contains("# not a heading"));
    }

    #[test]
    fn heading_requires_space_after_hashes() {
        assert_eq!(heading_text("## Title ##").as_deref(), Some("Title"));
        assert!(heading_text("#hashtag").is_none());
        assert!(heading_text("####### seven").is_none());
    }

    #[test]
    fn glossary_accepts_object_and_array() {
        let object = json!({
            "API Gateway": "Entry point for requests",
            "SLA": {"definition": "Service level agreement", "reading": "es-el-ei"},
        });
        let entries = parse_glossary(&object);
        assert_eq!(entries.len(), 2);
        let sla = entries.iter().find(|e| e.term == "SLA").unwrap();
        assert!(sla.content.starts_with("SLA: Service level agreement"));
        assert!(sla.content.contains("reading: es-el-ei"));
        assert_eq!(sla.metadata["reading"], "es-el-ei");

        let array = json!([{"term": "Sprint", "description": "Two-week cycle"}, {"nope": 1}]);
        let entries = parse_glossary(&array);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, "Sprint: Two-week cycle");
    }

    #[test]
    fn terms_normalize_to_lowercase_snake() {
        assert_eq!(normalize_term("  API   Gateway "), "api_gateway");
        assert_eq!(normalize_term("SLA"), "sla");
    }

    #[test]
    fn projections_per_source() {
        let ticket = json!({
            "content": "raw",
            "metadata": {"key": "PRJ-1", "summary": "Login fails", "description": "500 on submit", "comment": "fixed"}
        });
        assert_eq!(
            project_record(Source::Backlog, &ticket),
            "PRJ-1 Login fails\n500 on submit\nfixed"
        );

        let chat = json!({"metadata": {"channel": "dev", "user": "aki", "text": "deploying now"}});
        assert_eq!(project_record(Source::Slack, &chat), "#dev aki: deploying now");

        let mail = json!({"metadata": {"subject": "Invoice", "from": "a@b.c"}, "content": "see attached"});
        assert_eq!(project_record(Source::Gmail, &mail), "Subject: Invoice\nFrom: a@b.c\nsee attached");

        let bare = json!({"content": "just text"});
        assert_eq!(project_record(Source::Slack, &bare), "just text");
        assert_eq!(project_record(Source::Gmail, &json!({"text": "t"})), "t");
    }
}

mod helpers;

use chrono::{Duration, Local, NaiveDate};
use helpers::{local, test_workspace};
use memlog::memory::{MemoryEntry, Source};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn appended_entry_reads_back_from_its_day() {
    let (_tmp, ws) = test_workspace();
    ws.create_project("p1", None, None).unwrap();
    let store = ws.memory_store("p1").unwrap();

    let path = store
        .append(
            Source::Backlog,
            MemoryEntry::new("e1", Source::Backlog, local(2026, 1, 20, 10, 0), "x"),
        )
        .unwrap();
    assert!(path.ends_with("memory/backlog/2026-01-20.jsonl"));

    let entries = store
        .read_entries(Source::Backlog, Some(date(2026, 1, 20)), Some(date(2026, 1, 20)))
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, "e1");
    assert_eq!(entries[0].content, "x");
    assert!(entries[0].synced_at.is_some(), "append fills in synced_at");
}

#[test]
fn entries_are_partitioned_by_event_date_and_source() {
    let (_tmp, ws) = test_workspace();
    ws.create_project("p1", None, None).unwrap();
    let store = ws.memory_store("p1").unwrap();

    let written = store
        .append_batch(
            Source::Slack,
            vec![
                MemoryEntry::new("a", Source::Slack, local(2026, 1, 19, 23, 59), "late"),
                MemoryEntry::new("b", Source::Slack, local(2026, 1, 20, 0, 1), "early"),
                MemoryEntry::new("c", Source::Slack, local(2026, 1, 20, 9, 0), "morning")
                    .with_metadata("channel", "general"),
            ],
        )
        .unwrap();
    assert_eq!(written, 3);

    assert_eq!(
        store.list_dates(Source::Slack).unwrap(),
        vec![date(2026, 1, 19), date(2026, 1, 20)]
    );
    assert!(store.list_dates(Source::Gmail).unwrap().is_empty());

    let day: Vec<String> = store
        .read_day(Source::Slack, date(2026, 1, 20))
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(day, vec!["b", "c"]);

    let all = store.read_entries(Source::Slack, None, None).unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[2].metadata["channel"], "general");
}

#[test]
fn range_reads_skip_missing_days_and_malformed_lines() {
    let (_tmp, ws) = test_workspace();
    ws.create_project("p1", None, None).unwrap();
    let store = ws.memory_store("p1").unwrap();

    store
        .append(Source::Gmail, MemoryEntry::new("m1", Source::Gmail, local(2026, 1, 10, 8, 0), "one"))
        .unwrap();
    store
        .append(Source::Gmail, MemoryEntry::new("m2", Source::Gmail, local(2026, 1, 14, 8, 0), "two"))
        .unwrap();

    let path = store.day_path(Source::Gmail, date(2026, 1, 14));
    let mut text = std::fs::read_to_string(&path).unwrap();
    text.push_str("{not json\n");
    std::fs::write(&path, text).unwrap();

    let entries = store
        .read_entries(Source::Gmail, Some(date(2026, 1, 9)), Some(date(2026, 1, 15)))
        .unwrap();
    let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2"]);

    let none = store
        .read_entries(Source::Gmail, Some(date(2026, 2, 1)), Some(date(2026, 2, 3)))
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn update_entry_rewrites_only_the_matching_line() {
    let (_tmp, ws) = test_workspace();
    ws.create_project("p1", None, None).unwrap();
    let store = ws.memory_store("p1").unwrap();
    let ts = local(2026, 1, 20, 10, 0);

    store
        .append_batch(
            Source::Backlog,
            vec![
                MemoryEntry::new("e1", Source::Backlog, ts, "first"),
                MemoryEntry::new("e2", Source::Backlog, ts, "second"),
            ],
        )
        .unwrap();

    let updated = store
        .update_entry(Source::Backlog, MemoryEntry::new("e2", Source::Backlog, ts, "second, edited"))
        .unwrap();
    assert!(updated);
    assert!(!store
        .update_entry(Source::Backlog, MemoryEntry::new("nope", Source::Backlog, ts, "x"))
        .unwrap());

    let day = store.read_day(Source::Backlog, date(2026, 1, 20)).unwrap();
    assert_eq!(day.len(), 2);
    assert_eq!(day[0].content, "first");
    assert_eq!(day[1].content, "second, edited");
}

#[test]
fn lifecycle_compresses_then_archives_old_days() {
    let (_tmp, ws) = test_workspace();
    ws.create_project("p1", None, None).unwrap();
    let store = ws.memory_store("p1").unwrap();

    let now = Local::now();
    let recent = now - Duration::days(1);
    let old = now - Duration::days(40);
    let ancient = now - Duration::days(120);
    for (id, ts) in [("recent", recent), ("old", old), ("ancient", ancient)] {
        store
            .append(Source::Backlog, MemoryEntry::new(id, Source::Backlog, ts, id))
            .unwrap();
    }

    let result = store.run_lifecycle(30, 90).unwrap();
    assert_eq!(result.compressed, 2);
    assert_eq!(result.archived, 1);

    assert!(store.day_path(Source::Backlog, recent.date_naive()).exists());
    assert!(!store.day_path(Source::Backlog, old.date_naive()).exists());
    assert!(store.gz_path(Source::Backlog, old.date_naive()).exists());

    // Compressed files stay readable; archived ones leave the live log.
    let old_day = store.read_day(Source::Backlog, old.date_naive()).unwrap();
    assert_eq!(old_day[0].id, "old");
    assert!(store
        .read_day(Source::Backlog, ancient.date_naive())
        .unwrap()
        .is_empty());
    assert!(store.archive_source_dir(Source::Backlog).read_dir().unwrap().next().is_some());

    let stats = store.get_stats().unwrap();
    let backlog = stats.sources.iter().find(|s| s.source == Source::Backlog).unwrap();
    assert_eq!((backlog.plain_files, backlog.compressed_files, backlog.archived_files), (1, 1, 1));

    let again = store.run_lifecycle(30, 90).unwrap();
    assert_eq!((again.compressed, again.archived), (0, 0));
}

mod helpers;

use std::sync::Arc;

use chrono::NaiveDate;
use helpers::{open_store, FailingProvider, KeywordProvider};
use memlog::index::{HybridSearch, HybridWeights, Layer, SearchFilter};
use serde_json::json;
use tempfile::TempDir;

fn keyword_hybrid(tmp: &TempDir, vocab: &[&'static str]) -> HybridSearch {
    let store = open_store(tmp, Arc::new(KeywordProvider::new(vocab)));
    HybridSearch::new(Arc::new(store), HybridWeights::default())
}

fn store_of(tmp: &TempDir, vocab: &[&'static str]) -> Arc<memlog::index::EmbeddingStore> {
    Arc::new(open_store(tmp, Arc::new(KeywordProvider::new(vocab))))
}

#[test]
fn layer_scoped_searches_see_only_their_layer() {
    let tmp = TempDir::new().unwrap();
    let store = store_of(&tmp, &["deploy", "checklist"]);
    let content = "Deploy checklist for the release";
    store.index_item("k1", content, Some("faq"), Some("knowledge"), None).unwrap();
    store.index_item("m1", content, Some("slack"), Some("memory"), None).unwrap();
    let hybrid = HybridSearch::new(store, HybridWeights::default());

    let knowledge = hybrid.search_knowledge("deploy checklist", 10, 0.0, None).unwrap();
    let ids: Vec<&str> = knowledge.iter().map(|r| r.item_id.as_str()).collect();
    assert_eq!(ids, vec!["k1"]);

    let memory = hybrid
        .search_memory("deploy checklist", 10, 0.0, None, None, None)
        .unwrap();
    let ids: Vec<&str> = memory.iter().map(|r| r.item_id.as_str()).collect();
    assert_eq!(ids, vec!["m1"]);
    assert_eq!(memory[0].layer, Layer::Memory);

    assert_eq!(hybrid.search("deploy", 10, 0.0, SearchFilter::default()).unwrap().len(), 2);
}

#[test]
fn combined_score_weights_both_signals() {
    let tmp = TempDir::new().unwrap();
    let store = store_of(&tmp, &["rollback", "deploy"]);
    store.index_item("a", "rollback procedure for deploy", None, None, None).unwrap();
    store.index_item("b", "deploy calendar", None, None, None).unwrap();
    let hybrid = HybridSearch::new(store, HybridWeights::default());

    let results = hybrid.search("rollback", 10, 0.0, SearchFilter::default()).unwrap();
    assert_eq!(results[0].item_id, "a");
    let top = &results[0];
    assert!(top.semantic_score > 0.0);
    assert!(top.keyword_score > 0.0);
    let expected = 0.7 * top.semantic_score + 0.3 * top.keyword_score;
    assert!((top.combined_score - expected).abs() < 1e-9);

    // "b" has no "rollback" token, so it only competes on the semantic side.
    if let Some(b) = results.iter().find(|r| r.item_id == "b") {
        assert_eq!(b.keyword_score, 0.0);
        assert!(b.combined_score < top.combined_score);
    }

    let combined: Vec<f64> = results.iter().map(|r| r.combined_score).collect();
    assert!(combined.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn keyword_signal_alone_still_ranks_when_embeddings_fail() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(open_store(&tmp, Arc::new(FailingProvider)));
    store.index_item("k1", "Invoice approval flow", None, None, None).unwrap();
    let hybrid = HybridSearch::new(store, HybridWeights::default());

    let results = hybrid.search("invoice", 10, 0.0, SearchFilter::default()).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].semantic_score, 0.0);
    assert!((results[0].combined_score - 0.3 * results[0].keyword_score).abs() < 1e-9);
}

#[test]
fn min_score_and_top_k_bound_results() {
    let tmp = TempDir::new().unwrap();
    let hybrid = keyword_hybrid(&tmp, &["alpha"]);
    let store = store_of(&tmp, &["alpha"]);
    for i in 0..5 {
        store
            .index_item(&format!("i{i}"), &format!("alpha item {i}"), None, None, None)
            .unwrap();
    }

    assert_eq!(hybrid.search("alpha", 3, 0.0, SearchFilter::default()).unwrap().len(), 3);
    assert!(hybrid.search("alpha", 0, 0.0, SearchFilter::default()).unwrap().is_empty());
    assert!(hybrid.search("alpha", 10, 1.5, SearchFilter::default()).unwrap().is_empty());
}

#[test]
fn memory_search_filters_by_result_date() {
    let tmp = TempDir::new().unwrap();
    let store = store_of(&tmp, &["outage"]);
    store
        .index_item(
            "early",
            "outage in the payment service",
            Some("slack"),
            Some("memory"),
            Some(&json!({"timestamp": "2026-01-10T09:00:00"})),
        )
        .unwrap();
    store
        .index_item(
            "late",
            "outage follow-up review",
            Some("slack"),
            Some("memory"),
            Some(&json!({"timestamp": "2026-01-20T09:00:00"})),
        )
        .unwrap();
    store
        .index_item("undated", "outage rumor", Some("slack"), Some("memory"), None)
        .unwrap();
    let hybrid = HybridSearch::new(store, HybridWeights::default());

    let from = NaiveDate::from_ymd_opt(2026, 1, 15);
    let results = hybrid.search_memory("outage", 10, 0.0, None, from, None).unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.item_id.as_str()).collect();
    assert_eq!(ids, vec!["late"]);

    let until = NaiveDate::from_ymd_opt(2026, 1, 10);
    let results = hybrid
        .search_memory("outage", 10, 0.0, Some("slack"), None, until)
        .unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.item_id.as_str()).collect();
    assert_eq!(ids, vec!["early"]);

    let unfiltered = hybrid.search_memory("outage", 10, 0.0, None, None, None).unwrap();
    assert_eq!(unfiltered.len(), 3);
}

#[test]
fn related_items_exclude_the_item_itself() {
    let tmp = TempDir::new().unwrap();
    let store = store_of(&tmp, &["cache", "eviction", "billing"]);
    store.index_item("seed", "cache eviction policy", None, None, None).unwrap();
    store.index_item("near", "cache eviction tuning", None, None, None).unwrap();
    store.index_item("far", "billing export", None, None, None).unwrap();
    let hybrid = HybridSearch::new(store, HybridWeights::default());

    let related = hybrid.get_related("seed", 5, 0.0, SearchFilter::default()).unwrap();
    assert!(related.iter().all(|r| r.item_id != "seed"));
    assert_eq!(related[0].item_id, "near");

    let unbounded = hybrid
        .get_related("seed", usize::MAX, 0.0, SearchFilter::default())
        .unwrap();
    assert_eq!(unbounded[0].item_id, "near");
    assert!(unbounded.iter().all(|r| r.item_id != "seed"));

    assert!(hybrid
        .get_related("missing", 5, 0.0, SearchFilter::default())
        .unwrap()
        .is_empty());
}

//! Tests for store traversal
//!
//! These tests verify:
//! - for_each visits keys in first-insertion order
//! - Flow::Stop halts traversal immediately
//! - Overwrites keep a key's position; delete then re-set moves it last
//! - iter() agrees with for_each

#[path = "../common/mod.rs"]
mod common;

use common::store_over;
use driftkv::log::MemoryChannel;
use driftkv::{Flow, Store};
use serde_json::json;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_store(keys: &[&str]) -> Store {
    let mut store = Store::in_memory();
    store.wait_ready().unwrap();
    for (i, key) in keys.iter().enumerate() {
        store.set(*key, i);
    }
    store
}

fn keys_of(store: &Store) -> Vec<String> {
    let mut keys = Vec::new();
    store.for_each(|key, _| {
        keys.push(key.to_string());
        Flow::Continue
    });
    keys
}

// =============================================================================
// Ordering Tests
// =============================================================================

#[test]
fn test_stop_after_first_visits_only_first() {
    let store = setup_store(&["A", "B", "C"]);

    let mut seen = Vec::new();
    let visited = store.for_each(|key, _| {
        seen.push(key.to_string());
        Flow::Stop
    });

    assert_eq!(seen, vec!["A"]);
    assert_eq!(visited, 1);
}

#[test]
fn test_stop_midway() {
    let store = setup_store(&["A", "B", "C", "D"]);

    let mut seen = Vec::new();
    let visited = store.for_each(|key, _| {
        seen.push(key.to_string());
        if key == "B" {
            Flow::Stop
        } else {
            Flow::Continue
        }
    });

    assert_eq!(seen, vec!["A", "B"]);
    assert_eq!(visited, 2);
}

#[test]
fn test_insertion_order_not_key_order() {
    let store = setup_store(&["zeta", "alpha", "mid"]);
    assert_eq!(keys_of(&store), vec!["zeta", "alpha", "mid"]);
}

#[test]
fn test_overwrite_keeps_position() {
    let mut store = setup_store(&["A", "B", "C"]);

    store.set("A", "updated");

    assert_eq!(keys_of(&store), vec!["A", "B", "C"]);
    assert_eq!(store.get("A"), Some(&json!("updated")));
}

#[test]
fn test_delete_then_set_moves_key_last() {
    let mut store = setup_store(&["A", "B", "C"]);

    store.remove("A");
    assert_eq!(keys_of(&store), vec!["B", "C"]);

    store.set("A", 9);
    assert_eq!(keys_of(&store), vec!["B", "C", "A"]);
}

#[test]
fn test_order_follows_replayed_log() {
    let log = concat!(
        "{\"key\":\"c\",\"val\":1}\n",
        "{\"key\":\"a\",\"val\":2}\n",
        "{\"key\":\"c\",\"val\":3}\n",
        "{\"key\":\"b\",\"val\":4}\n",
    );
    let mut store = store_over(&MemoryChannel::with_contents(log));
    store.wait_ready().unwrap();

    assert_eq!(keys_of(&store), vec!["c", "a", "b"]);
}

// =============================================================================
// Iterator Tests
// =============================================================================

#[test]
fn test_iter_matches_for_each() {
    let store = setup_store(&["x", "y", "z"]);

    let from_iter: Vec<(String, serde_json::Value)> =
        store.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();

    let mut from_visitor = Vec::new();
    store.for_each(|k, v| {
        from_visitor.push((k.to_string(), v.clone()));
        Flow::Continue
    });

    assert_eq!(from_iter, from_visitor);
    assert_eq!(from_iter[2], ("z".to_string(), json!(2)));
}

#[test]
fn test_empty_store_visits_nothing() {
    let store = setup_store(&[]);

    let visited = store.for_each(|_, _| panic!("visitor called on empty store"));

    assert_eq!(visited, 0);
    assert_eq!(store.iter().count(), 0);
}

#[test]
fn test_traversal_does_not_touch_log() {
    let channel = MemoryChannel::new();
    let mut store = store_over(&channel);
    store.wait_ready().unwrap();
    store.set("a", 1);
    store.wait_drained().unwrap();
    let appends_before = channel.append_count();

    assert_eq!(store.for_each(|_, _| Flow::Continue), 1);
    assert_eq!(channel.append_count(), appends_before);
}

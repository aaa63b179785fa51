//! Tests for store shutdown and the blocking helpers
//!
//! These tests verify:
//! - Close releases the channel immediately when nothing is outstanding
//! - Close with writes in flight is deferred until the store drains
//! - Closed fires exactly once, after both log sides are released
//! - Close mid-load aborts the reader
//! - Writes after close are rejected
//! - wait_* helpers report stalls and timeouts

#[path = "../common/mod.rs"]
mod common;

use std::time::Duration;

use common::{count, outcomes, record_events, store_over, track, Seen};
use driftkv::log::{AckMode, MemoryChannel};
use driftkv::{Config, DriftError, ReadyState, Store};
use serde_json::json;

// =============================================================================
// Immediate Close Tests
// =============================================================================

#[test]
fn test_close_with_nothing_pending() {
    let channel = MemoryChannel::new();
    let mut store = store_over(&channel);
    store.wait_ready().unwrap();
    let events = record_events(&mut store);

    store.close();

    assert_eq!(store.state(), ReadyState::Closed);
    assert_eq!(*events.lock(), vec![Seen::Closed]);
    // The writer was never needed, so it was never opened
    assert!(!channel.writer_ended());
}

#[test]
fn test_close_after_writes_ends_and_destroys_writer() {
    let channel = MemoryChannel::new();
    let mut store = store_over(&channel);
    store.wait_ready().unwrap();

    store.set("a", 1);
    store.wait_drained().unwrap();
    store.close();

    assert_eq!(store.state(), ReadyState::Closed);
    assert!(channel.writer_ended());
    assert!(channel.writer_destroyed());
    assert_eq!(channel.contents_string(), "{\"key\":\"a\",\"val\":1}\n");
}

#[test]
fn test_second_close_is_noop() {
    let mut store = Store::in_memory();
    store.wait_ready().unwrap();
    let events = record_events(&mut store);

    store.close();
    store.close();
    store.poll();

    assert_eq!(count(&events, |s| *s == Seen::Closed), 1);
}

// =============================================================================
// Deferred Close Tests
// =============================================================================

#[test]
fn test_close_while_in_flight_is_deferred() {
    let channel = MemoryChannel::new().ack_mode(AckMode::Manual);
    let mut store = store_over(&channel);
    store.wait_ready().unwrap();
    let events = record_events(&mut store);
    let results = outcomes();

    store.set_with("a", 1, track(&results, "a"));
    store.close();

    // Nothing is released yet
    assert_eq!(store.state(), ReadyState::Ready);
    assert_eq!(count(&events, |s| *s == Seen::Closed), 0);
    assert!(!channel.writer_ended());
    assert!(!channel.writer_destroyed());

    channel.ack_next();
    store.poll();

    assert_eq!(*results.lock(), vec![("a", true)]);
    assert_eq!(store.state(), ReadyState::Closed);
    assert_eq!(*events.lock(), vec![Seen::Drain, Seen::Closed]);
    assert!(channel.writer_ended());
    assert!(channel.writer_destroyed());

    store.close();
    store.poll();
    assert_eq!(count(&events, |s| *s == Seen::Closed), 1);
}

#[test]
fn test_deferred_close_waits_for_every_key() {
    let channel = MemoryChannel::new().ack_mode(AckMode::Manual);
    let mut store = store_over(&channel);
    store.wait_ready().unwrap();

    store.set("a", 1);
    store.set("b", 2);
    store.set("a", 3); // follow-up for "a" after its first ack
    store.close();

    channel.ack_next();
    store.poll();
    assert_eq!(store.state(), ReadyState::Ready);

    while channel.ack_next() {
        store.poll();
    }

    assert_eq!(store.state(), ReadyState::Closed);
    assert_eq!(channel.append_count(), 3);
}

#[test]
fn test_close_under_backpressure() {
    let channel = MemoryChannel::new().ack_mode(AckMode::Manual).high_water_mark(1);
    let mut store = store_over(&channel);
    store.wait_ready().unwrap();
    let events = record_events(&mut store);

    store.set("a", 1); // saturates
    store.set("b", 2); // held back by backpressure
    store.close();

    while channel.ack_next() {
        store.poll();
    }

    assert_eq!(store.state(), ReadyState::Closed);
    assert_eq!(
        channel.contents_string(),
        "{\"key\":\"a\",\"val\":1}\n{\"key\":\"b\",\"val\":2}\n"
    );
    assert_eq!(count(&events, |s| *s == Seen::Closed), 1);
}

#[test]
fn test_wait_closed_completes_deferred_close() {
    let mut store = Store::in_memory();

    store.set("a", 1);
    store.close();
    store.wait_closed().unwrap();

    assert_eq!(store.state(), ReadyState::Closed);
    assert_eq!(store.get("a"), Some(&json!(1)));
}

// =============================================================================
// Close During Load Tests
// =============================================================================

#[test]
fn test_close_mid_load_aborts_reader() {
    let log = "{\"key\":\"a\",\"val\":1}\n{\"key\":\"b\",\"val\":2}\n";
    let channel = MemoryChannel::with_contents(log).chunk_size(4);
    let mut store = store_over(&channel);
    let events = record_events(&mut store);

    assert!(store.poll_once()); // opens the reader
    assert!(store.poll_once()); // first chunk
    assert_eq!(store.state(), ReadyState::Loading);

    store.close();

    assert!(channel.reader_aborted());
    assert_eq!(store.state(), ReadyState::Closed);
    assert_eq!(*events.lock(), vec![Seen::Closed]);

    // The load pass never resumes
    store.poll();
    assert_eq!(count(&events, |s| matches!(s, Seen::Load(_))), 0);
    assert!(matches!(store.wait_ready(), Err(DriftError::Closed)));
}

// =============================================================================
// Writes After Close
// =============================================================================

#[test]
fn test_set_after_close_is_rejected() {
    let channel = MemoryChannel::new();
    let mut store = store_over(&channel);
    store.wait_ready().unwrap();
    store.close();

    let rejected = std::sync::Arc::new(parking_lot::Mutex::new(None));
    let sink = std::sync::Arc::clone(&rejected);
    store.set_with("a", 1, move |result| {
        *sink.lock() = Some(matches!(result, Err(DriftError::Closed)));
    });
    store.remove("a");
    store.poll();

    assert_eq!(*rejected.lock(), Some(true));
    assert_eq!(store.get("a"), None);
    assert_eq!(channel.append_count(), 0);
}

// =============================================================================
// Blocking Helper Tests
// =============================================================================

#[test]
fn test_wait_closed_without_close_stalls() {
    let mut store = Store::in_memory();
    store.wait_ready().unwrap();

    let err = store.wait_closed().unwrap_err();
    assert!(matches!(err, DriftError::Stalled("close")));
}

#[test]
fn test_wait_drained_times_out() {
    let channel = MemoryChannel::new().ack_mode(AckMode::Manual);
    let config = Config::builder()
        .wait_timeout(Duration::from_millis(50))
        .build();
    let mut store = Store::with_channel(channel.clone(), config).unwrap();
    store.wait_ready().unwrap();

    store.set("a", 1);
    let err = store.wait_drained().unwrap_err();

    assert!(matches!(err, DriftError::Timeout("drain")));
    assert_eq!(store.in_flight_writes(), 1);

    channel.ack_all();
    store.wait_drained().unwrap();
}

#[test]
fn test_run_until_custom_condition() {
    let channel = MemoryChannel::with_contents("{\"key\":\"a\",\"val\":1}\n").chunk_size(1);
    let mut store = store_over(&channel);

    store
        .run_until("key a", |store| store.contains_key("a"))
        .unwrap();

    assert_eq!(store.get("a"), Some(&json!(1)));
}

//! Tests for the in-memory channel
//!
//! These tests verify:
//! - The read side hands out chunks of the configured size
//! - Missing logs and scripted failures surface as typed errors
//! - Appends are recorded and acknowledged (auto and manual)

use std::io;

use driftkv::log::{AckMode, LogChannel, MemoryChannel};
use driftkv::{Config, Store};

// =============================================================================
// Read Side Tests
// =============================================================================

#[test]
fn test_reader_chunks() {
    let mut channel = MemoryChannel::with_contents(b"abcdefg").chunk_size(3);
    let mut reader = channel.open_reader().unwrap();

    let mut chunks = Vec::new();
    while let Some(chunk) = reader.next_chunk().unwrap() {
        chunks.push(chunk.to_vec());
    }

    assert_eq!(chunks, vec![b"abc".to_vec(), b"def".to_vec(), b"g".to_vec()]);
    assert!(reader.next_chunk().unwrap().is_none());
}

#[test]
fn test_missing_log_is_not_found() {
    let mut channel = MemoryChannel::new();
    let err = channel.open_reader().err().unwrap();
    assert!(err.is_not_found());
}

#[test]
fn test_scripted_open_failure() {
    let mut channel = MemoryChannel::with_contents(b"x").fail_open(io::ErrorKind::PermissionDenied);
    let err = channel.open_reader().err().unwrap();
    assert_eq!(err.kind, io::ErrorKind::PermissionDenied);
    assert!(!err.is_not_found());
}

#[test]
fn test_scripted_read_failure() {
    let mut channel = MemoryChannel::with_contents(b"abcdef")
        .chunk_size(2)
        .fail_read_after(2, io::ErrorKind::Other);
    let mut reader = channel.open_reader().unwrap();

    assert!(reader.next_chunk().unwrap().is_some());
    assert!(reader.next_chunk().unwrap().is_some());
    let err = reader.next_chunk().unwrap_err();
    assert_eq!(err.kind, io::ErrorKind::Other);
}

#[test]
fn test_abort_is_observable() {
    let mut channel = MemoryChannel::with_contents(b"abc");
    let mut reader = channel.open_reader().unwrap();

    reader.abort();

    assert!(channel.reader_aborted());
    assert!(reader.next_chunk().unwrap().is_none());
}

// =============================================================================
// Append Side Tests (driven through a store)
// =============================================================================

#[test]
fn test_auto_ack_appends_to_contents() {
    let channel = MemoryChannel::new();
    let mut store = Store::with_channel(channel.clone(), Config::default()).unwrap();
    store.wait_ready().unwrap();

    store.set("a", 1);
    store.wait_drained().unwrap();

    assert_eq!(channel.append_count(), 1);
    assert_eq!(channel.contents_string(), "{\"key\":\"a\",\"val\":1}\n");
}

#[test]
fn test_manual_ack_holds_appends() {
    let channel = MemoryChannel::new().ack_mode(AckMode::Manual);
    let mut store = Store::with_channel(channel.clone(), Config::default()).unwrap();
    store.poll();

    store.set("a", 1);

    assert_eq!(channel.append_count(), 1);
    assert_eq!(channel.held_count(), 1);
    assert!(channel.contents().is_empty());

    assert!(channel.ack_next());
    assert!(!channel.ack_next());
    assert_eq!(channel.contents_string(), "{\"key\":\"a\",\"val\":1}\n");
}

#[test]
fn test_ack_all_releases_everything() {
    let channel = MemoryChannel::new().ack_mode(AckMode::Manual);
    let mut store = Store::with_channel(channel.clone(), Config::default()).unwrap();
    store.poll();

    store.set("a", 1);
    store.set("b", 2);
    store.set("c", 3);

    assert_eq!(channel.ack_all(), 3);
    assert_eq!(channel.held_count(), 0);
}

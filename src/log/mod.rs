//! Log Channel Module
//!
//! The sequential medium the store persists into and replays from.
//!
//! ## Responsibilities
//! - Read side: a lazy, finite sequence of byte chunks
//! - Append side: record submission with asynchronous acknowledgement
//! - Backpressure: `write` returns `false` once internal buffering is
//!   saturated and the channel later reports `drained`
//! - Distinguish "log not found" from every other I/O failure
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ {"key":"a","val":1}\n                   │
//! ├─────────────────────────────────────────┤
//! │ {"key":"b","val":{"nested":[1,2]}}\n    │
//! ├─────────────────────────────────────────┤
//! │ {"key":"a"}\n            (tombstone)    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Acknowledgements and drain notifications never call back into the store
//! directly. They are posted to the store's reactor through a
//! [`ChannelNotifier`] and dispatched on the store's own turn.

mod file;
mod lines;
mod memory;
mod record;

use std::fmt;
use std::io;

use bytes::Bytes;
use crossbeam::channel::Sender;
use thiserror::Error;

pub use file::FileChannel;
pub use lines::LineSplitter;
pub use memory::{AckMode, MemoryChannel};
pub use record::{Record, RECORD_TERMINATOR};

// =============================================================================
// Errors
// =============================================================================

/// A typed channel failure: the I/O kind plus a human readable detail
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct ChannelError {
    pub kind: io::ErrorKind,
    pub detail: String,
}

impl ChannelError {
    pub fn new(kind: io::ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// The log source does not exist (an empty store, not a failure)
    pub fn is_not_found(&self) -> bool {
        self.kind == io::ErrorKind::NotFound
    }
}

impl From<io::Error> for ChannelError {
    fn from(err: io::Error) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

// =============================================================================
// Channel Traits
// =============================================================================

/// A log medium that can be opened for reading and for appending
pub trait LogChannel: Send {
    /// Open the read side used by the load pass
    fn open_reader(&mut self) -> Result<Box<dyn LogReader>, ChannelError>;

    /// Open the append side. `notifier` receives acks and drain events.
    fn open_writer(&mut self, notifier: ChannelNotifier) -> Result<Box<dyn LogWriter>, ChannelError>;

    /// Short description for logging
    fn describe(&self) -> String;
}

/// Read side of a channel
pub trait LogReader: Send {
    /// Next chunk of bytes; `Ok(None)` signals end of input
    fn next_chunk(&mut self) -> Result<Option<Bytes>, ChannelError>;

    /// Release the read side immediately
    fn abort(&mut self);
}

/// Append side of a channel
pub trait LogWriter: Send {
    /// Submit one record. Completion must be reported through `ticket`.
    ///
    /// Returns `false` when buffering is saturated; the record is still
    /// accepted, but the caller should wait for `drained` before writing more.
    fn write(&mut self, record: Bytes, ticket: WriteTicket) -> bool;

    /// Flush anything buffered and release gracefully
    fn end(&mut self) -> Result<(), ChannelError>;

    /// Release immediately
    fn destroy(&mut self);
}

// =============================================================================
// Reactor Plumbing
// =============================================================================

/// Signals posted by channels to the owning store
#[derive(Debug)]
pub(crate) enum Signal {
    /// An append was acknowledged (or failed)
    Ack {
        ticket: u64,
        result: Result<(), ChannelError>,
    },

    /// Backpressure cleared
    Drained,
}

/// Handle a channel uses to talk back to its store
#[derive(Clone)]
pub struct ChannelNotifier {
    tx: Sender<Signal>,
}

impl ChannelNotifier {
    pub(crate) fn new(tx: Sender<Signal>) -> Self {
        Self { tx }
    }

    /// Report that buffered appends have been flushed
    pub fn drained(&self) {
        // The store may already be gone; nothing left to notify then.
        let _ = self.tx.send(Signal::Drained);
    }

    pub(crate) fn ticket(&self, id: u64) -> WriteTicket {
        WriteTicket {
            id,
            notifier: self.clone(),
        }
    }
}

impl fmt::Debug for ChannelNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelNotifier").finish_non_exhaustive()
    }
}

/// Completion handle for a single append
#[must_use = "an unacknowledged append keeps the store from draining"]
#[derive(Debug)]
pub struct WriteTicket {
    id: u64,
    notifier: ChannelNotifier,
}

impl WriteTicket {
    /// Identifier of the append this ticket acknowledges
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Acknowledge the append
    pub fn complete(self, result: Result<(), ChannelError>) {
        let _ = self.notifier.tx.send(Signal::Ack {
            ticket: self.id,
            result,
        });
    }
}

//! Write queue
//!
//! Bookkeeping for the asynchronous write path: which keys need a physical
//! append, which appends are in flight, and who is waiting on them.
//!
//! ## Per-key slot lifecycle
//! ```text
//!   set ──► dirty, queued ──► in flight ──ack──► removed
//!                ▲                │
//!                └── set again ───┘ (dirty: re-queued on ack)
//! ```
//!
//! A slot exists iff an append for its key is queued or in flight, and at
//! most one append per key is ever in flight. Writes made while an append is
//! in flight only mark the slot dirty; the follow-up append carries whatever
//! the index holds when it is issued.

use std::collections::{HashMap, VecDeque};
use std::mem;

use crate::error::Result;

/// Durability callback registered with a write
pub type Continuation = Box<dyn FnOnce(Result<()>) + Send>;

#[derive(Default)]
struct PendingSlot {
    /// Continuations for writes not yet covered by an issued append
    waiting: Vec<Continuation>,

    /// Continuations the in-flight append will satisfy
    in_flight: Vec<Continuation>,

    /// Ticket of the in-flight append
    ticket: Option<u64>,

    /// Index changed since the last append was issued
    dirty: bool,

    /// Present in the ready queue
    queued: bool,

    /// Failed attempts of the current append
    attempts: u32,
}

/// An acknowledged append
pub(crate) struct Completed {
    pub key: String,
    pub continuations: Vec<Continuation>,
    pub attempts: u32,
}

#[derive(Default)]
pub(crate) struct WriteQueue {
    slots: HashMap<String, PendingSlot>,

    /// Keys eligible for an append, in the order they became eligible
    ready: VecDeque<String>,

    /// In-flight ticket → key
    tickets: HashMap<u64, String>,
    next_ticket: u64,

    /// Appends submitted but not yet acknowledged
    in_flight: usize,

    /// The channel reported saturation and has not drained yet
    backpressure: bool,
}

impl WriteQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a write to `key`
    pub(crate) fn enqueue(&mut self, key: &str, continuation: Option<Continuation>) {
        let slot = self.slots.entry(key.to_string()).or_default();
        slot.dirty = true;
        if let Some(continuation) = continuation {
            slot.waiting.push(continuation);
        }
        if slot.ticket.is_none() && !slot.queued {
            slot.queued = true;
            self.ready.push_back(key.to_string());
        }
    }

    /// Next key that needs an append and has none in flight
    pub(crate) fn pop_ready(&mut self) -> Option<String> {
        while let Some(key) = self.ready.pop_front() {
            if let Some(slot) = self.slots.get_mut(&key) {
                slot.queued = false;
                if slot.ticket.is_none() && slot.dirty {
                    return Some(key);
                }
            }
        }
        None
    }

    /// Mark `key` as in flight and hand out the ticket for its append
    pub(crate) fn begin(&mut self, key: &str) -> Option<u64> {
        let slot = self.slots.get_mut(key)?;

        let ticket = self.next_ticket;
        self.next_ticket += 1;

        slot.ticket = Some(ticket);
        slot.dirty = false;
        let mut waiting = mem::take(&mut slot.waiting);
        slot.in_flight.append(&mut waiting);

        self.tickets.insert(ticket, key.to_string());
        self.in_flight += 1;
        Some(ticket)
    }

    /// Take the in-flight state of an acknowledged append.
    /// Unknown tickets are ignored.
    pub(crate) fn complete(&mut self, ticket: u64) -> Option<Completed> {
        let key = self.tickets.remove(&ticket)?;
        self.in_flight = self.in_flight.saturating_sub(1);

        let slot = self.slots.get_mut(&key)?;
        slot.ticket = None;
        Some(Completed {
            continuations: mem::take(&mut slot.in_flight),
            attempts: slot.attempts,
            key,
        })
    }

    /// The append for `key` is finished with: re-queue if written again,
    /// otherwise drop the slot
    pub(crate) fn settle(&mut self, key: &str) {
        let Some(slot) = self.slots.get_mut(key) else {
            return;
        };
        slot.attempts = 0;

        if slot.dirty {
            if !slot.queued {
                slot.queued = true;
                self.ready.push_back(key.to_string());
            }
        } else {
            self.slots.remove(key);
        }
    }

    /// Re-issue a failed append, keeping its continuations
    pub(crate) fn retry(&mut self, key: &str, continuations: Vec<Continuation>) {
        let Some(slot) = self.slots.get_mut(key) else {
            return;
        };
        slot.attempts += 1;
        slot.in_flight = continuations;
        slot.dirty = true;
        if !slot.queued {
            slot.queued = true;
            self.ready.push_front(key.to_string());
        }
    }

    /// Nothing pending and nothing in flight
    pub(crate) fn is_drained(&self) -> bool {
        self.slots.is_empty() && self.in_flight == 0
    }

    pub(crate) fn pending_keys(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub(crate) fn backpressure(&self) -> bool {
        self.backpressure
    }

    pub(crate) fn set_backpressure(&mut self, saturated: bool) {
        self.backpressure = saturated;
    }
}

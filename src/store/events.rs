//! Store events
//!
//! A small listener registry keyed by event kind.
//!
//! ## Multiplicity
//! | Event   | Fires                                              |
//! |---------|----------------------------------------------------|
//! | `Load`  | at most once per store, when the load pass ends    |
//! | `ReadClosed` | at most once per store, when an opened read side is released (after `Load` or the fatal `Error`) |
//! | `Error` | any number of times (recoverable or fatal)         |
//! | `Drain` | once per transition into "nothing pending or in flight" |
//! | `Closed`| at most once per store, after both log sides are released |
//!
//! Every matching listener sees every emission (broadcast). Listeners
//! registered with [`EventBus::once`] are removed after their first delivery.

use std::fmt;

use crate::error::DriftError;

/// Something observable that happened inside the store
#[derive(Debug)]
pub enum Event {
    /// The load pass finished; `records` keys are live in the index
    Load { records: usize },

    /// The read side of the log was released: end of input, a fatal read
    /// error, or a close during the load pass
    ReadClosed,

    /// A recoverable or fatal condition
    Error(DriftError),

    /// No writes are pending or in flight
    Drain,

    /// Both sides of the log channel have been released
    Closed,
}

/// Discriminant of [`Event`], used to register listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Load,
    ReadClosed,
    Error,
    Drain,
    Closed,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Load { .. } => EventKind::Load,
            Event::ReadClosed => EventKind::ReadClosed,
            Event::Error(_) => EventKind::Error,
            Event::Drain => EventKind::Drain,
            Event::Closed => EventKind::Closed,
        }
    }
}

/// Handle returned on registration, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Boxed listener callback
pub type Listener = Box<dyn FnMut(&Event) + Send>;

struct Registration {
    id: ListenerId,
    kind: EventKind,
    once: bool,
    callback: Listener,
}

/// Registry of event listeners
#[derive(Default)]
pub struct EventBus {
    registrations: Vec<Registration>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every emission of `kind`
    pub fn on<F>(&mut self, kind: EventKind, callback: F) -> ListenerId
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.register(kind, false, Box::new(callback))
    }

    /// Register a listener for the next emission of `kind` only
    pub fn once<F>(&mut self, kind: EventKind, callback: F) -> ListenerId
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.register(kind, true, Box::new(callback))
    }

    /// Unregister a listener. Returns `false` if it was already gone.
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.registrations.len();
        self.registrations.retain(|r| r.id != id);
        self.registrations.len() != before
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registrations.iter().filter(|r| r.kind == kind).count()
    }

    /// Deliver `event` to its listeners, in registration order.
    /// Returns how many listeners saw it.
    pub fn emit(&mut self, event: &Event) -> usize {
        let kind = event.kind();
        let mut delivered = 0;

        self.registrations.retain_mut(|registration| {
            if registration.kind != kind {
                return true;
            }
            (registration.callback)(event);
            delivered += 1;
            !registration.once
        });

        delivered
    }

    fn register(&mut self, kind: EventKind, once: bool, callback: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.registrations.push(Registration {
            id,
            kind,
            once,
            callback,
        });
        id
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.registrations.len())
            .finish()
    }
}

//! Store reactor
//!
//! The signal queue that channel callbacks post into. The store drains it
//! on its own turns, so acknowledgements never run concurrently with
//! `set`, `for_each` or `close`.

use std::time::Instant;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

use crate::log::{ChannelNotifier, Signal};

pub(crate) enum Wait {
    Signal(Signal),
    TimedOut,
}

pub(crate) struct Reactor {
    tx: Sender<Signal>,
    rx: Receiver<Signal>,
}

impl Reactor {
    pub(crate) fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self { tx, rx }
    }

    /// A notifier channels use to post signals back to this reactor
    pub(crate) fn notifier(&self) -> ChannelNotifier {
        ChannelNotifier::new(self.tx.clone())
    }

    pub(crate) fn try_next(&self) -> Option<Signal> {
        self.rx.try_recv().ok()
    }

    /// Block for the next signal, up to `deadline`
    pub(crate) fn wait_next(&self, deadline: Option<Instant>) -> Wait {
        // The reactor holds a sender itself, so the queue never disconnects.
        match deadline {
            Some(deadline) => match self.rx.recv_deadline(deadline) {
                Ok(signal) => Wait::Signal(signal),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => Wait::TimedOut,
            },
            None => match self.rx.recv() {
                Ok(signal) => Wait::Signal(signal),
                Err(_) => Wait::TimedOut,
            },
        }
    }
}

//! Store Module
//!
//! The embedded store: an in-memory index persisted by appending records to
//! a log channel.
//!
//! ## Responsibilities
//! - Replay the log into the index on startup (`loader`)
//! - Write through to the index and append asynchronously (`queue`)
//! - Defer shutdown until every write is acknowledged (`lifecycle`)
//! - Broadcast load/read-closed/error/drain/closed events (`events`)
//!
//! ## Turn Model
//! The store is a single-owner value driven by its own reactor. Channel
//! acknowledgements and drain notifications are queued by the channel and
//! only dispatched inside [`Store::poll`], [`Store::poll_once`],
//! [`Store::run_until`] and the `wait_*` helpers. Everything between two
//! turns (`set`, `get`, `for_each`, `close`) runs to completion without
//! interleaving.

mod events;
mod lifecycle;
mod loader;
mod queue;
mod reactor;

use std::path::Path;
use std::time::Instant;

use serde_json::Value;

use crate::config::Config;
use crate::error::{DriftError, Result};
use crate::index::{Flow, Index, IndexIter};
use crate::log::{ChannelError, FileChannel, LogChannel, LogWriter, Record, Signal, WriteTicket};

pub use events::{Event, EventBus, EventKind, Listener, ListenerId};
pub use loader::LoadStats;
pub use queue::Continuation;

use loader::{LoadStep, Loader};
use queue::WriteQueue;
use reactor::{Reactor, Wait};

/// Where the store is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// No log configured and the first turn has not run yet
    NotStarted,

    /// Replaying the log
    Loading,

    /// Load pass complete (or no log); serving
    Ready,

    /// The log could not be read; the store never becomes ready
    LoadFailed,

    /// Releasing the channel
    Closing,

    /// Channel released; no further writes are honoured
    Closed,
}

/// Append side of the channel, opened on first flush.
/// A failed open leaves the slot `Unopened` so the next append tries again.
enum WriterSlot {
    Unopened,
    Open(Box<dyn LogWriter>),
    Released,
}

/// Outcome of a single reactor turn
#[derive(Debug, PartialEq, Eq)]
enum Turn {
    Progressed,
    Idle,
    TimedOut,
}

/// The log-backed key-value store
///
/// ## Concurrency Model: single owner
///
/// - All mutation goes through `&mut self`
/// - Channel callbacks only enqueue signals; the store applies them on its
///   own turn
/// - Multiple appends may be in flight for different keys, never two for
///   the same key
pub struct Store {
    /// Store configuration
    config: Config,

    state: ReadyState,

    /// Live keys and values
    index: Index,

    /// Startup replay
    loader: Loader,

    /// Fatal load failure, kept for `wait_ready`
    load_error: Option<ChannelError>,

    /// Pending and in-flight appends
    queue: WriteQueue,

    events: EventBus,
    reactor: Reactor,

    /// Log medium; `None` keeps the store purely in memory
    channel: Option<Box<dyn LogChannel>>,
    writer: WriterSlot,

    /// `close` was called with work outstanding
    close_on_drain: bool,
}

impl Store {
    /// Open a store using `config`. With a `log_path` the log is replayed
    /// on the first turns; without one the store is memory-only.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let channel = config
            .log_path
            .as_ref()
            .map(|path| Box::new(FileChannel::new(path, &config)) as Box<dyn LogChannel>);
        Ok(Self::build(config, channel))
    }

    /// Open the log at `path` with default settings and wait until it is
    /// loaded
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let config = Config::builder().log_path(path.as_ref()).build();
        let mut store = Self::open(config)?;
        store.wait_ready()?;
        Ok(store)
    }

    /// A store with no log at all
    pub fn in_memory() -> Self {
        Self::build(Config::default(), None)
    }

    /// Open a store over a caller-supplied channel
    pub fn with_channel<C>(channel: C, config: Config) -> Result<Self>
    where
        C: LogChannel + 'static,
    {
        config.validate()?;
        Ok(Self::build(config, Some(Box::new(channel))))
    }

    fn build(config: Config, channel: Option<Box<dyn LogChannel>>) -> Self {
        let state = if channel.is_some() {
            ReadyState::Loading
        } else {
            ReadyState::NotStarted
        };

        Self {
            config,
            state,
            index: Index::new(),
            loader: Loader::new(),
            load_error: None,
            queue: WriteQueue::new(),
            events: EventBus::new(),
            reactor: Reactor::new(),
            channel,
            writer: WriterSlot::Unopened,
            close_on_drain: false,
        }
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Listen for every emission of `kind`
    pub fn on<F>(&mut self, kind: EventKind, listener: F) -> ListenerId
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.events.on(kind, listener)
    }

    /// Listen for the next emission of `kind` only
    pub fn once<F>(&mut self, kind: EventKind, listener: F) -> ListenerId
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.events.once(kind, listener)
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    fn emit(&mut self, event: Event) {
        self.events.emit(&event);
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Look a key up in the index
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Visit every entry in first-insertion order until the visitor returns
    /// [`Flow::Stop`]. Returns the number of entries visited.
    ///
    /// Only the in-memory index is traversed; the log is never touched.
    pub fn for_each<F>(&self, visitor: F) -> usize
    where
        F: FnMut(&str, &Value) -> Flow,
    {
        self.index.for_each(visitor)
    }

    /// Iterate entries in first-insertion order
    pub fn iter(&self) -> IndexIter<'_> {
        self.index.iter()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Set `key` to `value`. `Value::Null` deletes the key.
    ///
    /// The index is updated immediately; the append happens asynchronously.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.write(key.into(), value.into(), None);
    }

    /// Like [`Store::set`], calling `continuation` once the value (or a
    /// later value for the same key) is durable
    pub fn set_with<F>(&mut self, key: impl Into<String>, value: impl Into<Value>, continuation: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.write(key.into(), value.into(), Some(Box::new(continuation)));
    }

    /// Delete `key` (appends a tombstone)
    pub fn remove(&mut self, key: impl Into<String>) {
        self.write(key.into(), Value::Null, None);
    }

    /// Like [`Store::remove`], with a durability continuation
    pub fn remove_with<F>(&mut self, key: impl Into<String>, continuation: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.write(key.into(), Value::Null, Some(Box::new(continuation)));
    }

    fn write(&mut self, key: String, value: Value, continuation: Option<Continuation>) {
        if matches!(self.state, ReadyState::Closing | ReadyState::Closed) {
            tracing::warn!("Ignoring write to {:?}: store is closed", key);
            if let Some(continuation) = continuation {
                continuation(Err(DriftError::Closed));
            }
            return;
        }

        self.index.apply(&key, Some(value));
        if self.state == ReadyState::Loading {
            self.loader.shadow(&key);
        }

        self.queue.enqueue(&key, continuation);
        self.flush_pending();
    }

    /// Issue appends for every eligible key until the channel pushes back
    fn flush_pending(&mut self) {
        let can_flush = matches!(self.state, ReadyState::Ready | ReadyState::LoadFailed);
        if !can_flush || self.queue.backpressure() {
            return;
        }

        while let Some(key) = self.queue.pop_ready() {
            let Some(id) = self.queue.begin(&key) else {
                continue;
            };
            let ticket = self.reactor.notifier().ticket(id);

            let record = Record::new(key.as_str(), self.index.get(&key).cloned());
            let bytes = match record.encode() {
                Ok(bytes) => bytes,
                Err(e) => {
                    ticket.complete(Err(ChannelError::new(std::io::ErrorKind::InvalidData, e.to_string())));
                    continue;
                }
            };

            tracing::trace!("Appending record for {:?} (ticket {})", key, id);
            if !self.submit(bytes, ticket) {
                tracing::debug!("Log channel saturated; holding further appends");
                self.queue.set_backpressure(true);
                break;
            }
        }
    }

    /// Hand one record to the append side. Returns `false` on backpressure.
    fn submit(&mut self, record: bytes::Bytes, ticket: WriteTicket) -> bool {
        let Some(channel) = self.channel.as_mut() else {
            // Nothing to persist to: acknowledge on the next turn.
            ticket.complete(Ok(()));
            return true;
        };

        if let WriterSlot::Unopened = self.writer {
            match channel.open_writer(self.reactor.notifier()) {
                Ok(writer) => self.writer = WriterSlot::Open(writer),
                Err(e) => {
                    tracing::error!("Failed to open log writer for {}: {}", channel.describe(), e);
                    ticket.complete(Err(e));
                    return true;
                }
            }
        }

        match &mut self.writer {
            WriterSlot::Open(writer) => writer.write(record, ticket),
            WriterSlot::Unopened | WriterSlot::Released => {
                ticket.complete(Err(ChannelError::new(
                    std::io::ErrorKind::BrokenPipe,
                    "log writer is released",
                )));
                true
            }
        }
    }

    // =========================================================================
    // Reactor
    // =========================================================================

    /// Run turns until nothing more can happen without waiting.
    /// Returns the number of turns that made progress.
    pub fn poll(&mut self) -> usize {
        let mut turns = 0;
        while self.turn(false, None) == Turn::Progressed {
            turns += 1;
        }
        turns
    }

    /// Run a single non-blocking turn. Returns whether anything happened.
    pub fn poll_once(&mut self) -> bool {
        self.turn(false, None) == Turn::Progressed
    }

    /// Run turns, blocking on the channel when needed, until `done` holds.
    ///
    /// Fails with `Stalled` if nothing outstanding could change the store
    /// and with `Timeout` once `Config::wait_timeout` elapses.
    pub fn run_until<F>(&mut self, waiting_for: &'static str, mut done: F) -> Result<()>
    where
        F: FnMut(&Store) -> bool,
    {
        let deadline = self.config.wait_timeout.map(|timeout| Instant::now() + timeout);
        loop {
            if done(self) {
                return Ok(());
            }
            match self.turn(true, deadline) {
                Turn::Progressed => {}
                Turn::Idle => return Err(DriftError::Stalled(waiting_for)),
                Turn::TimedOut => return Err(DriftError::Timeout(waiting_for)),
            }
        }
    }

    /// Wait for the load pass to finish
    pub fn wait_ready(&mut self) -> Result<()> {
        self.run_until("ready", |store| {
            !matches!(store.state, ReadyState::NotStarted | ReadyState::Loading)
        })?;

        match self.state {
            ReadyState::LoadFailed => {
                let err = self.load_error.clone().unwrap_or_else(|| {
                    ChannelError::new(std::io::ErrorKind::Other, "load failed")
                });
                Err(DriftError::FatalLoad(err))
            }
            ReadyState::Closing | ReadyState::Closed => Err(DriftError::Closed),
            _ => Ok(()),
        }
    }

    /// Wait until no write is pending or in flight
    pub fn wait_drained(&mut self) -> Result<()> {
        self.run_until("drain", |store| {
            store.queue.is_drained() && store.state != ReadyState::NotStarted
        })
    }

    /// Wait until a requested close has released the channel
    pub fn wait_closed(&mut self) -> Result<()> {
        self.run_until("close", |store| store.state == ReadyState::Closed)
    }

    fn turn(&mut self, block: bool, deadline: Option<Instant>) -> Turn {
        let mut progressed = false;

        match self.state {
            ReadyState::NotStarted => {
                self.finish_load();
                progressed = true;
            }
            ReadyState::Loading => {
                self.advance_load();
                progressed = true;
            }
            _ => {}
        }

        while let Some(signal) = self.reactor.try_next() {
            self.dispatch(signal);
            progressed = true;
        }

        if progressed {
            return Turn::Progressed;
        }
        if !block || !self.awaiting_channel() {
            return Turn::Idle;
        }

        match self.reactor.wait_next(deadline) {
            Wait::Signal(signal) => {
                self.dispatch(signal);
                Turn::Progressed
            }
            Wait::TimedOut => Turn::TimedOut,
        }
    }

    /// Whether the channel still owes us a signal
    fn awaiting_channel(&self) -> bool {
        self.queue.in_flight() > 0 || self.queue.backpressure()
    }

    fn dispatch(&mut self, signal: Signal) {
        match signal {
            Signal::Ack { ticket, result } => self.on_ack(ticket, result),
            Signal::Drained => {
                if self.queue.backpressure() {
                    tracing::debug!("Log channel drained; resuming appends");
                    self.queue.set_backpressure(false);
                    self.flush_pending();
                }
            }
        }
    }

    fn on_ack(&mut self, ticket: u64, result: std::result::Result<(), ChannelError>) {
        let Some(done) = self.queue.complete(ticket) else {
            tracing::trace!("Ignoring ack for unknown ticket {}", ticket);
            return;
        };

        match result {
            Ok(()) => {
                tracing::trace!("Append for {:?} acknowledged", done.key);
                for continuation in done.continuations {
                    continuation(Ok(()));
                }
                self.queue.settle(&done.key);
            }
            Err(err) if done.attempts < self.config.max_write_retries => {
                tracing::warn!(
                    "Append for {:?} failed (attempt {}), retrying: {}",
                    done.key,
                    done.attempts + 1,
                    err
                );
                self.queue.retry(&done.key, done.continuations);
            }
            Err(err) => {
                tracing::warn!("Append for {:?} failed: {}", done.key, err);
                for continuation in done.continuations {
                    continuation(Err(DriftError::WriteFailure {
                        key: done.key.clone(),
                        source: err.clone(),
                    }));
                }
                self.queue.settle(&done.key);
                self.emit(Event::Error(DriftError::WriteFailure {
                    key: done.key,
                    source: err,
                }));
            }
        }

        self.flush_pending();

        if self.queue.is_drained() {
            tracing::trace!("Write queue drained");
            self.emit(Event::Drain);
            if self.close_on_drain {
                self.close_on_drain = false;
                self.close();
            }
        }
    }

    // =========================================================================
    // Loading
    // =========================================================================

    fn advance_load(&mut self) {
        if !self.loader.is_started() {
            let Some(channel) = self.channel.as_mut() else {
                self.finish_load();
                return;
            };

            let source = channel.describe();
            match self.loader.start(channel.as_mut()) {
                Ok(true) => tracing::debug!("Loading log from {}", source),
                Ok(false) => {
                    tracing::debug!("No log at {}; starting empty", source);
                    self.finish_load();
                }
                Err(e) => self.fail_load(e),
            }
            return;
        }

        let mut issues = Vec::new();
        let step = self.loader.step(&mut self.index, &mut issues);

        for issue in issues {
            tracing::warn!("Skipping log record: {}", issue);
            self.emit(Event::Error(issue));
        }

        match step {
            Ok(LoadStep::More) => {}
            Ok(LoadStep::Finished) => {
                self.finish_load();
                self.emit(Event::ReadClosed);
            }
            Err(e) => {
                self.fail_load(e);
                self.emit(Event::ReadClosed);
            }
        }
    }

    fn finish_load(&mut self) {
        self.state = ReadyState::Ready;

        let stats = self.loader.stats();
        if stats.records_applied > 0 || stats.empty_records > 0 || stats.corrupted_records > 0 {
            tracing::debug!(
                "Log replay: {} records applied, {} empty, {} corrupted, {} keys live",
                stats.records_applied,
                stats.empty_records,
                stats.corrupted_records,
                self.index.len()
            );
        }

        let records = self.index.len();
        self.emit(Event::Load { records });
        self.flush_pending();
    }

    fn fail_load(&mut self, err: ChannelError) {
        tracing::error!("Failed to load log: {}", err);
        self.state = ReadyState::LoadFailed;
        self.load_error = Some(err.clone());
        self.emit(Event::Error(DriftError::FatalLoad(err)));
        self.flush_pending();
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn state(&self) -> ReadyState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ReadyState::Ready
    }

    /// Appends submitted but not yet acknowledged
    pub fn in_flight_writes(&self) -> usize {
        self.queue.in_flight()
    }

    /// Keys with an append queued or in flight
    pub fn pending_keys(&self) -> usize {
        self.queue.pending_keys()
    }

    /// Nothing pending and nothing in flight
    pub fn is_drained(&self) -> bool {
        self.queue.is_drained()
    }

    /// Counters from the load pass so far
    pub fn load_stats(&self) -> LoadStats {
        self.loader.stats()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

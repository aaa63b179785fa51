//! In-memory log channel
//!
//! A channel whose "file" is a byte buffer. Acknowledgements can be
//! automatic or held until released by hand, and read/write failures and
//! backpressure can be scripted, which makes it the channel of choice for
//! exercising the store's write path deterministically.
//!
//! Clones share the same underlying buffer, so a test can keep a handle to
//! inspect and drive the channel after handing a clone to a store.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use super::{ChannelError, ChannelNotifier, LogChannel, LogReader, LogWriter, WriteTicket};

/// When appends are acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Acknowledge as soon as the record is written
    Auto,

    /// Hold appends until `ack_next` / `ack_all`
    Manual,
}

/// Shared in-memory log
#[derive(Clone)]
pub struct MemoryChannel {
    state: Arc<Mutex<MemoryState>>,
}

struct MemoryState {
    /// Log contents; `None` means the log does not exist
    contents: Option<Vec<u8>>,
    chunk_size: usize,
    ack_mode: AckMode,

    /// Held appends allowed before `write` reports backpressure
    high_water_mark: usize,

    // Scripted failures
    open_error: Option<ChannelError>,
    read_error_after: Option<(usize, ChannelError)>,
    writer_open_error: Option<ChannelError>,
    /// Failing opens left before `writer_open_error` clears; `None` = forever
    writer_open_failures_left: Option<usize>,
    failing_writes: VecDeque<ChannelError>,

    // Append side
    notifier: Option<ChannelNotifier>,
    held: VecDeque<(Bytes, WriteTicket)>,
    appends: Vec<Bytes>,
    saturated: bool,

    // Lifecycle observations
    writer_open_attempts: usize,
    reader_aborted: bool,
    writer_ended: bool,
    writer_destroyed: bool,
}

impl MemoryChannel {
    /// A channel whose log does not exist yet
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                contents: None,
                chunk_size: 64 * 1024,
                ack_mode: AckMode::Auto,
                high_water_mark: usize::MAX,
                open_error: None,
                read_error_after: None,
                writer_open_error: None,
                writer_open_failures_left: None,
                failing_writes: VecDeque::new(),
                notifier: None,
                held: VecDeque::new(),
                appends: Vec::new(),
                saturated: false,
                writer_open_attempts: 0,
                reader_aborted: false,
                writer_ended: false,
                writer_destroyed: false,
            })),
        }
    }

    /// A channel whose log already holds `contents`
    pub fn with_contents(contents: impl AsRef<[u8]>) -> Self {
        let channel = Self::new();
        channel.state.lock().contents = Some(contents.as_ref().to_vec());
        channel
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Size of the chunks handed to the loader
    pub fn chunk_size(self, size: usize) -> Self {
        self.state.lock().chunk_size = size.max(1);
        self
    }

    pub fn ack_mode(self, mode: AckMode) -> Self {
        self.state.lock().ack_mode = mode;
        self
    }

    /// Number of unacknowledged appends at which `write` returns `false`
    pub fn high_water_mark(self, records: usize) -> Self {
        self.state.lock().high_water_mark = records.max(1);
        self
    }

    /// Make `open_reader` fail with `kind`
    pub fn fail_open(self, kind: io::ErrorKind) -> Self {
        self.state.lock().open_error = Some(ChannelError::new(kind, "scripted open failure"));
        self
    }

    /// Make the reader fail with `kind` after handing out `chunks` chunks
    pub fn fail_read_after(self, chunks: usize, kind: io::ErrorKind) -> Self {
        self.state.lock().read_error_after =
            Some((chunks, ChannelError::new(kind, "scripted read failure")));
        self
    }

    /// Make every `open_writer` fail with `kind`
    pub fn fail_writer_open(self, kind: io::ErrorKind) -> Self {
        {
            let mut state = self.state.lock();
            state.writer_open_error = Some(ChannelError::new(kind, "scripted writer open failure"));
            state.writer_open_failures_left = None;
        }
        self
    }

    /// Make the next `times` calls to `open_writer` fail with `kind`
    pub fn fail_writer_open_times(self, times: usize, kind: io::ErrorKind) -> Self {
        {
            let mut state = self.state.lock();
            state.writer_open_error = Some(ChannelError::new(kind, "scripted writer open failure"));
            state.writer_open_failures_left = Some(times);
        }
        self
    }

    /// Fail the next acknowledged append with `kind`
    pub fn fail_next_write(&self, kind: io::ErrorKind) {
        self.state
            .lock()
            .failing_writes
            .push_back(ChannelError::new(kind, "scripted write failure"));
    }

    // =========================================================================
    // Manual Acknowledgement
    // =========================================================================

    /// Acknowledge the oldest held append. Returns `false` if none was held.
    pub fn ack_next(&self) -> bool {
        let mut state = self.state.lock();
        let Some((record, ticket)) = state.held.pop_front() else {
            return false;
        };
        state.commit(record, ticket);
        state.release_backpressure();
        true
    }

    /// Acknowledge every held append, returning how many were released
    pub fn ack_all(&self) -> usize {
        let mut count = 0;
        while self.ack_next() {
            count += 1;
        }
        count
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Current log contents (empty if the log does not exist)
    pub fn contents(&self) -> Vec<u8> {
        self.state.lock().contents.clone().unwrap_or_default()
    }

    pub fn contents_string(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }

    /// Every append submitted to the writer, acknowledged or not
    pub fn appends(&self) -> Vec<Bytes> {
        self.state.lock().appends.clone()
    }

    pub fn append_count(&self) -> usize {
        self.state.lock().appends.len()
    }

    /// Appends submitted but not yet acknowledged
    pub fn held_count(&self) -> usize {
        self.state.lock().held.len()
    }

    /// Calls to `open_writer`, failed ones included
    pub fn writer_open_attempts(&self) -> usize {
        self.state.lock().writer_open_attempts
    }

    pub fn reader_aborted(&self) -> bool {
        self.state.lock().reader_aborted
    }

    pub fn writer_ended(&self) -> bool {
        self.state.lock().writer_ended
    }

    pub fn writer_destroyed(&self) -> bool {
        self.state.lock().writer_destroyed
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryState {
    /// Apply an append to the contents and acknowledge it
    fn commit(&mut self, record: Bytes, ticket: WriteTicket) {
        match self.failing_writes.pop_front() {
            Some(err) => ticket.complete(Err(err)),
            None => {
                self.contents
                    .get_or_insert_with(Vec::new)
                    .extend_from_slice(&record);
                ticket.complete(Ok(()));
            }
        }
    }

    fn release_backpressure(&mut self) {
        if self.saturated && self.held.len() < self.high_water_mark {
            self.saturated = false;
            if let Some(notifier) = &self.notifier {
                notifier.drained();
            }
        }
    }
}

impl LogChannel for MemoryChannel {
    fn open_reader(&mut self) -> Result<Box<dyn LogReader>, ChannelError> {
        let state = self.state.lock();
        if let Some(err) = &state.open_error {
            return Err(err.clone());
        }
        let Some(contents) = &state.contents else {
            return Err(ChannelError::new(io::ErrorKind::NotFound, "memory log does not exist"));
        };

        Ok(Box::new(MemoryReader {
            state: Arc::clone(&self.state),
            data: Bytes::from(contents.clone()),
            offset: 0,
            chunk_size: state.chunk_size,
            chunks_read: 0,
            fail_after: state.read_error_after.clone(),
        }))
    }

    fn open_writer(&mut self, notifier: ChannelNotifier) -> Result<Box<dyn LogWriter>, ChannelError> {
        let mut state = self.state.lock();
        state.writer_open_attempts += 1;
        if let Some(err) = state.writer_open_error.clone() {
            match state.writer_open_failures_left {
                None => return Err(err),
                Some(0) => state.writer_open_error = None,
                Some(left) => {
                    state.writer_open_failures_left = Some(left - 1);
                    return Err(err);
                }
            }
        }
        state.contents.get_or_insert_with(Vec::new);
        state.notifier = Some(notifier);

        Ok(Box::new(MemoryWriter {
            state: Arc::clone(&self.state),
        }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

// =============================================================================
// Read Side
// =============================================================================

struct MemoryReader {
    state: Arc<Mutex<MemoryState>>,
    data: Bytes,
    offset: usize,
    chunk_size: usize,
    chunks_read: usize,
    fail_after: Option<(usize, ChannelError)>,
}

impl LogReader for MemoryReader {
    fn next_chunk(&mut self) -> Result<Option<Bytes>, ChannelError> {
        if let Some((after, err)) = &self.fail_after {
            if self.chunks_read >= *after {
                return Err(err.clone());
            }
        }
        if self.offset >= self.data.len() {
            return Ok(None);
        }

        let end = (self.offset + self.chunk_size).min(self.data.len());
        let chunk = self.data.slice(self.offset..end);
        self.offset = end;
        self.chunks_read += 1;
        Ok(Some(chunk))
    }

    fn abort(&mut self) {
        self.offset = self.data.len();
        self.state.lock().reader_aborted = true;
    }
}

// =============================================================================
// Append Side
// =============================================================================

struct MemoryWriter {
    state: Arc<Mutex<MemoryState>>,
}

impl LogWriter for MemoryWriter {
    fn write(&mut self, record: Bytes, ticket: WriteTicket) -> bool {
        let mut state = self.state.lock();
        state.appends.push(record.clone());

        match state.ack_mode {
            AckMode::Auto => {
                state.commit(record, ticket);
                true
            }
            AckMode::Manual => {
                state.held.push_back((record, ticket));
                let has_room = state.held.len() < state.high_water_mark;
                if !has_room {
                    state.saturated = true;
                }
                has_room
            }
        }
    }

    fn end(&mut self) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        while let Some((record, ticket)) = state.held.pop_front() {
            state.commit(record, ticket);
        }
        state.writer_ended = true;
        Ok(())
    }

    fn destroy(&mut self) {
        let mut state = self.state.lock();
        state.held.clear();
        state.notifier = None;
        state.writer_destroyed = true;
    }
}

//! File-backed log channel
//!
//! Reads the log in fixed-size chunks and appends through a dedicated
//! writer thread, so `write` never blocks the store on disk I/O.
//!
//! ## Writer Thread
//! ```text
//!   store ──write()──► [command queue] ──► writer thread ──► file
//!     ▲                                        │
//!     └──────── ack / drained (reactor) ◄──────┘
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::{Bytes, BytesMut};
use crossbeam::channel::{self, Receiver, Sender};

use crate::config::{Config, SyncStrategy};

use super::{ChannelError, ChannelNotifier, LogChannel, LogReader, LogWriter, WriteTicket};

/// A log stored in a single append-only file
#[derive(Debug, Clone)]
pub struct FileChannel {
    path: PathBuf,
    read_chunk_size: usize,
    high_water_mark: usize,
    sync_strategy: SyncStrategy,
}

impl FileChannel {
    /// Create a channel for `path` using the I/O settings from `config`
    pub fn new(path: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            path: path.into(),
            read_chunk_size: config.read_chunk_size,
            high_water_mark: config.high_water_mark,
            sync_strategy: config.sync_strategy,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogChannel for FileChannel {
    fn open_reader(&mut self) -> Result<Box<dyn LogReader>, ChannelError> {
        let file = File::open(&self.path)?;
        Ok(Box::new(FileReader {
            file: Some(file),
            chunk_size: self.read_chunk_size,
        }))
    }

    fn open_writer(&mut self, notifier: ChannelNotifier) -> Result<Box<dyn LogWriter>, ChannelError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let writer = FileWriter::spawn(file, notifier, self.high_water_mark, self.sync_strategy)?;
        tracing::debug!("Opened log writer for {}", self.path.display());
        Ok(Box::new(writer))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// =============================================================================
// Read Side
// =============================================================================

struct FileReader {
    /// `None` once end of input is reached or the reader is aborted
    file: Option<File>,
    chunk_size: usize,
}

impl LogReader for FileReader {
    fn next_chunk(&mut self) -> Result<Option<Bytes>, ChannelError> {
        let Some(file) = self.file.as_mut() else {
            return Ok(None);
        };

        let mut buf = BytesMut::zeroed(self.chunk_size);
        loop {
            match file.read(&mut buf) {
                Ok(0) => {
                    self.file = None;
                    return Ok(None);
                }
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(Some(buf.freeze()));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.file = None;
                    return Err(e.into());
                }
            }
        }
    }

    fn abort(&mut self) {
        self.file = None;
    }
}

// =============================================================================
// Append Side
// =============================================================================

enum WriterCommand {
    Append { record: Bytes, ticket: WriteTicket },
    End { reply: Sender<Result<(), ChannelError>> },
}

struct FileWriter {
    /// Command queue into the writer thread; `None` once ended or destroyed
    tx: Option<Sender<WriterCommand>>,
    handle: Option<JoinHandle<()>>,

    /// Bytes submitted but not yet written by the thread
    buffered: Arc<AtomicUsize>,

    /// Set when `write` reported saturation; cleared when drained is sent
    needs_drain: Arc<AtomicBool>,

    high_water_mark: usize,
}

impl FileWriter {
    fn spawn(
        file: File,
        notifier: ChannelNotifier,
        high_water_mark: usize,
        sync_strategy: SyncStrategy,
    ) -> Result<Self, ChannelError> {
        let (tx, rx) = channel::unbounded();
        let buffered = Arc::new(AtomicUsize::new(0));
        let needs_drain = Arc::new(AtomicBool::new(false));

        let worker = WriterThread {
            file,
            rx,
            notifier,
            sync_strategy,
            unsynced: 0,
            buffered: Arc::clone(&buffered),
            needs_drain: Arc::clone(&needs_drain),
        };

        let handle = thread::Builder::new()
            .name("driftkv-log-writer".to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            buffered,
            needs_drain,
            high_water_mark,
        })
    }

    fn closed_error() -> ChannelError {
        ChannelError::new(io::ErrorKind::BrokenPipe, "log writer is closed")
    }
}

impl LogWriter for FileWriter {
    fn write(&mut self, record: Bytes, ticket: WriteTicket) -> bool {
        let Some(tx) = self.tx.as_ref() else {
            ticket.complete(Err(Self::closed_error()));
            return true;
        };

        let len = record.len();
        let total = self.buffered.fetch_add(len, Ordering::SeqCst) + len;
        let has_room = total < self.high_water_mark;

        // Must be visible before the thread can finish this record
        if !has_room {
            self.needs_drain.store(true, Ordering::SeqCst);
        }

        if let Err(err) = tx.send(WriterCommand::Append { record, ticket }) {
            self.buffered.fetch_sub(len, Ordering::SeqCst);
            if let WriterCommand::Append { ticket, .. } = err.into_inner() {
                ticket.complete(Err(Self::closed_error()));
            }
            return true;
        }

        has_room
    }

    fn end(&mut self) -> Result<(), ChannelError> {
        let Some(tx) = self.tx.take() else {
            return Ok(());
        };

        let (reply_tx, reply_rx) = channel::bounded(1);
        let result = match tx.send(WriterCommand::End { reply: reply_tx }) {
            Ok(()) => reply_rx.recv().unwrap_or_else(|_| {
                Err(ChannelError::new(io::ErrorKind::BrokenPipe, "log writer thread exited"))
            }),
            Err(_) => Err(ChannelError::new(io::ErrorKind::BrokenPipe, "log writer thread exited")),
        };
        drop(tx);

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                return Err(ChannelError::new(io::ErrorKind::Other, "log writer thread panicked"));
            }
        }

        result
    }

    fn destroy(&mut self) {
        // Dropping the sender stops the thread after whatever is queued.
        self.tx = None;
        self.handle = None;
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        self.destroy();
    }
}

struct WriterThread {
    file: File,
    rx: Receiver<WriterCommand>,
    notifier: ChannelNotifier,
    sync_strategy: SyncStrategy,
    unsynced: usize,
    buffered: Arc<AtomicUsize>,
    needs_drain: Arc<AtomicBool>,
}

impl WriterThread {
    fn run(mut self) {
        while let Ok(command) = self.rx.recv() {
            match command {
                WriterCommand::Append { record, ticket } => {
                    let result = self.append(&record).map_err(ChannelError::from);
                    if let Err(e) = &result {
                        tracing::warn!("Log append for ticket {} failed: {}", ticket.id(), e);
                    }
                    ticket.complete(result);

                    let len = record.len();
                    let remaining = self.buffered.fetch_sub(len, Ordering::SeqCst) - len;
                    if remaining == 0 && self.needs_drain.swap(false, Ordering::SeqCst) {
                        self.notifier.drained();
                    }
                }
                WriterCommand::End { reply } => {
                    let result = self.file.sync_all().map_err(ChannelError::from);
                    let _ = reply.send(result);
                    return;
                }
            }
        }
    }

    fn append(&mut self, record: &[u8]) -> io::Result<()> {
        append_whole(&mut self.file, record)?;
        self.unsynced += 1;

        let due = match self.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNEntries { count } => self.unsynced >= count,
            SyncStrategy::OnEnd => false,
        };
        if due {
            self.file.sync_data()?;
            self.unsynced = 0;
        }

        Ok(())
    }
}

// =============================================================================
// Torn Write Handling
// =============================================================================

/// File operations needed to keep a failed append from leaving a fragment
trait AppendTarget: Write {
    /// Current end of the log
    fn end_offset(&self) -> io::Result<u64>;

    /// Cut the log back to `offset`
    fn truncate_to(&mut self, offset: u64) -> io::Result<()>;
}

impl AppendTarget for File {
    fn end_offset(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate_to(&mut self, offset: u64) -> io::Result<()> {
        self.set_len(offset)
    }
}

/// Append `record` in full or not at all.
///
/// A short write (e.g. a full disk) is cut back to where the record started,
/// so the next record does not land on the tail of a torn line.
fn append_whole<T: AppendTarget>(target: &mut T, record: &[u8]) -> io::Result<()> {
    let start = target.end_offset()?;

    if let Err(e) = target.write_all(record) {
        if let Err(cut) = target.truncate_to(start) {
            tracing::error!("Failed to remove torn record at offset {}: {}", start, cut);
        }
        return Err(e);
    }

    Ok(())
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;

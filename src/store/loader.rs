//! Loader
//!
//! Replays the log into the index on startup.
//!
//! This will:
//! 1. Open the read side (a missing log means an empty store)
//! 2. Pull one chunk per step and split it into lines
//! 3. Skip blank and corrupted lines, reporting each one
//! 4. Apply every well-formed record in file order
//!
//! The pass runs at most once per store and never re-reads.

use std::collections::HashSet;

use crate::error::DriftError;
use crate::index::Index;
use crate::log::{ChannelError, LineSplitter, LogChannel, LogReader, Record};

/// Outcome counters for a load pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Records applied to the index (sets and deletes)
    pub records_applied: u64,

    /// Blank lines skipped
    pub empty_records: u64,

    /// Unparseable lines skipped
    pub corrupted_records: u64,

    /// Bytes consumed from the read side
    pub bytes_read: u64,
}

pub(crate) enum LoadStep {
    /// More input may follow
    More,

    /// End of input reached
    Finished,
}

pub(crate) struct Loader {
    reader: Option<Box<dyn LogReader>>,
    started: bool,
    lines: LineSplitter,
    line_no: u64,
    stats: LoadStats,

    /// Keys written at runtime while loading; replay must not clobber them
    shadowed: HashSet<String>,
}

impl Loader {
    pub(crate) fn new() -> Self {
        Self {
            reader: None,
            started: false,
            lines: LineSplitter::new(),
            line_no: 0,
            stats: LoadStats::default(),
            shadowed: HashSet::new(),
        }
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started
    }

    /// Open the read side.
    /// Returns `Ok(false)` if the log does not exist.
    pub(crate) fn start(&mut self, channel: &mut dyn LogChannel) -> Result<bool, ChannelError> {
        self.started = true;
        match channel.open_reader() {
            Ok(reader) => {
                self.reader = Some(reader);
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Consume one chunk, replaying every line it completes.
    /// Recoverable problems are pushed onto `issues`.
    pub(crate) fn step(
        &mut self,
        index: &mut Index,
        issues: &mut Vec<DriftError>,
    ) -> Result<LoadStep, ChannelError> {
        let next = match self.reader.as_mut() {
            Some(reader) => reader.next_chunk(),
            None => return Ok(LoadStep::Finished),
        };

        match next {
            Ok(Some(chunk)) => {
                self.stats.bytes_read += chunk.len() as u64;
                for line in self.lines.push(&chunk) {
                    self.replay_line(&line, index, issues);
                }
                Ok(LoadStep::More)
            }
            Ok(None) => {
                if let Some(tail) = self.lines.finish() {
                    self.replay_line(&tail, index, issues);
                }
                self.release();
                Ok(LoadStep::Finished)
            }
            Err(e) => {
                self.release();
                Err(e)
            }
        }
    }

    fn replay_line(&mut self, line: &[u8], index: &mut Index, issues: &mut Vec<DriftError>) {
        self.line_no += 1;

        if line.iter().all(u8::is_ascii_whitespace) {
            self.stats.empty_records += 1;
            issues.push(DriftError::EmptyRecord { line: self.line_no });
            return;
        }

        let record = match Record::decode(line) {
            Ok(record) => record,
            Err(e) => {
                tracing::trace!("Line {} does not parse: {}", self.line_no, e);
                self.stats.corrupted_records += 1;
                issues.push(DriftError::CorruptedRecord {
                    line: self.line_no,
                    content: String::from_utf8_lossy(line).into_owned(),
                });
                return;
            }
        };

        self.stats.records_applied += 1;
        if self.shadowed.contains(&record.key) {
            return;
        }
        index.apply(&record.key, record.val);
    }

    /// Protect `key` from being overwritten by the rest of the replay
    pub(crate) fn shadow(&mut self, key: &str) {
        self.shadowed.insert(key.to_string());
    }

    /// Release the read side if it is still open
    pub(crate) fn abort(&mut self) -> bool {
        let aborted = match self.reader.take() {
            Some(mut reader) => {
                reader.abort();
                true
            }
            None => false,
        };
        self.release();
        aborted
    }

    /// Drop everything only the pass itself needs
    fn release(&mut self) {
        self.reader = None;
        self.shadowed = HashSet::new();
    }

    pub(crate) fn stats(&self) -> LoadStats {
        self.stats
    }
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;

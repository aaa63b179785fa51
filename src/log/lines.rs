//! Line splitter
//!
//! Turns a lazily produced sequence of byte chunks into candidate record
//! lines. Chunk boundaries need not line up with record boundaries; a line
//! split across chunks is reassembled before it is handed out.

use bytes::{Bytes, BytesMut};

use super::RECORD_TERMINATOR;

/// Incremental splitter over record-terminated bytes
#[derive(Debug, Default)]
pub struct LineSplitter {
    /// Bytes received but not yet terminated
    pending: BytesMut,

    /// Prefix of `pending` already known to contain no terminator
    scanned: usize,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line it completes (terminators stripped)
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(offset) = self.pending[self.scanned..]
            .iter()
            .position(|&b| b == RECORD_TERMINATOR)
        {
            let end = self.scanned + offset;
            let mut line = self.pending.split_to(end + 1);
            line.truncate(end);
            lines.push(line.freeze());
            self.scanned = 0;
        }
        self.scanned = self.pending.len();

        lines
    }

    /// End of input: return the unterminated tail, if there is one
    pub fn finish(&mut self) -> Option<Bytes> {
        self.scanned = 0;
        if self.pending.is_empty() {
            return None;
        }
        Some(self.pending.split().freeze())
    }

    /// Bytes held waiting for a terminator
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}

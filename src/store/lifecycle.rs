//! Store shutdown
//!
//! The channel is only released once the write queue is drained. A close
//! requested earlier is parked and completed by the drain that follows the
//! last acknowledgement.

use super::{Event, ReadyState, Store, WriterSlot};

impl Store {
    /// Close the store, releasing the log channel.
    ///
    /// With writes pending or in flight this only records the request and
    /// returns; the close completes on a later turn, right after the
    /// store drains. `Event::Closed` fires once both sides are released.
    ///
    /// Writes after close are not honoured.
    pub fn close(&mut self) {
        if matches!(self.state, ReadyState::Closing | ReadyState::Closed) {
            return;
        }

        if !self.queue.is_drained() {
            tracing::debug!(
                "Close deferred: {} keys pending, {} appends in flight",
                self.queue.pending_keys(),
                self.queue.in_flight()
            );
            self.close_on_drain = true;
            return;
        }

        self.release();
    }

    fn release(&mut self) {
        self.state = ReadyState::Closing;

        // Step 1: Read side (only still open if closed mid-load)
        if self.loader.abort() {
            tracing::debug!("Aborted log reader");
            self.emit(Event::ReadClosed);
        }

        // Step 2: Append side, flushed before it is dropped
        if let WriterSlot::Open(mut writer) = std::mem::replace(&mut self.writer, WriterSlot::Released) {
            if let Err(e) = writer.end() {
                tracing::warn!("Failed to end log writer cleanly: {}", e);
                self.emit(Event::Error(e.into()));
            }
            writer.destroy();
        }

        self.state = ReadyState::Closed;
        tracing::debug!("Store closed");
        self.emit(Event::Closed);
    }
}

//! Index Module
//!
//! The in-memory key-value map the store serves reads from.
//!
//! ## Responsibilities
//! - Point lookups and writes in memory
//! - Iteration in first-insertion order (a removed key that is set again
//!   moves to the end)
//! - Early-exit traversal via [`Flow`]
//!
//! ## Data Structure Choice
//! A `HashMap` for lookups plus a `BTreeMap` keyed by insertion sequence for
//! ordering. Both are owned by the store, which is single-writer, so no
//! locking is needed here.

mod table;

pub use table::{Index, IndexIter};

/// Result of a traversal visitor: keep going or stop right here
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

impl Flow {
    pub fn is_stop(self) -> bool {
        self == Flow::Stop
    }
}

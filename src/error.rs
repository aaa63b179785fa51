//! Error types for driftkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::log::ChannelError;

/// Result type alias using DriftError
pub type Result<T> = std::result::Result<T, DriftError>;

/// Unified error type for driftkv operations
#[derive(Debug, Error)]
pub enum DriftError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    // -------------------------------------------------------------------------
    // Load Errors
    // -------------------------------------------------------------------------
    /// The log exists but could not be opened or read. The store never
    /// becomes ready.
    #[error("Fatal load error: {0}")]
    FatalLoad(ChannelError),

    /// A blank line was found while replaying the log. Recoverable.
    #[error("Empty record at line {line}: empty lines never appear in a healthy database")]
    EmptyRecord { line: u64 },

    /// A line that is not a `{"key": .., "val": ..}` object. Recoverable.
    #[error("Could not load corrupted record at line {line}: {content}")]
    CorruptedRecord { line: u64, content: String },

    // -------------------------------------------------------------------------
    // Write Errors
    // -------------------------------------------------------------------------
    #[error("Write failed for key {key:?}: {source}")]
    WriteFailure { key: String, source: ChannelError },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Store is closed")]
    Closed,

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// Nothing outstanding could ever satisfy the wait.
    #[error("Stalled waiting for {0}: no outstanding work")]
    Stalled(&'static str),
}

impl DriftError {
    /// Whether the load pass can continue after this error
    pub fn is_recoverable_load_error(&self) -> bool {
        matches!(self, DriftError::EmptyRecord { .. } | DriftError::CorruptedRecord { .. })
    }
}

impl From<serde_json::Error> for DriftError {
    fn from(err: serde_json::Error) -> Self {
        DriftError::Serialization(err.to_string())
    }
}

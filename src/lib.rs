//! # driftkv
//!
//! An embedded, append-only log-backed key-value store with:
//! - Write-through in-memory index with asynchronous, coalesced appends
//! - Crash-tolerant replay that skips blank and corrupted records
//! - Backpressure-aware write path
//! - Graceful shutdown that waits for every outstanding append
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Store                                │
//! │         set / get / for_each / close  +  event bus           │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │                                  │
//!            ▼                                  ▼
//!   ┌─────────────────┐                ┌─────────────────┐
//!   │      Index      │◄── replay ─────│     Loader      │
//!   │ (insert order)  │                └────────▲────────┘
//!   └────────┬────────┘                         │ chunks
//!            │ snapshot at flush                │
//!            ▼                                  │
//!   ┌─────────────────┐    appends     ┌────────┴────────┐
//!   │   WriteQueue    │───────────────►│   LogChannel    │
//!   │ (per-key slots) │◄── acks/drain ─│ (file / memory) │
//!   └─────────────────┘   via reactor  └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod log;
pub mod index;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{DriftError, Result};
pub use config::{Config, SyncStrategy};
pub use index::Flow;
pub use store::{Event, EventKind, LoadStats, ReadyState, Store};

/// Stored values
pub use serde_json::Value;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of driftkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Configuration for driftkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{DriftError, Result};

/// Main configuration for a driftkv store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Log Configuration
    // -------------------------------------------------------------------------
    /// Path of the append-only log file.
    /// `None` keeps the store purely in memory.
    pub log_path: Option<PathBuf>,

    /// Sync strategy: how often the file writer fsyncs
    pub sync_strategy: SyncStrategy,

    /// Bytes the file writer may buffer before `write` reports backpressure
    pub high_water_mark: usize,

    /// Size of each chunk read from the log during load
    pub read_chunk_size: usize,

    // -------------------------------------------------------------------------
    // Write Path Configuration
    // -------------------------------------------------------------------------
    /// How many times a failed append is re-issued before it is reported
    pub max_write_retries: u32,

    // -------------------------------------------------------------------------
    // Reactor Configuration
    // -------------------------------------------------------------------------
    /// Upper bound for the blocking `wait_*` helpers (None = wait forever)
    pub wait_timeout: Option<Duration>,
}

/// Log sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every record (safest, slowest)
    EveryWrite,

    /// fsync after N records (balanced durability/performance)
    EveryNEntries { count: usize },

    /// fsync only when the append side is ended
    OnEnd,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_path: None,
            sync_strategy: SyncStrategy::EveryNEntries { count: 100 },
            high_water_mark: 16 * 1024,  // 16 KB
            read_chunk_size: 64 * 1024,  // 64 KB
            max_write_retries: 0,
            wait_timeout: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the store cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.read_chunk_size == 0 {
            return Err(DriftError::Config("read_chunk_size must be > 0".into()));
        }
        if self.high_water_mark == 0 {
            return Err(DriftError::Config("high_water_mark must be > 0".into()));
        }
        if let SyncStrategy::EveryNEntries { count: 0 } = self.sync_strategy {
            return Err(DriftError::Config("EveryNEntries count must be > 0".into()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the log file path
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_path = Some(path.into());
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the writer high-water mark (in bytes)
    pub fn high_water_mark(mut self, bytes: usize) -> Self {
        self.config.high_water_mark = bytes;
        self
    }

    /// Set the load chunk size (in bytes)
    pub fn read_chunk_size(mut self, bytes: usize) -> Self {
        self.config.read_chunk_size = bytes;
        self
    }

    /// Set how many times a failed append is retried
    pub fn max_write_retries(mut self, retries: u32) -> Self {
        self.config.max_write_retries = retries;
        self
    }

    /// Set the timeout used by the blocking wait helpers
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.wait_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

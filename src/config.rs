//! Configuration for AtlasMVCC
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AtlasError, Result};

/// Main configuration for an AtlasMVCC instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     └── store.snap       (key-value snapshot)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Sweep Configuration
    // -------------------------------------------------------------------------
    /// Maximum number of rows inspected per sweep batch
    pub sweep_batch_size: usize,

    /// Pause between two batches of the same table (milliseconds)
    pub sweep_pause_ms: u64,

    /// Run storage-level compaction after a table sweep deleted something
    pub compact_after_sweep: bool,

    /// Number of tables swept in parallel
    pub sweep_threads: usize,

    // -------------------------------------------------------------------------
    // Lock Configuration
    // -------------------------------------------------------------------------
    /// Lock client id used for per-table sweep locks (None = anonymous)
    pub lock_client_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./atlasmvcc_data"),
            sweep_batch_size: 2000,
            sweep_pause_ms: 5000,
            compact_after_sweep: true,
            sweep_threads: 1,
            lock_client_id: None,
        }
    }
}

impl Config {
    const SNAPSHOT_FILENAME: &'static str = "store.snap";

    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Path of the key-value snapshot inside the data directory
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(Self::SNAPSHOT_FILENAME)
    }

    /// Pause between batches as a Duration
    pub fn sweep_pause(&self) -> Duration {
        Duration::from_millis(self.sweep_pause_ms)
    }

    /// Reject settings the sweeper cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sweep_batch_size == 0 {
            return Err(AtlasError::Config("sweep_batch_size must be positive".to_string()));
        }
        if self.sweep_threads == 0 {
            return Err(AtlasError::Config("sweep_threads must be positive".to_string()));
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
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the number of rows per sweep batch
    pub fn sweep_batch_size(mut self, rows: usize) -> Self {
        self.config.sweep_batch_size = rows;
        self
    }

    /// Set the pause between batches (in milliseconds)
    pub fn sweep_pause_ms(mut self, ms: u64) -> Self {
        self.config.sweep_pause_ms = ms;
        self
    }

    /// Enable or disable compaction after a sweep
    pub fn compact_after_sweep(mut self, enabled: bool) -> Self {
        self.config.compact_after_sweep = enabled;
        self
    }

    /// Set the number of tables swept concurrently
    pub fn sweep_threads(mut self, threads: usize) -> Self {
        self.config.sweep_threads = threads;
        self
    }

    /// Set the lock client id used by the sweeper
    pub fn lock_client_id(mut self, id: impl Into<String>) -> Self {
        self.config.lock_client_id = Some(id.into());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

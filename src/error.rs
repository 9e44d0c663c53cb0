//! Error types for AtlasMVCC
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using AtlasError
pub type Result<T> = std::result::Result<T, AtlasError>;

/// Unified error type for AtlasMVCC operations
#[derive(Debug, Error)]
pub enum AtlasError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Version already exists in table {table} at timestamp {timestamp}")]
    KeyAlreadyExists { table: String, timestamp: u64 },

    #[error("Corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Sweep Errors
    // -------------------------------------------------------------------------
    #[error("No sweep strategy known for table {0}")]
    UnknownTable(String),

    #[error("Table {0} is hidden and cannot be swept")]
    HiddenTable(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid sweep cursor: {0}")]
    InvalidCursor(String),

    #[error("Follower {follower} failed: {reason}")]
    Follower { follower: String, reason: String },

    #[error(
        "Sweep of {table} failed at {cursor} after examining {cells_examined} cells \
         and deleting {cells_deleted}: {source}"
    )]
    SweepFailed {
        table: String,
        cursor: String,
        cells_examined: u64,
        cells_deleted: u64,
        #[source]
        source: Box<AtlasError>,
    },

    // -------------------------------------------------------------------------
    // Partition Errors
    // -------------------------------------------------------------------------
    #[error("Partition map version too old: client has {client}, endpoint has {server}")]
    VersionTooOld { client: i64, server: i64 },

    // -------------------------------------------------------------------------
    // Construction Errors
    // -------------------------------------------------------------------------
    #[error("Invalid lock client id: {0}")]
    InvalidLockClient(String),

    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    // -------------------------------------------------------------------------
    // Lock Errors
    // -------------------------------------------------------------------------
    #[error("Lock {lock} is held by {holder}")]
    LockUnavailable { lock: String, holder: String },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AtlasError {
    /// True when the caller must refresh its partition map and retry
    pub fn is_version_too_old(&self) -> bool {
        matches!(self, AtlasError::VersionTooOld { .. })
    }
}

impl From<bincode::Error> for AtlasError {
    fn from(err: bincode::Error) -> Self {
        AtlasError::Serialization(err.to_string())
    }
}

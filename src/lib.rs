//! # AtlasMVCC
//!
//! The multi-version storage layer of a distributed transactional store:
//! - Cells keep every committed version, tagged with its commit timestamp
//! - Sweep deletes versions no live or future transaction can observe
//! - A version gate keeps callers with a stale partition map away from
//!   partitioned endpoints
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Sweep Orchestrator                          │
//! │        (per-table lock, pause, record, compact)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  Sweep Task Runner                           │
//! │   strategy registry · timestamp bounds · cleanup followers   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌──────────────┐
//!   │  Progress   │          │ Version Gate │◄── RequestContext
//!   │   Ledger    │          │  (endpoint)  │
//!   └──────┬──────┘          └──────┬───────┘
//!          │                        │
//!          ▼                        ▼
//!   ┌─────────────────────────────────────────┐
//!   │          Key-Value Service               │
//!   │     (all versions of every cell)         │
//!   └─────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod kvs;
pub mod schema;
pub mod timestamp;
pub mod sweep;
pub mod partition;
pub mod lock;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{AtlasError, Result};
pub use config::Config;
pub use kvs::{Cell, InMemoryKeyValueService, KeyValueService, Timestamp};
pub use schema::SweepStrategy;
pub use sweep::{SweepCursor, SweepResults, SweepTaskRunner};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of AtlasMVCC
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Schema Module
//!
//! Table metadata and naming rules shared by the sweeper and the substrate.
//!
//! ## Responsibilities
//! - Per-table sweep strategy carried in table metadata
//! - Hidden (internal) tables that are never swept
//! - Namespace validation and fully-qualified table names

mod metadata;
mod namespace;

pub use metadata::{is_hidden_table, SweepStrategy, TableMetadata, HIDDEN_TABLE_PREFIX, SWEEP_PROGRESS_TABLE};
pub use namespace::{NamePattern, Namespace};

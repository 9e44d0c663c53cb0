//! Table metadata
//!
//! The only piece of metadata the sweeper cares about is the strategy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AtlasError;

/// Tables whose name starts with this prefix are internal
pub const HIDDEN_TABLE_PREFIX: &str = "_";

/// Hidden table holding per-table sweep progress
pub const SWEEP_PROGRESS_TABLE: &str = "_sweep_progress";

/// Returns true for internal tables that sweep must never touch
pub fn is_hidden_table(table: &str) -> bool {
    table.starts_with(HIDDEN_TABLE_PREFIX)
}

/// How aggressively old versions of a table may be removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SweepStrategy {
    /// Keep the newest version below the bound, even a tombstone
    Conservative,

    /// Like Conservative, but a tombstone below the bound is purged too
    Thorough,

    /// Never sweep this table
    Nothing,
}

impl fmt::Display for SweepStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SweepStrategy::Conservative => "CONSERVATIVE",
            SweepStrategy::Thorough => "THOROUGH",
            SweepStrategy::Nothing => "NOTHING",
        };
        f.write_str(name)
    }
}

impl FromStr for SweepStrategy {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CONSERVATIVE" => Ok(SweepStrategy::Conservative),
            "THOROUGH" => Ok(SweepStrategy::Thorough),
            "NOTHING" => Ok(SweepStrategy::Nothing),
            other => Err(AtlasError::InvalidArgument(format!("unknown sweep strategy '{}'", other))),
        }
    }
}

/// Metadata persisted alongside each table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub sweep_strategy: SweepStrategy,
}

impl TableMetadata {
    pub fn new(sweep_strategy: SweepStrategy) -> Self {
        Self { sweep_strategy }
    }
}

impl Default for TableMetadata {
    fn default() -> Self {
        Self::new(SweepStrategy::Conservative)
    }
}

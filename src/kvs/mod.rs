//! Key-Value Service Module
//!
//! The multi-version substrate the sweeper and the version gate sit on.
//!
//! ## Responsibilities
//! - Store every committed version of a cell, keyed by commit timestamp
//! - Ordered all-version range scans paginated by start row
//! - Batched deletion of (cell, timestamp) pairs
//! - Table metadata (sweep strategy)
//!
//! ## Data Layout
//! ```text
//! table ──► (row, column) ──► { timestamp → value }
//!                                 │
//!                                 └─ empty value = tombstone
//! ```

mod memory;
mod snapshot;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schema::TableMetadata;

pub use memory::InMemoryKeyValueService;

/// Commit timestamp of a version
pub type Timestamp = u64;

/// The value written to mark a cell as deleted
pub const TOMBSTONE: &[u8] = &[];

/// Returns true if `value` is the deleted marker
#[inline]
pub fn is_tombstone(value: &[u8]) -> bool {
    value.is_empty()
}

/// A (row, column) location inside a table
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub row: Bytes,
    pub column: Bytes,
}

impl Cell {
    pub fn new(row: impl Into<Bytes>, column: impl Into<Bytes>) -> Self {
        Self {
            row: row.into(),
            column: column.into(),
        }
    }

    /// Convenience constructor for UTF-8 names (tests, CLI)
    pub fn from_strs(row: &str, column: &str) -> Self {
        Self::new(Bytes::copy_from_slice(row.as_bytes()), Bytes::copy_from_slice(column.as_bytes()))
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", hex::encode(&self.row), hex::encode(&self.column))
    }
}

/// One historical version of a cell, as returned by an all-version scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellVersion {
    pub cell: Cell,
    pub timestamp: Timestamp,
    pub value: Bytes,
}

impl CellVersion {
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        is_tombstone(&self.value)
    }
}

/// The storage capability of a node
///
/// All methods take `&self`; implementations handle their own locking.
pub trait KeyValueService: Send + Sync {
    // -------------------------------------------------------------------------
    // Tables
    // -------------------------------------------------------------------------

    /// Create a table (no-op if it already exists)
    fn create_table(&self, table: &str) -> Result<()>;

    /// Drop a table and all of its versions
    fn drop_table(&self, table: &str) -> Result<()>;

    /// Names of all tables, hidden ones included
    fn get_all_table_names(&self) -> Result<BTreeSet<String>>;

    fn put_metadata_for_table(&self, table: &str, metadata: TableMetadata) -> Result<()>;

    /// Metadata for `table`, `None` if never set
    fn get_metadata_for_table(&self, table: &str) -> Result<Option<TableMetadata>>;

    // -------------------------------------------------------------------------
    // Reads and writes
    // -------------------------------------------------------------------------

    /// Write `values` at `timestamp`. Fails if any cell already has a version
    /// at exactly that timestamp.
    fn put(&self, table: &str, values: &BTreeMap<Cell, Bytes>, timestamp: Timestamp) -> Result<()>;

    /// Latest version strictly older than `read_timestamp` for each cell
    fn get(
        &self,
        table: &str,
        cells: &[Cell],
        read_timestamp: Timestamp,
    ) -> Result<BTreeMap<Cell, (Timestamp, Bytes)>>;

    /// All versions of at most `row_limit` rows starting at `start_row`,
    /// ordered by (row, column, timestamp)
    fn scan_all_versions(&self, table: &str, start_row: &[u8], row_limit: usize) -> Result<Vec<CellVersion>>;

    /// Delete exactly the given (cell, timestamp) versions
    fn multi_delete(&self, table: &str, versions: &[(Cell, Timestamp)]) -> Result<()>;

    /// Ask the store to reclaim space of deleted versions
    fn compact_internally(&self, table: &str) -> Result<()>;
}

impl<T: KeyValueService + ?Sized> KeyValueService for Arc<T> {
    fn create_table(&self, table: &str) -> Result<()> {
        (**self).create_table(table)
    }

    fn drop_table(&self, table: &str) -> Result<()> {
        (**self).drop_table(table)
    }

    fn get_all_table_names(&self) -> Result<BTreeSet<String>> {
        (**self).get_all_table_names()
    }

    fn put_metadata_for_table(&self, table: &str, metadata: TableMetadata) -> Result<()> {
        (**self).put_metadata_for_table(table, metadata)
    }

    fn get_metadata_for_table(&self, table: &str) -> Result<Option<TableMetadata>> {
        (**self).get_metadata_for_table(table)
    }

    fn put(&self, table: &str, values: &BTreeMap<Cell, Bytes>, timestamp: Timestamp) -> Result<()> {
        (**self).put(table, values, timestamp)
    }

    fn get(
        &self,
        table: &str,
        cells: &[Cell],
        read_timestamp: Timestamp,
    ) -> Result<BTreeMap<Cell, (Timestamp, Bytes)>> {
        (**self).get(table, cells, read_timestamp)
    }

    fn scan_all_versions(&self, table: &str, start_row: &[u8], row_limit: usize) -> Result<Vec<CellVersion>> {
        (**self).scan_all_versions(table, start_row, row_limit)
    }

    fn multi_delete(&self, table: &str, versions: &[(Cell, Timestamp)]) -> Result<()> {
        (**self).multi_delete(table, versions)
    }

    fn compact_internally(&self, table: &str) -> Result<()> {
        (**self).compact_internally(table)
    }
}

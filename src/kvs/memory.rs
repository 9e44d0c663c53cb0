//! In-memory key-value service
//!
//! BTreeMap-based multi-version store with a single RwLock over all tables.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, Result};
use crate::schema::TableMetadata;

use super::{Cell, CellVersion, KeyValueService, Timestamp};

/// All state of one table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct TableData {
    pub(super) metadata: Option<TableMetadata>,

    /// cell → (timestamp → value), both levels ordered
    pub(super) cells: BTreeMap<Cell, BTreeMap<Timestamp, Bytes>>,

    /// Number of compactions requested (not persisted)
    #[serde(skip)]
    pub(super) compactions: u64,
}

/// Multi-version key-value store held entirely in memory
///
/// ## Concurrency:
/// - `tables`: RwLock (concurrent scans/gets, exclusive put/delete)
/// - `latest_timestamp`: atomic high-water mark of written timestamps
pub struct InMemoryKeyValueService {
    pub(super) tables: RwLock<BTreeMap<String, TableData>>,
    pub(super) latest_timestamp: AtomicU64,
}

impl InMemoryKeyValueService {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(BTreeMap::new()),
            latest_timestamp: AtomicU64::new(0),
        }
    }

    /// Highest timestamp ever written (0 for a fresh store)
    pub fn latest_timestamp(&self) -> Timestamp {
        self.latest_timestamp.load(Ordering::SeqCst)
    }

    /// How many times `compact_internally` ran for `table`
    pub fn compaction_count(&self, table: &str) -> u64 {
        self.tables.read().get(table).map_or(0, |t| t.compactions)
    }

    /// Every timestamp stored for `cell`, oldest first
    pub fn all_timestamps(&self, table: &str, cell: &Cell) -> Vec<Timestamp> {
        self.tables
            .read()
            .get(table)
            .and_then(|t| t.cells.get(cell))
            .map(|versions| versions.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Total number of stored versions in `table`
    pub fn version_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .get(table)
            .map_or(0, |t| t.cells.values().map(BTreeMap::len).sum())
    }

    fn missing(table: &str) -> AtlasError {
        AtlasError::TableNotFound(table.to_string())
    }
}

impl Default for InMemoryKeyValueService {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueService for InMemoryKeyValueService {
    fn create_table(&self, table: &str) -> Result<()> {
        if table.is_empty() {
            return Err(AtlasError::InvalidArgument("table name cannot be empty".to_string()));
        }
        self.tables.write().entry(table.to_string()).or_default();
        Ok(())
    }

    fn drop_table(&self, table: &str) -> Result<()> {
        self.tables.write().remove(table);
        Ok(())
    }

    fn get_all_table_names(&self) -> Result<BTreeSet<String>> {
        Ok(self.tables.read().keys().cloned().collect())
    }

    fn put_metadata_for_table(&self, table: &str, metadata: TableMetadata) -> Result<()> {
        let mut tables = self.tables.write();
        let data = tables.get_mut(table).ok_or_else(|| Self::missing(table))?;
        data.metadata = Some(metadata);
        Ok(())
    }

    fn get_metadata_for_table(&self, table: &str) -> Result<Option<TableMetadata>> {
        let tables = self.tables.read();
        let data = tables.get(table).ok_or_else(|| Self::missing(table))?;
        Ok(data.metadata.clone())
    }

    fn put(&self, table: &str, values: &BTreeMap<Cell, Bytes>, timestamp: Timestamp) -> Result<()> {
        let mut tables = self.tables.write();
        let data = tables.get_mut(table).ok_or_else(|| Self::missing(table))?;

        // Check everything first so a rejected put writes nothing
        for cell in values.keys() {
            if data.cells.get(cell).map_or(false, |v| v.contains_key(&timestamp)) {
                return Err(AtlasError::KeyAlreadyExists {
                    table: table.to_string(),
                    timestamp,
                });
            }
        }

        for (cell, value) in values {
            data.cells
                .entry(cell.clone())
                .or_default()
                .insert(timestamp, value.clone());
        }

        self.latest_timestamp.fetch_max(timestamp, Ordering::SeqCst);
        Ok(())
    }

    fn get(
        &self,
        table: &str,
        cells: &[Cell],
        read_timestamp: Timestamp,
    ) -> Result<BTreeMap<Cell, (Timestamp, Bytes)>> {
        let tables = self.tables.read();
        let data = tables.get(table).ok_or_else(|| Self::missing(table))?;

        let mut result = BTreeMap::new();
        for cell in cells {
            let latest = data
                .cells
                .get(cell)
                .and_then(|versions| versions.range(..read_timestamp).next_back());
            if let Some((ts, value)) = latest {
                result.insert(cell.clone(), (*ts, value.clone()));
            }
        }
        Ok(result)
    }

    fn scan_all_versions(&self, table: &str, start_row: &[u8], row_limit: usize) -> Result<Vec<CellVersion>> {
        let tables = self.tables.read();
        let data = tables.get(table).ok_or_else(|| Self::missing(table))?;

        let start = Cell::new(Bytes::copy_from_slice(start_row), Bytes::new());
        let mut out = Vec::new();
        let mut rows_seen = 0usize;
        let mut current_row: Option<&Bytes> = None;

        for (cell, versions) in data.cells.range(start..) {
            if current_row != Some(&cell.row) {
                if rows_seen == row_limit {
                    break;
                }
                rows_seen += 1;
                current_row = Some(&cell.row);
            }
            for (ts, value) in versions {
                out.push(CellVersion {
                    cell: cell.clone(),
                    timestamp: *ts,
                    value: value.clone(),
                });
            }
        }

        Ok(out)
    }

    fn multi_delete(&self, table: &str, versions: &[(Cell, Timestamp)]) -> Result<()> {
        let mut tables = self.tables.write();
        let data = tables.get_mut(table).ok_or_else(|| Self::missing(table))?;

        for (cell, ts) in versions {
            // Deleting an absent version is fine: retried batches repeat deletes
            if let Some(history) = data.cells.get_mut(cell) {
                history.remove(ts);
                if history.is_empty() {
                    data.cells.remove(cell);
                }
            }
        }
        Ok(())
    }

    fn compact_internally(&self, table: &str) -> Result<()> {
        let mut tables = self.tables.write();
        let data = tables.get_mut(table).ok_or_else(|| Self::missing(table))?;
        data.compactions += 1;
        tracing::debug!("Compacted table {}", table);
        Ok(())
    }
}

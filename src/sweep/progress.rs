//! Sweep Progress Ledger
//!
//! Per-table sweep statistics, stored in the hidden `_sweep_progress` table of
//! the same key-value service. One row per swept table, one bincode-encoded
//! record per row. Each write replaces the previous version.
//!
//! Writers for the same table must be serialized by the caller; the ledger
//! does not merge concurrent updates.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::kvs::{Cell, KeyValueService, Timestamp};
use crate::schema::SWEEP_PROGRESS_TABLE;

const PROGRESS_COLUMN: &[u8] = b"p";

/// Current wall-clock time in unix milliseconds
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Progress record of one table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepProgress {
    /// Writes since the last completed sweep
    pub write_count: u64,

    /// Unique cells examined by the last completed sweep
    pub cells_examined: u64,

    /// Versions deleted by the last completed sweep
    pub cells_deleted: u64,

    /// Unix millis of the last completed sweep, `None` if never swept
    pub last_sweep_time_ms: Option<u64>,
}

/// Reads and writes sweep progress records
pub struct SweepProgressLedger {
    kvs: Arc<dyn KeyValueService>,
}

impl SweepProgressLedger {
    /// Open the ledger, creating its hidden table if needed
    pub fn new(kvs: Arc<dyn KeyValueService>) -> Result<Self> {
        kvs.create_table(SWEEP_PROGRESS_TABLE)?;
        Ok(Self { kvs })
    }

    /// Store the outcome of a completed sweep of `table`
    ///
    /// Overwrites every field; the write count starts over from zero.
    pub fn record(&self, table: &str, cells_deleted: u64, cells_examined: u64, timestamp_ms: u64) -> Result<()> {
        let progress = SweepProgress {
            write_count: 0,
            cells_examined,
            cells_deleted,
            last_sweep_time_ms: Some(timestamp_ms),
        };
        let previous = self.read_latest(table)?;
        self.write(table, &progress, previous.map(|(ts, _)| ts))?;

        tracing::info!(
            "Recorded sweep of {}: examined {} unique cells, deleted {} cells",
            table,
            cells_examined,
            cells_deleted
        );
        Ok(())
    }

    /// Add `writes` to the write count of `table`
    pub fn record_writes(&self, table: &str, writes: u64) -> Result<()> {
        let previous = self.read_latest(table)?;
        let mut progress = previous.as_ref().map(|(_, p)| *p).unwrap_or_default();
        progress.write_count = progress.write_count.saturating_add(writes);
        self.write(table, &progress, previous.map(|(ts, _)| ts))
    }

    /// Progress record of `table`, `None` if nothing was ever recorded
    pub fn get(&self, table: &str) -> Result<Option<SweepProgress>> {
        Ok(self.read_latest(table)?.map(|(_, progress)| progress))
    }

    /// All records, keyed by table name
    pub fn all(&self) -> Result<BTreeMap<String, SweepProgress>> {
        let versions = self.kvs.scan_all_versions(SWEEP_PROGRESS_TABLE, &[], usize::MAX)?;

        // Versions come oldest first, so the last one per row wins
        let mut records = BTreeMap::new();
        for version in versions {
            let table = String::from_utf8_lossy(&version.cell.row).into_owned();
            records.insert(table, bincode::deserialize(&version.value)?);
        }
        Ok(records)
    }

    /// Pick the candidate most in need of a sweep
    ///
    /// Never-swept tables come first, then the most written-to, then the one
    /// swept longest ago.
    pub fn next_table_to_sweep<'a>(&self, candidates: &'a [String]) -> Result<Option<&'a str>> {
        let records = self.all()?;
        let best = candidates
            .iter()
            .min_by_key(|table| Self::priority(records.get(table.as_str())));
        Ok(best.map(String::as_str))
    }

    /// Reorder `tables` most-in-need first, by the same rule as
    /// `next_table_to_sweep`. Ties keep their given order.
    pub fn prioritize(&self, mut tables: Vec<String>) -> Result<Vec<String>> {
        let records = self.all()?;
        tables.sort_by_key(|table| Self::priority(records.get(table.as_str())));
        Ok(tables)
    }

    fn priority(progress: Option<&SweepProgress>) -> (bool, Reverse<u64>, Option<u64>) {
        let progress = progress.copied().unwrap_or_default();
        (
            progress.last_sweep_time_ms.is_some(),
            Reverse(progress.write_count),
            progress.last_sweep_time_ms,
        )
    }

    fn cell(table: &str) -> Cell {
        Cell::new(Bytes::copy_from_slice(table.as_bytes()), Bytes::from_static(PROGRESS_COLUMN))
    }

    fn read_latest(&self, table: &str) -> Result<Option<(Timestamp, SweepProgress)>> {
        let cell = Self::cell(table);
        let found = self.kvs.get(SWEEP_PROGRESS_TABLE, std::slice::from_ref(&cell), Timestamp::MAX)?;
        match found.get(&cell) {
            Some((ts, bytes)) => Ok(Some((*ts, bincode::deserialize(bytes)?))),
            None => Ok(None),
        }
    }

    /// Write a new version and drop the one it replaces
    fn write(&self, table: &str, progress: &SweepProgress, previous_ts: Option<Timestamp>) -> Result<()> {
        let cell = Self::cell(table);
        let ts = previous_ts.map_or(1, |ts| ts + 1);

        let mut values = BTreeMap::new();
        values.insert(cell.clone(), Bytes::from(bincode::serialize(progress)?));
        self.kvs.put(SWEEP_PROGRESS_TABLE, &values, ts)?;

        if let Some(old) = previous_ts {
            self.kvs.multi_delete(SWEEP_PROGRESS_TABLE, &[(cell, old)])?;
        }
        Ok(())
    }
}

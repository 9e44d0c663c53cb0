//! Sweep Task Runner
//!
//! Sweeps one batch of one table per call.
//!
//! ## Batch Steps
//! 1. Resolve the table's strategy (unknown table fails the call)
//! 2. Read the sweep bound `min(unreadable, immutable)` fresh for this batch
//! 3. Scan all versions of at most `batch_size` rows from the cursor
//! 4. Per cell, select versions no reader at or above the bound can see
//! 5. Run followers, then issue one multi-delete for the whole batch
//! 6. Return counts and the cursor after the last scanned row
//!
//! ## Concurrency
//! No locking of its own. One batch per table at a time is the caller's job;
//! different tables can be swept from different threads.

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{AtlasError, Result};
use crate::kvs::{Cell, CellVersion, KeyValueService, Timestamp};
use crate::schema::{is_hidden_table, SweepStrategy};
use crate::timestamp::TimestampBounds;

use super::{Follower, SweepCursor, SweepStrategyManager};

/// Outcome of one sweep batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepResults {
    /// Unique cells inspected
    pub cells_examined: u64,

    /// (cell, timestamp) versions deleted
    pub cells_deleted: u64,

    /// Where the next batch starts (`Finished` at end of table)
    pub next_start_row: SweepCursor,
}

impl SweepResults {
    /// Nothing examined, nothing deleted, nothing left
    pub fn finished() -> Self {
        Self {
            cells_examined: 0,
            cells_deleted: 0,
            next_start_row: SweepCursor::Finished,
        }
    }
}

/// Select the timestamps of one cell that may be deleted
///
/// `versions` holds `(timestamp, is_tombstone)` for every version of the cell.
/// Only versions strictly older than `sweep_ts` are candidates. The newest
/// candidate is what a reader at `sweep_ts` sees, so it is kept, unless the
/// strategy is `Thorough` and it is a tombstone. Returned oldest first.
pub fn timestamps_to_sweep(
    versions: &[(Timestamp, bool)],
    sweep_ts: Timestamp,
    strategy: SweepStrategy,
) -> Vec<Timestamp> {
    if strategy == SweepStrategy::Nothing {
        return Vec::new();
    }

    let mut candidates: Vec<(Timestamp, bool)> = versions
        .iter()
        .copied()
        .filter(|(ts, _)| *ts < sweep_ts)
        .collect();
    candidates.sort_unstable_by_key(|(ts, _)| *ts);

    let Some((newest_ts, newest_is_tombstone)) = candidates.pop() else {
        return Vec::new();
    };

    let mut doomed: Vec<Timestamp> = candidates.into_iter().map(|(ts, _)| ts).collect();
    if strategy == SweepStrategy::Thorough && newest_is_tombstone {
        doomed.push(newest_ts);
    }
    doomed
}

/// Runs single sweep batches against a key-value service
pub struct SweepTaskRunner {
    kvs: Arc<dyn KeyValueService>,
    timestamps: Arc<dyn TimestampBounds>,
    strategies: Arc<SweepStrategyManager>,
    followers: Vec<Arc<dyn Follower>>,
}

impl SweepTaskRunner {
    pub fn new(
        kvs: Arc<dyn KeyValueService>,
        timestamps: Arc<dyn TimestampBounds>,
        strategies: Arc<SweepStrategyManager>,
        followers: Vec<Arc<dyn Follower>>,
    ) -> Self {
        Self {
            kvs,
            timestamps,
            strategies,
            followers,
        }
    }

    /// The strategy registry used by this runner
    pub fn strategies(&self) -> &SweepStrategyManager {
        &self.strategies
    }

    /// Sweep at most `batch_size` rows of `table` starting at `start`
    pub fn run(&self, table: &str, batch_size: usize, start: &SweepCursor) -> Result<SweepResults> {
        if batch_size == 0 {
            return Err(AtlasError::InvalidArgument("sweep batch size must be positive".to_string()));
        }
        if is_hidden_table(table) {
            return Err(AtlasError::HiddenTable(table.to_string()));
        }

        let strategy = self.strategies.strategy_for(table)?;
        if strategy == SweepStrategy::Nothing {
            tracing::debug!("Table {} has sweep strategy NOTHING, skipping", table);
            return Ok(SweepResults::finished());
        }

        let Some(start_row) = start.start_row() else {
            return Ok(SweepResults::finished());
        };

        // Taken before the scan: a bound read later could be newer than what
        // was safe when the versions were observed
        let sweep_ts = self.timestamps.sweep_timestamp();

        let versions = self.kvs.scan_all_versions(table, start_row, batch_size)?;
        if versions.is_empty() {
            return Ok(SweepResults::finished());
        }

        let batch = CellBatch::group(&versions);
        let mut to_delete: Vec<(Cell, Timestamp)> = Vec::new();
        let mut touched: BTreeSet<Cell> = BTreeSet::new();

        for (cell, history) in &batch.cells {
            let doomed = timestamps_to_sweep(history, sweep_ts, strategy);
            if !doomed.is_empty() {
                touched.insert(cell.clone());
                to_delete.extend(doomed.into_iter().map(|ts| (cell.clone(), ts)));
            }
        }

        if !to_delete.is_empty() {
            for follower in &self.followers {
                follower.run(table, &touched)?;
            }
            self.kvs.multi_delete(table, &to_delete)?;
        }

        let next_start_row = if batch.rows < batch_size {
            SweepCursor::Finished
        } else {
            SweepCursor::after(&batch.last_row)
        };

        let results = SweepResults {
            cells_examined: batch.cells.len() as u64,
            cells_deleted: to_delete.len() as u64,
            next_start_row,
        };

        tracing::debug!(
            table = table,
            strategy = %strategy,
            sweep_ts = sweep_ts,
            rows = batch.rows,
            cells_examined = results.cells_examined,
            cells_deleted = results.cells_deleted,
            next = %results.next_start_row,
            "Swept batch"
        );

        Ok(results)
    }
}

/// Versions of one scan, grouped per cell
struct CellBatch {
    cells: Vec<(Cell, Vec<(Timestamp, bool)>)>,
    rows: usize,
    last_row: Bytes,
}

impl CellBatch {
    /// Relies on the scan being ordered by (row, column, timestamp)
    fn group(versions: &[CellVersion]) -> Self {
        let mut cells: Vec<(Cell, Vec<(Timestamp, bool)>)> = Vec::new();
        let mut rows = 0usize;
        let mut last_row = Bytes::new();

        for version in versions {
            if rows == 0 || version.cell.row != last_row {
                rows += 1;
                last_row = version.cell.row.clone();
            }
            match cells.last_mut() {
                Some((cell, history)) if *cell == version.cell => {
                    history.push((version.timestamp, version.is_tombstone()));
                }
                _ => cells.push((version.cell.clone(), vec![(version.timestamp, version.is_tombstone())])),
            }
        }

        Self { cells, rows, last_row }
    }
}

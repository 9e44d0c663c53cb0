//! Sweep orchestration
//!
//! Drives the task runner over whole tables: repeated batches with a pause in
//! between, one progress record per completed table, and a compaction when a
//! table lost versions.
//!
//! ## Concurrency
//! - Each table is swept under the lock `sweep/<table>`, taken with the
//!   orchestrator's lock client
//! - Different tables are handed to `sweep_threads` scoped worker threads
//! - Cancellation is checked between batches only; a cancelled table reports
//!   its resumable cursor and is not recorded

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel;
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{AtlasError, Result};
use crate::kvs::KeyValueService;
use crate::lock::{LockClient, LockService};
use crate::schema::{is_hidden_table, Namespace};

use super::progress::now_millis;
use super::{SweepCursor, SweepProgressLedger, SweepTaskRunner};

/// Which tables to sweep
#[derive(Debug, Clone)]
pub enum SweepTarget {
    /// One table, optionally resuming from a cursor
    Table { name: String, start: SweepCursor },

    /// Every table of a namespace, from the start, in ledger priority order
    Namespace(Namespace),

    /// Every non-hidden table, from the start, in ledger priority order
    All,
}

/// What happened to one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSweepSummary {
    pub table: String,
    pub cells_examined: u64,
    pub cells_deleted: u64,
    pub batches: u64,

    /// `Finished` unless the sweep was cancelled
    pub next_cursor: SweepCursor,

    /// Whether a compaction ran successfully afterwards
    pub compacted: bool,
}

impl TableSweepSummary {
    pub fn is_complete(&self) -> bool {
        self.next_cursor.is_finished()
    }
}

/// Sweeps tables batch by batch until their cursors are exhausted
pub struct SweepOrchestrator {
    runner: Arc<SweepTaskRunner>,
    kvs: Arc<dyn KeyValueService>,
    ledger: Arc<SweepProgressLedger>,
    locks: Arc<LockService>,
    lock_client: LockClient,
    batch_size: usize,
    pause: Duration,
    compact_after_sweep: bool,
    threads: usize,
    cancelled: Arc<AtomicBool>,
}

impl SweepOrchestrator {
    pub fn new(
        runner: Arc<SweepTaskRunner>,
        kvs: Arc<dyn KeyValueService>,
        ledger: Arc<SweepProgressLedger>,
        locks: Arc<LockService>,
        config: &Config,
    ) -> Result<Self> {
        config.validate()?;
        let lock_client = match &config.lock_client_id {
            Some(id) => LockClient::of(id)?,
            None => LockClient::anonymous().clone(),
        };

        Ok(Self {
            runner,
            kvs,
            ledger,
            locks,
            lock_client,
            batch_size: config.sweep_batch_size,
            pause: config.sweep_pause(),
            compact_after_sweep: config.compact_after_sweep,
            threads: config.sweep_threads,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that stops all sweeps at their next batch boundary
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn lock_client(&self) -> &LockClient {
        &self.lock_client
    }

    /// Expand a target into (table, start cursor) pairs
    ///
    /// Multi-table targets are ordered by `SweepProgressLedger::prioritize`,
    /// name order breaking ties.
    pub fn resolve_targets(&self, target: &SweepTarget) -> Result<Vec<(String, SweepCursor)>> {
        let tables: Vec<String> = match target {
            SweepTarget::Table { name, start } => return Ok(vec![(name.clone(), start.clone())]),
            SweepTarget::Namespace(namespace) => self
                .kvs
                .get_all_table_names()?
                .into_iter()
                .filter(|table| namespace.contains_table(table) && !is_hidden_table(table))
                .collect(),
            SweepTarget::All => self
                .kvs
                .get_all_table_names()?
                .into_iter()
                .filter(|table| !is_hidden_table(table))
                .collect(),
        };

        Ok(self
            .ledger
            .prioritize(tables)?
            .into_iter()
            .map(|table| (table, SweepCursor::Start))
            .collect())
    }

    /// Sweep every table of `target`
    ///
    /// One outcome per table, in target order. A failing table does not stop
    /// the others.
    pub fn sweep(&self, target: &SweepTarget) -> Result<Vec<Result<TableSweepSummary>>> {
        let targets = self.resolve_targets(target)?;
        if self.threads <= 1 || targets.len() <= 1 {
            return Ok(targets
                .into_iter()
                .map(|(table, start)| self.sweep_table(&table, start))
                .collect());
        }
        self.sweep_parallel(targets)
    }

    fn sweep_parallel(&self, targets: Vec<(String, SweepCursor)>) -> Result<Vec<Result<TableSweepSummary>>> {
        let total = targets.len();
        let (tx, rx) = channel::unbounded();
        for (index, target) in targets.into_iter().enumerate() {
            // The receiver is alive, send cannot fail
            let _ = tx.send((index, target));
        }
        drop(tx);

        let outcomes = Mutex::new(Vec::with_capacity(total));
        crossbeam::thread::scope(|scope| {
            for _ in 0..self.threads.min(total) {
                let rx = rx.clone();
                let outcomes = &outcomes;
                scope.spawn(move |_| {
                    while let Ok((index, (table, start))) = rx.recv() {
                        let outcome = self.sweep_table(&table, start);
                        outcomes.lock().push((index, outcome));
                    }
                });
            }
        })
        .map_err(|_| AtlasError::Storage("sweep worker thread panicked".to_string()))?;

        let mut outcomes = outcomes.into_inner();
        outcomes.sort_by_key(|(index, _)| *index);
        Ok(outcomes.into_iter().map(|(_, outcome)| outcome).collect())
    }

    /// Sweep `table` from `start` until finished or cancelled
    pub fn sweep_table(&self, table: &str, start: SweepCursor) -> Result<TableSweepSummary> {
        let _guard = self.locks.lock(&self.lock_client, &format!("sweep/{}", table))?;

        let mut summary = TableSweepSummary {
            table: table.to_string(),
            cells_examined: 0,
            cells_deleted: 0,
            batches: 0,
            next_cursor: start,
            compacted: false,
        };

        while !summary.next_cursor.is_finished() {
            if self.cancelled.load(Ordering::SeqCst) {
                tracing::info!(
                    "Sweep of {} cancelled, resume from {}",
                    table,
                    summary.next_cursor
                );
                return Ok(summary);
            }

            let watch = Instant::now();
            let results = self
                .runner
                .run(table, self.batch_size, &summary.next_cursor)
                .map_err(|e| AtlasError::SweepFailed {
                    table: table.to_string(),
                    cursor: summary.next_cursor.render(),
                    cells_examined: summary.cells_examined,
                    cells_deleted: summary.cells_deleted,
                    source: Box::new(e),
                })?;

            tracing::info!(
                "Swept from {} to {} in table {} in {} ms, examined {} unique cells, deleted {} cells.",
                summary.next_cursor,
                results.next_start_row,
                table,
                watch.elapsed().as_millis(),
                results.cells_examined,
                results.cells_deleted
            );

            summary.cells_examined += results.cells_examined;
            summary.cells_deleted += results.cells_deleted;
            summary.batches += 1;
            summary.next_cursor = results.next_start_row;

            if !summary.next_cursor.is_finished() && !self.pause.is_zero() {
                thread::sleep(self.pause);
            }
        }

        self.ledger
            .record(table, summary.cells_deleted, summary.cells_examined, now_millis())?;

        tracing::info!(
            "Finished sweeping {}, examined {} unique cells, deleted {} cells.",
            table,
            summary.cells_examined,
            summary.cells_deleted
        );

        if summary.cells_deleted > 0 && self.compact_after_sweep {
            summary.compacted = self.compact(table);
        }

        Ok(summary)
    }

    /// Compaction is best effort: failures are logged, never retried
    fn compact(&self, table: &str) -> bool {
        let watch = Instant::now();
        match self.kvs.compact_internally(table) {
            Ok(()) => {
                tracing::info!(
                    "Finished performing compactInternally on {} in {} ms.",
                    table,
                    watch.elapsed().as_millis()
                );
                true
            }
            Err(e) => {
                tracing::warn!("Compaction of {} failed: {}", table, e);
                false
            }
        }
    }
}

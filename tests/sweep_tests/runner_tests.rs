//! Tests for SweepTaskRunner
//!
//! These tests verify:
//! - Which versions each strategy deletes
//! - Cursor pagination across batches
//! - Rejected inputs (unknown/hidden tables, zero batch size)
//! - Followers run before deletes and can abort a batch
//! - The sweep bound is read fresh for every batch

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use atlasmvcc::kvs::{Cell, InMemoryKeyValueService, KeyValueService, Timestamp, TOMBSTONE};
use atlasmvcc::schema::{SweepStrategy, SWEEP_PROGRESS_TABLE};
use atlasmvcc::sweep::{
    CleanupFollower, Follower, OnCleanupTask, StrategyMap, SweepCursor, SweepResults, SweepStrategyManager,
    SweepTaskRunner,
};
use atlasmvcc::timestamp::SweepTimestamps;
use atlasmvcc::{AtlasError, Result};
use bytes::Bytes;
use parking_lot::Mutex;

// =============================================================================
// Helper Functions
// =============================================================================

struct Harness {
    kvs: Arc<InMemoryKeyValueService>,
    timestamps: Arc<SweepTimestamps>,
    runner: SweepTaskRunner,
}

fn harness(tables: &[(&str, SweepStrategy)], bound: Timestamp, followers: Vec<Arc<dyn Follower>>) -> Harness {
    let kvs = Arc::new(InMemoryKeyValueService::new());
    let mut strategies = StrategyMap::new();
    for (table, strategy) in tables {
        kvs.create_table(table).unwrap();
        strategies.insert(table.to_string(), *strategy);
    }
    let timestamps = Arc::new(SweepTimestamps::fixed(bound));
    let runner = SweepTaskRunner::new(
        kvs.clone(),
        timestamps.clone(),
        Arc::new(SweepStrategyManager::fixed(strategies)),
        followers,
    );
    Harness { kvs, timestamps, runner }
}

fn put(kvs: &InMemoryKeyValueService, table: &str, row: &str, ts: Timestamp, value: &[u8]) {
    let mut values = BTreeMap::new();
    values.insert(Cell::from_strs(row, "c"), Bytes::copy_from_slice(value));
    kvs.put(table, &values, ts).unwrap();
}

fn cell(row: &str) -> Cell {
    Cell::from_strs(row, "c")
}

/// Records the cells it is shown and what the table looked like at that time
#[derive(Default)]
struct RecordingFollower {
    kvs: Option<Arc<InMemoryKeyValueService>>,
    calls: Mutex<Vec<(String, BTreeSet<Cell>, usize)>>,
}

impl Follower for RecordingFollower {
    fn name(&self) -> &str {
        "recording"
    }

    fn run(&self, table: &str, cells: &BTreeSet<Cell>) -> Result<()> {
        let versions_before = self.kvs.as_ref().map_or(0, |kvs| kvs.version_count(table));
        self.calls.lock().push((table.to_string(), cells.clone(), versions_before));
        Ok(())
    }
}

struct FailingFollower;

impl Follower for FailingFollower {
    fn name(&self) -> &str {
        "failing"
    }

    fn run(&self, _table: &str, _cells: &BTreeSet<Cell>) -> Result<()> {
        Err(AtlasError::Follower {
            follower: "failing".to_string(),
            reason: "index unavailable".to_string(),
        })
    }
}

// =============================================================================
// Strategy Tests
// =============================================================================

#[test]
fn test_conservative_keeps_newest_visible_version() {
    let h = harness(&[("t", SweepStrategy::Conservative)], 12, vec![]);
    put(&h.kvs, "t", "r", 5, b"a");
    put(&h.kvs, "t", "r", 10, b"b");
    put(&h.kvs, "t", "r", 15, b"c");

    let results = h.runner.run("t", 100, &SweepCursor::Start).unwrap();

    assert_eq!(h.kvs.all_timestamps("t", &cell("r")), vec![10, 15]);
    assert_eq!(results.cells_examined, 1);
    assert_eq!(results.cells_deleted, 1);
    assert_eq!(results.next_start_row, SweepCursor::Finished);
}

#[test]
fn test_thorough_removes_tombstone_below_bound() {
    let h = harness(&[("t", SweepStrategy::Thorough)], 12, vec![]);
    put(&h.kvs, "t", "r", 5, b"a");
    put(&h.kvs, "t", "r", 10, TOMBSTONE);
    put(&h.kvs, "t", "r", 15, b"c");

    let results = h.runner.run("t", 100, &SweepCursor::Start).unwrap();

    assert_eq!(h.kvs.all_timestamps("t", &cell("r")), vec![15]);
    assert_eq!(results.cells_deleted, 2);
}

#[test]
fn test_conservative_keeps_tombstone() {
    let h = harness(&[("t", SweepStrategy::Conservative)], 12, vec![]);
    put(&h.kvs, "t", "r", 5, b"a");
    put(&h.kvs, "t", "r", 10, TOMBSTONE);

    h.runner.run("t", 100, &SweepCursor::Start).unwrap();

    assert_eq!(h.kvs.all_timestamps("t", &cell("r")), vec![10]);
}

#[test]
fn test_nothing_strategy_is_a_no_op() {
    let h = harness(&[("t", SweepStrategy::Nothing)], 100, vec![]);
    put(&h.kvs, "t", "r", 5, b"a");
    put(&h.kvs, "t", "r", 10, b"b");

    let results = h.runner.run("t", 100, &SweepCursor::Start).unwrap();

    assert_eq!(results, SweepResults::finished());
    assert_eq!(h.kvs.version_count("t"), 2);
}

#[test]
fn test_versions_at_bound_are_not_candidates() {
    let h = harness(&[("t", SweepStrategy::Conservative)], 10, vec![]);
    put(&h.kvs, "t", "r", 5, b"a");
    put(&h.kvs, "t", "r", 10, b"b");

    let results = h.runner.run("t", 100, &SweepCursor::Start).unwrap();

    assert_eq!(results.cells_deleted, 0);
    assert_eq!(results.cells_examined, 1);
    assert_eq!(h.kvs.all_timestamps("t", &cell("r")), vec![5, 10]);
}

#[test]
fn test_columns_of_a_row_are_separate_cells() {
    let h = harness(&[("t", SweepStrategy::Conservative)], 100, vec![]);
    for column in ["x", "y"] {
        for ts in [1, 2] {
            let mut values = BTreeMap::new();
            values.insert(Cell::from_strs("r", column), Bytes::from_static(b"v"));
            h.kvs.put("t", &values, ts).unwrap();
        }
    }

    let results = h.runner.run("t", 1, &SweepCursor::Start).unwrap();

    assert_eq!(results.cells_examined, 2);
    assert_eq!(results.cells_deleted, 2);
    // One row scanned with a batch of one: the table may have more
    assert_eq!(results.next_start_row, SweepCursor::after(b"r"));
}

// =============================================================================
// Cursor Tests
// =============================================================================

#[test]
fn test_batches_walk_the_table_once() {
    let h = harness(&[("t", SweepStrategy::Conservative)], 100, vec![]);
    for row in ["a", "b", "c", "d", "e"] {
        put(&h.kvs, "t", row, 1, b"old");
        put(&h.kvs, "t", row, 2, b"new");
    }

    let first = h.runner.run("t", 2, &SweepCursor::Start).unwrap();
    assert_eq!(first.next_start_row, SweepCursor::after(b"b"));

    let second = h.runner.run("t", 2, &first.next_start_row).unwrap();
    assert_eq!(second.next_start_row, SweepCursor::after(b"d"));

    let third = h.runner.run("t", 2, &second.next_start_row).unwrap();
    assert_eq!(third.next_start_row, SweepCursor::Finished);

    let examined = first.cells_examined + second.cells_examined + third.cells_examined;
    let deleted = first.cells_deleted + second.cells_deleted + third.cells_deleted;
    assert_eq!(examined, 5);
    assert_eq!(deleted, 5);
    assert_eq!(h.kvs.version_count("t"), 5);
}

#[test]
fn test_full_last_batch_needs_one_more_call() {
    let h = harness(&[("t", SweepStrategy::Conservative)], 100, vec![]);
    put(&h.kvs, "t", "a", 1, b"v");
    put(&h.kvs, "t", "b", 1, b"v");

    let first = h.runner.run("t", 2, &SweepCursor::Start).unwrap();
    assert_eq!(first.next_start_row, SweepCursor::after(b"b"));

    let second = h.runner.run("t", 2, &first.next_start_row).unwrap();
    assert_eq!(second, SweepResults::finished());
}

#[test]
fn test_finished_cursor_is_idempotent() {
    let h = harness(&[("t", SweepStrategy::Conservative)], 100, vec![]);
    put(&h.kvs, "t", "r", 1, b"v");
    put(&h.kvs, "t", "r", 2, b"v");

    for _ in 0..2 {
        let results = h.runner.run("t", 10, &SweepCursor::Finished).unwrap();
        assert_eq!(results, SweepResults::finished());
    }
    assert_eq!(h.kvs.version_count("t"), 2);
}

#[test]
fn test_empty_table_finishes() {
    let h = harness(&[("t", SweepStrategy::Thorough)], 100, vec![]);
    assert_eq!(h.runner.run("t", 10, &SweepCursor::Start).unwrap(), SweepResults::finished());
}

#[test]
fn test_resume_from_row_skips_earlier_rows() {
    let h = harness(&[("t", SweepStrategy::Conservative)], 100, vec![]);
    for row in ["a", "b"] {
        put(&h.kvs, "t", row, 1, b"v");
        put(&h.kvs, "t", row, 2, b"v");
    }

    h.runner.run("t", 10, &SweepCursor::from_row(Bytes::from_static(b"b"))).unwrap();

    assert_eq!(h.kvs.all_timestamps("t", &cell("a")), vec![1, 2]);
    assert_eq!(h.kvs.all_timestamps("t", &cell("b")), vec![2]);
}

// =============================================================================
// Rejection Tests
// =============================================================================

#[test]
fn test_unknown_table_fails() {
    let h = harness(&[("t", SweepStrategy::Conservative)], 100, vec![]);
    let result = h.runner.run("other", 10, &SweepCursor::Start);
    assert!(matches!(result, Err(AtlasError::UnknownTable(table)) if table == "other"));
}

#[test]
fn test_hidden_table_fails() {
    let h = harness(&[(SWEEP_PROGRESS_TABLE, SweepStrategy::Conservative)], 100, vec![]);
    let result = h.runner.run(SWEEP_PROGRESS_TABLE, 10, &SweepCursor::Start);
    assert!(matches!(result, Err(AtlasError::HiddenTable(_))));
}

#[test]
fn test_zero_batch_size_fails() {
    let h = harness(&[("t", SweepStrategy::Conservative)], 100, vec![]);
    let result = h.runner.run("t", 0, &SweepCursor::Start);
    assert!(matches!(result, Err(AtlasError::InvalidArgument(_))));
}

// =============================================================================
// Follower Tests
// =============================================================================

#[test]
fn test_followers_see_touched_cells_before_delete() {
    let kvs = Arc::new(InMemoryKeyValueService::new());
    let follower = Arc::new(RecordingFollower {
        kvs: Some(kvs.clone()),
        ..Default::default()
    });
    kvs.create_table("t").unwrap();
    let mut strategies = StrategyMap::new();
    strategies.insert("t".to_string(), SweepStrategy::Conservative);
    let runner = SweepTaskRunner::new(
        kvs.clone(),
        Arc::new(SweepTimestamps::fixed(100)),
        Arc::new(SweepStrategyManager::fixed(strategies)),
        vec![follower.clone() as Arc<dyn Follower>],
    );

    put(&kvs, "t", "a", 1, b"v");
    put(&kvs, "t", "a", 2, b"v");
    put(&kvs, "t", "b", 1, b"single");

    runner.run("t", 10, &SweepCursor::Start).unwrap();

    let calls = follower.calls.lock();
    assert_eq!(calls.len(), 1);
    let (table, cells, versions_before) = &calls[0];
    assert_eq!(table, "t");
    assert_eq!(cells.iter().cloned().collect::<Vec<_>>(), vec![cell("a")]);
    assert_eq!(*versions_before, 3);
    assert_eq!(kvs.version_count("t"), 2);
}

#[test]
fn test_followers_skipped_when_nothing_to_delete() {
    let follower = Arc::new(RecordingFollower::default());
    let h = harness(&[("t", SweepStrategy::Conservative)], 100, vec![follower.clone() as Arc<dyn Follower>]);
    put(&h.kvs, "t", "a", 1, b"v");

    h.runner.run("t", 10, &SweepCursor::Start).unwrap();

    assert!(follower.calls.lock().is_empty());
}

#[test]
fn test_failing_follower_aborts_delete() {
    let h = harness(&[("t", SweepStrategy::Conservative)], 100, vec![Arc::new(FailingFollower) as Arc<dyn Follower>]);
    put(&h.kvs, "t", "a", 1, b"v");
    put(&h.kvs, "t", "a", 2, b"v");

    let result = h.runner.run("t", 10, &SweepCursor::Start);

    assert!(matches!(result, Err(AtlasError::Follower { .. })));
    assert_eq!(h.kvs.all_timestamps("t", &cell("a")), vec![1, 2]);
}

struct StopAfter {
    stop: bool,
    seen: Mutex<usize>,
}

impl OnCleanupTask for StopAfter {
    fn cells_cleaned_up(&self, _table: &str, cells: &BTreeSet<Cell>) -> Result<bool> {
        *self.seen.lock() += cells.len();
        Ok(self.stop)
    }
}

#[test]
fn test_cleanup_tasks_stop_when_asked() {
    let first = Arc::new(StopAfter { stop: true, seen: Mutex::new(0) });
    let second = Arc::new(StopAfter { stop: false, seen: Mutex::new(0) });
    let other_table = Arc::new(StopAfter { stop: false, seen: Mutex::new(0) });
    let follower = CleanupFollower::new()
        .on_cleanup("t", first.clone())
        .on_cleanup("t", second.clone())
        .on_cleanup("u", other_table.clone());
    assert_eq!(follower.task_count("t"), 2);

    let h = harness(&[("t", SweepStrategy::Conservative)], 100, vec![Arc::new(follower) as Arc<dyn Follower>]);
    put(&h.kvs, "t", "a", 1, b"v");
    put(&h.kvs, "t", "a", 2, b"v");

    h.runner.run("t", 10, &SweepCursor::Start).unwrap();

    assert_eq!(*first.seen.lock(), 1);
    assert_eq!(*second.seen.lock(), 0);
    assert_eq!(*other_table.seen.lock(), 0);
}

struct BrokenIndex;

impl OnCleanupTask for BrokenIndex {
    fn cells_cleaned_up(&self, _table: &str, _cells: &BTreeSet<Cell>) -> Result<bool> {
        Err(AtlasError::Storage("index table offline".to_string()))
    }
}

#[test]
fn test_cleanup_task_failure_names_the_follower() {
    let follower = CleanupFollower::new().on_cleanup("t", Arc::new(BrokenIndex));
    let h = harness(&[("t", SweepStrategy::Conservative)], 100, vec![Arc::new(follower) as Arc<dyn Follower>]);
    put(&h.kvs, "t", "a", 1, b"v");
    put(&h.kvs, "t", "a", 2, b"v");

    let err = h.runner.run("t", 10, &SweepCursor::Start).unwrap_err();

    match err {
        AtlasError::Follower { follower, reason } => {
            assert_eq!(follower, "cleanup");
            assert!(reason.contains("index table offline"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(h.kvs.version_count("t"), 2);
}

// =============================================================================
// Bound Tests
// =============================================================================

#[test]
fn test_bound_is_read_per_batch() {
    let h = harness(&[("t", SweepStrategy::Conservative)], 2, vec![]);
    for row in ["a", "b"] {
        put(&h.kvs, "t", row, 1, b"v");
        put(&h.kvs, "t", row, 5, b"v");
        put(&h.kvs, "t", row, 8, b"v");
    }

    let first = h.runner.run("t", 1, &SweepCursor::Start).unwrap();
    assert_eq!(first.cells_deleted, 0);

    h.timestamps.advance_unreadable(100);
    h.timestamps.advance_immutable(100);

    h.runner.run("t", 1, &first.next_start_row).unwrap();

    assert_eq!(h.kvs.all_timestamps("t", &cell("a")), vec![1, 5, 8]);
    assert_eq!(h.kvs.all_timestamps("t", &cell("b")), vec![8]);
}

#[test]
fn test_bound_is_minimum_of_watermarks() {
    let h = harness(&[("t", SweepStrategy::Conservative)], 0, vec![]);
    h.timestamps.advance_unreadable(100);
    h.timestamps.advance_immutable(6);
    put(&h.kvs, "t", "r", 1, b"v");
    put(&h.kvs, "t", "r", 5, b"v");
    put(&h.kvs, "t", "r", 8, b"v");

    h.runner.run("t", 10, &SweepCursor::Start).unwrap();

    assert_eq!(h.kvs.all_timestamps("t", &cell("r")), vec![5, 8]);
}

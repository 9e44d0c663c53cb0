//! Cleanup followers
//!
//! Hooks run with every sweep batch before its versions are deleted. A batch
//! whose delete fails is retried from the same cursor, so followers see the
//! same cells again and must tolerate it.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::{AtlasError, Result};
use crate::kvs::Cell;

/// Post-sweep hook, invoked once per batch that deletes something
pub trait Follower: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Called with every cell of `table` that is about to lose versions
    fn run(&self, table: &str, cells: &BTreeSet<Cell>) -> Result<()>;
}

/// Per-table cleanup action, e.g. dropping secondary index entries
pub trait OnCleanupTask: Send + Sync {
    /// Returns `true` if no further task for this table should run
    fn cells_cleaned_up(&self, table: &str, cells: &BTreeSet<Cell>) -> Result<bool>;
}

/// Follower dispatching to the cleanup tasks registered for each table
#[derive(Default)]
pub struct CleanupFollower {
    tasks: HashMap<String, Vec<Arc<dyn OnCleanupTask>>>,
}

impl CleanupFollower {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `task` for `table`; tasks run in registration order
    pub fn on_cleanup(mut self, table: impl Into<String>, task: Arc<dyn OnCleanupTask>) -> Self {
        self.tasks.entry(table.into()).or_default().push(task);
        self
    }

    /// Number of tasks registered for `table`
    pub fn task_count(&self, table: &str) -> usize {
        self.tasks.get(table).map_or(0, Vec::len)
    }
}

impl Follower for CleanupFollower {
    fn name(&self) -> &str {
        "cleanup"
    }

    fn run(&self, table: &str, cells: &BTreeSet<Cell>) -> Result<()> {
        let Some(tasks) = self.tasks.get(table) else {
            return Ok(());
        };
        for task in tasks {
            let stop = task
                .cells_cleaned_up(table, cells)
                .map_err(|e| AtlasError::Follower {
                    follower: self.name().to_string(),
                    reason: e.to_string(),
                })?;
            if stop {
                break;
            }
        }
        Ok(())
    }
}

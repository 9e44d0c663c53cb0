//! Sweep Module
//!
//! Background garbage collection of cell versions no transaction can observe.
//!
//! ## Responsibilities
//! - Per-table sweep strategy registry (recomputable snapshot)
//! - Batch sweeping with a resumable cursor
//! - Cleanup followers run with every batch
//! - Progress ledger used for reporting and prioritization
//! - Whole-table orchestration (pause, lock, record, compact)
//!
//! ## Safety Rule
//! ```text
//!   versions of one cell:   5      10      15
//!   sweep bound:                      12
//!                           ───────────┤
//!   candidates (< bound):   5      10
//!   kept:                          10        newest candidate
//!   deleted:                5
//! ```
//! Under THOROUGH the newest candidate is deleted too when it is a tombstone.

mod cursor;
mod follower;
mod orchestrator;
mod progress;
mod runner;
mod strategy;

pub use cursor::{SweepCursor, RENDERED_ROW_LEN};
pub use follower::{CleanupFollower, Follower, OnCleanupTask};
pub use orchestrator::{SweepOrchestrator, SweepTarget, TableSweepSummary};
pub use progress::{now_millis, SweepProgress, SweepProgressLedger};
pub use runner::{timestamps_to_sweep, SweepResults, SweepTaskRunner};
pub use strategy::{StrategyMap, SweepStrategyManager};

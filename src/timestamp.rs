//! Timestamp Bounds
//!
//! The two watermarks the timestamp/lock oracle publishes, and the sweep
//! bound derived from them.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::kvs::Timestamp;

/// Source of the oracle's safe-timestamp watermarks
pub trait TimestampBounds: Send + Sync {
    /// Oldest timestamp an in-flight transaction may still read at
    fn unreadable_timestamp(&self) -> Timestamp;

    /// Oldest timestamp committed transactions still consider live
    fn immutable_timestamp(&self) -> Timestamp;

    /// Versions strictly older than this may be swept
    fn sweep_timestamp(&self) -> Timestamp {
        self.unreadable_timestamp().min(self.immutable_timestamp())
    }
}

/// Watermarks held in atomics; setters only move them forward
#[derive(Debug, Default)]
pub struct SweepTimestamps {
    unreadable: AtomicU64,
    immutable: AtomicU64,
}

impl SweepTimestamps {
    pub fn new(unreadable: Timestamp, immutable: Timestamp) -> Self {
        Self {
            unreadable: AtomicU64::new(unreadable),
            immutable: AtomicU64::new(immutable),
        }
    }

    /// Both watermarks at the same value
    pub fn fixed(ts: Timestamp) -> Self {
        Self::new(ts, ts)
    }

    /// Advance the unreadable watermark (ignored if `ts` is older)
    pub fn advance_unreadable(&self, ts: Timestamp) {
        self.unreadable.fetch_max(ts, Ordering::SeqCst);
    }

    /// Advance the immutable watermark (ignored if `ts` is older)
    pub fn advance_immutable(&self, ts: Timestamp) {
        self.immutable.fetch_max(ts, Ordering::SeqCst);
    }
}

impl TimestampBounds for SweepTimestamps {
    fn unreadable_timestamp(&self) -> Timestamp {
        self.unreadable.load(Ordering::SeqCst)
    }

    fn immutable_timestamp(&self) -> Timestamp {
        self.immutable.load(Ordering::SeqCst)
    }
}

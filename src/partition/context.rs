//! Request context
//!
//! Per-request metadata that travels next to a storage call rather than in
//! its arguments. It is created by the caller and handed down explicitly.

use super::PartitionMap;

/// Out-of-band data attached to one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestContext {
    partition_map_version: Option<i64>,
}

impl RequestContext {
    /// A context that advertises no partition map version
    pub fn unversioned() -> Self {
        Self::default()
    }

    /// A context advertising `version`
    pub fn with_partition_map_version(version: i64) -> Self {
        Self {
            partition_map_version: Some(version),
        }
    }

    /// A context advertising the version of `map`
    pub fn for_map(map: &PartitionMap) -> Self {
        Self::with_partition_map_version(map.version())
    }

    /// Version the caller routed this request with
    pub fn partition_map_version(&self) -> Option<i64> {
        self.partition_map_version
    }
}

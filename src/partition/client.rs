//! Client-side map refresh
//!
//! Callers route with a cached partition map. When an endpoint answers
//! `VersionTooOld`, the cache is refreshed and the call retried once.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;

use super::{PartitionMap, PartitionMapService, RequestContext};

/// Caller holding a cached partition map
pub struct RefreshingCaller {
    partition_maps: Arc<dyn PartitionMapService>,
    cached: RwLock<PartitionMap>,
}

impl RefreshingCaller {
    /// Start with the map currently published by `partition_maps`
    pub fn new(partition_maps: Arc<dyn PartitionMapService>) -> Self {
        let cached = RwLock::new(partition_maps.get_map());
        Self { partition_maps, cached }
    }

    /// Start with an explicit (possibly stale) map
    pub fn with_map(partition_maps: Arc<dyn PartitionMapService>, map: PartitionMap) -> Self {
        Self {
            partition_maps,
            cached: RwLock::new(map),
        }
    }

    pub fn cached_version(&self) -> i64 {
        self.cached.read().version()
    }

    /// Context advertising the cached map
    pub fn context(&self) -> RequestContext {
        RequestContext::for_map(&self.cached.read())
    }

    /// Endpoint owning `row` according to the cached map
    pub fn endpoint_for(&self, row: &[u8]) -> Option<String> {
        self.cached.read().endpoint_for(row).map(str::to_string)
    }

    /// Replace the cached map with the published one
    pub fn refresh(&self) {
        let fresh = self.partition_maps.get_map();
        tracing::debug!(
            "Refreshed partition map from version {} to {}",
            self.cached_version(),
            fresh.version()
        );
        *self.cached.write() = fresh;
    }

    /// Run `op` with the cached context; on `VersionTooOld`, refresh and
    /// run it once more
    pub fn call<T, F>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(&RequestContext) -> Result<T>,
    {
        match op(&self.context()) {
            Err(e) if e.is_version_too_old() => {
                self.refresh();
                op(&self.context())
            }
            other => other,
        }
    }
}

//! Endpoint server
//!
//! One storage node exposing two capabilities: the storage surface, which
//! goes through the version gate, and the partition map surface, which does
//! not.

use std::sync::Arc;

use crate::error::Result;
use crate::kvs::KeyValueService;

use super::gate::{CheckedKeyValueService, VersionCheckedKeyValueService};
use super::{PartitionMap, PartitionMapService, RequestContext};

/// A partitioned storage endpoint
pub struct EndpointServer<K> {
    kvs: VersionCheckedKeyValueService<K>,
    partition_maps: Arc<dyn PartitionMapService>,
}

impl<K: KeyValueService> EndpointServer<K> {
    /// Gate `kvs` on the version published by `partition_maps`
    pub fn new(kvs: K, partition_maps: Arc<dyn PartitionMapService>) -> Self {
        let versions = Arc::clone(&partition_maps);
        Self {
            kvs: VersionCheckedKeyValueService::new(kvs, move || versions.get_map_version()),
            partition_maps,
        }
    }

    /// An endpoint that does not check partition map versions
    pub fn without_version_check(kvs: K, partition_maps: Arc<dyn PartitionMapService>) -> Self {
        Self {
            kvs: VersionCheckedKeyValueService::disabled(kvs),
            partition_maps,
        }
    }

    /// Storage surface for the request carrying `ctx`
    pub fn key_value_service<'a>(&'a self, ctx: &'a RequestContext) -> CheckedKeyValueService<'a, K> {
        self.kvs.with_context(ctx)
    }

    /// The version gate, for inspecting its staleness signals
    pub fn gate(&self) -> &VersionCheckedKeyValueService<K> {
        &self.kvs
    }
}

impl<K: KeyValueService> PartitionMapService for EndpointServer<K> {
    fn get_map_version(&self) -> i64 {
        self.partition_maps.get_map_version()
    }

    fn get_map(&self) -> PartitionMap {
        self.partition_maps.get_map()
    }

    fn update_map(&self, map: PartitionMap) -> Result<()> {
        self.partition_maps.update_map(map)
    }
}

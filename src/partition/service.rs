//! Partition map service
//!
//! The capability through which clients and endpoints fetch and publish the
//! authoritative partition map.

use parking_lot::RwLock;

use crate::error::{AtlasError, Result};

use super::PartitionMap;

/// Access to the authoritative partition map
pub trait PartitionMapService: Send + Sync {
    fn get_map_version(&self) -> i64;

    fn get_map(&self) -> PartitionMap;

    /// Replace the map. A map older than the current one is rejected.
    fn update_map(&self, map: PartitionMap) -> Result<()>;
}

/// Partition map service holding the map in memory
#[derive(Debug, Default)]
pub struct InMemoryPartitionMapService {
    map: RwLock<PartitionMap>,
}

impl InMemoryPartitionMapService {
    pub fn new(map: PartitionMap) -> Self {
        Self { map: RwLock::new(map) }
    }

    /// A service holding an empty map at version 0
    pub fn create_empty() -> Self {
        Self::default()
    }

    /// Apply a topology edit in place
    pub fn mutate<F>(&self, edit: F) -> Result<i64>
    where
        F: FnOnce(&mut PartitionMap) -> Result<()>,
    {
        let mut map = self.map.write();
        // Edit a copy so a failed edit leaves the published map untouched
        let mut draft = map.clone();
        edit(&mut draft)?;
        *map = draft;
        Ok(map.version())
    }
}

impl PartitionMapService for InMemoryPartitionMapService {
    fn get_map_version(&self) -> i64 {
        self.map.read().version()
    }

    fn get_map(&self) -> PartitionMap {
        self.map.read().clone()
    }

    fn update_map(&self, map: PartitionMap) -> Result<()> {
        let mut current = self.map.write();
        if map.version() < current.version() {
            return Err(AtlasError::InvalidArgument(format!(
                "partition map version {} is older than current {}",
                map.version(),
                current.version()
            )));
        }
        *current = map;
        Ok(())
    }
}

//! Partition map
//!
//! Assigns contiguous row ranges to storage endpoints. A range is identified
//! by its start row and runs up to the next range's start. The first range
//! always starts at the empty row, so every row has an owner.
//!
//! Every successful topology change bumps `version` by exactly one; failed or
//! no-op edits leave it untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, Result};

/// Endpoint version meaning "do not check versions"
pub const VERSION_CHECK_DISABLED: i64 = -1;

/// True if `version` is the disabled sentinel (any negative value)
#[inline]
pub fn is_version_check_disabled(version: i64) -> bool {
    version < 0
}

/// Versioned assignment of row ranges to endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionMap {
    version: i64,
    ranges: BTreeMap<Bytes, String>,
}

impl PartitionMap {
    /// An empty map at version 0
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// All distinct endpoints
    pub fn endpoints(&self) -> BTreeSet<&str> {
        self.ranges.values().map(String::as_str).collect()
    }

    /// (range start, endpoint) pairs in row order
    pub fn ranges(&self) -> impl Iterator<Item = (&[u8], &str)> {
        self.ranges.iter().map(|(start, endpoint)| (start.as_ref(), endpoint.as_str()))
    }

    /// Endpoint owning `row`
    pub fn endpoint_for(&self, row: &[u8]) -> Option<&str> {
        self.ranges
            .range::<[u8], _>((Bound::Unbounded, Bound::Included(row)))
            .next_back()
            .map(|(_, endpoint)| endpoint.as_str())
    }

    /// Split the range containing `range_start` and give the upper part to
    /// `endpoint`. The first endpoint of an empty map must start at the
    /// empty row. Splitting off a part for the range's own owner is a no-op.
    pub fn add_endpoint(&mut self, range_start: impl Into<Bytes>, endpoint: &str) -> Result<()> {
        let range_start = range_start.into();
        if endpoint.is_empty() {
            return Err(AtlasError::InvalidArgument("endpoint name cannot be empty".to_string()));
        }
        if self.ranges.is_empty() && !range_start.is_empty() {
            return Err(AtlasError::InvalidArgument(
                "the first range must start at the empty row".to_string(),
            ));
        }
        if self.ranges.contains_key(&range_start) {
            return Err(AtlasError::InvalidArgument(format!(
                "a range already starts at {}",
                hex::encode(&range_start)
            )));
        }

        if self.endpoint_for(&range_start) == Some(endpoint) {
            // The owner already serves the upper part, routing is unchanged
            return Ok(());
        }

        self.ranges.insert(range_start, endpoint.to_string());
        self.bump();
        Ok(())
    }

    /// Remove every range of `endpoint`; each merges into the range before
    /// it (the first range goes to the owner of the next one)
    pub fn remove_endpoint(&mut self, endpoint: &str) -> Result<()> {
        let owned: Vec<Bytes> = self
            .ranges
            .iter()
            .filter(|(_, owner)| owner.as_str() == endpoint)
            .map(|(start, _)| start.clone())
            .collect();

        if owned.is_empty() {
            return Err(AtlasError::InvalidArgument(format!("unknown endpoint {}", endpoint)));
        }
        if owned.len() == self.ranges.len() {
            return Err(AtlasError::InvalidArgument(format!(
                "cannot remove {}, it is the only endpoint",
                endpoint
            )));
        }

        for start in owned.iter().filter(|start| !start.is_empty()) {
            self.ranges.remove(start);
        }

        if owned.first().map_or(false, |start| start.is_empty()) {
            // Ranges of the removed endpoint are gone, so the next one has
            // a different owner. Pull it down to the empty row.
            let next = self
                .ranges
                .range::<[u8], _>((Bound::Excluded(&[][..]), Bound::Unbounded))
                .next()
                .map(|(start, owner)| (start.clone(), owner.clone()));
            if let Some((next_start, next_owner)) = next {
                self.ranges.remove(&next_start);
                self.ranges.insert(Bytes::new(), next_owner);
            }
        }

        self.bump();
        Ok(())
    }

    /// Hand the range starting at `range_start` to `endpoint`
    pub fn reassign_range(&mut self, range_start: &[u8], endpoint: &str) -> Result<()> {
        if endpoint.is_empty() {
            return Err(AtlasError::InvalidArgument("endpoint name cannot be empty".to_string()));
        }
        let owner = self.ranges.get_mut(range_start).ok_or_else(|| {
            AtlasError::InvalidArgument(format!("no range starts at {}", hex::encode(range_start)))
        })?;
        if owner.as_str() == endpoint {
            return Ok(());
        }

        *owner = endpoint.to_string();
        self.bump();
        Ok(())
    }

    fn bump(&mut self) {
        self.version += 1;
        tracing::debug!("Partition map now at version {}", self.version);
    }
}

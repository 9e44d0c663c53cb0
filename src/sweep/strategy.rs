//! Sweep strategy registry
//!
//! Holds an immutable table → strategy snapshot. `recompute()` builds a fresh
//! map and swaps it in whole; readers clone the `Arc` and never observe a
//! half-updated mapping.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{AtlasError, Result};
use crate::kvs::KeyValueService;
use crate::schema::{is_hidden_table, SweepStrategy};

/// Snapshot of the per-table strategies
pub type StrategyMap = HashMap<String, SweepStrategy>;

type StrategyLoader = Box<dyn Fn() -> Result<StrategyMap> + Send + Sync>;

/// Cached, recomputable mapping from table name to sweep strategy
pub struct SweepStrategyManager {
    loader: StrategyLoader,
    current: RwLock<Arc<StrategyMap>>,
}

impl SweepStrategyManager {
    /// Build a manager around `loader`, computing the first snapshot now
    pub fn new<F>(loader: F) -> Result<Self>
    where
        F: Fn() -> Result<StrategyMap> + Send + Sync + 'static,
    {
        let initial = loader()?;
        Ok(Self {
            loader: Box::new(loader),
            current: RwLock::new(Arc::new(initial)),
        })
    }

    /// Strategies read from the table metadata stored in `kvs`
    ///
    /// Tables without metadata and hidden tables get no strategy, so sweeping
    /// them fails with `UnknownTable`.
    pub fn from_key_value_service(kvs: Arc<dyn KeyValueService>) -> Result<Self> {
        Self::new(move || {
            let mut strategies = StrategyMap::new();
            for table in kvs.get_all_table_names()? {
                if is_hidden_table(&table) {
                    continue;
                }
                if let Some(metadata) = kvs.get_metadata_for_table(&table)? {
                    strategies.insert(table, metadata.sweep_strategy);
                }
            }
            Ok(strategies)
        })
    }

    /// A manager over a fixed map; `recompute()` reinstalls the same map
    pub fn fixed(strategies: StrategyMap) -> Self {
        let snapshot = strategies.clone();
        Self {
            loader: Box::new(move || Ok(snapshot.clone())),
            current: RwLock::new(Arc::new(strategies)),
        }
    }

    /// The current snapshot
    pub fn get(&self) -> Arc<StrategyMap> {
        Arc::clone(&self.current.read())
    }

    /// Strategy of `table`, failing for tables the snapshot does not know
    pub fn strategy_for(&self, table: &str) -> Result<SweepStrategy> {
        self.get()
            .get(table)
            .copied()
            .ok_or_else(|| AtlasError::UnknownTable(table.to_string()))
    }

    /// Reload after a schema change. On failure the previous snapshot stays.
    pub fn recompute(&self) -> Result<()> {
        let fresh = Arc::new((self.loader)()?);
        tracing::debug!("Recomputed sweep strategies for {} tables", fresh.len());
        *self.current.write() = fresh;
        Ok(())
    }
}

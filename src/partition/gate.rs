//! Version-check gate
//!
//! Decorator in front of a partitioned endpoint's storage surface. Before any
//! storage call it compares the caller's partition map version (from the
//! request context) with the endpoint's current version:
//!
//! ```text
//!   endpoint < 0            → pass through, checking disabled
//!   caller  < endpoint      → VersionTooOld, caller refreshes and retries
//!   caller  > endpoint      → served, endpoint flagged as stale
//!   caller == endpoint      → served
//! ```
//!
//! With checking disabled the caller is expected to have disabled it too;
//! the gate cannot verify that.
//!
//! The delegate's results and errors come back untouched. The gate never
//! retries.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use crate::error::{AtlasError, Result};
use crate::kvs::{Cell, CellVersion, KeyValueService, Timestamp};
use crate::schema::TableMetadata;

use super::map::{is_version_check_disabled, VERSION_CHECK_DISABLED};
use super::RequestContext;

type VersionSupplier = Box<dyn Fn() -> i64 + Send + Sync>;

/// Storage service guarded by a partition map version check
pub struct VersionCheckedKeyValueService<K> {
    delegate: K,
    endpoint_version: VersionSupplier,
    stale_endpoint_signals: AtomicU64,
}

impl<K: KeyValueService> VersionCheckedKeyValueService<K> {
    /// Guard `delegate`; `endpoint_version` is read once per call
    pub fn new<F>(delegate: K, endpoint_version: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        Self {
            delegate,
            endpoint_version: Box::new(endpoint_version),
            stale_endpoint_signals: AtomicU64::new(0),
        }
    }

    /// A gate that lets everything through
    pub fn disabled(delegate: K) -> Self {
        Self::new(delegate, || VERSION_CHECK_DISABLED)
    }

    /// The storage surface as seen by the request carrying `ctx`
    pub fn with_context<'a>(&'a self, ctx: &'a RequestContext) -> CheckedKeyValueService<'a, K> {
        CheckedKeyValueService { gate: self, ctx }
    }

    /// Run the version check for one request
    pub fn check(&self, ctx: &RequestContext) -> Result<()> {
        let server = (self.endpoint_version)();
        if is_version_check_disabled(server) {
            return Ok(());
        }

        // A caller that advertises nothing is treated as older than any map
        let client = ctx.partition_map_version().unwrap_or(VERSION_CHECK_DISABLED);
        if client < server {
            tracing::debug!("Rejecting request: client map version {} < endpoint {}", client, server);
            return Err(AtlasError::VersionTooOld { client, server });
        }
        if client > server {
            self.stale_endpoint_signals.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                "Server partition map version is out-of-date: endpoint {}, client {}",
                server,
                client
            );
        }
        Ok(())
    }

    /// How many requests arrived with a newer map than the endpoint's
    pub fn stale_endpoint_signals(&self) -> u64 {
        self.stale_endpoint_signals.load(Ordering::Relaxed)
    }

    /// The unguarded delegate
    pub fn delegate(&self) -> &K {
        &self.delegate
    }
}

/// Gate bound to one request context; implements the storage surface
pub struct CheckedKeyValueService<'a, K> {
    gate: &'a VersionCheckedKeyValueService<K>,
    ctx: &'a RequestContext,
}

impl<K: KeyValueService> CheckedKeyValueService<'_, K> {
    fn delegate(&self) -> Result<&K> {
        self.gate.check(self.ctx)?;
        Ok(&self.gate.delegate)
    }
}

impl<K: KeyValueService> KeyValueService for CheckedKeyValueService<'_, K> {
    fn create_table(&self, table: &str) -> Result<()> {
        self.delegate()?.create_table(table)
    }

    fn drop_table(&self, table: &str) -> Result<()> {
        self.delegate()?.drop_table(table)
    }

    fn get_all_table_names(&self) -> Result<BTreeSet<String>> {
        self.delegate()?.get_all_table_names()
    }

    fn put_metadata_for_table(&self, table: &str, metadata: TableMetadata) -> Result<()> {
        self.delegate()?.put_metadata_for_table(table, metadata)
    }

    fn get_metadata_for_table(&self, table: &str) -> Result<Option<TableMetadata>> {
        self.delegate()?.get_metadata_for_table(table)
    }

    fn put(&self, table: &str, values: &BTreeMap<Cell, Bytes>, timestamp: Timestamp) -> Result<()> {
        self.delegate()?.put(table, values, timestamp)
    }

    fn get(
        &self,
        table: &str,
        cells: &[Cell],
        read_timestamp: Timestamp,
    ) -> Result<BTreeMap<Cell, (Timestamp, Bytes)>> {
        self.delegate()?.get(table, cells, read_timestamp)
    }

    fn scan_all_versions(&self, table: &str, start_row: &[u8], row_limit: usize) -> Result<Vec<CellVersion>> {
        self.delegate()?.scan_all_versions(table, start_row, row_limit)
    }

    fn multi_delete(&self, table: &str, versions: &[(Cell, Timestamp)]) -> Result<()> {
        self.delegate()?.multi_delete(table, versions)
    }

    fn compact_internally(&self, table: &str) -> Result<()> {
        self.delegate()?.compact_internally(table)
    }
}

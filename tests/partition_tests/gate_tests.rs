//! Tests for the partition map version gate
//!
//! These tests verify:
//! - Callers with an older map are rejected before touching storage
//! - Callers with a newer map are served and flag the endpoint as stale
//! - A negative endpoint version disables checking
//! - The endpoint's partition map surface is never gated
//! - RefreshingCaller refreshes and retries once
//! - The accept/reject decision holds for every (caller, endpoint) pair

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use atlasmvcc::kvs::{Cell, InMemoryKeyValueService, KeyValueService};
use atlasmvcc::partition::{
    EndpointServer, InMemoryPartitionMapService, PartitionMap, PartitionMapService, RefreshingCaller,
    RequestContext, VersionCheckedKeyValueService, VERSION_CHECK_DISABLED,
};
use atlasmvcc::AtlasError;
use bytes::Bytes;
use proptest::prelude::*;

// =============================================================================
// Helper Functions
// =============================================================================

fn store() -> Arc<InMemoryKeyValueService> {
    let kvs = Arc::new(InMemoryKeyValueService::new());
    kvs.create_table("t").unwrap();
    kvs
}

fn gate_at(version: i64) -> (Arc<InMemoryKeyValueService>, Arc<AtomicI64>, VersionCheckedKeyValueService<Arc<InMemoryKeyValueService>>) {
    let kvs = store();
    let endpoint_version = Arc::new(AtomicI64::new(version));
    let supplier = endpoint_version.clone();
    let gate = VersionCheckedKeyValueService::new(kvs.clone(), move || supplier.load(Ordering::SeqCst));
    (kvs, endpoint_version, gate)
}

fn one_value() -> BTreeMap<Cell, Bytes> {
    let mut values = BTreeMap::new();
    values.insert(Cell::from_strs("r", "c"), Bytes::from_static(b"v"));
    values
}

fn service_with_endpoint() -> Arc<InMemoryPartitionMapService> {
    let mut map = PartitionMap::new();
    map.add_endpoint(Bytes::new(), "node-1").unwrap();
    Arc::new(InMemoryPartitionMapService::new(map))
}

// =============================================================================
// Gate Tests
// =============================================================================

#[test]
fn test_older_caller_is_rejected() {
    let (kvs, _version, gate) = gate_at(7);
    let ctx = RequestContext::with_partition_map_version(5);

    let result = gate.with_context(&ctx).put("t", &one_value(), 1);

    assert!(matches!(result, Err(AtlasError::VersionTooOld { client: 5, server: 7 })));
    assert!(result.unwrap_err().is_version_too_old());
    assert_eq!(kvs.version_count("t"), 0);
}

#[test]
fn test_newer_caller_is_served_and_flags_endpoint() {
    let (kvs, _version, gate) = gate_at(7);
    let ctx = RequestContext::with_partition_map_version(9);

    gate.with_context(&ctx).put("t", &one_value(), 1).unwrap();

    assert_eq!(kvs.version_count("t"), 1);
    assert_eq!(gate.stale_endpoint_signals(), 1);
}

#[test]
fn test_equal_versions_are_served_silently() {
    let (_kvs, _version, gate) = gate_at(7);
    let ctx = RequestContext::with_partition_map_version(7);

    let names = gate.with_context(&ctx).get_all_table_names().unwrap();

    assert!(names.contains("t"));
    assert_eq!(gate.stale_endpoint_signals(), 0);
}

#[test]
fn test_unversioned_caller_is_rejected_when_checking() {
    let (_kvs, _version, gate) = gate_at(0);

    let result = gate.check(&RequestContext::unversioned());

    assert!(matches!(
        result,
        Err(AtlasError::VersionTooOld { client: VERSION_CHECK_DISABLED, server: 0 })
    ));
}

#[test]
fn test_negative_endpoint_version_disables_checking() {
    let (_kvs, _version, gate) = gate_at(VERSION_CHECK_DISABLED);

    for ctx in [
        RequestContext::unversioned(),
        RequestContext::with_partition_map_version(0),
        RequestContext::with_partition_map_version(100),
    ] {
        gate.with_context(&ctx).get_all_table_names().unwrap();
    }
    assert_eq!(gate.stale_endpoint_signals(), 0);

    let disabled = VersionCheckedKeyValueService::disabled(store());
    disabled.check(&RequestContext::unversioned()).unwrap();
}

#[test]
fn test_endpoint_version_is_read_per_call() {
    let (_kvs, version, gate) = gate_at(3);
    let ctx = RequestContext::with_partition_map_version(3);
    gate.check(&ctx).unwrap();

    version.store(4, Ordering::SeqCst);

    assert!(gate.check(&ctx).is_err());
}

#[test]
fn test_delegate_errors_pass_through() {
    let (_kvs, _version, gate) = gate_at(1);
    let ctx = RequestContext::with_partition_map_version(1);

    let result = gate.with_context(&ctx).scan_all_versions("missing", b"", 10);

    assert!(matches!(result, Err(AtlasError::TableNotFound(_))));
}

// =============================================================================
// Endpoint Tests
// =============================================================================

#[test]
fn test_endpoint_checks_against_published_map() {
    let partition_maps = service_with_endpoint();
    let endpoint = EndpointServer::new(store(), partition_maps.clone());
    let old_ctx = RequestContext::for_map(&partition_maps.get_map());

    endpoint.key_value_service(&old_ctx).put("t", &one_value(), 1).unwrap();

    partition_maps
        .mutate(|map| map.add_endpoint(Bytes::from_static(b"m"), "node-2"))
        .unwrap();

    let result = endpoint.key_value_service(&old_ctx).put("t", &one_value(), 2);
    assert!(matches!(result, Err(AtlasError::VersionTooOld { client: 1, server: 2 })));
}

#[test]
fn test_endpoint_map_surface_is_unchecked() {
    let partition_maps = service_with_endpoint();
    let endpoint = EndpointServer::new(store(), partition_maps.clone());

    // No request context at all: the map surface is how stale callers catch up
    assert_eq!(endpoint.get_map_version(), 1);
    assert_eq!(endpoint.get_map().endpoint_for(b"x"), Some("node-1"));

    let mut newer = endpoint.get_map();
    newer.add_endpoint(Bytes::from_static(b"q"), "node-3").unwrap();
    endpoint.update_map(newer).unwrap();
    assert_eq!(partition_maps.get_map_version(), 2);
}

#[test]
fn test_endpoint_without_version_check() {
    let partition_maps = service_with_endpoint();
    let endpoint = EndpointServer::without_version_check(store(), partition_maps);

    endpoint
        .key_value_service(&RequestContext::unversioned())
        .put("t", &one_value(), 1)
        .unwrap();

    assert_eq!(endpoint.gate().delegate().version_count("t"), 1);
}

// =============================================================================
// Refreshing Caller Tests
// =============================================================================

#[test]
fn test_caller_refreshes_after_rejection() {
    let partition_maps = service_with_endpoint();
    let endpoint = EndpointServer::new(store(), partition_maps.clone());
    let caller = RefreshingCaller::new(partition_maps.clone());

    partition_maps
        .mutate(|map| map.reassign_range(b"", "node-2"))
        .unwrap();
    assert_eq!(caller.cached_version(), 1);

    let mut attempts = 0;
    caller
        .call(|ctx| {
            attempts += 1;
            endpoint.key_value_service(ctx).put("t", &one_value(), 1)
        })
        .unwrap();

    assert_eq!(attempts, 2);
    assert_eq!(caller.cached_version(), 2);
    assert_eq!(caller.endpoint_for(b"row").as_deref(), Some("node-2"));
}

#[test]
fn test_caller_retries_only_once() {
    let partition_maps = service_with_endpoint();
    let caller = RefreshingCaller::with_map(partition_maps, PartitionMap::new());

    let mut attempts = 0;
    let result: atlasmvcc::Result<()> = caller.call(|_| {
        attempts += 1;
        Err(AtlasError::VersionTooOld { client: 0, server: 99 })
    });

    assert!(result.is_err());
    assert_eq!(attempts, 2);
}

#[test]
fn test_caller_does_not_retry_other_errors() {
    let caller = RefreshingCaller::new(service_with_endpoint());

    let mut attempts = 0;
    let result: atlasmvcc::Result<()> = caller.call(|_| {
        attempts += 1;
        Err(AtlasError::Storage("disk full".to_string()))
    });

    assert!(matches!(result, Err(AtlasError::Storage(_))));
    assert_eq!(attempts, 1);
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #[test]
    fn gate_rejects_exactly_older_callers(caller in -1i64..50, endpoint in -1i64..50) {
        let (kvs, _version, gate) = gate_at(endpoint);
        kvs.put("t", &one_value(), 1).unwrap();
        let cells = [Cell::from_strs("r", "c")];
        let ctx = RequestContext::with_partition_map_version(caller);

        let result = gate.with_context(&ctx).get("t", &cells, 2);

        if endpoint >= 0 && caller < endpoint {
            prop_assert!(
                matches!(result, Err(AtlasError::VersionTooOld { client, server }) if client == caller && server == endpoint),
                "expected VersionTooOld error"
            );
        } else {
            prop_assert_eq!(result.unwrap(), kvs.get("t", &cells, 2).unwrap());
        }

        let expected_signals = u64::from(endpoint >= 0 && caller > endpoint);
        prop_assert_eq!(gate.stale_endpoint_signals(), expected_signals);
    }
}

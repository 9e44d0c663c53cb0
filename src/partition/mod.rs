//! Partition Module
//!
//! Placement of row ranges on storage endpoints, and the gate that keeps
//! callers with an outdated placement view away from an endpoint.
//!
//! ## Request Flow
//! ```text
//!   caller ──(RequestContext: map version)──► EndpointServer
//!                                               │
//!                        storage surface ───────┤──── partition map surface
//!                               │                        (unchecked)
//!                     VersionCheckedKeyValueService
//!                               │
//!                        KeyValueService
//! ```

mod client;
mod context;
mod endpoint;
mod gate;
mod map;
mod service;

pub use client::RefreshingCaller;
pub use context::RequestContext;
pub use endpoint::EndpointServer;
pub use gate::{CheckedKeyValueService, VersionCheckedKeyValueService};
pub use map::{is_version_check_disabled, PartitionMap, VERSION_CHECK_DISABLED};
pub use service::{InMemoryPartitionMapService, PartitionMapService};

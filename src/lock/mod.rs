//! Lock Module
//!
//! Identities of lock-service callers and a small in-process lock service.
//!
//! ## Reentrancy
//! A lock held by a named client may be acquired again by an equal client.
//! Anonymous clients can never be told apart, so they are never reentrant.

mod client;
mod service;

pub use client::{LockClient, ANONYMOUS, INTERNAL_LOCK_GRANT};
pub use service::{LockGuard, LockService};

//! In-process lock service
//!
//! Named advisory locks with per-client reentrancy. Guards release their hold
//! when dropped.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::{AtlasError, Result};

use super::LockClient;

#[derive(Debug)]
struct HeldLock {
    holder: LockClient,
    hold_count: u32,
}

/// Grants exclusive named locks to lock clients
#[derive(Debug, Default)]
pub struct LockService {
    locks: Mutex<HashMap<String, HeldLock>>,
}

impl LockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire `name` for `client` without blocking
    ///
    /// Succeeds if the lock is free, or if it is held by an equal named
    /// client (reentrant). Fails with `LockUnavailable` otherwise.
    pub fn lock<'a>(&'a self, client: &LockClient, name: &str) -> Result<LockGuard<'a>> {
        let mut locks = self.locks.lock();
        match locks.get_mut(name) {
            None => {
                locks.insert(
                    name.to_string(),
                    HeldLock {
                        holder: client.clone(),
                        hold_count: 1,
                    },
                );
            }
            Some(held) if !client.is_anonymous() && held.holder == *client => {
                held.hold_count += 1;
            }
            Some(held) => {
                return Err(AtlasError::LockUnavailable {
                    lock: name.to_string(),
                    holder: held.holder.to_string(),
                });
            }
        }
        tracing::trace!("{} acquired lock {}", client, name);

        Ok(LockGuard {
            service: self,
            name: name.to_string(),
        })
    }

    /// Current holder of `name`
    pub fn holder(&self, name: &str) -> Option<LockClient> {
        self.locks.lock().get(name).map(|held| held.holder.clone())
    }

    pub fn is_locked(&self, name: &str) -> bool {
        self.locks.lock().contains_key(name)
    }

    fn release(&self, name: &str) {
        let mut locks = self.locks.lock();
        if let Some(held) = locks.get_mut(name) {
            held.hold_count -= 1;
            if held.hold_count == 0 {
                locks.remove(name);
            }
        }
    }
}

/// One hold on a named lock
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    service: &'a LockService,
    name: String,
}

impl LockGuard<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.service.release(&self.name);
    }
}

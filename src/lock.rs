//! Per-key mutual exclusion
//!
//! Serializes work keyed by a URI (fetch a page, write it to the cache)
//! without one global mutex. Acquisition is an atomic insert-if-absent on a
//! concurrent table; contention is handled by sleeping for the poll interval
//! and retrying. There is no queue, so waiters are not served in order.
//!
//! Not reentrant: acquiring a key already held by the same task waits
//! forever.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Default retry period while a key is held elsewhere
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Table of held keys
///
/// One instance per cache or client; separate instances never contend.
#[derive(Debug)]
pub struct KeyedLock {
    /// key -> token of the current holder
    held: DashMap<String, u64>,
    next_token: AtomicU64,
    poll_interval: Duration,
}

impl Default for KeyedLock {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl KeyedLock {
    /// Create an empty table with the given retry period
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            held: DashMap::new(),
            next_token: AtomicU64::new(1),
            poll_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Take `key` if nobody holds it
    pub fn try_acquire(&self, key: &str) -> Option<KeyedLockGuard<'_>> {
        match self.held.entry(key.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                vacant.insert(token);
                Some(KeyedLockGuard {
                    lock: self,
                    key: key.to_string(),
                    token,
                })
            }
        }
    }

    /// Wait until `key` is free, then hold it until the guard drops
    pub async fn acquire(&self, key: &str) -> KeyedLockGuard<'_> {
        loop {
            if let Some(guard) = self.try_acquire(key) {
                return guard;
            }
            debug!("Key busy, retrying in {:?}: {}", self.poll_interval, key);
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Blocking variant of [`KeyedLock::acquire`] for non-async callers
    pub fn acquire_blocking(&self, key: &str) -> KeyedLockGuard<'_> {
        loop {
            if let Some(guard) = self.try_acquire(key) {
                return guard;
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Run `action` while holding `key`
    pub async fn run_exclusive<F, Fut, T>(&self, key: &str, action: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire(key).await;
        action().await
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held.contains_key(key)
    }

    /// Number of keys currently held
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    fn release(&self, key: &str, token: u64) {
        if self.held.remove_if(key, |_, holder| *holder == token).is_none() {
            warn!("Released a key that was not held: {}", key);
            debug_assert!(false, "double release of key {}", key);
        }
    }
}

/// Holds a key until dropped
#[derive(Debug)]
pub struct KeyedLockGuard<'a> {
    lock: &'a KeyedLock,
    key: String,
    token: u64,
}

impl KeyedLockGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyedLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release(&self.key, self.token);
    }
}

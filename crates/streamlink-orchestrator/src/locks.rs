//! Per-service locks.
//!
//! `KeyedLocks` serializes the creation path of one service on one cluster.
//! It is created once at startup and shared by clone. Entries are removed
//! when the last guard (or waiter) for a key goes away, so the map only
//! ever holds keys that are in use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockKey = (String, String);
type LockMap = HashMap<LockKey, Arc<AsyncMutex<()>>>;

/// Async mutexes keyed by `(cluster_id, catalog_name)`.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    inner: Arc<Mutex<LockMap>>,
}

/// Held for as long as the keyed section runs.
pub struct KeyGuard {
    key: LockKey,
    guard: Option<OwnedMutexGuard<()>>,
    map: Arc<Mutex<LockMap>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, LockMap> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for exclusive access to `(cluster_id, catalog_name)`.
    pub async fn acquire(&self, cluster_id: &str, catalog_name: &str) -> KeyGuard {
        let key = (cluster_id.to_string(), catalog_name.to_string());
        let mutex = self.map().entry(key.clone()).or_default().clone();
        let guard = mutex.lock_owned().await;
        KeyGuard {
            key,
            guard: Some(guard),
            map: self.inner.clone(),
        }
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        let mutex = OwnedMutexGuard::mutex(&guard).clone();
        drop(guard);
        // One reference in the map, one in `mutex`: nobody else is waiting.
        let idle = map
            .get(&self.key)
            .is_some_and(|entry| Arc::ptr_eq(entry, &mutex) && Arc::strong_count(&mutex) == 2);
        if idle {
            map.remove(&self.key);
        }
    }
}

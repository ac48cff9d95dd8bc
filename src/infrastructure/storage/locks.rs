//! Per-key async locks

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Table of async mutexes keyed by backend key
///
/// Serializes read-modify-write sequences on one key; different keys never
/// contend. An entry is dropped as soon as no task holds or waits on it,
/// including waiters cancelled before they acquired the lock.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, LockEntry>>,
}

#[derive(Debug, Default)]
struct LockEntry {
    mutex: Arc<AsyncMutex<()>>,
    /// Tasks holding or waiting on `mutex`
    users: usize,
}

/// Exclusive access to one key, released on drop
#[derive(Debug)]
pub struct KeyGuard<'a> {
    table: &'a KeyedLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other task holds `key`
    pub async fn lock(&self, key: &str) -> KeyGuard<'_> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            let entry = locks.entry(key.to_string()).or_default();
            entry.users += 1;
            Arc::clone(&entry.mutex)
        };

        // Registered before waiting so a cancelled waiter still unregisters.
        let mut key_guard = KeyGuard {
            table: self,
            key: key.to_string(),
            guard: None,
        };
        key_guard.guard = Some(mutex.lock_owned().await);

        key_guard
    }

    /// Number of keys currently held or waited on
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();

        let mut locks = self
            .table
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = locks.get_mut(&self.key) {
            entry.users = entry.users.saturating_sub(1);
            if entry.users == 0 {
                locks.remove(&self.key);
            }
        }
    }
}

//! Per-key exclusive access.
//!
//! One async mutex per key, created on demand and dropped once the last
//! guard for it is released. Used for per-user ledger writes and per-event
//! webhook handling.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex, PoisonError, Weak},
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Held while the caller owns its key.
pub type KeyGuard = OwnedMutexGuard<()>;

#[derive(Debug)]
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Weak<AsyncMutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &K) -> KeyGuard {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            match slots.get(key).and_then(Weak::upgrade) {
                Some(slot) => slot,
                None => {
                    // Drop entries nobody holds before adding a new one.
                    slots.retain(|_, weak| weak.strong_count() > 0);
                    let slot = Arc::new(AsyncMutex::new(()));
                    slots.insert(key.clone(), Arc::downgrade(&slot));
                    slot
                }
            }
        };
        slot.lock_owned().await
    }

    /// Number of keys currently held or awaited.
    pub fn active_keys(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

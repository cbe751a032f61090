//! Per-key async mutual exclusion.
//!
//! Holders of different keys never wait on each other. Lock slots are
//! reference-counted and dropped from the table once the last guard goes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, Weak};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Prune dead slots once the table grows past this many entries.
const PRUNE_THRESHOLD: usize = 256;

#[derive(Default)]
pub struct KeyedLocks {
    slots: StdMutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<Mutex<()>> {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(existing) = slots.get(key).and_then(Weak::upgrade) {
            return existing;
        }

        if slots.len() >= PRUNE_THRESHOLD {
            slots.retain(|_, slot| slot.strong_count() > 0);
        }

        let slot = Arc::new(Mutex::new(()));
        slots.insert(key.to_string(), Arc::downgrade(&slot));
        slot
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        self.slot(key).lock_owned().await
    }

    /// Number of keys currently tracked, live or not yet pruned.
    pub fn tracked(&self) -> usize {
        self.slots
            .lock()
            .map(|slots| slots.len())
            .unwrap_or_default()
    }
}

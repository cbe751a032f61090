//! In-process cache tier backed by moka.
//!
//! Bounded by entry count with LRU eviction. Each entry carries its own
//! expiry, checked on read, so entries promoted from disk keep their
//! remaining lifetime rather than a fresh one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::future::Cache;
use moka::policy::EvictionPolicy;

/// Stand-in expiry for TTLs too large to represent.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Arc<[u8]>,
    expires_at: Instant,
}

/// Bounded LRU tier.
pub struct MemoryTier {
    entries: Cache<String, MemoryEntry>,
}

impl MemoryTier {
    pub fn new(max_capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_capacity)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        Self { entries }
    }

    pub async fn get(&self, key: &str) -> Option<Arc<[u8]>> {
        let entry = self.entries.get(key).await?;
        if entry.expires_at <= Instant::now() {
            self.entries.invalidate(key).await;
            return None;
        }
        Some(entry.value)
    }

    pub async fn insert(&self, key: String, value: Arc<[u8]>, ttl: Duration) {
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).unwrap_or(now + FAR_FUTURE);
        self.entries
            .insert(key, MemoryEntry { value, expires_at })
            .await;
    }

    pub async fn invalidate(&self, key: &str) {
        self.entries.invalidate(key).await;
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    /// Approximate entry count after pending maintenance has run.
    pub async fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }
}

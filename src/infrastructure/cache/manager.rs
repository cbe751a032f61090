//! Two-tier cache manager.
//!
//! Reads check memory, then disk; a disk hit is promoted into memory with
//! its remaining lifetime. Writes go to both tiers. The tiers evict
//! independently: memory by LRU capacity, disk by TTL plus an optional byte
//! cap enforced by compaction.
//!
//! Disk failures are never fatal. The first I/O error switches the manager
//! to memory-only operation for the rest of its life.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::domain::models::CacheConfig;
use crate::infrastructure::cache::disk_tier::{CompactionReport, DiskTier};
use crate::infrastructure::cache::memory_tier::MemoryTier;

/// Point-in-time cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub memory_entries: u64,
    pub disk_enabled: bool,
}

#[derive(Default)]
struct Counters {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

struct CompactionTask {
    handle: JoinHandle<()>,
    stop: Arc<Notify>,
}

/// Generic two-tier key/value cache.
pub struct CacheManager {
    enabled: bool,
    memory: MemoryTier,
    disk: Option<DiskTier>,
    disk_healthy: AtomicBool,
    default_ttl: Duration,
    max_disk_bytes: Option<u64>,
    counters: Counters,
    compaction: Mutex<Option<CompactionTask>>,
}

impl CacheManager {
    /// Build from configuration. A directory that cannot be created leaves
    /// the manager memory-only.
    pub async fn open(config: &CacheConfig) -> Self {
        Self::open_with_ttl(config, Duration::from_secs(config.ttl_secs)).await
    }

    /// Like [`open`](Self::open) with a different default TTL.
    pub async fn open_with_ttl(config: &CacheConfig, default_ttl: Duration) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        let disk = match &config.directory {
            Some(dir) => match DiskTier::open(PathBuf::from(dir)).await {
                Ok(tier) => Some(tier),
                Err(e) => {
                    warn!(dir = %dir, error = %e, "Cache directory unusable, running memory-only");
                    None
                }
            },
            None => None,
        };

        let mut manager = Self::memory_only(config.memory_capacity, default_ttl);
        manager.max_disk_bytes = config.max_disk_bytes;
        manager.disk_healthy = AtomicBool::new(disk.is_some());
        manager.disk = disk;
        manager
    }

    pub fn memory_only(memory_capacity: u64, default_ttl: Duration) -> Self {
        Self {
            enabled: true,
            memory: MemoryTier::new(memory_capacity),
            disk: None,
            disk_healthy: AtomicBool::new(false),
            default_ttl,
            max_disk_bytes: None,
            counters: Counters::default(),
            compaction: Mutex::new(None),
        }
    }

    /// Every `get` misses and every `put` is a no-op.
    pub fn disabled() -> Self {
        let mut manager = Self::memory_only(1, Duration::ZERO);
        manager.enabled = false;
        manager
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the disk tier is configured and has not failed.
    pub fn is_disk_enabled(&self) -> bool {
        self.disk.is_some() && self.disk_healthy.load(Ordering::Acquire)
    }

    fn disk(&self) -> Option<&DiskTier> {
        self.disk.as_ref().filter(|_| self.disk_healthy.load(Ordering::Acquire))
    }

    fn degrade_disk(&self, operation: &str, error: &std::io::Error) {
        if self.disk_healthy.swap(false, Ordering::AcqRel) {
            warn!(operation, error = %error, "Disk cache failed, continuing memory-only");
        }
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        if !self.enabled {
            return None;
        }

        if let Some(value) = self.memory.get(key).await {
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            return Some(value.to_vec());
        }

        if let Some(disk) = self.disk() {
            match disk.read(key).await {
                Ok(Some(hit)) => {
                    self.counters.disk_hits.fetch_add(1, Ordering::Relaxed);
                    let remaining = hit.remaining();
                    self.memory
                        .insert(key.to_string(), Arc::from(hit.value.as_slice()), remaining)
                        .await;
                    return Some(hit.value);
                }
                Ok(None) => {}
                Err(e) => self.degrade_disk("read", &e),
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Write to both tiers. `ttl` of `None` uses the manager default.
    pub async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        if !self.enabled {
            return;
        }

        let ttl = ttl.unwrap_or(self.default_ttl);
        self.counters.writes.fetch_add(1, Ordering::Relaxed);

        if let Some(disk) = self.disk() {
            if let Err(e) = disk.write(key, &value, ttl).await {
                self.degrade_disk("write", &e);
            }
        }
        self.memory
            .insert(key.to_string(), Arc::from(value), ttl)
            .await;
    }

    pub async fn invalidate(&self, key: &str) {
        if !self.enabled {
            return;
        }

        self.memory.invalidate(key).await;
        if let Some(disk) = self.disk() {
            if let Err(e) = disk.remove(key).await {
                self.degrade_disk("invalidate", &e);
            }
        }
    }

    pub async fn clear(&self) {
        if !self.enabled {
            return;
        }

        self.memory.clear();
        if let Some(disk) = self.disk() {
            if let Err(e) = disk.clear().await {
                self.degrade_disk("clear", &e);
            }
        }
    }

    /// Typed read; undecodable entries count as misses.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_slice(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(error = %e, "Dropping undecodable cache entry");
                self.invalidate(key).await;
                None
            }
        }
    }

    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        match serde_json::to_vec(value) {
            Ok(raw) => self.put(key, raw, ttl).await,
            Err(e) => debug!(error = %e, "Value not cacheable"),
        }
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.counters.disk_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            memory_entries: self.memory.entry_count().await,
            disk_enabled: self.is_disk_enabled(),
        }
    }

    /// Run one disk compaction pass. `None` when there is no usable disk tier.
    pub async fn compact(&self) -> Option<CompactionReport> {
        let disk = self.disk()?;
        match disk.compact(self.max_disk_bytes).await {
            Ok(report) => Some(report),
            Err(e) => {
                self.degrade_disk("compact", &e);
                None
            }
        }
    }

    /// Start periodic compaction. No-op without a disk tier or when already
    /// running.
    pub async fn start_compaction(self: &Arc<Self>, every: Duration) {
        if self.disk.is_none() || every.is_zero() {
            return;
        }

        let mut task = self.compaction.lock().await;
        if task.is_some() {
            return;
        }

        let stop = Arc::new(Notify::new());
        let handle = tokio::spawn(run_compaction(Arc::downgrade(self), every, Arc::clone(&stop)));
        info!(interval_secs = every.as_secs(), "Disk cache compaction started");
        *task = Some(CompactionTask { handle, stop });
    }

    /// Stop background compaction and wait for it to finish.
    pub async fn shutdown(&self) {
        let task = self.compaction.lock().await.take();
        if let Some(CompactionTask { handle, stop }) = task {
            stop.notify_one();
            if let Err(e) = handle.await {
                warn!(error = %e, "Compaction task ended abnormally");
            }
        }
    }
}

async fn run_compaction(manager: Weak<CacheManager>, every: Duration, stop: Arc<Notify>) {
    let mut ticker = interval(every);
    // first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(manager) = manager.upgrade() else { break };
                if !manager.is_disk_enabled() {
                    break;
                }
                if let Some(report) = manager.compact().await {
                    debug!(
                        expired = report.expired_removed,
                        evicted = report.evicted,
                        bytes = report.bytes_after,
                        "Scheduled compaction finished"
                    );
                }
            }
            () = stop.notified() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_cache_is_inert() {
        let cache = CacheManager::disabled();
        cache.put("k", b"v".to_vec(), None).await;

        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.stats().await.writes, 0);
    }

    #[tokio::test]
    async fn test_memory_only_round_trip() {
        let cache = CacheManager::memory_only(100, Duration::from_secs(60));
        cache.put("k", b"v".to_vec(), None).await;

        assert_eq!(cache.get("k").await, Some(b"v".to_vec()));
        cache.invalidate("k").await;
        assert!(cache.get("k").await.is_none());

        let stats = cache.stats().await;
        assert_eq!(stats.memory_hits, 1);
        assert_eq!(stats.misses, 1);
        assert!(!stats.disk_enabled);
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let cache = CacheManager::memory_only(100, Duration::from_secs(60));
        cache.put_json("v", &vec![0.5f32, 0.25], None).await;

        let value: Option<Vec<f32>> = cache.get_json("v").await;
        assert_eq!(value, Some(vec![0.5, 0.25]));

        cache.put("bad", b"not json".to_vec(), None).await;
        assert!(cache.get_json::<Vec<f32>>("bad").await.is_none());
    }

    #[tokio::test]
    async fn test_start_compaction_requires_disk() {
        let cache = Arc::new(CacheManager::memory_only(10, Duration::from_secs(60)));
        cache.start_compaction(Duration::from_millis(10)).await;
        assert!(cache.compaction.lock().await.is_none());
        cache.shutdown().await;
    }
}

//! Two-tier cache behavior against a real directory.

mod common;

use std::time::Duration;

use patternbase::domain::models::CacheConfig;
use patternbase::infrastructure::cache::CacheManager;

use common::temp_dir;

fn disk_config(dir: &std::path::Path) -> CacheConfig {
    CacheConfig {
        directory: Some(dir.to_string_lossy().into_owned()),
        ..CacheConfig::default()
    }
}

#[tokio::test]
async fn test_disk_entries_survive_a_restart() {
    let dir = temp_dir();

    let first = CacheManager::open(&disk_config(dir.path())).await;
    assert!(first.is_disk_enabled());
    first.put("embed:a", b"vector-a".to_vec(), None).await;
    drop(first);

    let second = CacheManager::open(&disk_config(dir.path())).await;
    assert_eq!(second.get("embed:a").await, Some(b"vector-a".to_vec()));
    assert_eq!(second.get("embed:a").await, Some(b"vector-a".to_vec()));

    let stats = second.stats().await;
    assert_eq!(stats.disk_hits, 1);
    assert_eq!(stats.memory_hits, 1);
    assert_eq!(stats.misses, 0);
}

#[tokio::test]
async fn test_expired_entries_are_misses() {
    let dir = temp_dir();
    let cache = CacheManager::open(&disk_config(dir.path())).await;

    cache
        .put("short", b"x".to_vec(), Some(Duration::from_millis(50)))
        .await;
    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(cache.get("short").await, None);
    let reopened = CacheManager::open(&disk_config(dir.path())).await;
    assert_eq!(reopened.get("short").await, None);
}

#[tokio::test]
async fn test_disk_failure_falls_back_to_memory() {
    let dir = temp_dir();
    let cache_dir = dir.path().join("cache");
    let cache = CacheManager::open(&disk_config(&cache_dir)).await;
    assert!(cache.is_disk_enabled());

    std::fs::remove_dir_all(&cache_dir).unwrap();
    cache.put("k", b"v".to_vec(), None).await;

    assert!(!cache.is_disk_enabled());
    assert_eq!(cache.get("k").await, Some(b"v".to_vec()));
    assert!(cache.compact().await.is_none());
}

#[tokio::test]
async fn test_unusable_directory_starts_memory_only() {
    let dir = temp_dir();
    let file = dir.path().join("not-a-dir");
    std::fs::write(&file, b"occupied").unwrap();

    let cache = CacheManager::open(&disk_config(&file)).await;
    assert!(cache.is_enabled());
    assert!(!cache.is_disk_enabled());

    cache.put("k", b"v".to_vec(), None).await;
    assert_eq!(cache.get("k").await, Some(b"v".to_vec()));
}

#[tokio::test]
async fn test_compaction_enforces_byte_cap() {
    let dir = temp_dir();
    let config = CacheConfig {
        max_disk_bytes: Some(1),
        ..disk_config(dir.path())
    };
    let cache = CacheManager::open(&config).await;

    for i in 0..4 {
        cache.put(&format!("k{i}"), vec![b'x'; 64], None).await;
    }
    let report = cache.compact().await.unwrap();
    assert_eq!(report.entries_after, 0);
    assert_eq!(report.evicted, 4);
}

#[tokio::test]
async fn test_clear_empties_both_tiers() {
    let dir = temp_dir();
    let cache = CacheManager::open(&disk_config(dir.path())).await;
    cache.put("a", b"1".to_vec(), None).await;
    cache.clear().await;

    assert_eq!(cache.get("a").await, None);
    let reopened = CacheManager::open(&disk_config(dir.path())).await;
    assert_eq!(reopened.get("a").await, None);
}

#[tokio::test]
async fn test_disabled_cache_ignores_directory() {
    let dir = temp_dir();
    let config = CacheConfig {
        enabled: false,
        ..disk_config(dir.path())
    };
    let cache = CacheManager::open(&config).await;

    cache.put("a", b"1".to_vec(), None).await;
    assert_eq!(cache.get("a").await, None);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

//! File-per-entry disk cache tier.
//!
//! Each entry is a small JSON envelope named by the SHA-256 of its key.
//! Writes go to a temporary file in the same directory and are renamed into
//! place, so readers never observe a partial entry.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::infrastructure::cache::fingerprint::key_digest;

const ENTRY_EXT: &str = "json";
const TEMP_EXT: &str = "tmp";

/// Temp files older than this are leftovers from an interrupted write.
const STALE_TEMP_AGE: Duration = Duration::from_secs(300);

#[derive(Debug, Serialize, Deserialize)]
struct DiskEnvelope {
    key: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    /// Base64 of the cached bytes
    value: String,
}

/// A live entry read from disk.
#[derive(Debug)]
pub struct DiskHit {
    pub value: Vec<u8>,
    pub expires_at: DateTime<Utc>,
}

impl DiskHit {
    /// Lifetime left, zero if already past.
    pub fn remaining(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Outcome of one compaction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionReport {
    pub expired_removed: usize,
    pub evicted: usize,
    pub entries_after: usize,
    pub bytes_after: u64,
}

struct EntryInfo {
    path: PathBuf,
    size: u64,
    created_at: DateTime<Utc>,
}

/// On-disk key to blob store.
pub struct DiskTier {
    dir: PathBuf,
}

impl DiskTier {
    /// Open the tier, creating the directory if absent.
    pub async fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{ENTRY_EXT}", key_digest(key)))
    }

    pub async fn read(&self, key: &str) -> std::io::Result<Option<DiskHit>> {
        let path = self.entry_path(key);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let envelope: DiskEnvelope = match serde_json::from_slice(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding corrupt cache entry");
                remove_if_present(&path).await?;
                return Ok(None);
            }
        };

        if envelope.key != key {
            return Ok(None);
        }
        if envelope.expires_at <= Utc::now() {
            remove_if_present(&path).await?;
            return Ok(None);
        }

        match STANDARD.decode(envelope.value.as_bytes()) {
            Ok(value) => Ok(Some(DiskHit {
                value,
                expires_at: envelope.expires_at,
            })),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding undecodable cache entry");
                remove_if_present(&path).await?;
                Ok(None)
            }
        }
    }

    pub async fn write(&self, key: &str, value: &[u8], ttl: Duration) -> std::io::Result<()> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let envelope = DiskEnvelope {
            key: key.to_string(),
            created_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            value: STANDARD.encode(value),
        };
        let bytes = serde_json::to_vec(&envelope)?;

        let path = self.entry_path(key);
        let temp = self.dir.join(format!(
            "{}.{}.{TEMP_EXT}",
            key_digest(key),
            uuid::Uuid::new_v4().simple()
        ));

        fs::write(&temp, &bytes).await?;
        if let Err(e) = fs::rename(&temp, &path).await {
            if let Err(cleanup) = fs::remove_file(&temp).await {
                debug!(path = %temp.display(), error = %cleanup, "Failed to remove temp cache file");
            }
            return Err(e);
        }
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> std::io::Result<()> {
        remove_if_present(&self.entry_path(key)).await
    }

    /// Delete every entry and temp file.
    pub async fn clear(&self) -> std::io::Result<()> {
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if is_cache_file(&path) {
                remove_if_present(&path).await?;
            }
        }
        Ok(())
    }

    /// Remove expired entries, then the oldest ones until the tier fits in
    /// `max_bytes`.
    pub async fn compact(&self, max_bytes: Option<u64>) -> std::io::Result<CompactionReport> {
        let now = Utc::now();
        let mut report = CompactionReport::default();
        let mut live = Vec::new();

        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            let metadata = match item.metadata().await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };

            if has_ext(&path, TEMP_EXT) {
                let stale = metadata
                    .modified()
                    .ok()
                    .and_then(|m| m.elapsed().ok())
                    .is_some_and(|age| age > STALE_TEMP_AGE);
                if stale {
                    remove_if_present(&path).await?;
                }
                continue;
            }
            if !has_ext(&path, ENTRY_EXT) {
                continue;
            }

            let envelope = match fs::read(&path).await {
                Ok(raw) => serde_json::from_slice::<DiskEnvelope>(&raw).ok(),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };

            match envelope {
                Some(envelope) if envelope.expires_at > now => live.push(EntryInfo {
                    path,
                    size: metadata.len(),
                    created_at: envelope.created_at,
                }),
                _ => {
                    remove_if_present(&path).await?;
                    report.expired_removed += 1;
                }
            }
        }

        let mut total: u64 = live.iter().map(|e| e.size).sum();
        if let Some(max_bytes) = max_bytes {
            live.sort_by_key(|e| e.created_at);
            let mut keep = Vec::with_capacity(live.len());
            for entry in live {
                if total > max_bytes {
                    remove_if_present(&entry.path).await?;
                    total -= entry.size;
                    report.evicted += 1;
                } else {
                    keep.push(entry);
                }
            }
            live = keep;
        }

        report.entries_after = live.len();
        report.bytes_after = total;
        debug!(
            dir = %self.dir.display(),
            expired = report.expired_removed,
            evicted = report.evicted,
            bytes = report.bytes_after,
            "Disk cache compacted"
        );
        Ok(report)
    }
}

fn has_ext(path: &Path, ext: &str) -> bool {
    path.extension().is_some_and(|e| e == ext)
}

fn is_cache_file(path: &Path) -> bool {
    has_ext(path, ENTRY_EXT) || has_ext(path, TEMP_EXT)
}

async fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

//! Two-tier cache: a bounded in-process tier over a file-per-entry disk tier.

pub mod disk_tier;
pub mod fingerprint;
pub mod keyed_locks;
pub mod manager;
pub mod memory_tier;

pub use disk_tier::{CompactionReport, DiskTier};
pub use fingerprint::{normalize_text, query_fingerprint, text_fingerprint};
pub use keyed_locks::KeyedLocks;
pub use manager::{CacheManager, CacheStats};
pub use memory_tier::MemoryTier;

//! Infrastructure layer module
//!
//! Adapters for everything outside the process:
//! - Vector index clients (REST and in-memory) and the local encoder
//! - Two-tier cache (moka memory tier, file-per-entry disk tier)
//! - Configuration management
//! - Logging infrastructure
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod cache;
pub mod config;
pub mod logging;
pub mod vector;

//! Domain layer for the patternbase knowledge core
//!
//! Core models, ports and the error taxonomy. Nothing in here performs I/O.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{ComponentFailure, KnowledgeError, KnowledgeResult};

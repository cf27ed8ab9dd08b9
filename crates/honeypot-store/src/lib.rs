//! honeypot-store: Fake model registry
//!
//! This crate provides the registry of "installed" models:
//! - Concurrent key-value store keyed by normalized `name:tag`
//! - Snapshot persistence to the mock directory's `tags.json`

pub mod registry;
pub mod snapshot;

pub use registry::ModelRegistry;
pub use snapshot::{JsonFileSnapshot, SnapshotStore};

//! honeypot-network: Upstream registry access
//!
//! Pulls of unknown models need a real layer list so the simulated download
//! reports believable sizes and digests. This crate fetches manifests from
//! the public model registry.

pub mod manifest;

pub use manifest::{ManifestFetcher, RegistryClient};

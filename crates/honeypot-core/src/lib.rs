//! honeypot-core: Core types for the Ollama honeypot
//!
//! This crate provides the fundamental types shared by every other crate:
//! - Fake model records, layers and detail blocks
//! - Model name normalization (`name:tag`)
//! - Configuration types
//! - Error handling

pub mod config;
pub mod error;
pub mod model;

pub use config::*;
pub use error::*;
pub use model::*;

//! honeypot-api: HTTP surface of the honeypot
//!
//! This crate exposes the impersonated endpoints:
//! - Ollama native API (`/api/*`)
//! - OpenAI compatible API (`/v1/*` and unprefixed aliases)
//! - Request audit logging

pub mod audit;
pub mod completions;
pub mod models;
pub mod rest;

pub use rest::{create_router, AppState};

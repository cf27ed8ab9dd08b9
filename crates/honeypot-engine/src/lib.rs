//! honeypot-engine: Protocol-faithful response fabrication
//!
//! This crate produces everything the honeypot sends back to a client:
//! - Canned response corpus and text fabrication
//! - Ollama and OpenAI completion frames with fabricated timing
//! - Paced NDJSON / SSE frame streaming with disconnect detection
//! - Simulated model downloads over a noisy bandwidth curve

pub mod completion;
pub mod corpus;
pub mod fabricator;
pub mod pull;
pub mod stream;
pub mod timing;

pub use completion::CompletionEngine;
pub use corpus::{ResponseCorpus, ResponseTemplate};
pub use fabricator::{chunk, TextFabricator};
pub use pull::{BandwidthCurve, PullProgress, PullSimulator};
pub use stream::{FrameSink, FrameStream, Framing};
pub use timing::CompletionTiming;

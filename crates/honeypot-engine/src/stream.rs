//! Paced frame streaming
//!
//! A producer task hands frames one at a time to the writer over a single-slot
//! channel. The writer side is the HTTP body: when the peer goes away the body
//! is dropped, the channel closes, and the producer stops at its next send or
//! pause. Dropping the stream also aborts the producer task outright.

use futures::{Stream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::error;

/// Literal terminator of every SSE stream
pub const SSE_DONE: &str = "data: [DONE]\n\n";

/// Wire framing of a streamed response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One JSON object per line
    Ndjson,
    /// `data: <json>` events followed by `data: [DONE]`
    Sse,
}

impl Framing {
    pub fn content_type(&self) -> &'static str {
        match self {
            Framing::Ndjson => "application/x-ndjson",
            Framing::Sse => "text/event-stream",
        }
    }

    /// Response headers, content type included
    pub fn headers(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Framing::Ndjson => &[("content-type", "application/x-ndjson")],
            Framing::Sse => &[
                ("content-type", "text/event-stream"),
                ("cache-control", "no-cache"),
                ("connection", "keep-alive"),
            ],
        }
    }

    /// Serialize one frame
    pub fn encode<T: Serialize>(&self, frame: &T) -> serde_json::Result<String> {
        let json = serde_json::to_string(frame)?;
        Ok(match self {
            Framing::Ndjson => format!("{}\n", json),
            Framing::Sse => format!("data: {}\n\n", json),
        })
    }

    /// Bytes written after the last frame
    pub fn trailer(&self) -> Option<&'static str> {
        match self {
            Framing::Ndjson => None,
            Framing::Sse => Some(SSE_DONE),
        }
    }
}

/// The reading side of the stream has gone away
#[derive(Debug, Error, PartialEq, Eq)]
#[error("peer disconnected")]
pub struct Disconnected;

/// Producer handle for a [`FrameStream`]
pub struct FrameSink<T> {
    tx: mpsc::Sender<T>,
}

impl<T> FrameSink<T> {
    /// Hand over a frame, waiting until the previous one was taken
    pub async fn send(&self, frame: T) -> Result<(), Disconnected> {
        self.tx.send(frame).await.map_err(|_| Disconnected)
    }

    /// Pacing delay that ends early when the reader disconnects
    pub async fn pause(&self, duration: Duration) -> Result<(), Disconnected> {
        if duration.is_zero() {
            return if self.tx.is_closed() {
                Err(Disconnected)
            } else {
                Ok(())
            };
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.tx.closed() => Err(Disconnected),
        }
    }
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Lazily produced sequence of frames backed by a producer task
pub struct FrameStream<T> {
    rx: mpsc::Receiver<T>,
    producer: AbortOnDrop,
}

impl<T: Send + 'static> FrameStream<T> {
    /// Spawn `producer` and return the stream of frames it sends
    pub fn spawn<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(FrameSink<T>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(producer(FrameSink { tx }));
        Self {
            rx,
            producer: AbortOnDrop(task),
        }
    }

    /// Next frame, `None` once the producer is done
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Drain every frame; used where the whole stream is needed at once
    pub async fn collect(mut self) -> Vec<T> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next().await {
            frames.push(frame);
        }
        frames
    }
}

impl<T: Serialize + Send + 'static> FrameStream<T> {
    /// Encode frames with `framing`, appending the framing's trailer
    pub fn encode(self, framing: Framing) -> impl Stream<Item = Result<String, Infallible>> + Send {
        let FrameStream { rx, producer } = self;

        let frames = ReceiverStream::new(rx).filter_map(move |frame| {
            // Keeps the producer alive exactly as long as the body
            let _guard = &producer;
            let encoded = match framing.encode(&frame) {
                Ok(encoded) => Some(Ok(encoded)),
                Err(e) => {
                    error!(error = %e, "Failed to encode frame");
                    None
                }
            };
            futures::future::ready(encoded)
        });

        let trailer = futures::stream::iter(framing.trailer().map(|t| Ok(t.to_string())));

        frames.chain(trailer)
    }
}

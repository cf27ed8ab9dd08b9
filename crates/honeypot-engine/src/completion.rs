//! Ollama and OpenAI completion frames

use chrono::{SecondsFormat, Utc};
use honeypot_core::StreamConfig;
use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;
use tokio::time::Instant;

use crate::fabricator::{chunk, TextFabricator};
use crate::stream::FrameStream;
use crate::timing::CompletionTiming;

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// One `/api/generate` frame
#[derive(Debug, Clone, Serialize)]
pub struct GenerateFrame {
    pub model: String,
    pub created_at: String,
    pub response: String,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<&'static str>,
    #[serde(flatten)]
    pub timing: Option<CompletionTiming>,
}

impl GenerateFrame {
    fn content(model: &str, response: &str) -> Self {
        Self {
            model: model.to_string(),
            created_at: now_rfc3339(),
            response: response.to_string(),
            done: false,
            done_reason: None,
            timing: None,
        }
    }

    fn done(model: &str, response: String, reason: &'static str, timing: CompletionTiming) -> Self {
        Self {
            model: model.to_string(),
            created_at: now_rfc3339(),
            response,
            done: true,
            done_reason: Some(reason),
            timing: Some(timing),
        }
    }
}

/// Message body of a chat frame
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: content.into(),
        }
    }
}

/// One `/api/chat` frame
#[derive(Debug, Clone, Serialize)]
pub struct ChatFrame {
    pub model: String,
    pub created_at: String,
    pub message: ChatMessage,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<&'static str>,
    #[serde(flatten)]
    pub timing: Option<CompletionTiming>,
}

impl ChatFrame {
    fn content(model: &str, content: &str) -> Self {
        Self {
            model: model.to_string(),
            created_at: now_rfc3339(),
            message: ChatMessage::assistant(content),
            done: false,
            done_reason: None,
            timing: None,
        }
    }

    fn done(model: &str, content: String, timing: CompletionTiming) -> Self {
        Self {
            model: model.to_string(),
            created_at: now_rfc3339(),
            message: ChatMessage::assistant(content),
            done: true,
            done_reason: Some("stop"),
            timing: Some(timing),
        }
    }
}

/// Incremental content of an OpenAI stream chunk
#[derive(Debug, Clone, Default, Serialize)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<&'static str>,
}

/// One `chat.completion.chunk` event
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: Option<&'static str>,
}

/// Character counts standing in for token usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// Non-streamed `chat.completion` document
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    pub usage: Usage,
}

fn completion_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("chatcmpl-{}", rng.gen_range(0..i64::MAX))
}

/// Turns fabricated text into paced completion frames
#[derive(Debug, Clone)]
pub struct CompletionEngine {
    fabricator: TextFabricator,
    config: StreamConfig,
}

impl CompletionEngine {
    pub fn new(fabricator: TextFabricator, config: StreamConfig) -> Self {
        Self { fabricator, config }
    }

    pub fn fabricator(&self) -> &TextFabricator {
        &self.fabricator
    }

    /// Streamed `/api/generate` reply; an empty prompt yields one done frame
    pub fn generate(&self, model: &str, prompt: &str, mut rng: StdRng) -> FrameStream<GenerateFrame> {
        let model = model.to_string();

        if prompt.trim().is_empty() {
            return FrameStream::spawn(move |sink| async move {
                let started = Instant::now();
                let timing = CompletionTiming::generate(started.elapsed(), 0, 0, &mut rng);
                let _ = sink
                    .send(GenerateFrame::done(&model, String::new(), "load", timing))
                    .await;
            });
        }

        let text = self.fabricator.fabricate(&mut rng);
        let prompt_len = char_len(prompt);
        let config = self.config.clone();

        FrameStream::spawn(move |sink| async move {
            let started = Instant::now();
            for piece in chunk(&text, config.chunk_size) {
                if sink.send(GenerateFrame::content(&model, piece)).await.is_err() {
                    return;
                }
                if sink.pause(config.chunk_delay()).await.is_err() {
                    return;
                }
            }

            let timing =
                CompletionTiming::generate(started.elapsed(), prompt_len, char_len(&text), &mut rng);
            let _ = sink
                .send(GenerateFrame::done(&model, String::new(), "stop", timing))
                .await;
        })
    }

    /// Whole `/api/generate` reply as a single document
    pub fn generate_document(&self, model: &str, prompt: &str, mut rng: StdRng) -> GenerateFrame {
        let started = Instant::now();
        if prompt.trim().is_empty() {
            let timing = CompletionTiming::generate(started.elapsed(), 0, 0, &mut rng);
            return GenerateFrame::done(model, String::new(), "load", timing);
        }

        let text = self.fabricator.fabricate(&mut rng);
        let timing =
            CompletionTiming::generate(started.elapsed(), char_len(prompt), char_len(&text), &mut rng);
        GenerateFrame::done(model, text, "stop", timing)
    }

    /// Streamed `/api/chat` reply; `last_user` feeds `prompt_eval_count`
    pub fn chat(&self, model: &str, last_user: &str, mut rng: StdRng) -> FrameStream<ChatFrame> {
        let model = model.to_string();
        let text = self.fabricator.fabricate(&mut rng);
        let prompt_len = char_len(last_user);
        let config = self.config.clone();

        FrameStream::spawn(move |sink| async move {
            let started = Instant::now();
            for piece in chunk(&text, config.chunk_size) {
                if sink.send(ChatFrame::content(&model, piece)).await.is_err() {
                    return;
                }
                if sink.pause(config.chunk_delay()).await.is_err() {
                    return;
                }
            }

            let timing =
                CompletionTiming::chat(started.elapsed(), prompt_len, char_len(&text), &mut rng);
            let _ = sink.send(ChatFrame::done(&model, String::new(), timing)).await;
        })
    }

    /// Whole `/api/chat` reply as a single document
    pub fn chat_document(&self, model: &str, last_user: &str, mut rng: StdRng) -> ChatFrame {
        let started = Instant::now();
        let text = self.fabricator.fabricate(&mut rng);
        let timing =
            CompletionTiming::chat(started.elapsed(), char_len(last_user), char_len(&text), &mut rng);
        ChatFrame::done(model, text, timing)
    }

    /// Streamed OpenAI reply: role chunk, content chunks, then a stop chunk
    pub fn openai_chat(&self, model: &str, mut rng: StdRng) -> FrameStream<ChatCompletionChunk> {
        let model = model.to_string();
        let text = self.fabricator.fabricate(&mut rng);
        let id = completion_id(&mut rng);
        let created = Utc::now().timestamp();
        let config = self.config.clone();

        FrameStream::spawn(move |sink| async move {
            let frame = |delta: Delta, finish_reason: Option<&'static str>| ChatCompletionChunk {
                id: id.clone(),
                object: "chat.completion.chunk",
                created,
                model: model.clone(),
                choices: vec![ChunkChoice {
                    index: 0,
                    delta,
                    finish_reason,
                }],
            };

            let role = Delta {
                role: Some("assistant"),
                content: None,
            };
            if sink.send(frame(role, None)).await.is_err() {
                return;
            }

            for piece in chunk(&text, config.chunk_size) {
                let delta = Delta {
                    role: None,
                    content: Some(piece.to_string()),
                };
                if sink.send(frame(delta, None)).await.is_err() {
                    return;
                }
                if sink.pause(config.chunk_delay()).await.is_err() {
                    return;
                }
            }

            let _ = sink.send(frame(Delta::default(), Some("stop"))).await;
        })
    }

    /// Non-streamed OpenAI reply with character-count usage
    pub fn openai_chat_document(
        &self,
        model: &str,
        user_contents: &[&str],
        mut rng: StdRng,
    ) -> ChatCompletion {
        let text = self.fabricator.fabricate(&mut rng);
        let prompt_tokens = char_len(&user_contents.join(" "));
        let completion_tokens = char_len(&text);

        ChatCompletion {
            id: completion_id(&mut rng),
            object: "chat.completion",
            created: Utc::now().timestamp(),
            model: model.to_string(),
            choices: vec![CompletionChoice {
                index: 0,
                message: ChatMessage::assistant(text),
                finish_reason: Some("stop"),
            }],
            usage: Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        }
    }
}

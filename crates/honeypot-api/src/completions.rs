//! Completion endpoints: Ollama generate/chat and OpenAI chat completions

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use honeypot_core::ModelName;
use honeypot_engine::Framing;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::rest::{parse_body, stream_response, ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub stream: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub options: Option<Value>,
    #[serde(default)]
    pub think: Option<Value>,
    #[serde(default)]
    pub tools: Option<Value>,
}

/// OpenAI chat request; sampling fields are only recorded
#[derive(Debug, Deserialize)]
pub struct OpenAiChatRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    #[serde(default)]
    pub stop: Option<Value>,
    #[serde(default)]
    pub tools: Option<Value>,
}

fn user_contents(messages: &[Message]) -> Vec<&str> {
    messages
        .iter()
        .filter(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .collect()
}

/// Resolve an Ollama model reference to its installed `name:tag`
async fn require_model(state: &AppState, model: &str) -> Result<String, ApiError> {
    let name = ModelName::parse(model).full();
    if state.registry.contains(&name).await {
        Ok(name)
    } else {
        Err(ApiError::model_not_found())
    }
}

/// POST /api/generate
pub async fn generate(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response, ApiError> {
    let request: GenerateRequest = parse_body(&body)?;
    info!(target: "audit", model = %request.model, prompt = %request.prompt, "generate");
    let model = require_model(&state, &request.model).await?;

    if request.stream == Some(false) {
        let document = state
            .completions
            .generate_document(&model, &request.prompt, state.rng());
        return Ok(Json(document).into_response());
    }

    let frames = state
        .completions
        .generate(&model, &request.prompt, state.rng());
    Ok(stream_response(frames, Framing::Ndjson))
}

/// POST /api/chat
pub async fn chat(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response, ApiError> {
    let request: ChatRequest = parse_body(&body)?;
    let users = user_contents(&request.messages);
    info!(
        target: "audit",
        model = %request.model,
        messages = ?users,
        options = ?request.options,
        think = ?request.think,
        tools = request.tools.is_some(),
        "chat"
    );
    let model = require_model(&state, &request.model).await?;

    let last_user = users.last().copied().unwrap_or("");
    if request.stream == Some(false) {
        let document = state
            .completions
            .chat_document(&model, last_user, state.rng());
        return Ok(Json(document).into_response());
    }

    let frames = state.completions.chat(&model, last_user, state.rng());
    Ok(stream_response(frames, Framing::Ndjson))
}

/// POST /v1/chat/completions
///
/// Any model name is accepted, like the real compatibility layer does for
/// clients probing with OpenAI model ids.
pub async fn openai_chat(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: OpenAiChatRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Malformed chat completion request");
            return ApiError::openai(StatusCode::BAD_REQUEST, "invalid request").into_response();
        }
    };
    let users = user_contents(&request.messages);
    info!(
        target: "audit",
        model = %request.model,
        messages = ?users,
        stream = request.stream,
        temperature = ?request.temperature,
        top_p = ?request.top_p,
        max_tokens = ?request.max_tokens,
        stop = ?request.stop,
        tools = request.tools.is_some(),
        "openai chat"
    );

    if request.stream {
        let frames = state.completions.openai_chat(&request.model, state.rng());
        return stream_response(frames, Framing::Sse);
    }

    Json(
        state
            .completions
            .openai_chat_document(&request.model, &users, state.rng()),
    )
    .into_response()
}

//! Router, shared state and response helpers

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderName, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use honeypot_core::{HoneypotConfig, HoneypotError, MockConfig};
use honeypot_engine::{
    CompletionEngine, FrameStream, Framing, PullSimulator, ResponseCorpus, TextFabricator,
};
use honeypot_network::ManifestFetcher;
use honeypot_store::ModelRegistry;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::{audit, completions, models};

/// Version reported when the mock directory has no `version.json`
pub const DEFAULT_VERSION: &str = "0.6.8";

/// Application state shared across handlers
pub struct AppState {
    pub registry: Arc<ModelRegistry>,
    pub pulls: PullSimulator,
    pub completions: CompletionEngine,
    pub mock: MockConfig,
}

impl AppState {
    pub fn new(
        registry: Arc<ModelRegistry>,
        corpus: Arc<ResponseCorpus>,
        fetcher: Arc<dyn ManifestFetcher>,
        config: &HoneypotConfig,
    ) -> Self {
        Self {
            pulls: PullSimulator::new(registry.clone(), fetcher, config.pull.clone()),
            completions: CompletionEngine::new(
                TextFabricator::new(corpus),
                config.stream.clone(),
            ),
            registry,
            mock: config.mock.clone(),
        }
    }

    /// Fresh random source for one request
    pub fn rng(&self) -> StdRng {
        StdRng::from_entropy()
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/api/version", get(version))
        .route("/api/tags", get(models::tags))
        .route("/api/ps", get(models::ps))
        .route("/api/pull", post(models::pull))
        .route("/api/delete", delete(models::delete_model))
        .route("/api/show", post(models::show))
        .route("/api/generate", post(completions::generate))
        .route("/api/chat", post(completions::chat))
        .route("/v1/models", get(models::openai_models))
        .route("/v1/chat/completions", post(completions::openai_chat))
        .route("/models", get(models::openai_models))
        .route("/chat/completions", post(completions::openai_chat))
        .layer(middleware::from_fn(audit::audit_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Failure reported before any response byte is written
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    pub fn invalid_request() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!({ "error": "invalid request" }),
        }
    }

    pub fn model_not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: json!({ "error": "model not found" }),
        }
    }

    /// OpenAI error envelope
    pub fn openai(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            body: json!({
                "error": { "message": message, "type": "invalid_request_error" }
            }),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<HoneypotError> for ApiError {
    fn from(err: HoneypotError) -> Self {
        debug!(error = %err, "Request failed");
        match err {
            HoneypotError::InvalidRequest(_) => ApiError::invalid_request(),
            _ => ApiError::model_not_found(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Decode a JSON body regardless of the declared content type
pub fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, HoneypotError> {
    serde_json::from_slice(body).map_err(|e| HoneypotError::InvalidRequest(e.to_string()))
}

/// Streamed response writing `frames` with `framing`
pub fn stream_response<T>(frames: FrameStream<T>, framing: Framing) -> Response
where
    T: Serialize + Send + 'static,
{
    let mut response = Response::new(Body::from_stream(frames.encode(framing)));
    let headers = response.headers_mut();
    for (name, value) in framing.headers() {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    response
}

/// Liveness probe, answered exactly like the real server
async fn health() -> &'static str {
    "Ollama is running"
}

/// Version document from the mock directory
async fn version(State(state): State<Arc<AppState>>) -> Json<Value> {
    let path = state.mock.version_file();
    let version = match tokio::fs::read(&path).await {
        Ok(bytes) => serde_json::from_slice::<Value>(&bytes).ok(),
        Err(_) => None,
    };
    Json(version.unwrap_or_else(|| json!({ "version": DEFAULT_VERSION })))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;
    use honeypot_core::{HoneypotResult, Layer, ModelName, ModelRecord};
    use honeypot_engine::ResponseTemplate;
    use http_body_util::BodyExt;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use tower::ServiceExt;

    pub struct FakeFetcher(pub HashMap<String, Vec<Layer>>);

    #[async_trait]
    impl ManifestFetcher for FakeFetcher {
        async fn fetch(&self, name: &ModelName) -> HoneypotResult<Vec<Layer>> {
            self.0
                .get(&name.full())
                .cloned()
                .ok_or_else(|| HoneypotError::Upstream("status 404 Not Found".to_string()))
        }
    }

    pub fn layer(size: u64) -> Layer {
        Layer::new(
            format!("sha256:{}", "ab".repeat(32)),
            size,
            "application/vnd.ollama.image.model",
        )
    }

    /// Router with `installed` models and a one-template corpus
    pub async fn router(installed: &[&str], upstream: Vec<(&str, Vec<Layer>)>) -> Router {
        let registry = Arc::new(ModelRegistry::new());
        for name in installed {
            let name = ModelName::parse(name);
            registry
                .put(
                    &name.full(),
                    ModelRecord::from_layers(&name, vec![layer(2048)], chrono::Utc::now()),
                )
                .await;
        }

        let corpus = ResponseCorpus::from_templates(vec![ResponseTemplate {
            text: "hi ".to_string(),
            repeat_min: 2,
            repeat_max: 2,
        }])
        .unwrap();

        let mut config = HoneypotConfig::default();
        config.mock.path = PathBuf::from("/nonexistent/honeypot-mock");
        config.pull.speed = 1024;
        config.pull.variance = 0.0;
        config.pull.wave_amplitude = 0.0;

        let fetcher = FakeFetcher(
            upstream
                .into_iter()
                .map(|(name, layers)| (name.to_string(), layers))
                .collect(),
        );
        let state = AppState::new(registry, Arc::new(corpus), Arc::new(fetcher), &config);
        create_router(Arc::new(state))
    }

    pub async fn send(
        router: &Router,
        method: &str,
        uri: &str,
        body: Option<&str>,
    ) -> (StatusCode, axum::http::HeaderMap, String) {
        let request = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.unwrap_or("").to_string()))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_health() {
        let router = router(&[], vec![]).await;
        let (status, _, body) = send(&router, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Ollama is running");
    }

    #[tokio::test]
    async fn test_version_fallback() {
        let router = router(&[], vec![]).await;
        let (status, _, body) = send(&router, "GET", "/api/version", None).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["version"], DEFAULT_VERSION);
    }

    #[test]
    fn test_error_mapping() {
        let err: ApiError = HoneypotError::Upstream("timeout".to_string()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let err: ApiError = HoneypotError::InvalidRequest("eof".to_string()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_parse_body_rejects_garbage() {
        let result: Result<Value, _> = parse_body(&Bytes::from_static(b"{oops"));
        assert!(matches!(result, Err(HoneypotError::InvalidRequest(_))));
    }
}

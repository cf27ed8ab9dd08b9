//! Model management endpoints: tags, ps, show, pull, delete and the OpenAI model list

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use honeypot_core::{ModelDetails, ModelName, ModelRecord};
use honeypot_engine::pull::STATUS_SUCCESS;
use honeypot_engine::Framing;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;

use crate::rest::{parse_body, stream_response, ApiError, AppState};

/// Context length advertised for every loaded model
const CONTEXT_LENGTH: u64 = 65_536;
/// Keep-alive reported in `/api/ps`
const KEEP_ALIVE_MINUTES: i64 = 150;
/// Creation time reported in the OpenAI model list
const OPENAI_CREATED: i64 = 1_677_610_602;

const SHOW_LICENSE: &str = "MIT";
const SHOW_PARAMETERS: &str = "temperature 0.7\nnum_ctx 2048";
const SHOW_TEMPLATE: &str = "{{ .Prompt }}";

/// `{name}` request used by pull, show and delete
#[derive(Debug, Deserialize)]
pub struct ModelRequest {
    #[serde(alias = "model")]
    pub name: String,
    #[serde(default)]
    pub stream: Option<bool>,
}

/// Details block as the real server prints it
#[derive(Debug, Serialize)]
struct DetailsView<'a> {
    parent_model: &'a str,
    format: &'a str,
    family: &'a str,
    families: &'a [String],
    parameter_size: &'a str,
    quantization_level: &'a str,
}

impl<'a> From<&'a ModelDetails> for DetailsView<'a> {
    fn from(details: &'a ModelDetails) -> Self {
        Self {
            parent_model: "",
            format: &details.format,
            family: &details.family,
            families: &details.families,
            parameter_size: &details.parameter_size,
            quantization_level: &details.quantization_level,
        }
    }
}

#[derive(Debug, Serialize)]
struct TagEntry<'a> {
    name: &'a str,
    model: &'a str,
    modified_at: &'a str,
    size: u64,
    digest: &'a str,
    details: DetailsView<'a>,
}

#[derive(Debug, Serialize)]
struct RunningModel<'a> {
    name: &'a str,
    model: &'a str,
    size: u64,
    digest: &'a str,
    details: DetailsView<'a>,
    expires_at: &'a str,
    size_vram: u64,
    context_length: u64,
}

#[derive(Debug, Serialize)]
struct ShowResponse<'a> {
    license: &'static str,
    modelfile: String,
    parameters: &'static str,
    template: &'static str,
    details: DetailsView<'a>,
    model_info: Map<String, Value>,
    modified_at: &'a str,
}

#[derive(Debug, Serialize)]
struct OpenAiModel<'a> {
    id: &'a str,
    object: &'static str,
    created: i64,
    owned_by: &'static str,
}

/// GET /api/tags
pub async fn tags(State(state): State<Arc<AppState>>) -> Json<Value> {
    let models = state.registry.list().await;
    let entries: Vec<TagEntry> = models
        .iter()
        .map(|record| TagEntry {
            name: &record.name,
            model: &record.name,
            modified_at: &record.modified_at,
            size: record.size,
            digest: &record.digest,
            details: (&record.details).into(),
        })
        .collect();
    Json(json!({ "models": entries }))
}

/// GET /api/ps: every installed model pretends to be loaded
pub async fn ps(State(state): State<Arc<AppState>>) -> Json<Value> {
    let expires_at = (Utc::now() + ChronoDuration::minutes(KEEP_ALIVE_MINUTES))
        .to_rfc3339_opts(SecondsFormat::Nanos, true);
    let models = state.registry.list().await;
    let running: Vec<RunningModel> = models
        .iter()
        .map(|record| RunningModel {
            name: &record.name,
            model: &record.name,
            size: record.size,
            digest: &record.digest,
            details: (&record.details).into(),
            expires_at: &expires_at,
            size_vram: record.size,
            context_length: CONTEXT_LENGTH,
        })
        .collect();
    Json(json!({ "models": running }))
}

/// POST /api/show
pub async fn show(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response, ApiError> {
    let request: ModelRequest = parse_body(&body)?;
    let name = ModelName::parse(&request.name);
    info!(target: "audit", model = %name, "show");

    let record = state
        .registry
        .get(&name.full())
        .await
        .ok_or_else(ApiError::model_not_found)?;

    let response = ShowResponse {
        license: SHOW_LICENSE,
        modelfile: modelfile(&record),
        parameters: SHOW_PARAMETERS,
        template: SHOW_TEMPLATE,
        details: (&record.details).into(),
        model_info: model_info(&record),
        modified_at: &record.modified_at,
    };
    Ok(Json(response).into_response())
}

/// DELETE /api/delete: succeeds whether or not the model exists
pub async fn delete_model(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let request: ModelRequest = parse_body(&body)?;
    let name = ModelName::parse(&request.name);
    info!(target: "audit", model = %name, "delete");

    if state.registry.delete(&name.full()).await {
        state.registry.persist().await;
    }
    Ok(StatusCode::OK)
}

/// POST /api/pull
pub async fn pull(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response, ApiError> {
    let request: ModelRequest = parse_body(&body)?;
    let name = ModelName::parse(&request.name);
    info!(target: "audit", model = %name, "pull");

    let frames = state.pulls.pull(&name, state.rng()).await?;

    if request.stream == Some(false) {
        // Drain the whole simulation, then answer like the real server does
        let _ = frames.collect().await;
        return Ok(Json(json!({ "status": STATUS_SUCCESS })).into_response());
    }
    Ok(stream_response(frames, Framing::Ndjson))
}

/// GET /v1/models
pub async fn openai_models(State(state): State<Arc<AppState>>) -> Json<Value> {
    let models = state.registry.list().await;
    let data: Vec<OpenAiModel> = models
        .iter()
        .map(|record| OpenAiModel {
            id: &record.name,
            object: "model",
            created: OPENAI_CREATED,
            owned_by: "openai",
        })
        .collect();
    Json(json!({ "object": "list", "data": data }))
}

fn modelfile(record: &ModelRecord) -> String {
    format!(
        "# Modelfile generated by \"ollama show\"\n\
         # To build a new Modelfile based on this, replace FROM with:\n\
         # FROM {name}\n\n\
         FROM {name}\n",
        name = record.name
    )
}

fn model_info(record: &ModelRecord) -> Map<String, Value> {
    let details = &record.details;
    let architecture = if details.architecture.is_empty() {
        details.family.as_str()
    } else {
        details.architecture.as_str()
    };
    let parameter_count = if details.parameter_size.is_empty() {
        "7B"
    } else {
        details.parameter_size.as_str()
    };

    let mut info = Map::new();
    info.insert("general.architecture".to_string(), json!(architecture));
    info.insert(
        "general.file_type".to_string(),
        json!(details.quantization_level),
    );
    info.insert("general.parameter_count".to_string(), json!(parameter_count));
    info.insert(
        "general.quantization".to_string(),
        json!(details.quantization_level),
    );
    info
}

#[cfg(test)]
mod tests {
    use crate::rest::test_support::*;
    use axum::http::StatusCode;
    use serde_json::Value;

    #[tokio::test]
    async fn test_tags_lists_installed_models() {
        let router = router(&["llama3:8b", "qwen2"], vec![]).await;
        let (status, _, body) = send(&router, "GET", "/api/tags", None).await;
        assert_eq!(status, StatusCode::OK);

        let json: Value = serde_json::from_str(&body).unwrap();
        let models = json["models"].as_array().unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0]["name"], "llama3:8b");
        assert_eq!(models[0]["model"], "llama3:8b");
        assert_eq!(models[0]["size"], 2048);
        assert_eq!(models[0]["details"]["parameter_size"], "8B");
        assert_eq!(models[1]["name"], "qwen2:latest");
    }

    #[tokio::test]
    async fn test_tags_empty() {
        let router = router(&[], vec![]).await;
        let (_, _, body) = send(&router, "GET", "/api/tags", None).await;
        assert_eq!(body, r#"{"models":[]}"#);
    }

    #[tokio::test]
    async fn test_ps_reports_vram_and_context() {
        let router = router(&["mistral:7b"], vec![]).await;
        let (_, _, body) = send(&router, "GET", "/api/ps", None).await;
        let json: Value = serde_json::from_str(&body).unwrap();
        let model = &json["models"][0];
        assert_eq!(model["size_vram"], model["size"]);
        assert_eq!(model["context_length"], 65536);
        assert!(model["expires_at"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_show_existing_and_missing() {
        let router = router(&["llama3"], vec![]).await;

        let (status, _, body) =
            send(&router, "POST", "/api/show", Some(r#"{"name":"llama3"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert!(json["modelfile"].as_str().unwrap().contains("FROM llama3:latest"));
        assert!(json["model_info"]["general.architecture"].is_string());
        assert_eq!(json["license"], "MIT");
        assert_eq!(json["parameters"], "temperature 0.7\nnum_ctx 2048");
        assert_eq!(json["template"], "{{ .Prompt }}");
        let quantization = &json["details"]["quantization_level"];
        assert_eq!(&json["model_info"]["general.file_type"], quantization);
        assert_eq!(&json["model_info"]["general.quantization"], quantization);

        let (status, _, body) =
            send(&router, "POST", "/api/show", Some(r#"{"name":"nope"}"#)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, r#"{"error":"model not found"}"#);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let router = router(&["llama3"], vec![]).await;

        for _ in 0..2 {
            let (status, _, body) =
                send(&router, "DELETE", "/api/delete", Some(r#"{"name":"llama3"}"#)).await;
            assert_eq!(status, StatusCode::OK);
            assert!(body.is_empty());
        }

        let (_, _, body) = send(&router, "GET", "/api/tags", None).await;
        assert_eq!(body, r#"{"models":[]}"#);
    }

    #[tokio::test]
    async fn test_delete_malformed_body() {
        let router = router(&[], vec![]).await;
        let (status, _, body) = send(&router, "DELETE", "/api/delete", Some("name=x")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, r#"{"error":"invalid request"}"#);
    }

    #[tokio::test]
    async fn test_pull_unknown_upstream_is_not_found() {
        let router = router(&[], vec![]).await;
        let (status, _, body) =
            send(&router, "POST", "/api/pull", Some(r#"{"name":"ghost"}"#)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, r#"{"error":"model not found"}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pull_streams_then_installs() {
        let router = router(&[], vec![("tinyllama:latest", vec![layer(4096)])]).await;

        let (status, headers, body) =
            send(&router, "POST", "/api/pull", Some(r#"{"name":"tinyllama"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], "application/x-ndjson");

        let frames: Vec<Value> = body
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(frames.first().unwrap()["status"], "pulling manifest");
        assert_eq!(frames.last().unwrap()["status"], "success");
        let last_layer = frames
            .iter()
            .filter(|f| f.get("completed").is_some())
            .last()
            .unwrap();
        assert_eq!(last_layer["status"], "pulling layers");
        assert_eq!(last_layer["completed"], 4096);
        assert_eq!(last_layer["total"], 4096);

        let (_, _, body) = send(&router, "GET", "/api/tags", None).await;
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["models"][0]["name"], "tinyllama:latest");
        assert_eq!(json["models"][0]["details"]["quantization_level"], "Q4_K_M");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pull_without_streaming() {
        let router = router(&[], vec![("phi3:mini", vec![layer(100)])]).await;
        let (status, _, body) = send(
            &router,
            "POST",
            "/api/pull",
            Some(r#"{"model":"phi3:mini","stream":false}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"status":"success"}"#);
    }

    #[tokio::test]
    async fn test_openai_models() {
        let router = router(&["llama3"], vec![]).await;
        let (_, _, body) = send(&router, "GET", "/models", None).await;
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["object"], "list");
        assert_eq!(json["data"][0]["id"], "llama3:latest");
        assert_eq!(json["data"][0]["owned_by"], "openai");
        assert_eq!(json["data"][0]["created"], 1677610602);
    }
}

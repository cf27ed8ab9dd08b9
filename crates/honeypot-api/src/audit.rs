//! Request audit logging
//!
//! Every request is recorded on the `audit` tracing target before it reaches a
//! handler. The daemon routes that target to the audit log file.

use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, Request},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tracing::{info, info_span, warn, Instrument};

use crate::rest::ApiError;

/// Tracing target of audit events
pub const AUDIT_TARGET: &str = "audit";

/// Longest body excerpt written to the audit log
pub const MAX_LOGGED_BODY: usize = 1000;

/// Largest request body accepted at all
const MAX_BODY: usize = 16 * 1024 * 1024;

/// Middleware logging source address, request line, headers of interest and body
pub async fn audit_requests(request: Request, next: Next) -> Response {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or("").to_string();
    let user_agent = request
        .headers()
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();

    let (parts, body) = request.into_parts();
    let (excerpt, body) = if carries_body(&method) {
        match to_bytes(body, MAX_BODY).await {
            Ok(bytes) => (excerpt(&bytes), Body::from(bytes)),
            Err(e) => {
                warn!(target: AUDIT_TARGET, ip = %ip, path = %path, error = %e, "Unreadable request body");
                return ApiError::invalid_request().into_response();
            }
        }
    } else {
        (String::new(), body)
    };

    info!(
        target: AUDIT_TARGET,
        ip = %ip,
        method = %method,
        path = %path,
        query = %query,
        user_agent = %user_agent,
        body = %excerpt,
        "Incoming HTTP request"
    );

    let span = info_span!("request", ip = %ip, method = %method, path = %path);
    next.run(Request::from_parts(parts, body))
        .instrument(span)
        .await
}

fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}

/// Body as text, cut at [`MAX_LOGGED_BODY`] bytes with a `...` marker
pub fn excerpt(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= MAX_LOGGED_BODY {
        return text.into_owned();
    }

    let mut end = MAX_LOGGED_BODY;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

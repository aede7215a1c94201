//! HTTP endpoints.
//!
//! The webhook endpoint accepts every method so that non-POST requests
//! reach the handler and get its error response rather than a bare 405.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::HeaderName, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::WebhookError;
use crate::handler::{InboundRequest, WebhookHandler, WebhookResponse};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<WebhookHandler>,
}

impl AppState {
    pub fn new(handler: WebhookHandler) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/mailgun", any(mailgun_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Mailgun Webhook
// =============================================================================

/// Mailgun webhook endpoint.
pub async fn mailgun_webhook(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body = match String::from_utf8(body.to_vec()) {
        Ok(body) => body,
        Err(e) => {
            warn!(method = %method, body_length = body.len(), "mailgun_body_not_utf8");
            let err = WebhookError::MalformedPayload(format!("body is not valid UTF-8: {e}"));
            return into_http_response(WebhookResponse::from_error(err.status_code(), &err));
        }
    };

    let request = InboundRequest {
        http_method: method.as_str().to_string(),
        body,
        headers: header_map_to_strings(&headers),
    };

    let response = state.handler.handle(&request).await;

    into_http_response(response)
}

/// Keep only headers whose values are valid UTF-8.
fn header_map_to_strings(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Translate the handler's response object into an HTTP response.
fn into_http_response(response: WebhookResponse) -> Response {
    let status = response
        .status_code
        .parse::<u16>()
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or_else(|| {
            warn!(status_code = %response.status_code, "invalid_status_code");
            StatusCode::INTERNAL_SERVER_ERROR
        });

    let mut headers = HeaderMap::new();
    for (name, value) in &response.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "invalid_response_header"),
        }
    }

    (status, headers, response.body).into_response()
}

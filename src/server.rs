//! HTTP surface for the render service
//!
//! One route does the work: `POST /render` takes `{"url": "<string>"}` and
//! answers with the rendered HTML, `400 Missing URL`, or `500 Failed to
//! render page`. Callers get a coarse success/failure signal only; the
//! underlying cause stays in the server logs. `GET /healthz` is a liveness
//! probe that touches no browser state.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::error;

use crate::Renderer;

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Render backend; swapped for a stub in the wire-contract tests
    pub renderer: Arc<dyn Renderer>,
}

impl AppState {
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self { renderer }
    }
}

/// Body of a render request. `url` is optional at the serde level so `{}`
/// parses cleanly and fails validation instead of deserialization.
#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    #[serde(default)]
    pub url: Option<String>,
}

/// Build the service router
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/render", post(render))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn render(
    State(state): State<AppState>,
    body: Result<Json<RenderRequest>, JsonRejection>,
) -> Response {
    // A malformed body and a missing url get the same answer; the wire
    // contract is two-valued on the failure side.
    let url = match body {
        Ok(Json(req)) => req
            .url
            .map(|u| u.trim().to_string())
            .unwrap_or_default(),
        Err(_) => String::new(),
    };

    if url.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing URL").into_response();
    }

    let renderer = state.renderer.clone();
    let target = url.clone();
    let outcome = tokio::task::spawn_blocking(move || renderer.render(&target)).await;

    match outcome {
        Ok(Ok(html)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html")],
            html,
        )
            .into_response(),
        Ok(Err(err)) => {
            error!(url = %url, "render failed: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page").into_response()
        }
        Err(err) => {
            error!(url = %url, "render task panicked: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parses_empty_object() {
        let req: RenderRequest = serde_json::from_str("{}").unwrap();
        assert!(req.url.is_none());
    }

    #[test]
    fn test_request_parses_url_field() {
        let req: RenderRequest = serde_json::from_str(r#"{"url":"https://example.com"}"#).unwrap();
        assert_eq!(req.url.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn test_request_ignores_extra_fields() {
        let req: RenderRequest =
            serde_json::from_str(r#"{"url":"https://example.com","depth":3}"#).unwrap();
        assert_eq!(req.url.as_deref(), Some("https://example.com"));
    }
}

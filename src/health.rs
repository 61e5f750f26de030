//! Liveness and readiness probes.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::llm::LlmProvider;

/// `/health/live` always answers 200: it only proves the process is
/// scheduling requests at all.
pub async fn live() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

pub struct ReadyState {
    pub catalog_loaded: bool,
    pub llm: Arc<dyn LlmProvider>,
}

/// `/health/ready` answers 503 if the catalog never loaded, or if the
/// configured LLM provider fails to respond to a ping.
pub async fn ready(State(state): State<Arc<ReadyState>>) -> (StatusCode, Json<Value>) {
    if !state.catalog_loaded {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not ready", "reason": "specs not loaded" })),
        );
    }
    match state.llm.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not ready", "reason": "llm unreachable" })),
        ),
    }
}

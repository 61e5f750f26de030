//! HTTP ingress: admits work onto the bus and serves task results.
//!
//! `POST /ask` is the primary surface — it registers a task context,
//! forwards to the Inspector, and answers 202 immediately without
//! waiting on the pipeline. `POST /ask/sync` and `POST /ask_nlp` are the
//! optional synchronous variants `spec.md` §4.11 marks as "MAY exist":
//! they share the same admission path but poll the registry every 100 ms
//! up to a 30 s wall deadline before answering.

pub mod auth;
pub mod rate_limit;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::agents::message::{BusMessage, TaskId};
use crate::bus::Bus;
use crate::catalog::{Catalog, TaskMode};
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::metrics::Metrics;
use crate::registry::{ResultStatus, TaskRegistry};

use self::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct ApiState {
    pub bus: Arc<Bus>,
    pub registry: Arc<TaskRegistry>,
    pub catalog: Arc<Catalog>,
    pub metrics: Metrics,
    pub config: Arc<AppConfig>,
    pub rate_limiter: Arc<RateLimiter>,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub params: Option<std::collections::HashMap<String, Value>>,
}

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub id: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    pub id: String,
}

fn rate_limit_and_auth_key(headers: &HeaderMap, remote: SocketAddr) -> String {
    auth::bucket_key(headers, &remote.ip().to_string())
}

fn admit(state: &ApiState, req: AskRequest, mode: TaskMode) -> Result<TaskId, ApiError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message requerido".to_owned()));
    }
    // a fresh v4 uuid is always `[0-9a-f-]`, which `TaskId::new` always accepts.
    let id = TaskId::new(Uuid::new_v4().to_string()).expect("uuid is a valid task id");
    let params = req.params.map(|m| {
        m.into_iter()
            .map(|(k, v)| (k, value_to_string(&v)))
            .collect::<std::collections::HashMap<_, _>>()
    });

    let _ctx = state.registry.new_context(&id, Duration::from_secs(60));
    state.bus.send(
        "inspector",
        BusMessage::NewTask {
            id: id.clone(),
            message: req.message,
            mode,
            operation: req.operation,
            params,
        },
    );
    Ok(id)
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn check_rate_limit(state: &ApiState, headers: &HeaderMap, remote: SocketAddr) -> Result<(), ApiError> {
    let key = rate_limit_and_auth_key(headers, remote);
    if state.rate_limiter.allow(&key) {
        Ok(())
    } else {
        Err(ApiError::RateLimited)
    }
}

pub async fn ask(
    State(state): State<ApiState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<AskRequest>,
) -> Result<(axum::http::StatusCode, Json<AcceptedResponse>), ApiError> {
    check_rate_limit(&state, &headers, remote)?;
    let id = admit(&state, req, TaskMode::Structured)?;
    Ok((axum::http::StatusCode::ACCEPTED, Json(AcceptedResponse { id: id.into(), status: "accepted" })))
}

pub async fn task(
    State(state): State<ApiState>,
    Query(q): Query<TaskQuery>,
) -> Result<Json<TaskResponse>, ApiError> {
    let id = TaskId::new(q.id)?;
    match state.registry.fetch(&id) {
        Some(result) => {
            let status = match result.status {
                ResultStatus::Ok => "ok",
                ResultStatus::Error => "error",
            };
            Ok(Json(TaskResponse {
                id: id.into(),
                status: status.to_owned(),
                data: result.data,
                error: result.error,
            }))
        }
        None => Ok(Json(TaskResponse {
            id: id.into(),
            status: "pending".to_owned(),
            data: None,
            error: None,
        })),
    }
}

const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(100);
const SYNC_WALL_DEADLINE: Duration = Duration::from_secs(30);

async fn wait_for_result(state: &ApiState, id: &str) -> TaskResponse {
    let deadline = Instant::now() + SYNC_WALL_DEADLINE;
    loop {
        if let Some(result) = state.registry.fetch(id) {
            let status = match result.status {
                ResultStatus::Ok => "ok",
                ResultStatus::Error => "error",
            };
            return TaskResponse {
                id: id.to_owned(),
                status: status.to_owned(),
                data: result.data,
                error: result.error,
            };
        }
        if Instant::now() >= deadline {
            return TaskResponse {
                id: id.to_owned(),
                status: "timeout".to_owned(),
                data: None,
                error: Some("timeout esperando resultado".to_owned()),
            };
        }
        tokio::time::sleep(SYNC_POLL_INTERVAL).await;
    }
}

/// `POST /ask/sync` — same admission as `/ask`, but blocks (polling
/// every 100 ms) for up to 30 s before answering with the terminal
/// result, or `{status:"timeout"}` if the deadline elapses first.
pub async fn ask_sync(
    State(state): State<ApiState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<AskRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    check_rate_limit(&state, &headers, remote)?;
    let id = admit(&state, req, TaskMode::Structured)?;
    Ok(Json(wait_for_result(&state, &id).await))
}

#[derive(Debug, Deserialize)]
pub struct AskNlpRequest {
    #[serde(default)]
    pub message: String,
}

/// `POST /ask_nlp` — free-text variant of the synchronous path, tagging
/// the task `mode: nlp` instead of `structured`.
pub async fn ask_nlp(
    State(state): State<ApiState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<AskNlpRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    check_rate_limit(&state, &headers, remote)?;
    let id = admit(
        &state,
        AskRequest { message: req.message, operation: None, params: None },
        TaskMode::Nlp,
    )?;
    Ok(Json(wait_for_result(&state, &id).await))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_accepts_valid_ids() {
        assert!(TaskId::new("abc-123_XYZ").is_ok());
        assert!(TaskId::new("a".repeat(64)).is_ok());
    }

    #[test]
    fn task_id_rejects_invalid_ids() {
        assert!(TaskId::new("").is_err());
        assert!(TaskId::new("a".repeat(65)).is_err());
        assert!(TaskId::new("has a space").is_err());
        assert!(TaskId::new("has/slash").is_err());
    }
}

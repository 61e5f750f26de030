//! Error taxonomy for the orchestration core.
//!
//! Each layer gets its own `thiserror` enum instead of a bare `String` so
//! callers can match on variants (the guard's permission failure looks
//! nothing like a tool's HTTP failure, and should not be handled the same
//! way). [`ApiError`] is the outward-facing umbrella that the HTTP layer
//! converts every inner error into before it reaches a client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("pipeline '{pipeline}' references unknown tool '{tool}'")]
    UnknownTool { pipeline: String, tool: String },
    #[error("intent '{intent}' references unknown pipeline '{pipeline}'")]
    UnknownPipeline { intent: String, pipeline: String },
    #[error("pipeline step must reference exactly one of tool or analyst=true")]
    AmbiguousStep,
}

#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("tool '{0}' no encontrada")]
    UnknownTool(String),
    #[error("tool peligrosa '{tool}' requiere intent.allow_dangerous")]
    DangerousNotAllowed { tool: String },
    #[error("amount requerido no presente")]
    AmountMissing,
    #[error("amount debe ser positivo: {0}")]
    AmountNotPositive(f64),
    #[error("amount excede límite permitido: {amount} > {max}")]
    AmountExceedsLimit { amount: f64, max: f64 },
    #[error("toPhone requerido no presente")]
    PhoneMissing,
    #[error("toPhone no válido: {0}")]
    PhoneInvalid(String),
    #[error("pipeline '{0}' encadena tools peligrosas")]
    DangerousChain(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template render failed: {0}")]
    Render(#[from] tera::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool '{0}' no encontrada")]
    UnknownTool(String),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("transient tool error: {0}")]
    Transient(String),
    #[error("tool call deadline exceeded")]
    DeadlineExceeded,
    #[error("tool call cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum TaskIdError {
    #[error("invalid task id: {0}")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm provider unreachable: {0}")]
    Unreachable(String),
    #[error("llm returned unrecognized intent: {0}")]
    UnrecognizedIntent(String),
    #[error("llm output was not valid JSON: {0}")]
    InvalidJson(String),
    #[error("llm call failed: {0}")]
    Other(String),
}

/// Umbrella error returned from an agent to the task registry, and from
/// an HTTP handler straight to the client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("rate limited")]
    RateLimited,
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[error("request body too large")]
    TooLarge,
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    TaskId(#[from] TaskIdError),
    #[error("not found")]
    NotFound,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unsupported(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Catalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Guard(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Tool(ToolError::Http { .. }) => StatusCode::BAD_GATEWAY,
            ApiError::Tool(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Llm(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::TaskId(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
        };
        let body = json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

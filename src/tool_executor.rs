//! Executes one catalog [`Tool`] call: render, dispatch, retry, decode.
//!
//! Steps, in order: render the URL, body, and headers against the
//! supplied params; JSON-serialize the rendered body; issue the HTTP
//! request with `Content-Type: application/json`; retry on transient
//! failure (connection errors, timeouts, 429, 408 — never a generic
//! 5xx, which is treated as a hard failure so tests relying on it stay
//! fast and deterministic); decode the JSON response on any 2xx/3xx
//! status, otherwise return [`ToolError::Http`].
//!
//! The retry/backoff policy itself lives in [`crate::retry`] and is
//! shared verbatim with the LLM HTTP client, since both are the one
//! place in the system allowed to retry network calls.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::catalog::Tool;
use crate::error::ToolError;
use crate::retry::{self, is_retriable_status};
use crate::template;

pub struct RenderedCall {
    pub url: String,
    pub body: HashMap<String, String>,
    pub headers: HashMap<String, String>,
}

/// Renders a tool's url/body/headers templates against `params`,
/// without performing any I/O. Exposed separately so the verifier can
/// log or inspect a call before it is dispatched.
pub fn render(tool: &Tool, params: &HashMap<String, String>) -> Result<RenderedCall, ToolError> {
    let url = template::render_string(&tool.url, params)?;
    let body = template::render_map(&tool.body, params)?;
    let headers = template::render_map(&tool.headers, params)?;
    Ok(RenderedCall { url, body, headers })
}

/// Executes `tool` against `params`, honoring `cancel` and a
/// `per_call_budget` deadline equal to `min(caller deadline,
/// tool.timeout_ms)`.
pub async fn execute(
    client: &reqwest::Client,
    tool: &Tool,
    params: &HashMap<String, String>,
    cancel: &CancellationToken,
    per_call_budget: Duration,
) -> Result<Value, ToolError> {
    let rendered = render(tool, params)?;
    let deadline = per_call_budget.min(Duration::from_millis(tool.timeout_ms));

    let mut attempt = 1;
    loop {
        let outcome = dispatch_once(client, tool, &rendered, deadline, cancel).await;
        match outcome {
            Ok(value) => return Ok(value),
            Err(DispatchOutcome::Cancelled) => return Err(ToolError::Cancelled),
            Err(DispatchOutcome::DeadlineExceeded) => return Err(ToolError::DeadlineExceeded),
            Err(DispatchOutcome::Fatal(e)) => return Err(e),
            Err(DispatchOutcome::Retriable(e)) => {
                if attempt >= retry::MAX_ATTEMPTS {
                    return Err(e);
                }
                tokio::select! {
                    _ = tokio::time::sleep(retry::backoff_delay(attempt)) => {}
                    _ = cancel.cancelled() => return Err(ToolError::Cancelled),
                }
                attempt += 1;
            }
        }
    }
}

enum DispatchOutcome {
    Cancelled,
    DeadlineExceeded,
    Fatal(ToolError),
    Retriable(ToolError),
}

async fn dispatch_once(
    client: &reqwest::Client,
    tool: &Tool,
    rendered: &RenderedCall,
    deadline: Duration,
    cancel: &CancellationToken,
) -> Result<Value, DispatchOutcome> {
    let body_json = serde_json::to_value(&rendered.body).unwrap_or(Value::Object(Default::default()));

    let mut builder = client
        .request(
            tool.method.parse().unwrap_or(reqwest::Method::GET),
            &rendered.url,
        )
        .header("Content-Type", "application/json")
        .json(&body_json);
    for (k, v) in &rendered.headers {
        builder = builder.header(k, v);
    }

    let send_fut = builder.send();
    let response = tokio::select! {
        res = tokio::time::timeout(deadline, send_fut) => res,
        _ = cancel.cancelled() => return Err(DispatchOutcome::Cancelled),
    };

    let response = match response {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            return if retry::is_retriable_transport_error(&e) {
                Err(DispatchOutcome::Retriable(ToolError::Transient(e.to_string())))
            } else {
                Err(DispatchOutcome::Fatal(ToolError::Transient(e.to_string())))
            };
        }
        Err(_elapsed) => return Err(DispatchOutcome::DeadlineExceeded),
    };

    let status = response.status();
    if status.as_u16() >= 300 {
        let body = response.text().await.unwrap_or_default();
        return if is_retriable_status(status) {
            Err(DispatchOutcome::Retriable(ToolError::Http {
                status: status.as_u16(),
                body,
            }))
        } else {
            Err(DispatchOutcome::Fatal(ToolError::Http {
                status: status.as_u16(),
                body,
            }))
        };
    }

    let text = response
        .text()
        .await
        .map_err(|e| DispatchOutcome::Fatal(ToolError::Transient(e.to_string())))?;
    if text.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(&text)
        .map_err(|e| DispatchOutcome::Fatal(ToolError::Transient(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_url_and_body() {
        let mut tool_body = HashMap::new();
        tool_body.insert("to".to_owned(), "{{ .toPhone }}".to_owned());
        let tool = Tool {
            name: "transfer".to_owned(),
            kind: "http".to_owned(),
            method: "POST".to_owned(),
            url: "http://x/transfer?accountId={{ .accountId }}".to_owned(),
            mode: crate::catalog::ToolMode::Dangerous,
            timeout_ms: 1000,
            body: tool_body,
            headers: HashMap::new(),
            model: None,
        };
        let mut params = HashMap::new();
        params.insert("accountId".to_owned(), "555".to_owned());
        params.insert("toPhone".to_owned(), "5551234567".to_owned());
        let rendered = render(&tool, &params).unwrap();
        assert_eq!(rendered.url, "http://x/transfer?accountId=555");
        assert_eq!(rendered.body.get("to").unwrap(), "5551234567");
    }

    #[tokio::test]
    async fn empty_success_body_decodes_as_empty_map() {
        async fn empty_ok() -> axum::http::StatusCode {
            axum::http::StatusCode::NO_CONTENT
        }
        let app = axum::Router::new().route("/noop", axum::routing::post(empty_ok));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let tool = Tool {
            name: "noop".to_owned(),
            kind: "http".to_owned(),
            method: "POST".to_owned(),
            url: format!("http://{addr}/noop"),
            mode: crate::catalog::ToolMode::Read,
            timeout_ms: 2000,
            body: HashMap::new(),
            headers: HashMap::new(),
            model: None,
        };
        let client = reqwest::Client::new();
        let cancel = CancellationToken::new();
        let out = execute(&client, &tool, &HashMap::new(), &cancel, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(out, Value::Object(Default::default()));
    }
}

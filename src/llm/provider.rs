//! The [`LlmProvider`] trait and an OpenAI-compatible HTTP implementation.
//!
//! The trait is intentionally narrow — `ping` and `chat` only — unlike a
//! richer completion API with streaming and tool calls. Everything this
//! service needs from a language model (intent classification, param
//! extraction, result summarization) is expressible as "send this text
//! prompt, get text back".
//!
//! Both methods retry on the same bounded backoff policy as the Tool
//! Executor (spec.md §7: "Retries are local to the Tool Executor and
//! the LLM HTTP client; agents above do not retry") — see
//! [`crate::retry`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::error::LlmError;
use crate::metrics::Metrics;
use crate::retry;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn ping(&self) -> Result<(), LlmError>;
    async fn chat(&self, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Talks to any OpenAI-chat-completions-compatible endpoint: Ollama's
/// `/v1/chat/completions` shim, or a real provider like OpenAI itself.
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
    metrics: Metrics,
}

impl OpenAiCompatibleProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self::with_metrics(base_url, model, api_key, timeout, Metrics::new())
    }

    pub fn with_metrics(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            timeout,
            metrics,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// An attempt's failure, tagged with whether it is worth retrying —
/// a transient transport error or a `429`/`408`, never a generic `5xx`.
struct RetriableErr {
    retriable: bool,
    err: LlmError,
}

fn classify_transport_err(e: reqwest::Error) -> RetriableErr {
    let retriable = retry::is_retriable_transport_error(&e)
        || e.status().is_some_and(retry::is_retriable_status);
    RetriableErr { retriable, err: LlmError::Other(e.to_string()) }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn ping(&self) -> Result<(), LlmError> {
        let url = format!("{}/v1/models", self.base_url.trim_end_matches('/'));
        let mut attempt = 1;
        let result = loop {
            let mut req = self.client.get(&url).timeout(self.timeout);
            if let Some(key) = &self.api_key {
                req = req.bearer_auth(key);
            }
            let attempt_result = req
                .send()
                .await
                .and_then(|resp| resp.error_for_status())
                .map(|_| ())
                .map_err(classify_transport_err);

            match attempt_result {
                Ok(()) => break Ok(()),
                Err(RetriableErr { retriable, err }) => {
                    if retriable && attempt < retry::MAX_ATTEMPTS {
                        tokio::time::sleep(retry::backoff_delay(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    break Err(LlmError::Unreachable(err.to_string()));
                }
            }
        };
        self.metrics.llm_ping(&self.model, if result.is_ok() { "ok" } else { "error" });
        result
    }

    async fn chat(&self, prompt: &str) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            stream: Some(false),
        };
        let start = Instant::now();
        let mut attempt = 1;
        let outcome = loop {
            let mut req = self.client.post(self.endpoint()).timeout(self.timeout).json(&body);
            if let Some(key) = &self.api_key {
                req = req.bearer_auth(key);
            }
            let attempt_result: Result<String, RetriableErr> = async {
                let resp = req.send().await.map_err(classify_transport_err)?;
                let resp = resp.error_for_status().map_err(classify_transport_err)?;
                let parsed: ChatResponse = resp
                    .json()
                    .await
                    .map_err(|e| RetriableErr { retriable: false, err: LlmError::Other(e.to_string()) })?;
                parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or_else(|| RetriableErr {
                        retriable: false,
                        err: LlmError::Other("empty choices in llm response".to_owned()),
                    })
            }
            .await;

            match attempt_result {
                Ok(text) => break Ok(text),
                Err(RetriableErr { retriable, err }) => {
                    if retriable && attempt < retry::MAX_ATTEMPTS {
                        tokio::time::sleep(retry::backoff_delay(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    break Err(err);
                }
            }
        };
        self.metrics.llm_chat(&self.model, if outcome.is_ok() { "ok" } else { "error" }, start.elapsed().as_secs_f64());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc as StdArc;

    fn chat_ok_body() -> serde_json::Value {
        serde_json::json!({ "choices": [{ "message": { "content": "hola" } }] })
    }

    async fn spawn_mock(
        responses: Vec<(u16, serde_json::Value)>,
    ) -> (std::net::SocketAddr, StdArc<AtomicU32>) {
        let hits = StdArc::new(AtomicU32::new(0));
        let hits_for_handler = StdArc::clone(&hits);
        let responses = StdArc::new(responses);

        let app = axum::Router::new().route(
            "/v1/chat/completions",
            axum::routing::post(move || {
                let hits = StdArc::clone(&hits_for_handler);
                let responses = StdArc::clone(&responses);
                async move {
                    let i = hits.fetch_add(1, Ordering::SeqCst) as usize;
                    let (status, body) = responses[i.min(responses.len() - 1)].clone();
                    (axum::http::StatusCode::from_u16(status).unwrap(), axum::Json(body))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (addr, hits)
    }

    #[tokio::test]
    async fn chat_retries_429_then_succeeds() {
        let (addr, hits) = spawn_mock(vec![
            (429, serde_json::json!({})),
            (429, serde_json::json!({})),
            (200, chat_ok_body()),
        ])
        .await;
        let provider = OpenAiCompatibleProvider::new(
            format!("http://{addr}"),
            "test-model",
            None,
            Duration::from_secs(2),
        );
        let text = provider.chat("hola?").await.unwrap();
        assert_eq!(text, "hola");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn chat_does_not_retry_generic_5xx() {
        let (addr, hits) = spawn_mock(vec![(500, serde_json::json!({}))]).await;
        let provider = OpenAiCompatibleProvider::new(
            format!("http://{addr}"),
            "test-model",
            None,
            Duration::from_secs(2),
        );
        let err = provider.chat("hola?").await.unwrap_err();
        assert!(matches!(err, LlmError::Other(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}

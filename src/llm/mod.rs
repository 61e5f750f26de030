//! The LLM capability: a narrow provider interface plus three
//! higher-level helpers (`detect_intent`, `extract_params`,
//! `summarize`) built on top of it. No agent talks to an HTTP client
//! directly — they only ever see [`LlmProvider`] and the helpers below.

pub mod helpers;
pub mod provider;

pub use helpers::{detect_intent, extract_params, summarize};
pub use provider::{LlmProvider, OpenAiCompatibleProvider};

use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::LlmError;

/// Test double: returns canned answers, optionally failing on demand.
/// Grounded on the teacher's `AlwaysFailProvider`-style test doubles.
pub struct MockLlm {
    ping_ok: bool,
    chat_response: Mutex<Option<String>>,
    chat_err: bool,
}

impl MockLlm {
    pub fn always_ok() -> Self {
        Self {
            ping_ok: true,
            chat_response: Mutex::new(Some("ok".to_owned())),
            chat_err: false,
        }
    }

    pub fn always_failing() -> Self {
        Self {
            ping_ok: false,
            chat_response: Mutex::new(None),
            chat_err: true,
        }
    }

    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            ping_ok: true,
            chat_response: Mutex::new(Some(response.into())),
            chat_err: false,
        }
    }
}

#[async_trait]
impl LlmProvider for MockLlm {
    async fn ping(&self) -> Result<(), LlmError> {
        if self.ping_ok {
            Ok(())
        } else {
            Err(LlmError::Unreachable("mock provider is down".to_owned()))
        }
    }

    async fn chat(&self, _prompt: &str) -> Result<String, LlmError> {
        if self.chat_err {
            return Err(LlmError::Other("mock provider failed".to_owned()));
        }
        Ok(self
            .chat_response
            .lock()
            .expect("mock llm mutex poisoned")
            .clone()
            .unwrap_or_default())
    }
}

/// Test double that replays a fixed sequence of `chat` replies in order,
/// one per call — for exercising a full `detect_intent` ->
/// `extract_params` -> `summarize` round trip in an end-to-end test
/// where each step needs a different scripted answer.
pub struct ScriptedLlm {
    responses: Mutex<std::collections::VecDeque<String>>,
}

impl ScriptedLlm {
    pub fn new(responses: Vec<impl Into<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn ping(&self) -> Result<(), LlmError> {
        Ok(())
    }

    async fn chat(&self, _prompt: &str) -> Result<String, LlmError> {
        self.responses
            .lock()
            .expect("scripted llm mutex poisoned")
            .pop_front()
            .ok_or_else(|| LlmError::Other("scripted llm exhausted".to_owned()))
    }
}

//! Task registry: results storage and per-task cancellation.
//!
//! Two independent maps, each behind its own mutex. `results` is
//! read-once: fetching a result removes it, so a client polling
//! `/task?id=` cannot observe the same result twice and the map does not
//! grow without bound. `contexts` holds one cancellation token per
//! in-flight task, with a TTL watcher that cancels (and removes) it if
//! nobody claims the result in time.
//!
//! This is a plain library type, not a process-wide global: the
//! production binary holds one `Arc<TaskRegistry>` shared by every agent
//! and the API layer, and tests construct their own isolated instance.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResult {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: ResultStatus::Ok,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Error,
            data: None,
            error: Some(message.into()),
        }
    }
}

pub struct TaskRegistry {
    results: Mutex<HashMap<String, TaskResult>>,
    contexts: Mutex<HashMap<String, CancellationToken>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(HashMap::new()),
            contexts: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self, id: &str, result: TaskResult) {
        self.results
            .lock()
            .expect("results map poisoned")
            .insert(id.to_owned(), result);
    }

    /// Fetches and removes a result, if present. Read-once: a second
    /// call for the same id returns `None`.
    pub fn fetch(&self, id: &str) -> Option<TaskResult> {
        self.results.lock().expect("results map poisoned").remove(id)
    }

    pub fn has_result(&self, id: &str) -> bool {
        self.results.lock().expect("results map poisoned").contains_key(id)
    }

    /// Registers a new cancellable context for `id` with the given TTL.
    /// After the TTL elapses, the token is cancelled and the entry
    /// removed automatically, even if nothing ever claims the result.
    pub fn new_context(self: &std::sync::Arc<Self>, id: &str, ttl: Duration) -> CancellationToken {
        let token = CancellationToken::new();
        self.contexts
            .lock()
            .expect("contexts map poisoned")
            .insert(id.to_owned(), token.clone());

        let registry = std::sync::Arc::clone(self);
        let id = id.to_owned();
        let watcher_token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(ttl) => {
                    watcher_token.cancel();
                    registry.contexts.lock().expect("contexts map poisoned").remove(&id);
                }
                _ = watcher_token.cancelled() => {}
            }
        });

        token
    }

    pub fn context(&self, id: &str) -> Option<CancellationToken> {
        self.contexts.lock().expect("contexts map poisoned").get(id).cloned()
    }

    /// Cancels and removes the context for `id`, if any.
    pub fn cancel(&self, id: &str) {
        if let Some(token) = self.contexts.lock().expect("contexts map poisoned").remove(id) {
            token.cancel();
        }
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn fetch_is_read_once() {
        let reg = TaskRegistry::new();
        reg.store("t1", TaskResult::ok(serde_json::json!({"a": 1})));
        assert!(reg.fetch("t1").is_some());
        assert!(reg.fetch("t1").is_none());
    }

    #[tokio::test]
    async fn context_cancels_after_ttl() {
        let reg = Arc::new(TaskRegistry::new());
        let token = reg.new_context("t1", Duration::from_millis(20));
        assert!(!token.is_cancelled());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(token.is_cancelled());
        assert!(reg.context("t1").is_none());
    }

    #[tokio::test]
    async fn cancel_removes_context() {
        let reg = Arc::new(TaskRegistry::new());
        let token = reg.new_context("t1", Duration::from_secs(60));
        reg.cancel("t1");
        assert!(token.is_cancelled());
        assert!(reg.context("t1").is_none());
    }
}

//! The typed messages agents exchange over the [`crate::bus::Bus`].

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::catalog::TaskMode;
use crate::error::TaskIdError;

const TASK_ID_MAX_LEN: usize = 64;

/// A task identifier, validated against `^[A-Za-z0-9_-]{1,64}$` at
/// construction (spec.md §3) so every agent that forwards one already
/// holds a well-formed value rather than re-checking it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    pub fn new(raw: impl Into<String>) -> Result<Self, TaskIdError> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && raw.len() <= TASK_ID_MAX_LEN
            && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(Self(raw))
        } else {
            Err(TaskIdError::Invalid(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for TaskId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TaskId {
    type Error = TaskIdError;
    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> String {
        id.0
    }
}

impl PartialEq<str> for TaskId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TaskId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod task_id_tests {
    use super::TaskId;

    #[test]
    fn accepts_valid_ids() {
        assert!(TaskId::new("abc-123_XYZ").is_ok());
        assert!(TaskId::new("a".repeat(64)).is_ok());
    }

    #[test]
    fn rejects_invalid_ids() {
        assert!(TaskId::new("").is_err());
        assert!(TaskId::new("a".repeat(65)).is_err());
        assert!(TaskId::new("has a space").is_err());
        assert!(TaskId::new("has/slash").is_err());
    }
}

/// A message handed between agent inboxes. Each variant corresponds to
/// exactly one agent handler (`new_task` -> Inspector, `detect_intent`
/// -> Planner, `run_pipeline` -> Verifier, `summarize` -> Analyst).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMessage {
    NewTask {
        id: TaskId,
        message: String,
        mode: TaskMode,
        /// Pre-selected intent key, bypassing `DetectIntent` (the
        /// structured `operation`/`params` admission path).
        operation: Option<String>,
        params: Option<HashMap<String, String>>,
    },
    DetectIntent {
        id: TaskId,
        message: String,
        mode: TaskMode,
        operation: Option<String>,
        params: Option<HashMap<String, String>>,
    },
    RunPipeline {
        id: TaskId,
        intent: String,
        params: HashMap<String, String>,
    },
    Summarize {
        id: TaskId,
        intent: String,
        raw_result: serde_json::Value,
    },
    #[cfg(test)]
    Ping,
}

#[cfg(test)]
impl BusMessage {
    pub fn test_ping() -> Self {
        BusMessage::Ping
    }
}

//! Result summarization. On `summarize`, calls the LLM to turn
//! accumulated pipeline output into a short plain-text summary; on LLM
//! failure, degrades gracefully by storing the raw data with no
//! `summary` key rather than failing the task outright.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;

use crate::llm::{self, LlmProvider};
use crate::registry::TaskResult;

use super::message::{BusMessage, TaskId};
use super::AgentDeps;

pub async fn run(
    deps: AgentDeps,
    llm_provider: Arc<dyn LlmProvider>,
    mut inbox: Receiver<BusMessage>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            msg = inbox.recv() => {
                match msg {
                    Some(msg) => dispatch(&deps, &llm_provider, msg).await,
                    None => return,
                }
            }
            _ = shutdown.cancelled() => return,
        }
    }
}

async fn dispatch(deps: &AgentDeps, llm_provider: &Arc<dyn LlmProvider>, msg: BusMessage) {
    match msg {
        BusMessage::Summarize { id, intent, raw_result } => {
            handle_summarize(deps, llm_provider, id, intent, raw_result).await
        }
        other => tracing::warn!(?other, "analyst: unknown message type"),
    }
}

async fn handle_summarize(
    deps: &AgentDeps,
    llm_provider: &Arc<dyn LlmProvider>,
    id: TaskId,
    intent: String,
    raw_result: serde_json::Value,
) {
    if !raw_result.is_object() {
        deps.registry.store(&id, TaskResult::err("resultado bruto inválido"));
        return;
    }

    let cancel = deps.registry.context(&id).unwrap_or_default();
    let summarize = llm::summarize(llm_provider.as_ref(), &intent, &raw_result);
    let outcome = tokio::select! {
        r = summarize => r,
        _ = cancel.cancelled() => {
            deps.registry.store(&id, TaskResult::ok(json!({ "raw": raw_result })));
            return;
        }
    };

    match outcome {
        Ok(summary) => {
            tracing::info!(task_id = %id, "analyst: summary generated");
            deps.registry.store(
                &id,
                TaskResult::ok(json!({ "raw": raw_result, "summary": summary })),
            );
        }
        Err(e) => {
            tracing::warn!(task_id = %id, error = %e, "analyst: llm summarization failed, degrading to raw");
            deps.registry.store(&id, TaskResult::ok(json!({ "raw": raw_result })));
        }
    }
}

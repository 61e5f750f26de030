//! Pipeline interpreter: walks a resolved pipeline's steps in order,
//! executing each tool call and accumulating `step_results` keyed by
//! tool name. An `analyst=true` step is terminal — it hands off to the
//! Analyst immediately and steps after it are never executed. If the
//! pipeline ends without an explicit analyst step, one is sent implicitly
//! with whatever accumulated so far.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;

use crate::registry::TaskResult;
use crate::tool_executor;

use super::message::{BusMessage, TaskId};
use super::AgentDeps;

/// Upper bound on a single tool call's budget when no task deadline is
/// registered (should not normally happen — the API always registers
/// one on admission).
const FALLBACK_CALL_BUDGET: Duration = Duration::from_secs(30);

pub async fn run(
    deps: AgentDeps,
    client: reqwest::Client,
    mut inbox: Receiver<BusMessage>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            msg = inbox.recv() => {
                match msg {
                    Some(msg) => dispatch(&deps, &client, msg).await,
                    None => return,
                }
            }
            _ = shutdown.cancelled() => return,
        }
    }
}

async fn dispatch(deps: &AgentDeps, client: &reqwest::Client, msg: BusMessage) {
    match msg {
        BusMessage::RunPipeline { id, intent, params } => {
            handle_run_pipeline(deps, client, id, intent, params).await
        }
        other => tracing::warn!(?other, "verifier: unknown message type"),
    }
}

fn store_error(deps: &AgentDeps, id: &str, msg: impl Into<String>) {
    deps.registry.store(id, TaskResult::err(msg));
}

/// Merges a step's `with_params` defaults under the planner's params:
/// a default is applied only when the key is absent or empty in
/// `params`, and only when the default itself is non-empty. The
/// planner's value always wins when both are present.
fn merge_call_params(
    params: &HashMap<String, String>,
    with_params: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = params.clone();
    for (k, default_value) in with_params {
        let present_non_empty = merged.get(k).is_some_and(|v| !v.is_empty());
        if !present_non_empty && !default_value.is_empty() {
            merged.insert(k.clone(), default_value.clone());
        }
    }
    merged
}

async fn handle_run_pipeline(
    deps: &AgentDeps,
    client: &reqwest::Client,
    id: TaskId,
    intent: String,
    params: HashMap<String, String>,
) {
    let Some(intent_cfg) = deps.catalog.intent(&intent) else {
        store_error(deps, &id, "unknown intent");
        return;
    };
    let Some(pipeline) = deps.catalog.pipeline(&intent_cfg.pipeline) else {
        store_error(deps, &id, "pipeline inválido");
        return;
    };

    let cancel = deps.registry.context(&id).unwrap_or_default();
    let mut step_results = serde_json::Map::new();

    for step in &pipeline.steps {
        if step.analyst {
            deps.bus.send(
                "analyst",
                BusMessage::Summarize {
                    id,
                    intent,
                    raw_result: serde_json::Value::Object(step_results),
                },
            );
            return;
        }

        let Some(tool_name) = &step.tool else { continue };
        let Some(tool) = deps.catalog.tool(tool_name) else {
            store_error(deps, &id, format!("tool {tool_name} no encontrada"));
            return;
        };

        let call_params = merge_call_params(&params, &step.with_params);

        tracing::info!(task_id = %id, tool = %tool_name, "verifier: executing tool");
        let result = tool_executor::execute(client, tool, &call_params, &cancel, FALLBACK_CALL_BUDGET).await;
        match result {
            Ok(output) => {
                step_results.insert(tool_name.clone(), output);
            }
            Err(e) => {
                tracing::warn!(task_id = %id, tool = %tool_name, error = %e, "verifier: tool call failed");
                store_error(deps, &id, e.to_string());
                return;
            }
        }
    }

    deps.bus.send(
        "analyst",
        BusMessage::Summarize {
            id,
            intent,
            raw_result: serde_json::Value::Object(step_results),
        },
    );
}

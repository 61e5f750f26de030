//! Intent classification, parameter extraction, and guard validation.
//!
//! On `detect_intent`: resolve the intent (classifying via the LLM, or
//! taking the bypass `operation` key as-is), resolve its pipeline,
//! extract parameters (via the LLM, or taking bypass `params` as-is),
//! run [`crate::guard::validate_all`], and on success hand off to the
//! Verifier as `run_pipeline`. Any failure along the way stores a
//! terminal `error` result and stops — the Planner never retries.

use std::sync::Arc;

use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;

use crate::guard;
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
        BusMessage::DetectIntent {
            id,
            message,
            mode: _,
            operation,
            params,
        } => handle_detect_intent(deps, llm_provider, id, message, operation, params).await,
        other => tracing::warn!(?other, "planner: unknown message type"),
    }
}

fn store_error(deps: &AgentDeps, id: &str, msg: impl Into<String>) {
    deps.registry.store(id, TaskResult::err(msg));
}

async fn handle_detect_intent(
    deps: &AgentDeps,
    llm_provider: &Arc<dyn LlmProvider>,
    id: TaskId,
    message: String,
    operation: Option<String>,
    preset_params: Option<std::collections::HashMap<String, String>>,
) {
    let cancel = deps.registry.context(&id).unwrap_or_default();

    let intent_key = match operation {
        Some(op) => op,
        None => {
            let valid_keys: Vec<&str> = deps.catalog.intents.keys().map(String::as_str).collect();
            let detect = llm::detect_intent(llm_provider.as_ref(), &message, &valid_keys);
            let outcome = tokio::select! {
                r = detect => r,
                _ = cancel.cancelled() => {
                    store_error(deps, &id, "task cancelled during intent detection");
                    return;
                }
            };
            match outcome {
                Ok(key) => key,
                Err(e) => {
                    tracing::warn!(task_id = %id, error = %e, "planner: intent detection failed");
                    store_error(deps, &id, "no se pudo detectar intent");
                    return;
                }
            }
        }
    };

    let Some(intent) = deps.catalog.intent(&intent_key) else {
        store_error(deps, &id, "unknown intent");
        return;
    };
    let Some(pipeline) = deps.catalog.pipeline(&intent.pipeline) else {
        store_error(deps, &id, "pipeline inexistente para intent");
        return;
    };

    let params = if !intent.required_params.is_empty() && preset_params.is_none() {
        let extract = llm::extract_params(llm_provider.as_ref(), &message, &intent.required_params);
        let outcome = tokio::select! {
            r = extract => r,
            _ = cancel.cancelled() => {
                store_error(deps, &id, "task cancelled during parameter extraction");
                return;
            }
        };
        match outcome {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(task_id = %id, error = %e, "planner: param extraction failed");
                store_error(deps, &id, "error extrayendo parámetros");
                return;
            }
        }
    } else {
        preset_params.unwrap_or_default()
    };

    if let Err(e) = guard::validate_all(intent, pipeline, &params, &deps.catalog) {
        tracing::info!(task_id = %id, error = %e, "planner: guard rejected request");
        store_error(deps, &id, e.to_string());
        return;
    }

    tracing::info!(task_id = %id, intent = %intent_key, pipeline = %pipeline.name, "planner: dispatching to verifier");
    deps.bus.send(
        "verifier",
        BusMessage::RunPipeline {
            id,
            intent: intent_key,
            params,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;
    use crate::catalog::{Catalog, Intent, Pipeline, PipelineStep, Tool, ToolMode};
    use crate::llm::MockLlm;
    use crate::metrics::Metrics;
    use crate::registry::{ResultStatus, TaskRegistry};
    use std::collections::HashMap;

    fn catalog_with_balance_intent() -> Catalog {
        let mut tools = HashMap::new();
        tools.insert(
            "banking.core_get_balance".to_owned(),
            Tool {
                name: "banking.core_get_balance".to_owned(),
                kind: "http".to_owned(),
                method: "GET".to_owned(),
                url: "http://x/balance".to_owned(),
                mode: ToolMode::Read,
                timeout_ms: 1000,
                body: HashMap::new(),
                headers: HashMap::new(),
                model: None,
            },
        );
        let mut pipelines = HashMap::new();
        pipelines.insert(
            "p_balance".to_owned(),
            Pipeline {
                name: "p_balance".to_owned(),
                description: String::new(),
                steps: vec![
                    PipelineStep {
                        tool: Some("banking.core_get_balance".to_owned()),
                        with_params: HashMap::new(),
                        analyst: false,
                    },
                    PipelineStep {
                        tool: None,
                        with_params: HashMap::new(),
                        analyst: true,
                    },
                ],
            },
        );
        let mut intents = HashMap::new();
        intents.insert(
            "banking.get_balance".to_owned(),
            Intent {
                intent_type: "banking.get_balance".to_owned(),
                description: String::new(),
                pipeline: "p_balance".to_owned(),
                required_params: vec!["accountId".to_owned()],
                allow_dangerous: false,
                requires_amount: false,
                requires_phone: false,
                max_amount: None,
                shadow_mode: false,
            },
        );
        Catalog::new(tools, pipelines, intents).unwrap()
    }

    fn deps_with(catalog: Catalog) -> (AgentDeps, Arc<Bus>) {
        let bus = Arc::new(Bus::new(Metrics::new()));
        let deps = AgentDeps {
            bus: Arc::clone(&bus),
            registry: Arc::new(TaskRegistry::new()),
            catalog: Arc::new(catalog),
        };
        (deps, bus)
    }

    #[tokio::test]
    async fn happy_path_dispatches_run_pipeline() {
        let (deps, bus) = deps_with(catalog_with_balance_intent());
        let mut verifier_rx = bus.subscribe("verifier");
        let llm: Arc<dyn LlmProvider> =
            Arc::new(MockLlm::with_response(r#"{"accountId":"555"}"#));

        handle_detect_intent(
            &deps,
            &llm,
            TaskId::new("t1").unwrap(),
            "saldo 555".to_owned(),
            Some("banking.get_balance".to_owned()),
            None,
        )
        .await;

        match verifier_rx.try_recv().unwrap() {
            BusMessage::RunPipeline { id, intent, params } => {
                assert_eq!(id, "t1");
                assert_eq!(intent, "banking.get_balance");
                assert_eq!(params.get("accountId").unwrap(), "555");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_intent_stores_error() {
        let (deps, bus) = deps_with(catalog_with_balance_intent());
        let mut verifier_rx = bus.subscribe("verifier");
        let llm: Arc<dyn LlmProvider> = Arc::new(MockLlm::always_ok());

        handle_detect_intent(
            &deps,
            &llm,
            TaskId::new("t1").unwrap(),
            "x".to_owned(),
            Some("no.such.intent".to_owned()),
            None,
        )
        .await;

        assert!(verifier_rx.try_recv().is_err());
        let result = deps.registry.fetch("t1").unwrap();
        assert!(matches!(result.status, ResultStatus::Error));
    }

    #[tokio::test]
    async fn preset_params_skip_extraction() {
        let (deps, bus) = deps_with(catalog_with_balance_intent());
        let mut verifier_rx = bus.subscribe("verifier");
        // an llm that would fail if called, to prove extraction is skipped
        let llm: Arc<dyn LlmProvider> = Arc::new(MockLlm::always_failing());

        let mut params = HashMap::new();
        params.insert("accountId".to_owned(), "555".to_owned());
        handle_detect_intent(
            &deps,
            &llm,
            TaskId::new("t1").unwrap(),
            "saldo 555".to_owned(),
            Some("banking.get_balance".to_owned()),
            Some(params),
        )
        .await;

        assert!(verifier_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn guard_violation_prevents_dispatch() {
        let mut tools = HashMap::new();
        tools.insert(
            "transfer".to_owned(),
            Tool {
                name: "transfer".to_owned(),
                kind: "http".to_owned(),
                method: "POST".to_owned(),
                url: "http://x".to_owned(),
                mode: ToolMode::Dangerous,
                timeout_ms: 1000,
                body: HashMap::new(),
                headers: HashMap::new(),
                model: None,
            },
        );
        let mut pipelines = HashMap::new();
        pipelines.insert(
            "p_transfer".to_owned(),
            Pipeline {
                name: "p_transfer".to_owned(),
                description: String::new(),
                steps: vec![PipelineStep {
                    tool: Some("transfer".to_owned()),
                    with_params: HashMap::new(),
                    analyst: false,
                }],
            },
        );
        let mut intents = HashMap::new();
        intents.insert(
            "banking.send_bizum".to_owned(),
            Intent {
                intent_type: "banking.send_bizum".to_owned(),
                description: String::new(),
                pipeline: "p_transfer".to_owned(),
                required_params: vec![],
                allow_dangerous: true,
                requires_amount: true,
                requires_phone: true,
                max_amount: Some(100.0),
                shadow_mode: false,
            },
        );
        let catalog = Catalog::new(tools, pipelines, intents).unwrap();
        let (deps, bus) = deps_with(catalog);
        let mut verifier_rx = bus.subscribe("verifier");
        let llm: Arc<dyn LlmProvider> = Arc::new(MockLlm::always_ok());

        let mut params = HashMap::new();
        params.insert("amount".to_owned(), "1000".to_owned());
        params.insert("toPhone".to_owned(), "+34123456789".to_owned());
        handle_detect_intent(
            &deps,
            &llm,
            TaskId::new("t1").unwrap(),
            "x".to_owned(),
            Some("banking.send_bizum".to_owned()),
            Some(params),
        )
        .await;

        assert!(verifier_rx.try_recv().is_err());
        let result = deps.registry.fetch("t1").unwrap();
        assert_eq!(
            result.error.as_deref(),
            Some("amount excede límite permitido: 1000 > 100")
        );
    }
}

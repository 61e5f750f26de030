//! Three prompts built on top of the narrow [`super::LlmProvider`]
//! trait: intent classification, flat-JSON parameter extraction, and
//! result summarization. No agent ever writes a prompt string itself —
//! this module owns that.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::LlmError;

use super::LlmProvider;

fn json_object_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("static regex is valid"))
}

/// Asks the LLM to return exactly one of `valid_keys`, trimmed. Any
/// reply that is not an exact member of the set is rejected — the LLM
/// is never trusted to author new intents or schema.
pub async fn detect_intent(
    provider: &dyn LlmProvider,
    user_message: &str,
    valid_keys: &[&str],
) -> Result<String, LlmError> {
    let keys_json = serde_json::to_string(valid_keys).unwrap_or_default();
    let prompt = format!(
        "You are an intent classifier for a multi-domain Agent Orchestration \
         System (AOS).\n\nValid intents (choose exactly one, output must be \
         EXACTLY the key):\n\n{keys_json}\n\nRules:\n- Output ONLY the intent \
         key (like devops.get_service_status).\n- Do NOT explain or add \
         text.\n- Do NOT create new intents.\n\nUser message:\n\"{user_message}\"\n"
    );
    let raw = provider.chat(&prompt).await?;
    let clean = raw.trim();
    if valid_keys.contains(&clean) {
        Ok(clean.to_owned())
    } else {
        Err(LlmError::UnrecognizedIntent(clean.to_owned()))
    }
}

/// Asks the LLM for a flat JSON object containing exactly
/// `required_keys`, then sanitizes and parses the reply.
pub async fn extract_params(
    provider: &dyn LlmProvider,
    user_message: &str,
    required_keys: &[String],
) -> Result<HashMap<String, String>, LlmError> {
    let keys_json = serde_json::to_string(required_keys).unwrap_or_default();
    let prompt = format!(
        "Extract ONLY the required parameters from the user message.\n\n\
         Requirements:\n- Output MUST be valid JSON.\n- JSON MUST contain \
         EXACTLY these keys:\n  {keys_json}\n- NO markdown.\n- NO backticks.\n\
         - NO explanation.\n- NO prefix.\n- NO suffix.\n- If missing, infer \
         value from message.\n\nUser message: \"{user_message}\"\n"
    );
    let raw = provider.chat(&prompt).await?;
    let clean = sanitize_llm_output(&raw);
    let parsed: Value = serde_json::from_str(&clean).map_err(|e| LlmError::InvalidJson(format!("{e}; clean={clean}")))?;
    let obj = parsed
        .as_object()
        .ok_or_else(|| LlmError::InvalidJson(format!("expected a JSON object; clean={clean}")))?;
    Ok(obj
        .iter()
        .map(|(k, v)| (k.clone(), value_to_string(v)))
        .collect())
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Strips markdown code fences, extracts the first `{...}` object, and
/// normalizes curly quotes to straight ones — mirrors the sanitation a
/// chat-completion reply needs before it can be parsed as JSON.
fn sanitize_llm_output(raw: &str) -> String {
    let mut s = raw.trim().to_owned();
    if s.starts_with("```") {
        let lines: Vec<&str> = s.split('\n').collect();
        if lines.len() > 1 {
            s = lines[1..lines.len() - 1].join("\n");
        }
    }
    if let Some(m) = json_object_pattern().find(&s) {
        s = m.as_str().to_owned();
    }
    s = s
        .replace('\u{201c}', "\"")
        .replace('\u{201d}', "\"")
        .replace('\u{2018}', "'")
        .replace('\u{2019}', "'");
    s.trim().to_owned()
}

/// Serializes the accumulated pipeline output and asks for a short
/// plain-text summary. Callers degrade gracefully on error: the Analyst
/// stores raw data with no `summary` key rather than failing the task.
pub async fn summarize(
    provider: &dyn LlmProvider,
    intent_type: &str,
    raw_result: &Value,
) -> Result<String, LlmError> {
    let raw_json = serde_json::to_string(raw_result).unwrap_or_default();
    let prompt = format!(
        "Eres un asistente multi dominio experto.\n\nHas ejecutado una \
         operación con intent: \"{intent_type}\".\nAquí tienes los resultados \
         en bruto de las herramientas (JSON):\n\n{raw_json}\n\nEscribe un \
         resumen corto en español para el usuario final, explicando:\n- qué \
         operación se ha realizado,\n- si todo ha ido bien,\n- cualquier \
         detalle relevante.\n\nDevuelve SOLO texto plano, sin JSON, sin \
         listas.\n"
    );
    provider.chat(&prompt).await
}

//! Pure validation of an intent/pipeline/params triple against the
//! catalog, before anything is ever dispatched to a tool.
//!
//! Three fail-fast stages, run in order: permissions (does this intent
//! allow the dangerous tools its pipeline uses), dangerous-parameter
//! shape (amount/phone bounds when the intent requires them), and
//! dangerous chaining (a pipeline may call at most one dangerous tool).
//! [`validate_all`] takes no `&mut` state and performs no I/O — it is
//! safe to call from any agent, any number of times, with the same
//! inputs always producing the same verdict.

use std::collections::HashMap;

use regex::Regex;

use crate::catalog::{Catalog, Intent, Pipeline, ToolMode};
use crate::error::GuardError;

fn phone_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9+][0-9]{5,14}$").expect("static regex is valid"))
}

/// Stage 1: every tool a pipeline calls must either be non-dangerous, or
/// the intent must explicitly allow dangerous tools.
pub fn validate_intent_permissions(
    intent: &Intent,
    pipeline: &Pipeline,
    catalog: &Catalog,
) -> Result<(), GuardError> {
    for step in &pipeline.steps {
        let Some(tool_name) = &step.tool else { continue };
        let tool = catalog
            .tool(tool_name)
            .ok_or_else(|| GuardError::UnknownTool(tool_name.clone()))?;
        if tool.mode == ToolMode::Dangerous && !intent.allow_dangerous {
            return Err(GuardError::DangerousNotAllowed {
                tool: tool_name.clone(),
            });
        }
    }
    Ok(())
}

/// Stage 2: when an intent requires an amount and/or a phone number,
/// validate their shape and bounds.
pub fn validate_dangerous_params(
    intent: &Intent,
    params: &HashMap<String, String>,
) -> Result<(), GuardError> {
    if !intent.allow_dangerous {
        return Ok(());
    }
    if intent.requires_amount {
        let raw = params.get("amount").ok_or(GuardError::AmountMissing)?;
        let amount: f64 = raw.parse().map_err(|_| GuardError::AmountNotPositive(0.0))?;
        if amount <= 0.0 {
            return Err(GuardError::AmountNotPositive(amount));
        }
        if let Some(max) = intent.max_amount {
            if amount > max {
                return Err(GuardError::AmountExceedsLimit { amount, max });
            }
        }
    }
    if intent.requires_phone {
        let raw = params.get("toPhone").ok_or(GuardError::PhoneMissing)?;
        if !phone_regex().is_match(raw) {
            return Err(GuardError::PhoneInvalid(raw.clone()));
        }
    }
    Ok(())
}

/// Stage 3: a pipeline may chain at most one dangerous tool.
pub fn validate_dangerous_chain(pipeline: &Pipeline, catalog: &Catalog) -> Result<(), GuardError> {
    if catalog.pipeline_dangerous_tool_count(pipeline) > 1 {
        return Err(GuardError::DangerousChain(pipeline.name.clone()));
    }
    Ok(())
}

/// Runs all three stages in order, short-circuiting on the first
/// failure.
pub fn validate_all(
    intent: &Intent,
    pipeline: &Pipeline,
    params: &HashMap<String, String>,
    catalog: &Catalog,
) -> Result<(), GuardError> {
    validate_intent_permissions(intent, pipeline, catalog)?;
    validate_dangerous_params(intent, params)?;
    validate_dangerous_chain(pipeline, catalog)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PipelineStep, Tool};

    fn tool(name: &str, mode: ToolMode) -> Tool {
        Tool {
            name: name.to_owned(),
            kind: "http".to_owned(),
            method: "POST".to_owned(),
            url: "http://x".to_owned(),
            mode,
            timeout_ms: 1000,
            body: HashMap::new(),
            headers: HashMap::new(),
            model: None,
        }
    }

    fn catalog_with(tools: Vec<Tool>) -> Catalog {
        let mut map = HashMap::new();
        for t in tools {
            map.insert(t.name.clone(), t);
        }
        Catalog::new(map, HashMap::new(), HashMap::new()).unwrap()
    }

    fn intent(allow_dangerous: bool, requires_amount: bool, max_amount: Option<f64>) -> Intent {
        Intent {
            intent_type: "transfer".to_owned(),
            description: String::new(),
            pipeline: "transfer_pipeline".to_owned(),
            required_params: vec![],
            allow_dangerous,
            requires_amount,
            requires_phone: true,
            max_amount,
            shadow_mode: false,
        }
    }

    fn pipeline(steps: Vec<PipelineStep>) -> Pipeline {
        Pipeline {
            name: "transfer_pipeline".to_owned(),
            description: String::new(),
            steps,
        }
    }

    #[test]
    fn rejects_dangerous_tool_without_allow_flag() {
        let catalog = catalog_with(vec![tool("transfer", ToolMode::Dangerous)]);
        let pipeline = pipeline(vec![PipelineStep {
            tool: Some("transfer".to_owned()),
            with_params: HashMap::new(),
            analyst: false,
        }]);
        let intent = intent(false, true, Some(100.0));
        let err = validate_intent_permissions(&intent, &pipeline, &catalog).unwrap_err();
        assert!(matches!(err, GuardError::DangerousNotAllowed { .. }));
    }

    #[test]
    fn rejects_amount_over_limit_with_exact_message() {
        let intent = intent(true, true, Some(100.0));
        let mut params = HashMap::new();
        params.insert("amount".to_owned(), "1000".to_owned());
        params.insert("toPhone".to_owned(), "5551234567".to_owned());
        let err = validate_dangerous_params(&intent, &params).unwrap_err();
        assert_eq!(err.to_string(), "amount excede límite permitido: 1000 > 100");
    }

    #[test]
    fn rejects_invalid_phone_with_exact_message() {
        let intent = intent(true, false, None);
        let mut params = HashMap::new();
        params.insert("toPhone".to_owned(), "abc".to_owned());
        let err = validate_dangerous_params(&intent, &params).unwrap_err();
        assert_eq!(err.to_string(), "toPhone no válido: abc");
    }

    #[test]
    fn skips_amount_and_phone_checks_when_not_allow_dangerous() {
        // requires_amount/requires_phone are independent of allow_dangerous
        // in the catalog data; the shape checks only apply when the intent
        // is actually flagged dangerous.
        let mut intent = intent(false, true, Some(100.0));
        intent.requires_phone = true;
        assert!(validate_dangerous_params(&intent, &HashMap::new()).is_ok());
    }

    #[test]
    fn rejects_chained_dangerous_tools() {
        let catalog = catalog_with(vec![
            tool("transfer", ToolMode::Dangerous),
            tool("withdraw", ToolMode::Dangerous),
        ]);
        let pipeline = pipeline(vec![
            PipelineStep {
                tool: Some("transfer".to_owned()),
                with_params: HashMap::new(),
                analyst: false,
            },
            PipelineStep {
                tool: Some("withdraw".to_owned()),
                with_params: HashMap::new(),
                analyst: false,
            },
        ]);
        let err = validate_dangerous_chain(&pipeline, &catalog).unwrap_err();
        assert!(err.to_string().contains("encadena tools peligrosas"));
    }

    #[test]
    fn accepts_well_formed_dangerous_request() {
        let catalog = catalog_with(vec![tool("transfer", ToolMode::Dangerous)]);
        let pipeline = pipeline(vec![PipelineStep {
            tool: Some("transfer".to_owned()),
            with_params: HashMap::new(),
            analyst: false,
        }]);
        let intent = intent(true, true, Some(1000.0));
        let mut params = HashMap::new();
        params.insert("amount".to_owned(), "500".to_owned());
        params.insert("toPhone".to_owned(), "5551234567".to_owned());
        assert!(validate_all(&intent, &pipeline, &params, &catalog).is_ok());
    }
}

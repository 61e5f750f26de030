//! The declarative catalog: tools, pipelines, and intents.
//!
//! A [`Catalog`] is an immutable triple of maps built once at process
//! start. Every cross-reference (pipeline step -> tool, intent ->
//! pipeline) is validated eagerly in [`Catalog::new`] so a malformed
//! catalog never reaches the running agents — there is no "unknown tool"
//! failure mode at dispatch time that wasn't already caught at boot.

pub mod loader;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolMode {
    Read,
    Write,
    Dangerous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskMode {
    Structured,
    Nlp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub method: String,
    pub url: String,
    pub mode: ToolMode,
    pub timeout_ms: u64,
    #[serde(default)]
    pub body: HashMap<String, String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStep {
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub with_params: HashMap<String, String>,
    #[serde(default)]
    pub analyst: bool,
}

impl PipelineStep {
    pub fn validate(&self) -> Result<(), CatalogError> {
        match (&self.tool, self.analyst) {
            (Some(_), false) => Ok(()),
            (None, true) => Ok(()),
            _ => Err(CatalogError::AmbiguousStep),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<PipelineStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    #[serde(rename = "type")]
    pub intent_type: String,
    #[serde(default)]
    pub description: String,
    pub pipeline: String,
    #[serde(default)]
    pub required_params: Vec<String>,
    #[serde(default)]
    pub allow_dangerous: bool,
    #[serde(default)]
    pub requires_amount: bool,
    #[serde(default)]
    pub requires_phone: bool,
    #[serde(default)]
    pub max_amount: Option<f64>,
    #[serde(default)]
    pub shadow_mode: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub tools: HashMap<String, Tool>,
    pub pipelines: HashMap<String, Pipeline>,
    pub intents: HashMap<String, Intent>,
}

impl Catalog {
    /// Builds a catalog from its three maps, eagerly checking every
    /// cross-reference and shape invariant. A catalog that fails to
    /// construct never reaches the bus or the agents.
    pub fn new(
        tools: HashMap<String, Tool>,
        pipelines: HashMap<String, Pipeline>,
        intents: HashMap<String, Intent>,
    ) -> Result<Self, CatalogError> {
        for pipeline in pipelines.values() {
            for step in &pipeline.steps {
                step.validate()?;
                if let Some(tool_name) = &step.tool {
                    if !tools.contains_key(tool_name) {
                        return Err(CatalogError::UnknownTool {
                            pipeline: pipeline.name.clone(),
                            tool: tool_name.clone(),
                        });
                    }
                }
            }
        }
        for intent in intents.values() {
            if !pipelines.contains_key(&intent.pipeline) {
                return Err(CatalogError::UnknownPipeline {
                    intent: intent.intent_type.clone(),
                    pipeline: intent.pipeline.clone(),
                });
            }
        }
        Ok(Self {
            tools,
            pipelines,
            intents,
        })
    }

    pub fn intent(&self, key: &str) -> Option<&Intent> {
        self.intents.get(key)
    }

    pub fn pipeline(&self, name: &str) -> Option<&Pipeline> {
        self.pipelines.get(name)
    }

    pub fn tool(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Whether a pipeline chains more than one dangerous tool. Used by
    /// the guard's dangerous-chain check.
    pub fn pipeline_dangerous_tool_count(&self, pipeline: &Pipeline) -> usize {
        pipeline
            .steps
            .iter()
            .filter_map(|s| s.tool.as_ref())
            .filter_map(|name| self.tools.get(name))
            .filter(|t| t.mode == ToolMode::Dangerous)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str, mode: ToolMode) -> Tool {
        Tool {
            name: name.to_owned(),
            kind: "http".to_owned(),
            method: "GET".to_owned(),
            url: "http://example.test".to_owned(),
            mode,
            timeout_ms: 1000,
            body: HashMap::new(),
            headers: HashMap::new(),
            model: None,
        }
    }

    #[test]
    fn rejects_pipeline_referencing_unknown_tool() {
        let mut tools = HashMap::new();
        tools.insert("a".to_owned(), tool("a", ToolMode::Read));
        let mut pipelines = HashMap::new();
        pipelines.insert(
            "p".to_owned(),
            Pipeline {
                name: "p".to_owned(),
                description: String::new(),
                steps: vec![PipelineStep {
                    tool: Some("missing".to_owned()),
                    with_params: HashMap::new(),
                    analyst: false,
                }],
            },
        );
        let err = Catalog::new(tools, pipelines, HashMap::new()).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownTool { .. }));
    }

    #[test]
    fn accepts_non_terminal_analyst_step() {
        // An analyst step followed by further steps is legal catalog data —
        // the Verifier's interpreter loop is what makes it terminal at
        // runtime, not catalog construction.
        let tools = HashMap::new();
        let mut pipelines = HashMap::new();
        pipelines.insert(
            "p".to_owned(),
            Pipeline {
                name: "p".to_owned(),
                description: String::new(),
                steps: vec![
                    PipelineStep {
                        tool: None,
                        with_params: HashMap::new(),
                        analyst: true,
                    },
                    PipelineStep {
                        tool: None,
                        with_params: HashMap::new(),
                        analyst: true,
                    },
                ],
            },
        );
        assert!(Catalog::new(tools, pipelines, HashMap::new()).is_ok());
    }

    #[test]
    fn accepts_well_formed_catalog() {
        let mut tools = HashMap::new();
        tools.insert("balance".to_owned(), tool("balance", ToolMode::Read));
        let mut pipelines = HashMap::new();
        pipelines.insert(
            "balance_pipeline".to_owned(),
            Pipeline {
                name: "balance_pipeline".to_owned(),
                description: String::new(),
                steps: vec![
                    PipelineStep {
                        tool: Some("balance".to_owned()),
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
            "check_balance".to_owned(),
            Intent {
                intent_type: "check_balance".to_owned(),
                description: String::new(),
                pipeline: "balance_pipeline".to_owned(),
                required_params: vec!["accountId".to_owned()],
                allow_dangerous: false,
                requires_amount: false,
                requires_phone: false,
                max_amount: None,
                shadow_mode: false,
            },
        );
        assert!(Catalog::new(tools, pipelines, intents).is_ok());
    }
}

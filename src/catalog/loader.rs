//! Convenience YAML-directory catalog loader.
//!
//! This is deliberately outside the orchestration core: no agent, guard,
//! verifier, or planner ever calls into this module. It exists so the
//! binary entrypoint and integration tests can stand the service up from
//! a directory of catalog files on disk, matching the merge-by-name
//! semantics of a directory of `tools.yaml`/`pipelines.yaml`/`intents.yaml`
//! style files: every file's entries are merged into one map by name,
//! across however many files are present.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::{Catalog, Intent, Pipeline, Tool};
use crate::error::CatalogError;

#[derive(Debug, Deserialize, Default)]
struct ToolsFile {
    #[serde(default)]
    tools: Vec<Tool>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelinesFile {
    #[serde(default)]
    pipelines: Vec<Pipeline>,
}

#[derive(Debug, Deserialize, Default)]
struct IntentsFile {
    #[serde(default)]
    intents: Vec<Intent>,
}

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

fn yaml_files(dir: &Path) -> std::io::Result<Vec<std::path::PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            )
        })
        .collect();
    files.sort();
    Ok(files)
}

fn read_yaml<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> Result<T, LoaderError> {
    let raw = std::fs::read_to_string(path).map_err(|e| LoaderError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    serde_yaml::from_str(&raw).map_err(|e| LoaderError::Parse {
        path: path.display().to_string(),
        source: e,
    })
}

/// Loads `base/tools/*.yaml`, `base/pipelines/*.yaml`, and
/// `base/intents/*.yaml`, merging every file's entries by name, then
/// builds and validates a [`Catalog`] from the result.
pub fn load_from_dir(base: &Path) -> Result<Catalog, LoaderError> {
    let mut tools = HashMap::new();
    for path in yaml_files(&base.join("tools"))? {
        let file: ToolsFile = read_yaml(&path)?;
        for tool in file.tools {
            tools.insert(tool.name.clone(), tool);
        }
    }

    let mut pipelines = HashMap::new();
    for path in yaml_files(&base.join("pipelines"))? {
        let file: PipelinesFile = read_yaml(&path)?;
        for pipeline in file.pipelines {
            pipelines.insert(pipeline.name.clone(), pipeline);
        }
    }

    let mut intents = HashMap::new();
    for path in yaml_files(&base.join("intents"))? {
        let file: IntentsFile = read_yaml(&path)?;
        for intent in file.intents {
            intents.insert(intent.intent_type.clone(), intent);
        }
    }

    Ok(Catalog::new(tools, pipelines, intents)?)
}

//! Application configuration.
//!
//! Loaded from an optional TOML file (`--config <path>`, default
//! `~/.aos/config.toml`), then overridden field-by-field by environment
//! variables, falling back to [`AppConfig::default`] for anything unset.
//! All fields carry `#[serde(default)]` so a partially-filled config file
//! works correctly.
//!
//! Example `config.toml`:
//! ```toml
//! [server]
//! port = 8080
//!
//! [llm]
//! ollama_base_url = "http://localhost:11434"
//! ollama_model = "qwen3:0.6b"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Optional shared secret. When set, `/ask` and `/task` require either
    /// `Authorization: Bearer <key>` or `X-API-Key: <key>`. When unset,
    /// auth is disabled entirely.
    pub api_key: Option<String>,
    pub rate_limit_per_minute: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            api_key: None,
            rate_limit_per_minute: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub llm_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            ollama_base_url: "http://localhost:11434".to_owned(),
            ollama_model: "qwen3:0.6b".to_owned(),
            llm_api_key: None,
            llm_base_url: None,
            llm_model: None,
            llm_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TaskConfig {
    pub default_ttl_secs: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self { default_ttl_secs: 60 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_owned() }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub task: TaskConfig,
    pub log: LogConfig,
}

pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".aos")
        .join("config.toml")
}

/// Loads `path` if it exists, otherwise returns [`AppConfig::default`].
/// A present-but-unparsable file is an error: a typo in a config file
/// should not silently fall back to defaults.
pub fn load_config(path: &Path) -> Result<AppConfig, String> {
    match std::fs::read_to_string(path) {
        Ok(raw) => toml::from_str(&raw)
            .map_err(|e| format!("failed to parse config at {}: {e}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(format!("failed to read config at {}: {e}", path.display())),
    }
}

/// Applies `AOS_*`/`OLLAMA_*`/`LLM_*` environment overrides on top of a
/// base config, matching the env var table in the service's external
/// interface contract.
pub fn apply_env_overrides(mut cfg: AppConfig) -> AppConfig {
    if let Ok(v) = std::env::var("PORT") {
        if let Ok(p) = v.parse() {
            cfg.server.port = p;
        }
    }
    if let Ok(v) = std::env::var("API_KEY") {
        if !v.is_empty() {
            cfg.server.api_key = Some(v);
        }
    }
    if let Ok(v) = std::env::var("OLLAMA_BASE_URL") {
        cfg.llm.ollama_base_url = v;
    }
    if let Ok(v) = std::env::var("OLLAMA_MODEL") {
        cfg.llm.ollama_model = v;
    }
    if let Ok(v) = std::env::var("LLM_API_KEY") {
        cfg.llm.llm_api_key = Some(v);
    }
    if let Ok(v) = std::env::var("LLM_BASE_URL") {
        cfg.llm.llm_base_url = Some(v);
    }
    if let Ok(v) = std::env::var("LLM_MODEL") {
        cfg.llm.llm_model = Some(v);
    }
    if let Ok(v) = std::env::var("LLM_TIMEOUT") {
        if let Ok(secs) = v.parse() {
            cfg.llm.llm_timeout_secs = secs;
        }
    }
    if let Ok(v) = std::env::var("LOG_LEVEL") {
        cfg.log.level = v;
    }
    cfg
}

pub fn load(path: Option<&Path>) -> Result<AppConfig, String> {
    let owned;
    let path = match path {
        Some(p) => p,
        None => {
            owned = default_config_path();
            &owned
        }
    };
    let cfg = load_config(path)?;
    Ok(apply_env_overrides(cfg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = load_config(Path::new("/nonexistent/path/config.toml")).unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn env_overrides_win_over_file() {
        std::env::set_var("PORT", "9999");
        let cfg = apply_env_overrides(AppConfig::default());
        assert_eq!(cfg.server.port, 9999);
        std::env::remove_var("PORT");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: AppConfig = toml::from_str("[server]\nport = 1234\n").unwrap();
        assert_eq!(cfg.server.port, 1234);
        assert_eq!(cfg.server.rate_limit_per_minute, 60);
    }
}

//! The tool-call templater: renders URLs, bodies, and headers.
//!
//! The dialect is deliberately small: `{{ .name }}` substitutes a
//! parameter by name, and the custom function `env "VAR"` reads an
//! environment variable (used for header templates like
//! `Authorization: Bearer {{ env "API_TOKEN" }}`). A parameter referenced
//! in a template but absent from the supplied map renders as the empty
//! string, never as a placeholder error — a caller that forgot a param
//! gets a blank substitution, not a crash.
//!
//! Built on `tera`: the `{{ .name }}` dialect is rewritten to tera's
//! native `{{ name }}` syntax (and `env "VAR"` to a tera function call)
//! before rendering, and every variable a template mentions is seeded
//! into the context as `""` before the caller's params are layered on
//! top, so a missing key can never surface as tera's "variable not
//! found" error.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use tera::{Context, Tera, Value};

use crate::error::TemplateError;

fn dot_var_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*\.(\w+)\s*\}\}").expect("static regex is valid"))
}

fn env_call_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"env\s+"([^"]*)""#).expect("static regex is valid"))
}

fn rewrite(template: &str) -> String {
    let step1 = dot_var_pattern().replace_all(template, "{{ $1 }}");
    env_call_pattern()
        .replace_all(&step1, "env(name=\"$1\")")
        .into_owned()
}

fn referenced_vars(template: &str) -> Vec<String> {
    dot_var_pattern()
        .captures_iter(template)
        .map(|c| c[1].to_owned())
        .collect()
}

fn env_function(
    args: &HashMap<String, Value>,
) -> tera::Result<Value> {
    let name = args
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| tera::Error::msg("env() requires a `name` argument"))?;
    Ok(Value::String(std::env::var(name).unwrap_or_default()))
}

fn engine() -> Tera {
    let mut tera = Tera::default();
    tera.register_function("env", env_function);
    tera
}

/// Renders a single template string against `params`.
pub fn render_string(template: &str, params: &HashMap<String, String>) -> Result<String, TemplateError> {
    let rewritten = rewrite(template);
    let mut ctx = Context::new();
    for name in referenced_vars(template) {
        ctx.insert(name, "");
    }
    for (k, v) in params {
        ctx.insert(k, v);
    }
    engine().render_str(&rewritten, &ctx).map_err(TemplateError::from)
}

/// Renders every value in `templates` against `params`, keeping keys.
pub fn render_map(
    templates: &HashMap<String, String>,
    params: &HashMap<String, String>,
) -> Result<HashMap<String, String>, TemplateError> {
    templates
        .iter()
        .map(|(k, v)| render_string(v, params).map(|rendered| (k.clone(), rendered)))
        .collect()
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use coverly_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    let source = |key: &str, env_var: Option<&str>| {
        field_source(key, env_var, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    lines.push(render_line(
        "llm.provider",
        &format!("{:?}", config.llm.provider),
        source("llm.provider", Some("COVERLY_LLM_PROVIDER")),
    ));
    lines.push(render_line(
        "llm.model",
        &config.llm.model,
        source("llm.model", Some("COVERLY_LLM_MODEL")),
    ));
    lines.push(render_line(
        "llm.base_url",
        config.llm.base_url.as_deref().unwrap_or("(provider default)"),
        source("llm.base_url", Some("COVERLY_LLM_BASE_URL")),
    ));
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "(unset)".to_string());
    lines.push(render_line(
        "llm.api_key",
        &api_key,
        source("llm.api_key", Some("COVERLY_LLM_API_KEY")),
    ));
    lines.push(render_line(
        "llm.timeout_secs",
        &config.llm.timeout_secs.to_string(),
        source("llm.timeout_secs", Some("COVERLY_LLM_TIMEOUT_SECS")),
    ));

    lines.push(render_line(
        "embedding.base_url",
        &config.embedding.base_url,
        source("embedding.base_url", Some("COVERLY_EMBEDDING_BASE_URL")),
    ));
    lines.push(render_line(
        "embedding.model",
        &config.embedding.model,
        source("embedding.model", Some("COVERLY_EMBEDDING_MODEL")),
    ));

    lines.push(render_line(
        "retrieval.top_k",
        &config.retrieval.top_k.to_string(),
        source("retrieval.top_k", Some("COVERLY_RETRIEVAL_TOP_K")),
    ));
    lines.push(render_line(
        "policies.dir",
        &config.policies.dir.display().to_string(),
        source("policies.dir", Some("COVERLY_POLICIES_DIR")),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", Some("COVERLY_SERVER_BIND_ADDRESS")),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", Some("COVERLY_SERVER_PORT")),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", Some("COVERLY_LOGGING_LEVEL")),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", Some("COVERLY_LOGGING_FORMAT")),
    ));

    lines.join("\n")
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("  {key:<24} = {value:<40} [{source}]")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("coverly.toml"), PathBuf::from("config/coverly.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key: &str,
    env_var: Option<&str>,
    file_doc: Option<&Value>,
    file_path: Option<&Path>,
) -> String {
    if let Some(var) = env_var {
        if env::var(var).map(|value| !value.trim().is_empty()).unwrap_or(false) {
            return format!("env:{var}");
        }
    }

    if let (Some(doc), Some(path)) = (file_doc, file_path) {
        if file_has_key(doc, key) {
            return format!("file:{}", path.display());
        }
    }

    "default".to_string()
}

fn file_has_key(doc: &Value, dotted_key: &str) -> bool {
    let mut cursor = doc;
    for part in dotted_key.split('.') {
        match cursor.get(part) {
            Some(next) => cursor = next,
            None => return false,
        }
    }
    true
}

fn redact_token(token: &str) -> String {
    if token.len() <= 8 {
        return "****".to_string();
    }
    format!("{}****{}", &token[..4], &token[token.len() - 2..])
}

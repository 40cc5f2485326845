use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use relist_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |field: &str, env_var: &str| {
        field_source(field, env_var, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line("database.url", &config.database.url, source("database.url", "RELIST_DATABASE_URL")));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", "RELIST_DATABASE_MAX_CONNECTIONS"),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", "RELIST_DATABASE_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "llm.provider",
        &format!("{:?}", config.llm.provider),
        source("llm.provider", "RELIST_LLM_PROVIDER"),
    ));
    lines.push(render_line(
        "llm.model",
        &config.llm.model,
        source("llm.model", "RELIST_LLM_MODEL"),
    ));
    lines.push(render_line(
        "llm.base_url",
        config.llm.base_url.as_deref().unwrap_or("(unset)"),
        source("llm.base_url", "RELIST_LLM_BASE_URL"),
    ));
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "(unset)".to_string());
    lines.push(render_line("llm.api_key", &api_key, source("llm.api_key", "RELIST_LLM_API_KEY")));
    lines.push(render_line(
        "llm.timeout_secs",
        &config.llm.timeout_secs.to_string(),
        source("llm.timeout_secs", "RELIST_LLM_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "insights.cache_ttl_minutes",
        &config.insights.cache_ttl_minutes.to_string(),
        source("insights.cache_ttl_minutes", "RELIST_INSIGHTS_CACHE_TTL_MINUTES"),
    ));
    lines.push(render_line(
        "insights.stale_after_minutes",
        &config.insights.stale_after_minutes.to_string(),
        source("insights.stale_after_minutes", "RELIST_INSIGHTS_STALE_AFTER_MINUTES"),
    ));
    lines.push(render_line(
        "insights.sales_window_days",
        &config.insights.sales_window_days.to_string(),
        source("insights.sales_window_days", "RELIST_INSIGHTS_SALES_WINDOW_DAYS"),
    ));
    lines.push(render_line(
        "insights.max_sales_records",
        &config.insights.max_sales_records.to_string(),
        source("insights.max_sales_records", "RELIST_INSIGHTS_MAX_SALES_RECORDS"),
    ));
    lines.push(render_line(
        "insights.min_segment_samples",
        &config.insights.min_segment_samples.to_string(),
        source("insights.min_segment_samples", "RELIST_INSIGHTS_MIN_SEGMENT_SAMPLES"),
    ));
    lines.push(render_line(
        "insights.bundle_discount_percent",
        &config.insights.bundle_discount_percent.to_string(),
        source("insights.bundle_discount_percent", "RELIST_INSIGHTS_BUNDLE_DISCOUNT_PERCENT"),
    ));
    lines.push(render_line(
        "insights.regen_delay_ms",
        &config.insights.regen_delay_ms.to_string(),
        source("insights.regen_delay_ms", "RELIST_INSIGHTS_REGEN_DELAY_MS"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "RELIST_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "RELIST_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn render_line(field: &str, value: &str, source: String) -> String {
    format!("  {field} = {value}  [{source}]")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("relist.toml"), PathBuf::from("config/relist.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    field: &str,
    env_var: &str,
    file_doc: Option<&Value>,
    file_path: Option<&Path>,
) -> String {
    if env::var(env_var).map(|value| !value.trim().is_empty()).unwrap_or(false) {
        return format!("env:{env_var}");
    }

    if let (Some(doc), Some(path)) = (file_doc, file_path) {
        if file_has_field(doc, field) {
            return format!("file:{}", path.display());
        }
    }

    "default".to_string()
}

fn file_has_field(doc: &Value, field: &str) -> bool {
    let mut current = doc;
    for segment in field.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
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

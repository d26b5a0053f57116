use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use kbassist_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

/// One reported setting: dotted key, rendered value and the env vars that can set it.
struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Field {
    fn new(key: &'static str, value: impl ToString, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.to_string(), env_keys }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let backend = &config.backend;
    let pipeline = &config.pipeline;
    vec![
        Field::new(
            "backend.api_key",
            redact_secret(backend.api_key.expose_secret()),
            &["KBASSIST_BACKEND_API_KEY"],
        ),
        Field::new("backend.assistant_id", &backend.assistant_id, &["KBASSIST_BACKEND_ASSISTANT_ID"]),
        Field::new("backend.base_url", &backend.base_url, &["KBASSIST_BACKEND_BASE_URL"]),
        Field::new(
            "backend.request_timeout_secs",
            backend.request_timeout_secs,
            &["KBASSIST_BACKEND_REQUEST_TIMEOUT_SECS"],
        ),
        Field::new(
            "pipeline.focused_temperature",
            pipeline.focused_temperature,
            &["KBASSIST_PIPELINE_FOCUSED_TEMPERATURE"],
        ),
        Field::new(
            "pipeline.exploratory_temperature",
            pipeline.exploratory_temperature,
            &["KBASSIST_PIPELINE_EXPLORATORY_TEMPERATURE"],
        ),
        Field::new(
            "pipeline.structure_guardrail",
            pipeline.structure_guardrail,
            &["KBASSIST_PIPELINE_STRUCTURE_GUARDRAIL"],
        ),
        Field::new(
            "pipeline.scope_guardrail",
            pipeline.scope_guardrail,
            &["KBASSIST_PIPELINE_SCOPE_GUARDRAIL"],
        ),
        Field::new(
            "pipeline.max_rewrite_attempts",
            pipeline.max_rewrite_attempts,
            &["KBASSIST_PIPELINE_MAX_REWRITE_ATTEMPTS"],
        ),
        Field::new(
            "pipeline.poll_interval_ms",
            pipeline.poll_interval_ms,
            &["KBASSIST_PIPELINE_POLL_INTERVAL_MS"],
        ),
        Field::new(
            "pipeline.run_timeout_secs",
            pipeline.run_timeout_secs,
            &["KBASSIST_PIPELINE_RUN_TIMEOUT_SECS"],
        ),
        Field::new("thread_store.kind", config.thread_store.kind.as_str(), &["KBASSIST_THREAD_STORE"]),
        Field::new("database.url", &config.database.url, &["KBASSIST_DATABASE_URL"]),
        Field::new(
            "database.max_connections",
            config.database.max_connections,
            &["KBASSIST_DATABASE_MAX_CONNECTIONS"],
        ),
        Field::new(
            "database.timeout_secs",
            config.database.timeout_secs,
            &["KBASSIST_DATABASE_TIMEOUT_SECS"],
        ),
        Field::new(
            "server.bind_address",
            &config.server.bind_address,
            &["KBASSIST_SERVER_BIND_ADDRESS"],
        ),
        Field::new("server.port", config.server.port, &["KBASSIST_SERVER_PORT"]),
        Field::new("batch.max_retries", config.batch.max_retries, &["KBASSIST_BATCH_MAX_RETRIES"]),
        Field::new(
            "batch.initial_delay_ms",
            config.batch.initial_delay_ms,
            &["KBASSIST_BATCH_INITIAL_DELAY_MS"],
        ),
        Field::new(
            "batch.max_jitter_ms",
            config.batch.max_jitter_ms,
            &["KBASSIST_BATCH_MAX_JITTER_MS"],
        ),
        Field::new("batch.concurrency", config.batch.concurrency, &["KBASSIST_BATCH_CONCURRENCY"]),
        Field::new(
            "logging.level",
            &config.logging.level,
            &["KBASSIST_LOGGING_LEVEL", "KBASSIST_LOG_LEVEL"],
        ),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["KBASSIST_LOGGING_FORMAT", "KBASSIST_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("kbassist.toml"), PathBuf::from("config/kbassist.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a recognisable key prefix (`sk-`, `sk-proj-`) and hides everything else.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.rsplit_once('-') {
        Some((prefix, _)) if prefix.len() <= 8 => format!("{prefix}-***"),
        _ => "<redacted>".to_string(),
    }
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub pipeline: PipelineConfig,
    pub thread_store: ThreadStoreConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub batch: BatchConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub api_key: SecretString,
    pub assistant_id: String,
    pub base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    pub focused_temperature: f32,
    pub exploratory_temperature: f32,
    pub structure_guardrail: bool,
    pub scope_guardrail: bool,
    pub max_rewrite_attempts: u32,
    pub poll_interval_ms: u64,
    pub run_timeout_secs: u64,
}

impl PipelineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            focused_temperature: 0.2,
            exploratory_temperature: 0.4,
            structure_guardrail: true,
            scope_guardrail: true,
            max_rewrite_attempts: 1,
            poll_interval_ms: 800,
            run_timeout_secs: 60,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadStoreConfig {
    pub kind: ThreadStoreKind,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_jitter_ms: u64,
    pub concurrency: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStoreKind {
    Memory,
    Sqlite,
}

impl ThreadStoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub api_key: Option<String>,
    pub assistant_id: Option<String>,
    pub base_url: Option<String>,
    pub thread_store: Option<ThreadStoreKind>,
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub max_rewrite_attempts: Option<u32>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                api_key: String::new().into(),
                assistant_id: String::new(),
                base_url: "https://api.openai.com/v1".to_string(),
                request_timeout_secs: 30,
            },
            pipeline: PipelineConfig::default(),
            thread_store: ThreadStoreConfig { kind: ThreadStoreKind::Memory },
            database: DatabaseConfig {
                url: "sqlite://kbassist.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 5000 },
            batch: BatchConfig {
                max_retries: 5,
                initial_delay_ms: 1_000,
                max_jitter_ms: 1_000,
                concurrency: 4,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for ThreadStoreKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ConfigError::Validation(format!(
                "unsupported thread store `{other}` (expected memory|sqlite)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("kbassist.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(backend) = patch.backend {
            if let Some(api_key_value) = backend.api_key {
                self.backend.api_key = secret_value(api_key_value);
            }
            if let Some(assistant_id) = backend.assistant_id {
                self.backend.assistant_id = assistant_id;
            }
            if let Some(base_url) = backend.base_url {
                self.backend.base_url = base_url;
            }
            if let Some(request_timeout_secs) = backend.request_timeout_secs {
                self.backend.request_timeout_secs = request_timeout_secs;
            }
        }

        if let Some(pipeline) = patch.pipeline {
            if let Some(value) = pipeline.focused_temperature {
                self.pipeline.focused_temperature = value;
            }
            if let Some(value) = pipeline.exploratory_temperature {
                self.pipeline.exploratory_temperature = value;
            }
            if let Some(value) = pipeline.structure_guardrail {
                self.pipeline.structure_guardrail = value;
            }
            if let Some(value) = pipeline.scope_guardrail {
                self.pipeline.scope_guardrail = value;
            }
            if let Some(value) = pipeline.max_rewrite_attempts {
                self.pipeline.max_rewrite_attempts = value;
            }
            if let Some(value) = pipeline.poll_interval_ms {
                self.pipeline.poll_interval_ms = value;
            }
            if let Some(value) = pipeline.run_timeout_secs {
                self.pipeline.run_timeout_secs = value;
            }
        }

        if let Some(thread_store) = patch.thread_store {
            if let Some(kind) = thread_store.kind {
                self.thread_store.kind = kind;
            }
        }

        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(batch) = patch.batch {
            if let Some(max_retries) = batch.max_retries {
                self.batch.max_retries = max_retries;
            }
            if let Some(initial_delay_ms) = batch.initial_delay_ms {
                self.batch.initial_delay_ms = initial_delay_ms;
            }
            if let Some(max_jitter_ms) = batch.max_jitter_ms {
                self.batch.max_jitter_ms = max_jitter_ms;
            }
            if let Some(concurrency) = batch.concurrency {
                self.batch.concurrency = concurrency;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("KBASSIST_BACKEND_API_KEY") {
            self.backend.api_key = secret_value(value);
        }
        if let Some(value) = read_env("KBASSIST_BACKEND_ASSISTANT_ID") {
            self.backend.assistant_id = value;
        }
        if let Some(value) = read_env("KBASSIST_BACKEND_BASE_URL") {
            self.backend.base_url = value;
        }
        if let Some(value) = read_env("KBASSIST_BACKEND_REQUEST_TIMEOUT_SECS") {
            self.backend.request_timeout_secs =
                parse_u64("KBASSIST_BACKEND_REQUEST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("KBASSIST_PIPELINE_FOCUSED_TEMPERATURE") {
            self.pipeline.focused_temperature =
                parse_f32("KBASSIST_PIPELINE_FOCUSED_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("KBASSIST_PIPELINE_EXPLORATORY_TEMPERATURE") {
            self.pipeline.exploratory_temperature =
                parse_f32("KBASSIST_PIPELINE_EXPLORATORY_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("KBASSIST_PIPELINE_STRUCTURE_GUARDRAIL") {
            self.pipeline.structure_guardrail =
                parse_bool("KBASSIST_PIPELINE_STRUCTURE_GUARDRAIL", &value)?;
        }
        if let Some(value) = read_env("KBASSIST_PIPELINE_SCOPE_GUARDRAIL") {
            self.pipeline.scope_guardrail =
                parse_bool("KBASSIST_PIPELINE_SCOPE_GUARDRAIL", &value)?;
        }
        if let Some(value) = read_env("KBASSIST_PIPELINE_MAX_REWRITE_ATTEMPTS") {
            self.pipeline.max_rewrite_attempts =
                parse_u32("KBASSIST_PIPELINE_MAX_REWRITE_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("KBASSIST_PIPELINE_POLL_INTERVAL_MS") {
            self.pipeline.poll_interval_ms =
                parse_u64("KBASSIST_PIPELINE_POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = read_env("KBASSIST_PIPELINE_RUN_TIMEOUT_SECS") {
            self.pipeline.run_timeout_secs =
                parse_u64("KBASSIST_PIPELINE_RUN_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("KBASSIST_THREAD_STORE") {
            self.thread_store.kind = value.parse()?;
        }

        if let Some(value) = read_env("KBASSIST_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("KBASSIST_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("KBASSIST_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("KBASSIST_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("KBASSIST_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("KBASSIST_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("KBASSIST_SERVER_PORT") {
            self.server.port = parse_u16("KBASSIST_SERVER_PORT", &value)?;
        }

        if let Some(value) = read_env("KBASSIST_BATCH_MAX_RETRIES") {
            self.batch.max_retries = parse_u32("KBASSIST_BATCH_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("KBASSIST_BATCH_INITIAL_DELAY_MS") {
            self.batch.initial_delay_ms = parse_u64("KBASSIST_BATCH_INITIAL_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("KBASSIST_BATCH_MAX_JITTER_MS") {
            self.batch.max_jitter_ms = parse_u64("KBASSIST_BATCH_MAX_JITTER_MS", &value)?;
        }
        if let Some(value) = read_env("KBASSIST_BATCH_CONCURRENCY") {
            self.batch.concurrency = parse_u32("KBASSIST_BATCH_CONCURRENCY", &value)? as usize;
        }

        let log_level =
            read_env("KBASSIST_LOGGING_LEVEL").or_else(|| read_env("KBASSIST_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("KBASSIST_LOGGING_FORMAT").or_else(|| read_env("KBASSIST_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(api_key) = overrides.api_key {
            self.backend.api_key = secret_value(api_key);
        }
        if let Some(assistant_id) = overrides.assistant_id {
            self.backend.assistant_id = assistant_id;
        }
        if let Some(base_url) = overrides.base_url {
            self.backend.base_url = base_url;
        }
        if let Some(kind) = overrides.thread_store {
            self.thread_store.kind = kind;
        }
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(max_rewrite_attempts) = overrides.max_rewrite_attempts {
            self.pipeline.max_rewrite_attempts = max_rewrite_attempts;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_backend(&self.backend)?;
        validate_pipeline(&self.pipeline)?;
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_batch(&self.batch)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("kbassist.toml"), PathBuf::from("config/kbassist.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_backend(backend: &BackendConfig) -> Result<(), ConfigError> {
    if backend.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "backend.api_key is required (set KBASSIST_BACKEND_API_KEY)".to_string(),
        ));
    }

    if backend.assistant_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "backend.assistant_id is required (set KBASSIST_BACKEND_ASSISTANT_ID)".to_string(),
        ));
    }

    let base_url = backend.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "backend.base_url must start with http:// or https://".to_string(),
        ));
    }

    if backend.request_timeout_secs == 0 || backend.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "backend.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_pipeline(pipeline: &PipelineConfig) -> Result<(), ConfigError> {
    for (key, value) in [
        ("pipeline.focused_temperature", pipeline.focused_temperature),
        ("pipeline.exploratory_temperature", pipeline.exploratory_temperature),
    ] {
        if !(0.0..=2.0).contains(&value) {
            return Err(ConfigError::Validation(format!("{key} must be in range 0.0..=2.0")));
        }
    }

    if pipeline.max_rewrite_attempts > 5 {
        return Err(ConfigError::Validation(
            "pipeline.max_rewrite_attempts must be at most 5".to_string(),
        ));
    }

    if pipeline.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "pipeline.poll_interval_ms must be greater than zero".to_string(),
        ));
    }

    if pipeline.run_timeout_secs == 0 || pipeline.run_timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "pipeline.run_timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    Ok(())
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    Ok(())
}

fn validate_batch(batch: &BatchConfig) -> Result<(), ConfigError> {
    if batch.initial_delay_ms == 0 {
        return Err(ConfigError::Validation(
            "batch.initial_delay_ms must be greater than zero".to_string(),
        ));
    }

    if batch.concurrency == 0 || batch.concurrency > 64 {
        return Err(ConfigError::Validation(
            "batch.concurrency must be in range 1..=64".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    backend: Option<BackendPatch>,
    pipeline: Option<PipelinePatch>,
    thread_store: Option<ThreadStorePatch>,
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    batch: Option<BatchPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendPatch {
    api_key: Option<String>,
    assistant_id: Option<String>,
    base_url: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelinePatch {
    focused_temperature: Option<f32>,
    exploratory_temperature: Option<f32>,
    structure_guardrail: Option<bool>,
    scope_guardrail: Option<bool>,
    max_rewrite_attempts: Option<u32>,
    poll_interval_ms: Option<u64>,
    run_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ThreadStorePatch {
    kind: Option<ThreadStoreKind>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct BatchPatch {
    max_retries: Option<u32>,
    initial_delay_ms: Option<u64>,
    max_jitter_ms: Option<u64>,
    concurrency: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

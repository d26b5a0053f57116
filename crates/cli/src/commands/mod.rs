pub mod ask;
pub mod batch;
pub mod config;

use std::sync::Arc;

use kbassist_agent::{AgentRuntime, KeyedThreadStore, OpenAiAssistantsBackend};
use kbassist_core::backend::AssistantBackend;
use kbassist_core::config::{AppConfig, LoadOptions, ThreadStoreKind};
use kbassist_core::errors::InterfaceError;
use kbassist_db::{
    connect, migrations, DbPool, InMemoryThreadMappingRepository, SqlThreadMappingRepository,
    ThreadMappingRepository,
};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(&payload) }
    }

    /// Emits a command-specific payload; callers include `command` and `status` themselves.
    pub fn payload(exit_code: u8, payload: &impl Serialize) -> Self {
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: &impl Serialize) -> String {
    serde_json::to_string(payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Failure triple shared by the async command bodies: error class, message, exit code.
pub(crate) type CommandFailure = (&'static str, String, u8);

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })
}

pub(crate) fn async_runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_multi_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}

pub(crate) fn http_backend(
    command: &str,
    config: &AppConfig,
) -> Result<Arc<dyn AssistantBackend>, CommandResult> {
    OpenAiAssistantsBackend::new(&config.backend)
        .map(|backend| Arc::new(backend) as Arc<dyn AssistantBackend>)
        .map_err(|error| CommandResult::failure(command, "backend_init", error.to_string(), 3))
}

/// Opens the configured mapping store; the pool is returned so callers can close it.
pub(crate) async fn open_repository(
    config: &AppConfig,
) -> Result<(Arc<dyn ThreadMappingRepository>, Option<DbPool>), CommandFailure> {
    let (repository, pool): (Arc<dyn ThreadMappingRepository>, Option<DbPool>) =
        match config.thread_store.kind {
            ThreadStoreKind::Memory => (Arc::new(InMemoryThreadMappingRepository::default()), None),
            ThreadStoreKind::Sqlite => {
                let pool = connect(&config.database)
                    .await
                    .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
                migrations::run_pending(&pool)
                    .await
                    .map_err(|error| ("migration", error.to_string(), 5u8))?;
                (Arc::new(SqlThreadMappingRepository::new(pool.clone())), Some(pool))
            }
        };
    Ok((repository, pool))
}

pub(crate) fn build_runtime(
    config: &AppConfig,
    repository: Arc<dyn ThreadMappingRepository>,
    backend: Arc<dyn AssistantBackend>,
) -> AgentRuntime {
    let threads = Arc::new(KeyedThreadStore::new(repository, backend.clone()));
    AgentRuntime::new(backend, threads, &config.pipeline)
}

pub(crate) fn error_class(error: &InterfaceError) -> &'static str {
    match error {
        InterfaceError::BadRequest { .. } => "invalid_input",
        InterfaceError::Unauthorized { .. } => "backend_auth",
        InterfaceError::RateLimited { .. } => "rate_limited",
        InterfaceError::BadGateway { .. } => "backend_failure",
        InterfaceError::GatewayTimeout { .. } => "timeout",
        InterfaceError::Internal { .. } => "internal",
    }
}

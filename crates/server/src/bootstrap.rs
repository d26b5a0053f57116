use std::sync::Arc;

use kbassist_agent::{AgentRuntime, KeyedThreadStore, OpenAiAssistantsBackend};
use kbassist_core::backend::AssistantBackend;
use kbassist_core::config::{AppConfig, ConfigError, ThreadStoreKind};
use kbassist_core::errors::BackendError;
use kbassist_db::{
    connect, migrations, DbPool, InMemoryThreadMappingRepository, SqlThreadMappingRepository,
    ThreadMappingRepository,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: Option<DbPool>,
    pub agent_runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("assistant backend client could not be built: {0}")]
    Backend(#[source] BackendError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let backend =
        OpenAiAssistantsBackend::new(&config.backend).map_err(BootstrapError::Backend)?;
    bootstrap_with_backend(config, Arc::new(backend)).await
}

pub async fn bootstrap_with_backend(
    config: AppConfig,
    backend: Arc<dyn AssistantBackend>,
) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        thread_store = config.thread_store.kind.as_str(),
        "starting application bootstrap"
    );

    let (repository, db_pool): (Arc<dyn ThreadMappingRepository>, Option<DbPool>) =
        match config.thread_store.kind {
            ThreadStoreKind::Memory => (Arc::new(InMemoryThreadMappingRepository::default()), None),
            ThreadStoreKind::Sqlite => {
                let pool =
                    connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
                info!(
                    event_name = "system.bootstrap.database_connected",
                    correlation_id = "bootstrap",
                    "database connection established"
                );
                migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
                info!(
                    event_name = "system.bootstrap.migrations_applied",
                    correlation_id = "bootstrap",
                    "database migrations applied"
                );
                (Arc::new(SqlThreadMappingRepository::new(pool.clone())), Some(pool))
            }
        };

    let threads = Arc::new(KeyedThreadStore::new(repository, backend.clone()));
    let agent_runtime = Arc::new(AgentRuntime::new(backend, threads, &config.pipeline));

    Ok(Application { config, db_pool, agent_runtime })
}

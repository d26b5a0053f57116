mod bootstrap;
mod chat;
mod health;

use anyhow::Result;
use axum::{routing::get, Router};
use kbassist_core::config::{AppConfig, LoadOptions};

use crate::bootstrap::Application;
use crate::health::HealthState;

fn init_logging(config: &AppConfig) {
    use kbassist_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

fn app_router(app: &Application) -> Router {
    let health_state = HealthState {
        assistant_id: app.config.backend.assistant_id.clone(),
        thread_store: app.config.thread_store.kind,
        db_pool: app.db_pool.clone(),
    };

    chat::router(app.agent_runtime.clone())
        .merge(Router::new().route("/health", get(health::health)).with_state(health_state))
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        assistant_id = %app.config.backend.assistant_id,
        thread_store = app.config.thread_store.kind.as_str(),
        "kbassist-server listening"
    );

    axum::serve(listener, app_router(&app)).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "kbassist-server stopping"
    );
    if let Some(pool) = &app.db_pool {
        pool.close().await;
    }

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "failed to listen for shutdown signal"
        );
    }
}

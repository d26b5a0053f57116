use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use kbassist_core::config::ThreadStoreKind;
use kbassist_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    pub assistant_id: String,
    pub thread_store: ThreadStoreKind,
    pub db_pool: Option<DbPool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub assistant_id: String,
    pub thread_store: &'static str,
    pub database: HealthCheck,
    pub checked_at: String,
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match &state.db_pool {
        Some(pool) => database_check(pool).await,
        None => HealthCheck {
            status: "ready",
            detail: "in-memory thread store, no database configured".to_string(),
        },
    };
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ok" } else { "degraded" },
        service: "kbassist-server",
        assistant_id: state.assistant_id.clone(),
        thread_store: state.thread_store.as_str(),
        database,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use kbassist_agent::AgentRuntime;
use kbassist_core::domain::conversation::{ConversationId, UserId};
use kbassist_core::domain::turn::{TurnHints, TurnRequest};
use kbassist_core::errors::{InterfaceError, TurnError};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ChatState {
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub task: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub thread_id: String,
    pub user_id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DeleteThreadRequest {
    pub user_id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteThreadResponse {
    pub deleted: bool,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub correlation_id: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/thread/delete", post(delete_thread))
        .with_state(ChatState { runtime })
}

pub async fn chat(
    State(state): State<ChatState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let Json(request) = payload.map_err(|rejection| bad_json(rejection, &correlation_id))?;

    let turn = TurnRequest {
        user_id: UserId(request.user_id),
        message: request.message,
        thread_id: request.thread_id.map(ConversationId),
        hints: TurnHints {
            product: request.product,
            language: request.language,
            task: request.task,
        },
    };

    info!(
        event_name = "server.chat.received",
        correlation_id = %correlation_id,
        user_id = %turn.user_id,
        "chat request received"
    );

    let response = state
        .runtime
        .handle_turn(turn)
        .await
        .map_err(|error| turn_error(error, &correlation_id))?;

    Ok(Json(ChatResponse {
        response: response.response,
        thread_id: response.thread_id.0,
        user_id: response.user_id.0,
    }))
}

pub async fn delete_thread(
    State(state): State<ChatState>,
    payload: Result<Json<DeleteThreadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DeleteThreadResponse>), ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let Json(request) = payload.map_err(|rejection| bad_json(rejection, &correlation_id))?;

    let user_id = UserId(request.user_id);
    let expected = request.thread_id.filter(|id| !id.trim().is_empty()).map(ConversationId);
    let deleted = state
        .runtime
        .delete_thread(&user_id, expected.as_ref())
        .await
        .map_err(|error| turn_error(error, &correlation_id))?;

    let thread_label = expected.as_ref().map(ConversationId::as_str).unwrap_or("mapping");
    if deleted {
        Ok((
            StatusCode::OK,
            Json(DeleteThreadResponse {
                deleted: true,
                message: format!("Thread {thread_label} deleted successfully."),
            }),
        ))
    } else {
        Ok((
            StatusCode::NOT_FOUND,
            Json(DeleteThreadResponse {
                deleted: false,
                message: format!("Thread {thread_label} not found for user {user_id}."),
            }),
        ))
    }
}

fn bad_json(rejection: JsonRejection, correlation_id: &str) -> ApiError {
    warn!(
        event_name = "server.request.rejected",
        correlation_id = %correlation_id,
        error = %rejection.body_text(),
        "request body rejected"
    );
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: "bad_request".to_string(),
            message: rejection.body_text(),
            correlation_id: correlation_id.to_string(),
        }),
    )
}

fn turn_error(error: TurnError, correlation_id: &str) -> ApiError {
    let interface = error.into_interface(correlation_id);
    let status = StatusCode::from_u16(interface.status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if status.is_server_error() {
        error!(
            event_name = "server.chat.failed",
            correlation_id = %correlation_id,
            status = status.as_u16(),
            error = %interface,
            "turn failed"
        );
    } else {
        warn!(
            event_name = "server.chat.rejected",
            correlation_id = %correlation_id,
            status = status.as_u16(),
            error = %interface,
            "turn rejected"
        );
    }

    (
        status,
        Json(ErrorBody {
            error: error_kind(&interface).to_string(),
            message: interface.message().to_string(),
            correlation_id: interface.correlation_id().to_string(),
        }),
    )
}

fn error_kind(error: &InterfaceError) -> &'static str {
    match error {
        InterfaceError::BadRequest { .. } => "bad_request",
        InterfaceError::Unauthorized { .. } => "unauthorized",
        InterfaceError::RateLimited { .. } => "rate_limited",
        InterfaceError::BadGateway { .. } => "bad_gateway",
        InterfaceError::GatewayTimeout { .. } => "gateway_timeout",
        InterfaceError::Internal { .. } => "internal",
    }
}

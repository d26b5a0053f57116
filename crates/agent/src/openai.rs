//! HTTP implementation of [`AssistantBackend`] against an OpenAI Assistants v2 style
//! threads/runs API.

use std::time::Duration;

use async_trait::async_trait;
use kbassist_core::backend::AssistantBackend;
use kbassist_core::config::BackendConfig;
use kbassist_core::domain::conversation::{
    ConversationId, ConversationMessage, MessageOrder, MessageRole,
};
use kbassist_core::domain::run::{Run, RunError, RunId, RunRequest, RunStatus};
use kbassist_core::errors::BackendError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const ASSISTANTS_BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

pub struct OpenAiAssistantsBackend {
    client: Client,
    api_key: SecretString,
    assistant_id: String,
    base_url: String,
}

impl OpenAiAssistantsBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|error| BackendError::Transport(error.to_string()))?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            assistant_id: config.assistant_id.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(self.api_key.expose_secret())
            .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, BackendError> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|error| BackendError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_secs(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, retry_after, &body));
        }

        response.json::<T>().await.map_err(|error| BackendError::Decode(error.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    id: String,
    status: String,
    #[serde(default)]
    last_error: Option<RunErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RunErrorObject {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<MessageObject>,
}

#[derive(Debug, Deserialize)]
struct MessageObject {
    role: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(default)]
    text: Option<TextContent>,
}

#[derive(Debug, Deserialize)]
struct TextContent {
    value: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl From<RunObject> for Run {
    fn from(run: RunObject) -> Self {
        Self {
            id: RunId(run.id),
            status: RunStatus::from_wire(&run.status),
            last_error: run
                .last_error
                .map(|error| RunError { code: error.code, message: error.message }),
        }
    }
}

impl From<MessageObject> for ConversationMessage {
    fn from(message: MessageObject) -> Self {
        let role =
            if message.role == "assistant" { MessageRole::Assistant } else { MessageRole::User };
        // Only the first content part is read; image or file parts carry no text.
        let text = message.content.into_iter().next().and_then(|part| part.text).map(|t| t.value);
        Self { role, text }
    }
}

fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()
}

fn status_error(status: StatusCode, retry_after_secs: Option<u64>, body: &str) -> BackendError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status.to_string()
            } else {
                trimmed.to_string()
            }
        });

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Authentication(message),
        StatusCode::TOO_MANY_REQUESTS => BackendError::RateLimited { message, retry_after_secs },
        _ => BackendError::Service { status: status.as_u16(), message },
    }
}

#[async_trait]
impl AssistantBackend for OpenAiAssistantsBackend {
    async fn create_conversation(&self) -> Result<ConversationId, BackendError> {
        let thread: ThreadObject =
            self.send(self.client.post(self.url("threads")).json(&json!({}))).await?;
        debug!(event_name = "backend.thread.created", thread_id = %thread.id, "created thread");
        Ok(ConversationId(thread.id))
    }

    async fn append_message(
        &self,
        conversation: &ConversationId,
        role: MessageRole,
        text: &str,
    ) -> Result<(), BackendError> {
        let path = format!("threads/{conversation}/messages");
        let body = json!({ "role": role.as_str(), "content": text });
        let _: serde_json::Value = self.send(self.client.post(self.url(&path)).json(&body)).await?;
        Ok(())
    }

    async fn submit_run(
        &self,
        conversation: &ConversationId,
        request: &RunRequest,
    ) -> Result<Run, BackendError> {
        let path = format!("threads/{conversation}/runs");
        let body = json!({
            "assistant_id": self.assistant_id,
            "instructions": request.instructions,
            "temperature": request.temperature,
        });
        let run: RunObject = self.send(self.client.post(self.url(&path)).json(&body)).await?;
        Ok(run.into())
    }

    async fn get_run(
        &self,
        conversation: &ConversationId,
        run: &RunId,
    ) -> Result<Run, BackendError> {
        let path = format!("threads/{conversation}/runs/{run}");
        let run: RunObject = self.send(self.client.get(self.url(&path))).await?;
        Ok(run.into())
    }

    async fn list_messages(
        &self,
        conversation: &ConversationId,
        order: MessageOrder,
    ) -> Result<Vec<ConversationMessage>, BackendError> {
        let path = format!("threads/{conversation}/messages");
        let list: MessageList = self
            .send(self.client.get(self.url(&path)).query(&[("order", order.as_query_value())]))
            .await?;
        Ok(list.data.into_iter().map(ConversationMessage::from).collect())
    }
}

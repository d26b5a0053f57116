//! Collaborator surface of the hosted assistant backend.
//!
//! The pipeline only ever talks to the backend through [`AssistantBackend`]; the HTTP
//! implementation lives in the agent crate and tests substitute scripted fakes.

use async_trait::async_trait;

use crate::domain::conversation::{ConversationId, ConversationMessage, MessageOrder, MessageRole};
use crate::domain::run::{Run, RunId, RunRequest};
use crate::errors::BackendError;

/// Optional call paths a backend offers, probed once when a runtime is assembled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackendCapabilities {
    pub submit_and_wait: bool,
}

#[async_trait]
pub trait AssistantBackend: Send + Sync {
    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::default()
    }

    async fn create_conversation(&self) -> Result<ConversationId, BackendError>;

    async fn append_message(
        &self,
        conversation: &ConversationId,
        role: MessageRole,
        text: &str,
    ) -> Result<(), BackendError>;

    async fn submit_run(
        &self,
        conversation: &ConversationId,
        request: &RunRequest,
    ) -> Result<Run, BackendError>;

    /// Submits a run and returns it once it reached a terminal state.
    async fn submit_and_wait(
        &self,
        _conversation: &ConversationId,
        _request: &RunRequest,
    ) -> Result<Run, BackendError> {
        Err(BackendError::Unsupported("submit_and_wait"))
    }

    async fn get_run(&self, conversation: &ConversationId, run: &RunId)
        -> Result<Run, BackendError>;

    async fn list_messages(
        &self,
        conversation: &ConversationId,
        order: MessageOrder,
    ) -> Result<Vec<ConversationMessage>, BackendError>;
}

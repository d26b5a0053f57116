use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kbassist_core::backend::{AssistantBackend, BackendCapabilities};
use kbassist_core::config::BatchConfig;
use kbassist_core::domain::conversation::{
    ConversationId, ConversationMessage, MessageOrder, MessageRole,
};
use kbassist_core::domain::run::{Run, RunId, RunRequest};
use kbassist_core::errors::{BackendError, TurnError};
use rand::Rng;
use tracing::warn;

/// Exponential backoff with uniform jitter for rate-limited calls. Nothing else is retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitBackoff {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_jitter_ms: u64,
}

impl Default for RateLimitBackoff {
    fn default() -> Self {
        Self { max_retries: 5, initial_delay_ms: 1_000, max_jitter_ms: 1_000 }
    }
}

impl From<&BatchConfig> for RateLimitBackoff {
    fn from(config: &BatchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay_ms: config.initial_delay_ms,
            max_jitter_ms: config.max_jitter_ms,
        }
    }
}

/// Errors that can carry a rate-limit refusal.
pub trait RateLimitSignal {
    /// `Some(retry_after_secs)` when the error is a rate-limit refusal.
    fn rate_limit(&self) -> Option<Option<u64>>;
}

impl RateLimitSignal for BackendError {
    fn rate_limit(&self) -> Option<Option<u64>> {
        match self {
            Self::RateLimited { retry_after_secs, .. } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl RateLimitSignal for TurnError {
    fn rate_limit(&self) -> Option<Option<u64>> {
        match self {
            Self::Backend(error) => error.rate_limit(),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct RetryOutcome<T, E = TurnError> {
    pub result: Result<T, E>,
    /// Total calls made, the first one included.
    pub attempts: u32,
}

impl RateLimitBackoff {
    pub fn delay(&self, attempt: u32, jitter_ms: u64) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let base_ms = self.initial_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(base_ms.saturating_add(jitter_ms.min(self.max_jitter_ms)))
    }

    fn jitter_ms(&self) -> u64 {
        if self.max_jitter_ms == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..=self.max_jitter_ms)
    }

    pub async fn retry<T, E, F, Fut>(&self, mut operation: F) -> RetryOutcome<T, E>
    where
        E: RateLimitSignal,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            let result = operation().await;
            let retry_after = match &result {
                Err(error) if attempt < self.max_retries => error.rate_limit(),
                _ => None,
            };
            let Some(retry_after) = retry_after else {
                return RetryOutcome { result, attempts: attempt + 1 };
            };
            drop(result);

            let mut delay = self.delay(attempt, self.jitter_ms());
            if let Some(seconds) = retry_after {
                delay = delay.max(Duration::from_secs(seconds));
            }
            warn!(
                event_name = "backend.call.rate_limited",
                attempt = attempt + 1,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                "rate limited, backing off before retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// [`AssistantBackend`] decorator that retries each rate-limited call on its own.
///
/// Only the refused request is repeated, so a turn never appends its question twice or
/// starts a second run over one that is still active.
pub struct RetryingBackend {
    inner: Arc<dyn AssistantBackend>,
    backoff: RateLimitBackoff,
    retries: AtomicU32,
}

impl RetryingBackend {
    pub fn new(inner: Arc<dyn AssistantBackend>, backoff: RateLimitBackoff) -> Self {
        Self { inner, backoff, retries: AtomicU32::new(0) }
    }

    /// Retries performed so far across all calls.
    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::Relaxed)
    }

    async fn call<T, F, Fut>(&self, operation: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let outcome = self.backoff.retry(operation).await;
        self.retries.fetch_add(outcome.attempts - 1, Ordering::Relaxed);
        outcome.result
    }
}

#[async_trait]
impl AssistantBackend for RetryingBackend {
    fn capabilities(&self) -> BackendCapabilities {
        self.inner.capabilities()
    }

    async fn create_conversation(&self) -> Result<ConversationId, BackendError> {
        self.call(move || self.inner.create_conversation()).await
    }

    async fn append_message(
        &self,
        conversation: &ConversationId,
        role: MessageRole,
        text: &str,
    ) -> Result<(), BackendError> {
        self.call(move || self.inner.append_message(conversation, role, text)).await
    }

    async fn submit_run(
        &self,
        conversation: &ConversationId,
        request: &RunRequest,
    ) -> Result<Run, BackendError> {
        self.call(move || self.inner.submit_run(conversation, request)).await
    }

    async fn submit_and_wait(
        &self,
        conversation: &ConversationId,
        request: &RunRequest,
    ) -> Result<Run, BackendError> {
        self.call(move || self.inner.submit_and_wait(conversation, request)).await
    }

    async fn get_run(
        &self,
        conversation: &ConversationId,
        run: &RunId,
    ) -> Result<Run, BackendError> {
        self.call(move || self.inner.get_run(conversation, run)).await
    }

    async fn list_messages(
        &self,
        conversation: &ConversationId,
        order: MessageOrder,
    ) -> Result<Vec<ConversationMessage>, BackendError> {
        self.call(move || self.inner.list_messages(conversation, order)).await
    }
}

use std::sync::Arc;
use std::time::Duration;

use kbassist_core::backend::AssistantBackend;
use kbassist_core::config::PipelineConfig;
use kbassist_core::domain::conversation::{ConversationId, MessageOrder, MessageRole};
use kbassist_core::domain::run::{Run, RunId, RunRequest, RunStatus};
use kbassist_core::errors::TurnError;
use tokio::time::Instant;
use tracing::{debug, info};

/// Fixed run-level instruction sent with every run.
pub const SYSTEM_INSTRUCTION: &str = "You are the OPSWAT Knowledge Assistant.

Rules you must always follow:
1) Never guess. When the knowledge base context does not state the needed fact (exact path, endpoint, flag or value), reply with \"Not found in the provided knowledge base.\", then ask for the version, OS and product, and point to where in the product UI or docs to look.
2) Stay within the products named in the question (Core, Kiosk, ICAP, Cloud, OESIS). Ignore retrieved context about other products.
3) Answer in clean, structured Markdown:

## Answer
(one or two direct sentences)

## Steps / Example
- Numbered steps or bullets.
- Endpoints, paths, JSON and commands go in code fences.

## Notes (optional)
- Version or OS specific notes.

## Sources
- Document names or sections used. Say so when none were used.

Per intent:
- KNOWLEDGE: a direct answer grounded in the knowledge base, quoting exact strings for paths, endpoints, flags and ports.
- CODE: a minimal working template with placeholders first, then at most 2 clarifying questions.
- PRIVATE: refuse briefly and point to official documentation, vendor support or the internal IT process.
- CONTEXT: answer from the chat history only; when it is not enough, give a generic example without inventing product facts.

Do not repeat the question. No filler.";

/// How a submitted run is driven to a terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStrategy {
    SubmitAndWait,
    ManualPoll { poll_interval: Duration, timeout: Duration },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOutcome {
    pub answer: String,
    pub status: RunStatus,
    pub run_id: RunId,
}

#[derive(Clone)]
pub struct RunExecutor {
    backend: Arc<dyn AssistantBackend>,
    strategy: RunStrategy,
}

impl RunExecutor {
    /// Probes the backend once; the chosen strategy is kept for the executor's lifetime.
    pub fn new(backend: Arc<dyn AssistantBackend>, config: &PipelineConfig) -> Self {
        let strategy = if backend.capabilities().submit_and_wait {
            RunStrategy::SubmitAndWait
        } else {
            RunStrategy::ManualPoll {
                poll_interval: config.poll_interval(),
                timeout: config.run_timeout(),
            }
        };
        Self { backend, strategy }
    }

    pub fn with_strategy(backend: Arc<dyn AssistantBackend>, strategy: RunStrategy) -> Self {
        Self { backend, strategy }
    }

    pub fn strategy(&self) -> RunStrategy {
        self.strategy
    }

    pub async fn execute(
        &self,
        conversation: &ConversationId,
        text: &str,
        temperature: f32,
    ) -> Result<RunOutcome, TurnError> {
        self.backend.append_message(conversation, MessageRole::User, text).await?;

        let request =
            RunRequest { instructions: SYSTEM_INSTRUCTION.to_string(), temperature };
        let run = match self.strategy {
            RunStrategy::SubmitAndWait => {
                self.backend.submit_and_wait(conversation, &request).await?
            }
            RunStrategy::ManualPoll { poll_interval, timeout } => {
                let submitted = self.backend.submit_run(conversation, &request).await?;
                self.poll_until_terminal(conversation, submitted, poll_interval, timeout).await?
            }
        };

        if !run.status.is_success() {
            info!(
                event_name = "pipeline.run.failed",
                thread_id = %conversation,
                run_id = %run.id,
                status = %run.status,
                "assistant run ended without completing"
            );
            return Err(TurnError::RunFailed { status: run.status, message: run.failure_message() });
        }

        let answer = self.latest_assistant_text(conversation, &run.id).await?;
        debug!(
            event_name = "pipeline.run.completed",
            thread_id = %conversation,
            run_id = %run.id,
            answer_chars = answer.len(),
            "assistant run completed"
        );
        Ok(RunOutcome { answer, status: run.status, run_id: run.id })
    }

    async fn poll_until_terminal(
        &self,
        conversation: &ConversationId,
        submitted: Run,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Run, TurnError> {
        let started = Instant::now();
        let run_id = submitted.id;
        loop {
            let run = self.backend.get_run(conversation, &run_id).await?;
            if run.status.is_terminal() {
                return Ok(run);
            }
            if started.elapsed() >= timeout {
                return Err(TurnError::Timeout { timeout_secs: timeout.as_secs() });
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn latest_assistant_text(
        &self,
        conversation: &ConversationId,
        run_id: &RunId,
    ) -> Result<String, TurnError> {
        let messages =
            self.backend.list_messages(conversation, MessageOrder::NewestFirst).await?;
        // Anything past the newest user message belongs to an earlier turn.
        messages
            .into_iter()
            .take_while(|message| message.role == MessageRole::Assistant)
            .next()
            .and_then(|message| message.text)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| TurnError::EmptyAnswer { run_id: run_id.clone() })
    }
}

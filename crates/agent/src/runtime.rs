use std::sync::Arc;

use kbassist_core::backend::AssistantBackend;
use kbassist_core::config::PipelineConfig;
use kbassist_core::domain::conversation::{ConversationId, UserId};
use kbassist_core::domain::turn::{Intent, TurnRequest, TurnResponse};
use kbassist_core::errors::TurnError;
use tracing::info;

use crate::executor::RunExecutor;
use crate::guardrails::GuardrailPolicy;
use crate::rewrite::{RewriteContext, RewriteController};
use crate::thread_store::ThreadStore;
use crate::wrapper::MessageWrapper;

/// Runs one user turn end to end: conversation lookup, wrapping, the backend run and the
/// guardrail rewrite loop.
pub struct AgentRuntime {
    threads: Arc<dyn ThreadStore>,
    executor: RunExecutor,
    wrapper: MessageWrapper,
    rewrite: RewriteController,
    focused_temperature: f32,
    exploratory_temperature: f32,
}

impl AgentRuntime {
    pub fn new(
        backend: Arc<dyn AssistantBackend>,
        threads: Arc<dyn ThreadStore>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            threads,
            executor: RunExecutor::new(backend, config),
            wrapper: MessageWrapper::default(),
            rewrite: RewriteController::new(
                config.max_rewrite_attempts,
                GuardrailPolicy::from(config),
            ),
            focused_temperature: config.focused_temperature,
            exploratory_temperature: config.exploratory_temperature,
        }
    }

    pub fn threads(&self) -> &Arc<dyn ThreadStore> {
        &self.threads
    }

    pub fn temperature_for(&self, intent: Intent) -> f32 {
        match intent {
            Intent::Code => self.exploratory_temperature,
            Intent::Knowledge | Intent::Private | Intent::Context => self.focused_temperature,
        }
    }

    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnResponse, TurnError> {
        if request.user_id.as_str().trim().is_empty() {
            return Err(TurnError::InvalidInput("user_id must not be blank".to_string()));
        }
        if request.message.trim().is_empty() {
            return Err(TurnError::InvalidInput("message must not be blank".to_string()));
        }

        let thread_id = match request.thread_id.filter(|id| !id.as_str().trim().is_empty()) {
            Some(thread_id) => thread_id,
            None => self.threads.resolve_or_create(&request.user_id).await?,
        };

        let wrapped = self.wrapper.wrap(&request.message, &request.hints);
        let temperature = self.temperature_for(wrapped.intent);
        info!(
            event_name = "pipeline.turn.started",
            user_id = %request.user_id,
            thread_id = %thread_id,
            intent = %wrapped.intent,
            scope = ?wrapped.scope,
            exact_fact = wrapped.exact_fact,
            temperature,
            "processing user turn"
        );

        let first = self.executor.execute(&thread_id, &wrapped.text, temperature).await?;
        let rewritten = self
            .rewrite
            .run(
                &self.executor,
                self.wrapper.detector(),
                RewriteContext {
                    conversation: &thread_id,
                    question_scope: &wrapped.scope,
                    temperature,
                },
                first.answer,
            )
            .await?;

        info!(
            event_name = "pipeline.turn.completed",
            user_id = %request.user_id,
            thread_id = %thread_id,
            intent = %wrapped.intent,
            rewrite_attempts = rewritten.attempts,
            guardrails_passed = rewritten.verdict.passed(),
            "user turn answered"
        );

        Ok(TurnResponse {
            response: rewritten.answer,
            thread_id,
            user_id: request.user_id,
            intent: wrapped.intent,
            rewrite_attempts: rewritten.attempts,
        })
    }

    pub async fn delete_thread(
        &self,
        user_id: &UserId,
        expected: Option<&ConversationId>,
    ) -> Result<bool, TurnError> {
        self.threads.delete(user_id, expected).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kbassist_core::config::PipelineConfig;
    use kbassist_core::domain::conversation::{ConversationId, UserId};
    use kbassist_core::domain::turn::{Intent, TurnHints, TurnRequest};
    use kbassist_core::errors::TurnError;
    use kbassist_core::AssistantBackend;
    use kbassist_db::InMemoryThreadMappingRepository;

    use super::AgentRuntime;
    use crate::test_support::{ScriptedBackend, ScriptedRun};
    use crate::thread_store::KeyedThreadStore;

    const STRUCTURED: &str = "## Answer\nI can't help with that.\n\n## Steps / Example\n- Contact support.\n\n\
                              ## Notes (optional)\n-\n\n## Sources\n- None";

    fn runtime(backend: Arc<ScriptedBackend>, config: &PipelineConfig) -> AgentRuntime {
        let threads = Arc::new(KeyedThreadStore::new(
            Arc::new(InMemoryThreadMappingRepository::default()),
            backend.clone(),
        ));
        AgentRuntime::new(backend, threads, config)
    }

    #[tokio::test(start_paused = true)]
    async fn private_request_is_wrapped_with_decline_directive() {
        let backend = Arc::new(ScriptedBackend::new().with_runs([ScriptedRun::answer(STRUCTURED)]));
        let runtime = runtime(backend.clone(), &PipelineConfig::default());

        let response = runtime
            .handle_turn(TurnRequest::new("u1", "How do I bypass the license check?"))
            .await
            .expect("turn");

        assert_eq!(response.intent, Intent::Private);
        assert_eq!(response.rewrite_attempts, 0);
        assert_eq!(response.response, STRUCTURED);

        let sent = backend.user_messages(&response.thread_id);
        assert_eq!(sent.len(), 1);
        assert!(!sent[0].contains("Scope:"));
        assert!(!sent[0].contains("This is a CODE request."));
        assert!(sent[0].contains("Decline briefly"));
        assert!((backend.run_requests()[0].temperature - 0.2).abs() < f32::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn code_request_uses_exploratory_temperature() {
        let backend = Arc::new(ScriptedBackend::new().with_runs([ScriptedRun::answer(STRUCTURED)]));
        let runtime = runtime(backend.clone(), &PipelineConfig::default());

        let response = runtime
            .handle_turn(TurnRequest::new("u2", "Give me a Python snippet for the multiscanning API"))
            .await
            .expect("turn");

        assert_eq!(response.intent, Intent::Code);
        let sent = backend.user_messages(&response.thread_id);
        assert!(sent[0].contains("Known hints:\n- (no extra hints provided)"));
        assert!((backend.run_requests()[0].temperature - 0.4).abs() < f32::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn unstructured_answer_is_rewritten_once_by_default() {
        let backend = Arc::new(ScriptedBackend::new().with_runs([
            ScriptedRun::answer("Kiosk can forward files to MetaDefender Core."),
            ScriptedRun::answer("still no headings"),
        ]));
        let runtime = runtime(backend.clone(), &PipelineConfig::default());

        let response = runtime
            .handle_turn(TurnRequest::new("u3", "How does Kiosk handle USB drives?"))
            .await
            .expect("turn");

        assert_eq!(response.rewrite_attempts, 1);
        assert_eq!(response.response, "still no headings");
        let sent = backend.user_messages(&response.thread_id);
        assert_eq!(sent.len(), 2);
        assert!(sent[1].contains("- Remove references to: MetaDefender Core."));
    }

    #[tokio::test(start_paused = true)]
    async fn turns_reuse_the_users_conversation() {
        let backend = Arc::new(ScriptedBackend::new().with_runs([
            ScriptedRun::answer(STRUCTURED),
            ScriptedRun::answer(STRUCTURED),
        ]));
        let runtime = runtime(backend.clone(), &PipelineConfig::default());

        let first = runtime.handle_turn(TurnRequest::new("u4", "What is Kiosk?")).await.expect("first");
        let second = runtime
            .handle_turn(TurnRequest::new("u4", "And where does it log?"))
            .await
            .expect("second");

        assert_eq!(first.thread_id, second.thread_id);
        assert_eq!(backend.created_conversations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn caller_supplied_thread_is_used_as_is() {
        let backend = Arc::new(ScriptedBackend::new().with_runs([ScriptedRun::answer(STRUCTURED)]));
        let existing = backend.create_conversation().await.expect("conversation");
        let runtime = runtime(backend.clone(), &PipelineConfig::default());

        let mut request = TurnRequest::new("u5", "Where are ICAP logs?");
        request.thread_id = Some(existing.clone());
        request.hints = TurnHints { product: Some("icap".to_string()), ..TurnHints::default() };
        let response = runtime.handle_turn(request).await.expect("turn");

        assert_eq!(response.thread_id, existing);
        assert_eq!(backend.created_conversations(), 1);
    }

    #[tokio::test]
    async fn blank_message_is_rejected_before_any_backend_call() {
        let backend = Arc::new(ScriptedBackend::new());
        let runtime = runtime(backend.clone(), &PipelineConfig::default());

        let error = runtime.handle_turn(TurnRequest::new("u6", "   ")).await.expect_err("blank");

        assert!(matches!(error, TurnError::InvalidInput(_)));
        assert_eq!(backend.created_conversations(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_failure_on_first_answer_is_an_error() {
        let backend =
            Arc::new(ScriptedBackend::new().with_runs([ScriptedRun::failed("model overloaded")]));
        let runtime = runtime(backend.clone(), &PipelineConfig::default());

        let error = runtime.handle_turn(TurnRequest::new("u7", "What is OESIS?")).await.expect_err("failed");

        assert!(matches!(error, TurnError::RunFailed { ref message, .. } if message == "model overloaded"));
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_guardrails_skip_rewrites() {
        let backend = Arc::new(ScriptedBackend::new().with_runs([ScriptedRun::answer("free text")]));
        let config = PipelineConfig {
            structure_guardrail: false,
            scope_guardrail: false,
            ..PipelineConfig::default()
        };
        let runtime = runtime(backend.clone(), &config);

        let response = runtime.handle_turn(TurnRequest::new("u8", "Hello there")).await.expect("turn");

        assert_eq!(response.rewrite_attempts, 0);
        assert_eq!(backend.run_requests().len(), 1);
    }

    #[tokio::test]
    async fn delete_thread_checks_expected_conversation() {
        let backend = Arc::new(ScriptedBackend::new());
        let runtime = runtime(backend.clone(), &PipelineConfig::default());
        let user = UserId("u9".to_string());
        let thread = runtime.threads().resolve_or_create(&user).await.expect("thread");

        let wrong = ConversationId("thread_missing".to_string());
        assert!(!runtime.delete_thread(&user, Some(&wrong)).await.expect("delete"));
        assert!(runtime.delete_thread(&user, Some(&thread)).await.expect("delete"));
        assert!(!runtime.delete_thread(&user, None).await.expect("delete"));
    }
}

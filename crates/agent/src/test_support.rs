use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use kbassist_core::backend::{AssistantBackend, BackendCapabilities};
use kbassist_core::domain::conversation::{
    ConversationId, ConversationMessage, MessageOrder, MessageRole,
};
use kbassist_core::domain::run::{Run, RunError, RunId, RunRequest, RunStatus};
use kbassist_core::errors::BackendError;

/// How one submitted run behaves: how many polls it stays in progress, where it ends and
/// what the assistant writes when it completes.
#[derive(Clone, Debug)]
pub struct ScriptedRun {
    pub polls_before_terminal: u32,
    pub terminal: RunStatus,
    pub answer: Option<String>,
    pub last_error: Option<RunError>,
}

impl ScriptedRun {
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            polls_before_terminal: 0,
            terminal: RunStatus::Completed,
            answer: Some(text.into()),
            last_error: None,
        }
    }

    pub fn completed_without_text() -> Self {
        Self { polls_before_terminal: 0, terminal: RunStatus::Completed, answer: None, last_error: None }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            polls_before_terminal: 0,
            terminal: RunStatus::Failed,
            answer: None,
            last_error: Some(RunError {
                code: Some("server_error".to_string()),
                message: message.into(),
            }),
        }
    }

    pub fn ended(status: RunStatus) -> Self {
        Self { polls_before_terminal: 0, terminal: status, answer: None, last_error: None }
    }

    pub fn never_finishes() -> Self {
        Self::answer("unreachable").after_polls(u32::MAX)
    }

    pub fn after_polls(mut self, polls: u32) -> Self {
        self.polls_before_terminal = polls;
        self
    }
}

struct ActiveRun {
    conversation: ConversationId,
    script: ScriptedRun,
    polls: u32,
    delivered: bool,
}

#[derive(Default)]
struct ScriptState {
    created: u32,
    messages: HashMap<ConversationId, Vec<ConversationMessage>>,
    runs: VecDeque<ScriptedRun>,
    active: HashMap<RunId, ActiveRun>,
    run_requests: Vec<RunRequest>,
    submit_errors: VecDeque<BackendError>,
    create_errors: VecDeque<BackendError>,
    get_run_calls: u32,
    submit_and_wait_calls: u32,
}

impl ScriptState {
    fn deliver(&mut self, run_id: &RunId) {
        let Some(active) = self.active.get_mut(run_id) else {
            return;
        };
        if active.delivered || active.script.terminal != RunStatus::Completed {
            return;
        }
        active.delivered = true;
        let message =
            ConversationMessage { role: MessageRole::Assistant, text: active.script.answer.clone() };
        self.messages.entry(active.conversation.clone()).or_default().push(message);
    }

    fn run_view(&self, run_id: &RunId, status: RunStatus) -> Run {
        let last_error = self
            .active
            .get(run_id)
            .filter(|_| status.is_terminal())
            .and_then(|active| active.script.last_error.clone());
        Run { id: run_id.clone(), status, last_error }
    }
}

/// In-process [`AssistantBackend`] that plays back queued [`ScriptedRun`]s.
pub struct ScriptedBackend {
    capabilities: BackendCapabilities,
    create_delay: Option<Duration>,
    state: Mutex<ScriptState>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            capabilities: BackendCapabilities::default(),
            create_delay: None,
            state: Mutex::new(ScriptState::default()),
        }
    }

    pub fn with_submit_and_wait(mut self) -> Self {
        self.capabilities.submit_and_wait = true;
        self
    }

    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    pub fn with_runs(self, runs: impl IntoIterator<Item = ScriptedRun>) -> Self {
        self.lock().runs.extend(runs);
        self
    }

    pub fn push_run(&self, run: ScriptedRun) {
        self.lock().runs.push_back(run);
    }

    pub fn fail_next_submit(&self, error: BackendError) {
        self.lock().submit_errors.push_back(error);
    }

    pub fn fail_next_create(&self, error: BackendError) {
        self.lock().create_errors.push_back(error);
    }

    pub fn created_conversations(&self) -> u32 {
        self.lock().created
    }

    pub fn user_messages(&self, conversation: &ConversationId) -> Vec<String> {
        self.lock()
            .messages
            .get(conversation)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|message| message.role == MessageRole::User)
                    .filter_map(|message| message.text.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn run_requests(&self) -> Vec<RunRequest> {
        self.lock().run_requests.clone()
    }

    pub fn get_run_calls(&self) -> u32 {
        self.lock().get_run_calls
    }

    pub fn submit_and_wait_calls(&self) -> u32 {
        self.lock().submit_and_wait_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().expect("scripted backend lock")
    }

    fn start_run(
        &self,
        conversation: &ConversationId,
        request: &RunRequest,
    ) -> Result<(RunId, ScriptedRun), BackendError> {
        let mut state = self.lock();
        if let Some(error) = state.submit_errors.pop_front() {
            return Err(error);
        }
        let script = state.runs.pop_front().ok_or_else(|| BackendError::Service {
            status: 500,
            message: "no scripted run left".to_string(),
        })?;
        state.run_requests.push(request.clone());
        let run_id = RunId(format!("run_{}", state.run_requests.len()));
        state.active.insert(
            run_id.clone(),
            ActiveRun {
                conversation: conversation.clone(),
                script: script.clone(),
                polls: 0,
                delivered: false,
            },
        );
        Ok((run_id, script))
    }
}

#[async_trait]
impl AssistantBackend for ScriptedBackend {
    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    async fn create_conversation(&self) -> Result<ConversationId, BackendError> {
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.lock();
        if let Some(error) = state.create_errors.pop_front() {
            return Err(error);
        }
        state.created += 1;
        let conversation = ConversationId(format!("thread_{}", state.created));
        state.messages.insert(conversation.clone(), Vec::new());
        Ok(conversation)
    }

    async fn append_message(
        &self,
        conversation: &ConversationId,
        role: MessageRole,
        text: &str,
    ) -> Result<(), BackendError> {
        self.lock()
            .messages
            .entry(conversation.clone())
            .or_default()
            .push(ConversationMessage { role, text: Some(text.to_string()) });
        Ok(())
    }

    async fn submit_run(
        &self,
        conversation: &ConversationId,
        request: &RunRequest,
    ) -> Result<Run, BackendError> {
        let (id, _) = self.start_run(conversation, request)?;
        Ok(Run { id, status: RunStatus::Queued, last_error: None })
    }

    async fn submit_and_wait(
        &self,
        conversation: &ConversationId,
        request: &RunRequest,
    ) -> Result<Run, BackendError> {
        let (id, script) = self.start_run(conversation, request)?;
        let mut state = self.lock();
        state.submit_and_wait_calls += 1;
        state.deliver(&id);
        Ok(state.run_view(&id, script.terminal))
    }

    async fn get_run(
        &self,
        _conversation: &ConversationId,
        run: &RunId,
    ) -> Result<Run, BackendError> {
        let mut state = self.lock();
        state.get_run_calls += 1;
        let active = state.active.get_mut(run).ok_or_else(|| BackendError::Service {
            status: 404,
            message: format!("unknown run {run}"),
        })?;
        let status = if active.polls < active.script.polls_before_terminal {
            active.polls += 1;
            RunStatus::InProgress
        } else {
            active.script.terminal
        };
        if status.is_terminal() {
            state.deliver(run);
        }
        Ok(state.run_view(run, status))
    }

    async fn list_messages(
        &self,
        conversation: &ConversationId,
        order: MessageOrder,
    ) -> Result<Vec<ConversationMessage>, BackendError> {
        let mut messages = self.lock().messages.get(conversation).cloned().unwrap_or_default();
        if order == MessageOrder::NewestFirst {
            messages.reverse();
        }
        Ok(messages)
    }
}

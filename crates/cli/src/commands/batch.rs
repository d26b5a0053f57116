use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use kbassist_agent::{RateLimitBackoff, RetryingBackend};
use kbassist_core::backend::AssistantBackend;
use kbassist_core::config::AppConfig;
use kbassist_core::domain::turn::{Intent, TurnRequest, TurnResponse};
use kbassist_core::errors::TurnError;
use kbassist_db::ThreadMappingRepository;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::commands::{
    async_runtime, build_runtime, error_class, http_backend, load_config, open_repository,
    CommandResult,
};

#[derive(Clone, Debug, Default)]
pub struct BatchArgs {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub concurrency: Option<usize>,
}

/// One JSON line per question.
#[derive(Clone, Debug, Serialize)]
pub struct BatchRecord {
    pub question: String,
    pub user_id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
}

#[derive(Debug, Serialize)]
struct BatchSummary {
    command: &'static str,
    status: &'static str,
    total: usize,
    succeeded: usize,
    failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
}

pub fn run(args: BatchArgs) -> CommandResult {
    let config = match load_config("batch") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let backend = match http_backend("batch", &config) {
        Ok(backend) => backend,
        Err(result) => return result,
    };
    run_with_backend(&config, backend, args)
}

pub fn run_with_backend(
    config: &AppConfig,
    backend: Arc<dyn AssistantBackend>,
    args: BatchArgs,
) -> CommandResult {
    let raw = match fs::read_to_string(&args.input) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "batch",
                "input_read",
                format!("failed to read {}: {error}", args.input.display()),
                7,
            );
        }
    };
    let questions = read_questions(&raw);
    if questions.is_empty() {
        return CommandResult::failure("batch", "input_empty", "input contains no questions", 7);
    }

    let runtime = match async_runtime("batch") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let concurrency = args.concurrency.unwrap_or(config.batch.concurrency).max(1);
    let backoff = RateLimitBackoff::from(&config.batch);

    let records = runtime.block_on(async {
        let (repository, pool) = open_repository(config).await?;
        let records =
            run_questions(config, &repository, &backend, backoff, questions, concurrency).await;
        if let Some(pool) = pool {
            pool.close().await;
        }
        Ok::<_, (&'static str, String, u8)>(records)
    });
    let records = match records {
        Ok(records) => records,
        Err((class, message, exit_code)) => {
            return CommandResult::failure("batch", class, message, exit_code)
        }
    };

    let lines: Vec<String> = records
        .iter()
        .filter_map(|record| serde_json::to_string(record).ok())
        .collect();
    let output = match &args.output {
        Some(path) => {
            let mut contents = lines.join("\n");
            contents.push('\n');
            if let Err(error) = fs::write(path, contents) {
                return CommandResult::failure(
                    "batch",
                    "output_write",
                    format!("failed to write {}: {error}", path.display()),
                    7,
                );
            }
            String::new()
        }
        None => lines.iter().map(|line| format!("{line}\n")).collect(),
    };

    let failed = records.iter().filter(|record| record.status != "ok").count();
    let summary = BatchSummary {
        command: "batch",
        status: if failed == 0 { "ok" } else { "partial" },
        total: records.len(),
        succeeded: records.len() - failed,
        failed,
        output: args.output.as_ref().map(|path| path.display().to_string()),
    };
    let summary = CommandResult::payload(if failed == 0 { 0 } else { 1 }, &summary);

    CommandResult { exit_code: summary.exit_code, output: format!("{output}{}", summary.output) }
}

pub fn read_questions(raw: &str) -> Vec<String> {
    raw.lines().map(str::trim).filter(|line| !line.is_empty()).map(str::to_string).collect()
}

async fn run_questions(
    config: &AppConfig,
    repository: &Arc<dyn ThreadMappingRepository>,
    backend: &Arc<dyn AssistantBackend>,
    backoff: RateLimitBackoff,
    questions: Vec<String>,
    concurrency: usize,
) -> Vec<BatchRecord> {
    let batch_id = Uuid::new_v4().simple().to_string();
    let batch_id = &batch_id[..8];

    stream::iter(questions.into_iter().enumerate())
        .map(|(index, question)| {
            let user_id = format!("batch-{batch_id}-{}", index + 1);
            // Each question gets its own retrying backend so its retries are counted apart.
            let retrying = Arc::new(RetryingBackend::new(backend.clone(), backoff));
            let agent = build_runtime(config, repository.clone(), retrying.clone());
            async move {
                let result =
                    agent.handle_turn(TurnRequest::new(user_id.clone(), question.clone())).await;
                finish_question(user_id, question, result, retrying.retries() + 1)
            }
        })
        .buffered(concurrency)
        .collect()
        .await
}

fn finish_question(
    user_id: String,
    question: String,
    result: Result<TurnResponse, TurnError>,
    attempts: u32,
) -> BatchRecord {
    let record = match result {
        Ok(response) => BatchRecord {
            question,
            user_id,
            status: "ok",
            intent: Some(response.intent),
            response: Some(response.response),
            error_class: None,
            error: None,
            attempts,
        },
        Err(error) => {
            let interface = error.into_interface(user_id.clone());
            BatchRecord {
                question,
                user_id,
                status: "error",
                intent: None,
                response: None,
                error_class: Some(error_class(&interface)),
                error: Some(interface.message().to_string()),
                attempts,
            }
        }
    };

    info!(
        event_name = "batch.turn.finished",
        user_id = %record.user_id,
        status = record.status,
        attempts = record.attempts,
        "batch question processed"
    );
    record
}

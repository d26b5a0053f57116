use std::sync::Arc;

use kbassist_core::backend::AssistantBackend;
use kbassist_core::config::AppConfig;
use kbassist_core::domain::conversation::{ConversationId, UserId};
use kbassist_core::domain::turn::{Intent, TurnHints, TurnRequest};
use serde::Serialize;

use crate::commands::{
    async_runtime, build_runtime, error_class, http_backend, load_config, open_repository,
    CommandResult,
};

#[derive(Clone, Debug, Default)]
pub struct AskArgs {
    pub user: String,
    pub message: String,
    pub thread: Option<String>,
    pub product: Option<String>,
    pub language: Option<String>,
    pub task: Option<String>,
}

#[derive(Debug, Serialize)]
struct AskOutcome {
    command: &'static str,
    status: &'static str,
    user_id: String,
    thread_id: String,
    intent: Intent,
    rewrite_attempts: u32,
    response: String,
}

pub fn run(args: AskArgs) -> CommandResult {
    let config = match load_config("ask") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let backend = match http_backend("ask", &config) {
        Ok(backend) => backend,
        Err(result) => return result,
    };
    run_with_backend(&config, backend, args)
}

pub fn run_with_backend(
    config: &AppConfig,
    backend: Arc<dyn AssistantBackend>,
    args: AskArgs,
) -> CommandResult {
    let runtime = match async_runtime("ask") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let request = TurnRequest {
        user_id: UserId(args.user),
        message: args.message,
        thread_id: args.thread.map(ConversationId),
        hints: TurnHints { product: args.product, language: args.language, task: args.task },
    };

    runtime.block_on(async {
        let (repository, pool) = match open_repository(config).await {
            Ok(opened) => opened,
            Err((class, message, exit_code)) => {
                return CommandResult::failure("ask", class, message, exit_code)
            }
        };

        let agent = build_runtime(config, repository, backend);
        let result = match agent.handle_turn(request).await {
            Ok(response) => CommandResult::payload(
                0,
                &AskOutcome {
                    command: "ask",
                    status: "ok",
                    user_id: response.user_id.0,
                    thread_id: response.thread_id.0,
                    intent: response.intent,
                    rewrite_attempts: response.rewrite_attempts,
                    response: response.response,
                },
            ),
            Err(error) => {
                let interface = error.into_interface("cli-ask");
                CommandResult::failure("ask", error_class(&interface), interface.message(), 6)
            }
        };

        if let Some(pool) = pool {
            pool.close().await;
        }
        result
    })
}

pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use kbassist_core::config::{AppConfig, LoadOptions, LogFormat};

use crate::commands::{ask::AskArgs, batch::BatchArgs};

#[derive(Debug, Parser)]
#[command(
    name = "kbassist",
    about = "Knowledge-base support assistant operator CLI",
    long_about = "Inspect configuration, ask the assistant a single question, or run a file of questions through the turn pipeline.",
    after_help = "Examples:\n  kbassist config\n  kbassist ask --user u1 --message \"Where are Kiosk logs stored?\"\n  kbassist batch --input questions.txt --output answers.jsonl"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Run one user turn through the pipeline and print the answer as JSON")]
    Ask {
        #[arg(long, help = "Caller-facing user id; selects the conversation")]
        user: String,
        #[arg(long, help = "Question text")]
        message: String,
        #[arg(long, help = "Reuse an existing backend conversation id")]
        thread: Option<String>,
        #[arg(long, help = "Product hint, added to the detected scope")]
        product: Option<String>,
        #[arg(long, help = "Programming language hint; forces a code answer")]
        language: Option<String>,
        #[arg(long, help = "Task hint listed in code requests")]
        task: Option<String>,
    },
    #[command(about = "Answer one question per non-empty input line, each as its own user")]
    Batch {
        #[arg(long, help = "File with one question per line")]
        input: PathBuf,
        #[arg(long, help = "Write JSON lines here instead of stdout")]
        output: Option<PathBuf>,
        #[arg(long, help = "Questions in flight at once (defaults to batch.concurrency)")]
        concurrency: Option<usize>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Ask { user, message, thread, product, language, task } => {
            init_logging();
            commands::ask::run(AskArgs { user, message, thread, product, language, task })
        }
        Command::Batch { input, output, concurrency } => {
            init_logging();
            commands::batch::run(BatchArgs { input, output, concurrency })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout stays machine-readable JSON.
fn init_logging() {
    use tracing::Level;

    let Ok(config) = AppConfig::load(LoadOptions::default()) else {
        return;
    };
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

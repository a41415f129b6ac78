//! Worker daemon pieces for the video note queue.
//!
//! This crate wires [`vnote_queue::TaskQueue`] to external pipeline
//! commands and hosts the `vnote-worker` and `vnote-admin` binaries.

pub mod admin;
pub mod command;
pub mod config;
pub mod error;
pub mod telemetry;

use std::sync::Arc;

use vnote_models::TaskType;
use vnote_queue::{CollectionHandler, HandlerRegistry};

pub use admin::{AdminCli, AdminCommand, OverrideArgs};
pub use command::{CommandExpander, CommandHandler, CommandRunner, ShellCommand};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};

/// Build the handler table from the configured commands.
///
/// Collections are only handled when `NOTE_COLLECTION_CMD` is set; without
/// it collection tasks fail with "no handler registered".
pub fn build_handlers(config: &WorkerConfig) -> WorkerResult<HandlerRegistry> {
    let mut handlers = HandlerRegistry::new();

    if let Some(line) = &config.pipeline_cmd {
        let runner = command_runner(line, config)?;
        handlers.register(TaskType::SingleVideo, Arc::new(CommandHandler::new(runner)));
    }

    if let Some(line) = &config.collection_cmd {
        let runner = command_runner(line, config)?;
        let expander = Arc::new(CommandExpander::new(runner));
        handlers.register(
            TaskType::Collection,
            Arc::new(CollectionHandler::new(expander, config.queue.max_collection_videos)),
        );
    }

    Ok(handlers)
}

/// External commands share the queue's per-job deadline.
fn command_runner(line: &str, config: &WorkerConfig) -> WorkerResult<CommandRunner> {
    let runner = CommandRunner::new(ShellCommand::parse(line)?);
    Ok(match config.queue.job_timeout {
        Some(limit) => runner.with_timeout(limit),
        None => runner,
    })
}

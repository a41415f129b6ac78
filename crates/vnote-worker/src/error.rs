//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Invalid command output: {0}")]
    InvalidOutput(String),

    #[error("Metrics exporter error: {0}")]
    Metrics(String),

    #[error("Queue error: {0}")]
    Queue(#[from] vnote_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn command_failed(msg: impl Into<String>) -> Self {
        Self::CommandFailed(msg.into())
    }

    pub fn invalid_output(msg: impl Into<String>) -> Self {
        Self::InvalidOutput(msg.into())
    }
}

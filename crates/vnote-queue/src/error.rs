//! Queue error types.

use std::path::PathBuf;

use thiserror::Error;
use vnote_models::ModelError;

pub type QueueResult<T> = Result<T, QueueError>;
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Task already exists: {0}")]
    DuplicateTask(String),

    #[error("Enqueue failed: {0}")]
    EnqueueFailed(String),

    #[error("Worker pool already started")]
    AlreadyStarted,

    #[error("Invalid task: {0}")]
    InvalidTask(#[from] ModelError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn duplicate_task(id: impl Into<String>) -> Self {
        Self::DuplicateTask(id.into())
    }

    pub fn enqueue_failed(msg: impl Into<String>) -> Self {
        Self::EnqueueFailed(msg.into())
    }
}

/// Errors from the file-backed stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid task id: {0}")]
    InvalidId(#[from] ModelError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Malformed {
            path: path.into(),
            source,
        }
    }
}

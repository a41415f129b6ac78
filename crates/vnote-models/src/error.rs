//! Model error types.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid task id '{id}': {reason}")]
    InvalidTaskId { id: String, reason: String },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    pub fn invalid_task_id(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTaskId {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

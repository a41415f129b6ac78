//! Structured task logging utilities.
//!
//! Provides consistent, structured logging for task execution with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};
use vnote_models::{TaskId, TaskType};

/// Task logger for structured logging with consistent formatting.
///
/// Every event carries the task id, task type and attempt number, so a
/// single task can be followed through retries.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    task_id: String,
    task_type: &'static str,
    attempt: u32,
}

impl TaskLogger {
    /// Create a new logger for one attempt of a task.
    pub fn new(task_id: &TaskId, task_type: TaskType, attempt: u32) -> Self {
        Self {
            task_id: task_id.to_string(),
            task_type: task_type.as_str(),
            attempt,
        }
    }

    /// Log the start of a task.
    pub fn log_start(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            task_type = self.task_type,
            attempt = self.attempt,
            "Task started: {}", message
        );
    }

    /// Log a progress update during execution.
    pub fn log_progress(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            task_type = self.task_type,
            attempt = self.attempt,
            "Task progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            task_id = %self.task_id,
            task_type = self.task_type,
            attempt = self.attempt,
            "Task warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            task_id = %self.task_id,
            task_type = self.task_type,
            attempt = self.attempt,
            "Task error: {}", message
        );
    }

    /// Log the successful end of a task.
    pub fn log_completion(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            task_type = self.task_type,
            attempt = self.attempt,
            "Task completed: {}", message
        );
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn task_type(&self) -> &str {
        self.task_type
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Create a tracing span for this task attempt.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "task",
            task_id = %self.task_id,
            task_type = self.task_type,
            attempt = self.attempt
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_logger_creation() {
        let id = TaskId::new();
        let logger = TaskLogger::new(&id, TaskType::Collection, 2);

        assert_eq!(logger.task_id(), id.to_string());
        assert_eq!(logger.task_type(), "collection");
        assert_eq!(logger.attempt(), 2);
    }
}

//! Task records tracked by the queue.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};

/// Opaque key/value bag handed to job handlers.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Longest id accepted as a file name.
pub const MAX_TASK_ID_LEN: usize = 128;

/// Unique identifier for a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that the id can safely be used as a file stem.
    ///
    /// Ids are caller-supplied, so anything that could escape the
    /// records directory is rejected.
    pub fn validate(&self) -> ModelResult<()> {
        let id = self.0.as_str();
        if id.is_empty() {
            return Err(ModelError::invalid_task_id(id, "id is empty"));
        }
        if id.len() > MAX_TASK_ID_LEN {
            return Err(ModelError::invalid_task_id(id, "id is too long"));
        }
        if id == "." || id == ".." || id.starts_with('.') {
            return Err(ModelError::invalid_task_id(id, "id starts with a dot"));
        }
        if id
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control())
        {
            return Err(ModelError::invalid_task_id(id, "id contains a path separator or control character"));
        }
        Ok(())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Kind of job a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// One video turned into one note
    SingleVideo,
    /// A playlist/collection that fans out into single-video tasks
    Collection,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::SingleVideo => "single_video",
            TaskType::Collection => "collection",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Task processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    /// Waiting for a worker
    #[default]
    Pending,
    /// Claimed by a worker
    Running,
    /// Handler returned a result
    Success,
    /// Handler returned an error
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failed => "FAILED",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The durable unit of work.
///
/// This is exactly what gets written to `<data_dir>/tasks/<id>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskRecord {
    /// Unique task ID
    pub id: TaskId,

    /// Job kind, selects the handler
    #[serde(rename = "type")]
    pub task_type: TaskType,

    /// Handler input
    #[serde(default)]
    pub payload: Payload,

    /// Current status
    #[serde(default)]
    pub status: TaskStatus,

    /// Submission timestamp
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    /// When the current attempt was claimed by a worker
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    /// When the current attempt finished
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    /// Error message (only when failed)
    #[serde(default)]
    pub error: Option<String>,

    /// Handler output (only when succeeded)
    #[serde(default)]
    pub result: Option<serde_json::Value>,

    /// Execution attempt, bumped on every reset to pending
    #[serde(default)]
    pub attempt: u32,
}

impl TaskRecord {
    /// Create a new pending task.
    pub fn new(id: TaskId, task_type: TaskType, payload: Payload) -> Self {
        Self {
            id,
            task_type,
            payload,
            status: TaskStatus::Pending,
            created_at: Some(Utc::now()),
            started_at: None,
            completed_at: None,
            error: None,
            result: None,
            attempt: 0,
        }
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Claim the task for execution.
    pub fn mark_running(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Record a successful outcome.
    pub fn complete(&mut self, result: serde_json::Value) {
        self.status = TaskStatus::Success;
        self.result = Some(result);
        self.error = None;
        self.completed_at = Some(Utc::now());
    }

    /// Record a failed outcome.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.result = None;
        self.completed_at = Some(Utc::now());
    }

    /// Start a new attempt: back to pending with all outcome fields cleared.
    pub fn reset_for_retry(&mut self) {
        self.status = TaskStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        self.error = None;
        self.result = None;
        self.attempt = self.attempt.saturating_add(1);
    }

    /// Undo a claim that a crash interrupted.
    ///
    /// Unlike [`reset_for_retry`](Self::reset_for_retry) this keeps the
    /// attempt number, since the attempt never produced an outcome.
    pub fn reset_interrupted(&mut self) {
        self.status = TaskStatus::Pending;
        self.started_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Payload {
        let mut p = Payload::new();
        p.insert("video_url".into(), json!("https://example.com/v1"));
        p
    }

    #[test]
    fn test_task_record_creation() {
        let record = TaskRecord::new(TaskId::from("t1"), TaskType::SingleVideo, payload());
        assert_eq!(record.status, TaskStatus::Pending);
        assert!(record.created_at.is_some());
        assert!(record.started_at.is_none());
        assert_eq!(record.attempt, 0);
        assert!(!record.is_terminal());
    }

    #[test]
    fn test_task_status_transitions() {
        let mut record = TaskRecord::new(TaskId::from("t1"), TaskType::SingleVideo, payload());

        record.mark_running();
        assert_eq!(record.status, TaskStatus::Running);
        assert!(record.started_at.is_some());

        record.fail("network timeout");
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("network timeout"));
        assert!(record.completed_at.is_some());
        assert!(record.is_terminal());

        record.reset_for_retry();
        assert_eq!(record.status, TaskStatus::Pending);
        assert!(record.started_at.is_none());
        assert!(record.completed_at.is_none());
        assert!(record.error.is_none());
        assert!(record.result.is_none());
        assert_eq!(record.attempt, 1);
    }

    #[test]
    fn test_reset_interrupted_keeps_attempt() {
        let mut record = TaskRecord::new(TaskId::from("t1"), TaskType::SingleVideo, payload());
        record.attempt = 3;
        record.mark_running();
        record.reset_interrupted();
        assert_eq!(record.status, TaskStatus::Pending);
        assert!(record.started_at.is_none());
        assert_eq!(record.attempt, 3);
    }

    #[test]
    fn test_record_serialization_shape() {
        let mut record = TaskRecord::new(TaskId::from("t1"), TaskType::Collection, payload());
        record.complete(json!({"notes": "..."}));

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], "t1");
        assert_eq!(value["type"], "collection");
        assert_eq!(value["status"], "SUCCESS");
        assert_eq!(value["result"]["notes"], "...");
        assert!(value["error"].is_null());
        assert!(value.get("started_at").is_some());
    }

    #[test]
    fn test_record_tolerates_missing_optional_fields() {
        let raw = r#"{"id":"t9","type":"single_video","status":"RUNNING"}"#;
        let record: TaskRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.status, TaskStatus::Running);
        assert!(record.payload.is_empty());
        assert_eq!(record.attempt, 0);
    }

    #[test]
    fn test_task_id_validation() {
        assert!(TaskId::from("27dda469-bdd5-4887-aa5c-0d9567228fa9").validate().is_ok());
        assert!(TaskId::from("").validate().is_err());
        assert!(TaskId::from("..").validate().is_err());
        assert!(TaskId::from("../etc/passwd").validate().is_err());
        assert!(TaskId::from("a/b").validate().is_err());
        assert!(TaskId::from("a".repeat(MAX_TASK_ID_LEN + 1)).validate().is_err());
    }
}

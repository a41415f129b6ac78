//! Shared data models for the VNote task queue.
//!
//! This crate provides Serde-serializable types for:
//! - Task records, ids, types and statuses
//! - Note generation requests and retry overrides
//! - Pipeline artifacts used to rebuild lost tasks
//! - Platform detection from video URLs

pub mod artifact;
pub mod error;
pub mod platform;
pub mod request;
pub mod task;

// Re-export common types
pub use artifact::{AudioMeta, ResultArtifact};
pub use error::{ModelError, ModelResult};
pub use platform::{infer_platform_name, Platform};
pub use request::{NoteRequest, RebuildDefaults, RecoveredFields, RequestSnapshot, RetryOverrides};
pub use task::{Payload, TaskId, TaskRecord, TaskStatus, TaskType, MAX_TASK_ID_LEN};

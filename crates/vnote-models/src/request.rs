//! Note generation requests and the shapes derived from them.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, ModelResult};
use crate::platform::infer_platform_name;
use crate::task::{Payload, TaskId, TaskType};

fn default_quality() -> String {
    "fast".to_string()
}

/// A request to turn one video (or collection) into a note.
///
/// The queue itself treats payloads as opaque; this type is what the
/// rebuild path produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NoteRequest {
    /// Page URL of the video
    pub video_url: String,
    /// Platform name (bilibili, youtube, ...)
    pub platform: String,
    /// Download quality
    #[serde(default = "default_quality")]
    pub quality: String,
    /// LLM model
    #[serde(default)]
    pub model_name: String,
    /// LLM provider
    #[serde(default)]
    pub provider_id: String,
    #[serde(default)]
    pub screenshot: bool,
    #[serde(default)]
    pub link: bool,
    /// Output format toggles
    #[serde(default)]
    pub format: Vec<String>,
    /// Note style
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Extra prompt text
    #[serde(default)]
    pub extras: Option<String>,
    #[serde(default)]
    pub video_understanding: bool,
    #[serde(default)]
    pub video_interval: u32,
    #[serde(default)]
    pub grid_size: Vec<u32>,
    /// Video title, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Fan-out limit for collection requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_collection_videos: Option<usize>,
}

impl NoteRequest {
    /// Convert into a queue payload.
    pub fn into_payload(self) -> ModelResult<Payload> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(ModelError::MissingField("payload object")),
        }
    }
}

/// Payload defaults used when a task is rebuilt from partial artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebuildDefaults {
    pub quality: String,
    pub model_name: String,
    pub provider_id: String,
    pub style: String,
}

impl Default for RebuildDefaults {
    fn default() -> Self {
        Self {
            quality: default_quality(),
            model_name: "gpt-4o-mini".to_string(),
            provider_id: "openai".to_string(),
            style: "concise".to_string(),
        }
    }
}

impl RebuildDefaults {
    /// Build a full request around the recovered minimum fields.
    pub fn request_for(&self, fields: &RecoveredFields) -> NoteRequest {
        NoteRequest {
            video_url: fields.video_url.clone(),
            platform: fields.platform.clone(),
            quality: self.quality.clone(),
            model_name: self.model_name.clone(),
            provider_id: self.provider_id.clone(),
            screenshot: false,
            link: false,
            format: Vec::new(),
            style: Some(self.style.clone()),
            extras: None,
            video_understanding: false,
            video_interval: 0,
            grid_size: Vec::new(),
            title: fields.title.clone(),
            max_collection_videos: None,
        }
    }

    /// Payload with every default key present, to be overlaid by
    /// whatever a snapshot recorded.
    pub fn base_payload(&self, fields: &RecoveredFields) -> ModelResult<Payload> {
        self.request_for(fields).into_payload()
    }
}

/// The minimum a recovery source must produce to resubmit a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredFields {
    pub video_url: String,
    pub platform: String,
    pub title: Option<String>,
}

impl RecoveredFields {
    /// Assemble fields from optional parts, inferring the platform from
    /// the URL when it was not recorded. Returns `None` without a URL.
    pub fn assemble(
        video_url: Option<&str>,
        platform: Option<&str>,
        title: Option<&str>,
    ) -> Option<Self> {
        let video_url = video_url.map(str::trim).filter(|u| !u.is_empty())?;
        let platform = platform
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| infer_platform_name(video_url));

        Some(Self {
            video_url: video_url.to_string(),
            platform,
            title: title.map(str::to_string).filter(|t| !t.is_empty()),
        })
    }
}

/// Caller-supplied fields merged over a recovered payload on forced retry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RetryOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_understanding: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_interval: Option<u32>,
}

impl RetryOverrides {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Overwrite payload keys with every override that is set.
    ///
    /// Empty strings and empty lists count as unset.
    pub fn apply(&self, payload: &mut Payload) {
        if let Some(model) = self.model_name.as_ref().filter(|s| !s.is_empty()) {
            payload.insert("model_name".into(), Value::from(model.as_str()));
        }
        if let Some(provider) = self.provider_id.as_ref().filter(|s| !s.is_empty()) {
            payload.insert("provider_id".into(), Value::from(provider.as_str()));
        }
        if let Some(style) = self.style.as_ref().filter(|s| !s.is_empty()) {
            payload.insert("style".into(), Value::from(style.as_str()));
        }
        if let Some(format) = self.format.as_ref().filter(|f| !f.is_empty()) {
            payload.insert("format".into(), Value::from(format.clone()));
        }
        if let Some(understanding) = self.video_understanding {
            payload.insert("video_understanding".into(), Value::from(understanding));
        }
        if let Some(interval) = self.video_interval {
            payload.insert("video_interval".into(), Value::from(interval));
        }
    }
}

/// Snapshot of the caller's original request, written once at submission.
///
/// Stored as `<results_dir>/<id>.request.json` and read only when a task
/// has to be rebuilt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RequestSnapshot {
    pub task_id: TaskId,
    pub created_at: DateTime<Utc>,
    /// Absent in snapshots written before task types were recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
    #[serde(default)]
    pub original_request: Payload,
}

impl RequestSnapshot {
    pub fn new(task_id: TaskId, task_type: TaskType, original_request: Payload) -> Self {
        Self {
            task_id,
            created_at: Utc::now(),
            task_type: Some(task_type),
            original_request,
        }
    }

    /// Minimum fields, if the snapshot has them.
    pub fn recovered_fields(&self) -> Option<RecoveredFields> {
        let get = |key: &str| self.original_request.get(key).and_then(Value::as_str);
        RecoveredFields::assemble(get("video_url"), get("platform"), get("title"))
    }
}

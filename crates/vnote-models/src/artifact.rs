//! Pipeline output files the queue can mine when rebuilding a task.
//!
//! The note pipeline leaves `<id>_audio.json` after download and
//! `<id>.json` after generation (or an error document when it fails).
//! Both may carry enough of the original request to resubmit the task.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::platform::{bilibili_id_from_path, bilibili_url_from_video_id, is_http_url};
use crate::request::RecoveredFields;
use crate::task::Payload;

/// Download metadata written by the audio stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioMeta {
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub video_id: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub raw_info: Option<Payload>,
}

impl AudioMeta {
    /// Best guess at the page URL the audio was downloaded from.
    ///
    /// Order: the downloader's own `webpage_url`/`original_url`, then a
    /// Bilibili URL rebuilt from the video id (or the file name), then
    /// `file_path` when it is itself a link.
    pub fn source_url(&self) -> Option<String> {
        if let Some(raw) = &self.raw_info {
            for key in ["webpage_url", "original_url"] {
                if let Some(url) = raw.get(key).and_then(Value::as_str) {
                    if !url.trim().is_empty() {
                        return Some(url.trim().to_string());
                    }
                }
            }
        }

        if let Some(url) = bilibili_url_from_video_id(&self.video_id) {
            return Some(url);
        }
        if let Some(url) =
            bilibili_id_from_path(&self.file_path).and_then(|id| bilibili_url_from_video_id(&id))
        {
            return Some(url);
        }

        is_http_url(&self.file_path).then(|| self.file_path.trim().to_string())
    }

    pub fn recovered_fields(&self) -> Option<RecoveredFields> {
        let url = self.source_url()?;
        // A rebuilt BV link is bilibili regardless of what was recorded.
        let platform = if url.contains("bilibili.com/video/BV") {
            Some("bilibili")
        } else {
            Some(self.platform.as_str())
        };
        RecoveredFields::assemble(Some(&url), platform, Some(&self.title))
    }
}

/// The generation stage's output: a finished note or an error document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultArtifact {
    #[serde(default, rename = "audioMeta")]
    pub audio_meta: Option<AudioMeta>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub request_data: Option<Payload>,
}

impl ResultArtifact {
    /// Parse leniently; unknown shapes yield an empty artifact.
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    pub fn recovered_fields(&self) -> Option<RecoveredFields> {
        if let Some(fields) = self.audio_meta.as_ref().and_then(AudioMeta::recovered_fields) {
            return Some(fields);
        }

        let platform_hint = self
            .request_data
            .as_ref()
            .and_then(|r| r.get("platform"))
            .and_then(Value::as_str);
        let title_hint = self
            .request_data
            .as_ref()
            .and_then(|r| r.get("title"))
            .and_then(Value::as_str);

        let url = self
            .url
            .as_deref()
            .or(self.video_url.as_deref())
            .or_else(|| {
                self.request_data
                    .as_ref()
                    .and_then(|r| r.get("video_url"))
                    .and_then(Value::as_str)
            });

        RecoveredFields::assemble(url, platform_hint, title_hint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn audio(value: Value) -> AudioMeta {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_audio_prefers_raw_info() {
        let meta = audio(json!({
            "file_path": "/data/BV1abc.mp3",
            "video_id": "BV1abc",
            "platform": "bilibili",
            "title": "Intro",
            "raw_info": {"webpage_url": "https://www.bilibili.com/video/BV1abc?p=2"}
        }));
        assert_eq!(
            meta.source_url().as_deref(),
            Some("https://www.bilibili.com/video/BV1abc?p=2")
        );

        let meta = audio(json!({"raw_info": {"original_url": "https://youtu.be/x"}}));
        let fields = meta.recovered_fields().unwrap();
        assert_eq!(fields.video_url, "https://youtu.be/x");
        assert_eq!(fields.platform, "youtube");
    }

    #[test]
    fn test_audio_rebuilds_bilibili_page() {
        let meta = audio(json!({"video_id": "BV1pwj2zxEL9_p64", "platform": ""}));
        let fields = meta.recovered_fields().unwrap();
        assert_eq!(fields.video_url, "https://www.bilibili.com/video/BV1pwj2zxEL9?p=64");
        assert_eq!(fields.platform, "bilibili");

        let meta = audio(json!({"file_path": "/tmp/BV1pwj2zxEL9.mp3"}));
        assert_eq!(
            meta.source_url().as_deref(),
            Some("https://www.bilibili.com/video/BV1pwj2zxEL9")
        );
    }

    #[test]
    fn test_audio_file_path_link() {
        let meta = audio(json!({"file_path": "https://www.douyin.com/video/7", "video_id": "7"}));
        let fields = meta.recovered_fields().unwrap();
        assert_eq!(fields.platform, "douyin");

        let meta = audio(json!({"file_path": "/tmp/local.mp3", "video_id": "abc"}));
        assert!(meta.recovered_fields().is_none());
    }

    #[test]
    fn test_result_artifact_audio_meta() {
        let artifact = ResultArtifact::from_value(&json!({
            "markdown": "# Note",
            "audioMeta": {"file_path": "https://youtu.be/a", "platform": "youtube", "title": "A"}
        }));
        let fields = artifact.recovered_fields().unwrap();
        assert_eq!(fields.video_url, "https://youtu.be/a");
        assert_eq!(fields.title.as_deref(), Some("A"));
    }

    #[test]
    fn test_result_artifact_error_document() {
        let artifact = ResultArtifact::from_value(&json!({
            "error": "download failed",
            "request_data": {"video_url": "https://www.bilibili.com/video/BV9", "title": "T"}
        }));
        let fields = artifact.recovered_fields().unwrap();
        assert_eq!(fields.platform, "bilibili");
        assert_eq!(fields.title.as_deref(), Some("T"));

        let artifact = ResultArtifact::from_value(&json!({"url": "https://youtu.be/b"}));
        assert_eq!(artifact.recovered_fields().unwrap().video_url, "https://youtu.be/b");
    }

    #[test]
    fn test_result_artifact_unrecognized() {
        assert!(ResultArtifact::from_value(&json!([1, 2, 3])).recovered_fields().is_none());
        assert!(ResultArtifact::from_value(&json!({"error": "x"})).recovered_fields().is_none());
    }
}

//! Collection fan-out.
//!
//! A collection task expands a playlist URL into individual videos and
//! submits one `single_video` task per entry. The children are ordinary
//! tasks: they persist, recover and retry on their own.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use vnote_models::{Payload, TaskId, TaskType};

use crate::error::QueueError;
use crate::handler::{JobContext, JobHandler};

/// One video inside a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionEntry {
    pub video_url: String,
    #[serde(default)]
    pub title: String,
}

/// Lists the videos of a collection.
#[async_trait]
pub trait CollectionExpander: Send + Sync {
    async fn expand(
        &self,
        collection_url: &str,
        platform: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<CollectionEntry>>;
}

/// Handler for [`TaskType::Collection`].
pub struct CollectionHandler {
    expander: Arc<dyn CollectionExpander>,
    max_videos: usize,
}

impl CollectionHandler {
    pub fn new(expander: Arc<dyn CollectionExpander>, max_videos: usize) -> Self {
        Self {
            expander,
            max_videos,
        }
    }

    /// Effective cap: the payload may lower the configured limit, never raise it.
    fn limit_for(&self, payload: &Payload) -> usize {
        payload
            .get("max_collection_videos")
            .and_then(Value::as_u64)
            .map(|n| (n as usize).min(self.max_videos))
            .unwrap_or(self.max_videos)
    }
}

/// Id of the `index`-th child of a collection task.
pub fn child_task_id(parent: &TaskId, index: usize) -> TaskId {
    TaskId::from(format!("{}-{}", parent, index))
}

#[async_trait]
impl JobHandler for CollectionHandler {
    async fn execute(&self, ctx: JobContext, payload: Payload) -> anyhow::Result<Value> {
        let url = payload
            .get("video_url")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("collection payload has no video_url"))?;
        let platform = payload
            .get("platform")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let limit = self.limit_for(&payload);

        ctx.logger.log_progress(&format!("expanding collection {}", url));
        let mut entries = self.expander.expand(url, platform, limit).await?;
        entries.truncate(limit);
        if entries.is_empty() {
            anyhow::bail!("no videos found in collection {}", url);
        }

        let total = entries.len();
        let mut task_list = Vec::with_capacity(total);
        let mut existing = 0;
        for (index, entry) in entries.into_iter().enumerate() {
            let mut child = payload.clone();
            child.remove("max_collection_videos");
            child.insert("video_url".into(), Value::from(entry.video_url.as_str()));
            child.insert("title".into(), Value::from(entry.title.as_str()));

            // Stable child ids make a re-run of the parent reuse its children.
            let child_id = child_task_id(&ctx.task_id, index);
            let task_id = match ctx
                .submitter
                .submit(TaskType::SingleVideo, child, Some(child_id.clone()))
                .await
            {
                Ok(task_id) => task_id,
                Err(QueueError::DuplicateTask(_)) => {
                    existing += 1;
                    child_id
                }
                Err(e) => {
                    ctx.logger
                        .log_warning(&format!("failed to submit {}: {}", entry.video_url, e));
                    continue;
                }
            };
            task_list.push(json!({
                "task_id": task_id,
                "video_url": entry.video_url,
                "title": entry.title,
            }));
        }

        if existing > 0 {
            ctx.logger
                .log_progress(&format!("{} video tasks already existed", existing));
        }
        ctx.logger.log_completion(&format!(
            "created {} of {} video tasks",
            task_list.len(),
            total
        ));

        Ok(json!({
            "total_videos": total,
            "created_tasks": task_list.len(),
            "task_list": task_list,
        }))
    }
}

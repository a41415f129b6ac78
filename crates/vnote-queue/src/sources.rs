//! Recovery sources for forced task rebuilds.
//!
//! When a task has to be resubmitted, these are consulted in order of
//! confidence and the first one that can produce a payload wins:
//!
//! 1. [`RegistrySource`]: the live record
//! 2. [`StoreSource`]: the record file on disk
//! 3. [`RequestSnapshotSource`]: `<id>.request.json` from submission
//! 4. [`ResultArtifactSource`]: pipeline outputs (`<id>_audio.json`, `<id>.json`)

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use vnote_models::{
    Payload, RebuildDefaults, RecoveredFields, ResultArtifact, TaskId, TaskType,
};

use crate::artifacts::ArtifactStore;
use crate::shared::QueueShared;
use crate::store::TaskStore;

/// A payload a source managed to rebuild.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveredTask {
    pub task_type: TaskType,
    pub payload: Payload,
    /// Name of the source that produced it
    pub source: &'static str,
}

#[async_trait]
pub trait RecoverySource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Rebuild the task, or `None` when this source knows nothing usable.
    ///
    /// Read failures are logged and reported as `None`.
    async fn recover(&self, id: &TaskId) -> Option<RecoveredTask>;
}

/// The standard chain, highest confidence first.
pub(crate) fn default_chain(shared: &Arc<QueueShared>) -> Vec<Arc<dyn RecoverySource>> {
    let defaults = shared.config.rebuild.clone();
    vec![
        Arc::new(RegistrySource::new(Arc::clone(shared))),
        Arc::new(StoreSource::new(shared.store.clone())),
        Arc::new(RequestSnapshotSource::new(
            shared.artifacts.clone(),
            defaults.clone(),
        )),
        Arc::new(ResultArtifactSource::new(shared.artifacts.clone(), defaults)),
    ]
}

/// Reuses the payload of a task still held in memory, whatever its status.
pub struct RegistrySource {
    shared: Arc<QueueShared>,
}

impl RegistrySource {
    pub(crate) fn new(shared: Arc<QueueShared>) -> Self {
        Self { shared }
    }
}

#[async_trait]
impl RecoverySource for RegistrySource {
    fn name(&self) -> &'static str {
        "registry"
    }

    async fn recover(&self, id: &TaskId) -> Option<RecoveredTask> {
        let record = self.shared.registry.get(id).await?;
        Some(RecoveredTask {
            task_type: record.task_type,
            payload: record.payload,
            source: self.name(),
        })
    }
}

/// Reads the persisted record file.
pub struct StoreSource {
    store: TaskStore,
}

impl StoreSource {
    pub fn new(store: TaskStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RecoverySource for StoreSource {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn recover(&self, id: &TaskId) -> Option<RecoveredTask> {
        match self.store.load(id).await {
            Ok(record) => record.map(|r| RecoveredTask {
                task_type: r.task_type,
                payload: r.payload,
                source: self.name(),
            }),
            Err(e) => {
                warn!(task_id = %id, "Task record unusable for rebuild: {}", e);
                None
            }
        }
    }
}

/// Rebuilds from the snapshot written at submission.
///
/// Needs at least `video_url`; a missing platform is inferred from it.
/// Keys absent from the snapshot are filled from the rebuild defaults.
pub struct RequestSnapshotSource {
    artifacts: ArtifactStore,
    defaults: RebuildDefaults,
}

impl RequestSnapshotSource {
    pub fn new(artifacts: ArtifactStore, defaults: RebuildDefaults) -> Self {
        Self {
            artifacts,
            defaults,
        }
    }
}

#[async_trait]
impl RecoverySource for RequestSnapshotSource {
    fn name(&self) -> &'static str {
        "request_snapshot"
    }

    async fn recover(&self, id: &TaskId) -> Option<RecoveredTask> {
        let snapshot = match self.artifacts.read_snapshot(id).await {
            Ok(snapshot) => snapshot?,
            Err(e) => {
                warn!(task_id = %id, "Request snapshot unusable: {}", e);
                return None;
            }
        };

        let Some(fields) = snapshot.recovered_fields() else {
            debug!(task_id = %id, "Request snapshot has no video_url");
            return None;
        };

        let mut payload = rebuild_payload(&self.defaults, &fields)?;
        for (key, value) in snapshot.original_request {
            if !value.is_null() {
                payload.insert(key, value);
            }
        }
        payload.insert("platform".into(), Value::from(fields.platform));

        Some(RecoveredTask {
            task_type: snapshot.task_type.unwrap_or(TaskType::SingleVideo),
            payload,
            source: self.name(),
        })
    }
}

/// Last resort: mines the note pipeline's own output files.
pub struct ResultArtifactSource {
    artifacts: ArtifactStore,
    defaults: RebuildDefaults,
}

impl ResultArtifactSource {
    pub fn new(artifacts: ArtifactStore, defaults: RebuildDefaults) -> Self {
        Self {
            artifacts,
            defaults,
        }
    }

    async fn fields(&self, id: &TaskId) -> Option<RecoveredFields> {
        match self.artifacts.read_audio_meta(id).await {
            Ok(Some(meta)) => {
                if let Some(fields) = meta.recovered_fields() {
                    return Some(fields);
                }
            }
            Ok(None) => {}
            Err(e) => warn!(task_id = %id, "Audio metadata unusable: {}", e),
        }

        match self.artifacts.read_result(id).await {
            Ok(Some(value)) => ResultArtifact::from_value(&value).recovered_fields(),
            Ok(None) => None,
            Err(e) => {
                warn!(task_id = %id, "Result file unusable: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl RecoverySource for ResultArtifactSource {
    fn name(&self) -> &'static str {
        "result_artifact"
    }

    async fn recover(&self, id: &TaskId) -> Option<RecoveredTask> {
        let fields = self.fields(id).await?;
        Some(RecoveredTask {
            task_type: TaskType::SingleVideo,
            payload: rebuild_payload(&self.defaults, &fields)?,
            source: self.name(),
        })
    }
}

fn rebuild_payload(defaults: &RebuildDefaults, fields: &RecoveredFields) -> Option<Payload> {
    match defaults.base_payload(fields) {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!("Failed to build default payload: {}", e);
            None
        }
    }
}

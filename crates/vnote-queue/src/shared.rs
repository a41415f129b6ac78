//! State shared by the service facade, the workers and the retry paths.

use std::sync::Arc;

use tracing::{error, info, warn};

use vnote_models::{Payload, RequestSnapshot, TaskId, TaskRecord, TaskType};

use crate::artifacts::ArtifactStore;
use crate::config::QueueConfig;
use crate::dispatch::DispatchQueue;
use crate::error::{QueueError, QueueResult};
use crate::metrics;
use crate::registry::{RegistryState, TaskRegistry};
use crate::store::TaskStore;

#[derive(Debug)]
pub(crate) struct QueueShared {
    pub config: QueueConfig,
    pub store: TaskStore,
    pub artifacts: ArtifactStore,
    pub registry: TaskRegistry,
    pub dispatch: DispatchQueue,
}

impl QueueShared {
    pub async fn open(config: QueueConfig) -> QueueResult<Self> {
        let store = TaskStore::open(config.tasks_dir()).await?;
        let artifacts = ArtifactStore::open(config.results_dir.clone()).await?;
        Ok(Self {
            config,
            store,
            artifacts,
            registry: TaskRegistry::new(),
            dispatch: DispatchQueue::new(),
        })
    }

    /// Write a record, logging instead of failing.
    ///
    /// The in-memory transition stands even when the write does not.
    pub async fn persist(&self, record: &TaskRecord) {
        if let Err(e) = self.store.save(record).await {
            metrics::record_persist_failure();
            error!(task_id = %record.id, status = %record.status, "Failed to persist task: {}", e);
        }
    }

    pub fn enqueue(&self, id: TaskId, attempt: u32) -> QueueResult<()> {
        self.dispatch.push(id, attempt)?;
        metrics::set_queue_depth(self.dispatch.len());
        Ok(())
    }

    pub async fn submit(
        &self,
        task_type: TaskType,
        payload: Payload,
        id: Option<TaskId>,
    ) -> QueueResult<TaskId> {
        let id = id.unwrap_or_default();
        id.validate()?;

        let record = TaskRecord::new(id.clone(), task_type, payload.clone());
        {
            let mut state = self.registry.lock().await;
            if state.contains(&id) {
                return Err(QueueError::duplicate_task(id.as_str()));
            }

            self.persist(&record).await;
            let snapshot = RequestSnapshot::new(id.clone(), task_type, payload);
            if let Err(e) = self.artifacts.write_snapshot_once(&snapshot).await {
                warn!(task_id = %id, "Failed to write request snapshot: {}", e);
            }
            state.insert(record);
            self.enqueue(id.clone(), 0)?;
        }

        metrics::record_submitted(task_type);
        info!(task_id = %id, task_type = %task_type, "Task submitted");
        Ok(id)
    }

    /// Start a new attempt for a record already in the registry.
    ///
    /// Caller holds the registry lock and has checked the task is not
    /// active. Returns `false` if the id is unknown.
    pub async fn requeue_locked(&self, state: &mut RegistryState, id: &TaskId) -> QueueResult<bool> {
        let Some(record) = state.get_mut(id) else {
            return Ok(false);
        };
        record.reset_for_retry();
        let record = record.clone();

        self.persist(&record).await;
        self.enqueue(record.id.clone(), record.attempt)?;
        Ok(true)
    }
}

/// Handle that lets job handlers submit follow-up tasks.
#[derive(Debug, Clone)]
pub struct TaskSubmitter {
    shared: Arc<QueueShared>,
}

impl TaskSubmitter {
    pub(crate) fn new(shared: Arc<QueueShared>) -> Self {
        Self { shared }
    }

    pub async fn submit(
        &self,
        task_type: TaskType,
        payload: Payload,
        id: Option<TaskId>,
    ) -> QueueResult<TaskId> {
        self.shared.submit(task_type, payload, id).await
    }
}

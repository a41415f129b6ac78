//! The task queue facade.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use vnote_models::{Payload, RetryOverrides, TaskId, TaskRecord, TaskStatus, TaskType};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::handler::HandlerRegistry;
use crate::recovery::{RecoveryManager, RecoveryReport};
use crate::retry::{
    BatchRetryReport, ClearResetOutcome, ClearResetSummary, ForceRetryAllReport,
    ForceRetryOutcome, ForceRetrySummary, NonSuccessRetryReport, RetryCoordinator,
};
use crate::shared::QueueShared;
use crate::worker::WorkerPool;

/// Counts by status plus queue health.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub success: usize,
    pub failed: usize,
    /// Dispatches waiting for a worker
    pub queue_depth: usize,
    /// Tasks a worker is executing right now
    pub active: usize,
    /// Running workers, 0 when the pool is not started
    pub workers: usize,
}

/// Where a task id could be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskLocation {
    Registry,
    Store,
    Results,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskValidation {
    pub task_id: TaskId,
    pub found_in: TaskLocation,
    pub status: Option<TaskStatus>,
    pub needs_retry: bool,
}

/// Handle to one persistent queue.
///
/// Cheap to clone; all clones share the same registry, store and pool.
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<QueueShared>,
    handlers: Arc<HandlerRegistry>,
    retry: Arc<RetryCoordinator>,
    pool: Arc<Mutex<Option<WorkerPool>>>,
    recovery: RecoveryReport,
}

impl TaskQueue {
    /// Open the queue and recover persisted tasks.
    ///
    /// Workers are not started; call [`start`](Self::start) for that.
    pub async fn open(config: QueueConfig, handlers: HandlerRegistry) -> QueueResult<Self> {
        let shared = Arc::new(QueueShared::open(config).await?);
        let recovery = RecoveryManager::run(&shared).await?;
        let retry = Arc::new(RetryCoordinator::new(Arc::clone(&shared)));

        Ok(Self {
            shared,
            handlers: Arc::new(handlers),
            retry,
            pool: Arc::new(Mutex::new(None)),
            recovery,
        })
    }

    /// What startup recovery did.
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    /// Launch the configured number of workers.
    pub async fn start(&self) -> QueueResult<()> {
        self.start_with(self.shared.config.workers).await
    }

    pub async fn start_with(&self, workers: usize) -> QueueResult<()> {
        let mut pool = self.pool.lock().await;
        if pool.is_some() {
            return Err(QueueError::AlreadyStarted);
        }
        *pool = Some(WorkerPool::start(
            Arc::clone(&self.shared),
            Arc::clone(&self.handlers),
            workers.max(1),
        ));
        Ok(())
    }

    /// Stop the workers and wait for them, bounded by the shutdown timeout.
    ///
    /// Returns `false` if the deadline passed with work still running.
    pub async fn shutdown(&self) -> bool {
        let Some(pool) = self.pool.lock().await.take() else {
            return true;
        };
        info!("Stopping worker pool");
        pool.stop();
        pool.join(self.shared.config.shutdown_timeout).await
    }

    /// Submit a task. A fresh UUID is used when `id` is `None`.
    pub async fn submit(
        &self,
        task_type: TaskType,
        payload: Payload,
        id: Option<TaskId>,
    ) -> QueueResult<TaskId> {
        self.shared.submit(task_type, payload, id).await
    }

    pub async fn get_status(&self, id: &TaskId) -> Option<TaskRecord> {
        self.shared.registry.get(id).await
    }

    pub async fn list_all(&self) -> Vec<TaskRecord> {
        self.shared.registry.list().await
    }

    /// Newest tasks first, by creation time.
    pub async fn recent(&self, limit: usize) -> Vec<TaskRecord> {
        let mut records = self.list_all().await;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        records.truncate(limit);
        records
    }

    pub async fn stats(&self) -> QueueStats {
        let workers = self.pool.lock().await.as_ref().map(WorkerPool::size).unwrap_or(0);
        let state = self.shared.registry.lock().await;

        let mut stats = QueueStats {
            total: state.len(),
            queue_depth: self.shared.dispatch.len(),
            active: state.active_count(),
            workers,
            ..Default::default()
        };
        for record in state.records() {
            match record.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Success => stats.success += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Report where each id is known and whether it should be retried.
    pub async fn validate(&self, ids: &[TaskId]) -> Vec<TaskValidation> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let (found_in, status) = if let Some(record) = self.get_status(id).await {
                (TaskLocation::Registry, Some(record.status))
            } else if let Ok(Some(record)) = self.shared.store.load(id).await {
                (TaskLocation::Store, Some(record.status))
            } else if self.shared.artifacts.has_any(id).await {
                (TaskLocation::Results, None)
            } else {
                (TaskLocation::Missing, None)
            };

            let needs_retry = found_in != TaskLocation::Missing && status != Some(TaskStatus::Success);
            out.push(TaskValidation {
                task_id: id.clone(),
                found_in,
                status,
                needs_retry,
            });
        }
        out
    }

    pub async fn retry(&self, id: &TaskId) -> QueueResult<bool> {
        self.retry.retry(id).await
    }

    pub async fn retry_failed(&self) -> QueueResult<BatchRetryReport> {
        self.retry.retry_failed().await
    }

    pub async fn retry_non_success(&self) -> QueueResult<NonSuccessRetryReport> {
        self.retry.retry_non_success().await
    }

    pub async fn force_retry(
        &self,
        id: &TaskId,
        overrides: &RetryOverrides,
    ) -> QueueResult<ForceRetryOutcome> {
        self.retry.force_retry(id, overrides).await
    }

    pub async fn force_retry_many(
        &self,
        ids: &[TaskId],
        overrides: &RetryOverrides,
    ) -> QueueResult<ForceRetrySummary> {
        self.retry.force_retry_many(ids, overrides).await
    }

    pub async fn force_retry_all(&self, overrides: &RetryOverrides) -> QueueResult<ForceRetryAllReport> {
        self.retry.force_retry_all(overrides).await
    }

    /// Delete a task's stale outputs and rebuild it.
    pub async fn clear_reset(
        &self,
        id: &TaskId,
        overrides: &RetryOverrides,
    ) -> QueueResult<ClearResetOutcome> {
        self.retry.clear_reset(id, overrides).await
    }

    pub async fn clear_reset_many(
        &self,
        ids: &[TaskId],
        overrides: &RetryOverrides,
    ) -> QueueResult<ClearResetSummary> {
        self.retry.clear_reset_many(ids, overrides).await
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("tasks_dir", &self.shared.store.dir())
            .field("results_dir", &self.shared.artifacts.dir())
            .field("handlers", &self.handlers)
            .finish()
    }
}

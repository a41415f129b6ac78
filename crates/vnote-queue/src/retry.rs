//! Retry and rebuild coordination.
//!
//! Plain retries reset a task already in the registry. Forced retries
//! rebuild the task from the best surviving source and replace whatever
//! record existed. Tasks a worker is executing right now are never
//! touched.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use vnote_models::{RetryOverrides, TaskId, TaskRecord, TaskStatus};

use crate::error::QueueResult;
use crate::metrics;
use crate::shared::QueueShared;
use crate::sources::{default_chain, RecoveredTask, RecoverySource};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchRetryReport {
    pub retried: usize,
    pub total_failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NonSuccessRetryReport {
    /// Prior status counts of the registry tasks considered
    pub pending: usize,
    pub running: usize,
    pub failed: usize,
    pub retried: usize,
    /// Running tasks left alone because a worker owns them
    pub skipped_active: usize,
    /// Non-success records found only on disk and rebuilt
    pub rebuilt_from_store: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ForceRetrySummary {
    pub retried: Vec<TaskId>,
    pub not_found: Vec<TaskId>,
    pub skipped_active: Vec<TaskId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ForceRetryAllReport {
    pub retried: usize,
    pub total_tasks: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClearResetSummary {
    pub retried: Vec<TaskId>,
    pub not_found: Vec<TaskId>,
    pub skipped_active: Vec<TaskId>,
    /// Output files deleted across all ids
    pub cleared_files: usize,
}

/// Outcome of rebuilding one id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForceRetryOutcome {
    /// Resubmitted; names the source used.
    Retried { source: &'static str },
    NotFound,
    SkippedActive,
}

/// Outcome of a clear-and-reset of one id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearResetOutcome {
    pub outcome: ForceRetryOutcome,
    /// Output files that were deleted
    pub cleared: Vec<String>,
}

impl From<ForceRetryOutcome> for ClearResetOutcome {
    fn from(outcome: ForceRetryOutcome) -> Self {
        Self {
            outcome,
            cleared: Vec::new(),
        }
    }
}

pub struct RetryCoordinator {
    shared: Arc<QueueShared>,
    sources: Vec<Arc<dyn RecoverySource>>,
}

impl RetryCoordinator {
    pub(crate) fn new(shared: Arc<QueueShared>) -> Self {
        let sources = default_chain(&shared);
        Self { shared, sources }
    }

    /// Reset one task and enqueue it again.
    ///
    /// Refused (`false`) for unknown ids, successful tasks and tasks
    /// currently executing.
    pub async fn retry(&self, id: &TaskId) -> QueueResult<bool> {
        let mut state = self.shared.registry.lock().await;
        let Some(record) = state.get(id) else {
            return Ok(false);
        };
        if record.status == TaskStatus::Success || state.is_active(id) {
            return Ok(false);
        }

        let requeued = self.shared.requeue_locked(&mut state, id).await?;
        drop(state);

        if requeued {
            metrics::record_retry("single", 1);
            info!(task_id = %id, "Task reset for retry");
        }
        Ok(requeued)
    }

    /// Retry every `FAILED` task.
    pub async fn retry_failed(&self) -> QueueResult<BatchRetryReport> {
        let mut report = BatchRetryReport::default();
        let mut state = self.shared.registry.lock().await;

        let failed: Vec<TaskId> = state
            .records()
            .filter(|r| r.status == TaskStatus::Failed)
            .map(|r| r.id.clone())
            .collect();
        report.total_failed = failed.len();

        for id in failed {
            if self.shared.requeue_locked(&mut state, &id).await? {
                report.retried += 1;
            }
        }
        drop(state);

        metrics::record_retry("failed", report.retried);
        info!(
            retried = report.retried,
            total_failed = report.total_failed,
            "Retried failed tasks"
        );
        Ok(report)
    }

    /// Retry everything that has not succeeded.
    ///
    /// Also rebuilds non-success records that exist on disk but not in
    /// memory, such as files restored after the process started.
    pub async fn retry_non_success(&self) -> QueueResult<NonSuccessRetryReport> {
        let mut report = NonSuccessRetryReport::default();
        let known: HashSet<TaskId>;
        {
            let mut state = self.shared.registry.lock().await;
            known = state.records().map(|r| r.id.clone()).collect();

            let candidates: Vec<(TaskId, TaskStatus)> = state
                .records()
                .filter(|r| r.status != TaskStatus::Success)
                .map(|r| (r.id.clone(), r.status))
                .collect();

            for (id, status) in candidates {
                match status {
                    TaskStatus::Pending => report.pending += 1,
                    TaskStatus::Running => report.running += 1,
                    TaskStatus::Failed => report.failed += 1,
                    TaskStatus::Success => {}
                }
                if state.is_active(&id) {
                    report.skipped_active += 1;
                    continue;
                }
                if self.shared.requeue_locked(&mut state, &id).await? {
                    report.retried += 1;
                }
            }
        }

        let on_disk = self.shared.store.load_all().await?;
        for record in on_disk.records {
            if record.status == TaskStatus::Success || known.contains(&record.id) {
                continue;
            }
            if let ForceRetryOutcome::Retried { .. } =
                self.force_retry(&record.id, &RetryOverrides::default()).await?
            {
                report.rebuilt_from_store += 1;
            }
        }

        metrics::record_retry("non_success", report.retried + report.rebuilt_from_store);
        info!(
            retried = report.retried,
            skipped_active = report.skipped_active,
            rebuilt_from_store = report.rebuilt_from_store,
            "Retried non-success tasks"
        );
        Ok(report)
    }

    /// Rebuild one task from the first source that knows it and resubmit it.
    pub async fn force_retry(
        &self,
        id: &TaskId,
        overrides: &RetryOverrides,
    ) -> QueueResult<ForceRetryOutcome> {
        Ok(self.rebuild(id, overrides, false).await?.outcome)
    }

    /// Like [`force_retry`](Self::force_retry), but first deletes the
    /// task's stale pipeline outputs. The request snapshot is kept.
    ///
    /// Sources are read before anything is deleted, so an id that nothing
    /// can rebuild keeps its files.
    pub async fn clear_reset(
        &self,
        id: &TaskId,
        overrides: &RetryOverrides,
    ) -> QueueResult<ClearResetOutcome> {
        self.rebuild(id, overrides, true).await
    }

    async fn rebuild(
        &self,
        id: &TaskId,
        overrides: &RetryOverrides,
        clear_outputs: bool,
    ) -> QueueResult<ClearResetOutcome> {
        id.validate()?;
        if self.shared.registry.lock().await.is_active(id) {
            return Ok(ForceRetryOutcome::SkippedActive.into());
        }

        let Some(recovered) = self.recover(id).await else {
            metrics::record_rebuild_miss();
            warn!(task_id = %id, "No source could rebuild task");
            return Ok(ForceRetryOutcome::NotFound.into());
        };
        let source = recovered.source;

        let mut state = self.shared.registry.lock().await;
        // A worker may have claimed it while the sources were read.
        if state.is_active(id) {
            return Ok(ForceRetryOutcome::SkippedActive.into());
        }

        let cleared = if clear_outputs {
            let cleared = self.shared.artifacts.clear_outputs(id).await?;
            if !cleared.is_empty() {
                info!(task_id = %id, files = cleared.len(), "Cleared stale task outputs");
            }
            cleared
        } else {
            Vec::new()
        };

        let mut payload = recovered.payload;
        overrides.apply(&mut payload);

        let prior = match state.get(id) {
            Some(existing) => Some(existing.clone()),
            None => self.stored_record(id).await,
        };
        let mut record = TaskRecord::new(id.clone(), recovered.task_type, payload);
        if let Some(prior) = prior {
            record.attempt = prior.attempt;
            record.created_at = prior.created_at.or(record.created_at);
        }
        record.reset_for_retry();

        self.shared.persist(&record).await;
        let attempt = record.attempt;
        state.insert(record);
        self.shared.enqueue(id.clone(), attempt)?;
        drop(state);

        metrics::record_retry(if clear_outputs { "clear_reset" } else { "forced" }, 1);
        info!(task_id = %id, source, attempt, "Task rebuilt and resubmitted");
        Ok(ClearResetOutcome {
            outcome: ForceRetryOutcome::Retried { source },
            cleared,
        })
    }

    /// Clear-and-reset several ids; per-id problems land in the summary.
    pub async fn clear_reset_many(
        &self,
        ids: &[TaskId],
        overrides: &RetryOverrides,
    ) -> QueueResult<ClearResetSummary> {
        let mut summary = ClearResetSummary::default();
        for id in ids {
            let result = match self.clear_reset(id, overrides).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(task_id = %id, "Clear and reset failed: {}", e);
                    ForceRetryOutcome::NotFound.into()
                }
            };
            summary.cleared_files += result.cleared.len();
            match result.outcome {
                ForceRetryOutcome::Retried { .. } => summary.retried.push(id.clone()),
                ForceRetryOutcome::NotFound => summary.not_found.push(id.clone()),
                ForceRetryOutcome::SkippedActive => summary.skipped_active.push(id.clone()),
            }
        }
        Ok(summary)
    }

    /// Force-retry several ids; per-id problems land in the summary.
    pub async fn force_retry_many(
        &self,
        ids: &[TaskId],
        overrides: &RetryOverrides,
    ) -> QueueResult<ForceRetrySummary> {
        let mut summary = ForceRetrySummary::default();
        for id in ids {
            let outcome = match self.force_retry(id, overrides).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(task_id = %id, "Force retry failed: {}", e);
                    ForceRetryOutcome::NotFound
                }
            };
            match outcome {
                ForceRetryOutcome::Retried { .. } => summary.retried.push(id.clone()),
                ForceRetryOutcome::NotFound => summary.not_found.push(id.clone()),
                ForceRetryOutcome::SkippedActive => summary.skipped_active.push(id.clone()),
            }
        }
        Ok(summary)
    }

    /// Reset every registry task, whatever its status, with overrides applied.
    pub async fn force_retry_all(&self, overrides: &RetryOverrides) -> QueueResult<ForceRetryAllReport> {
        let mut report = ForceRetryAllReport::default();
        let mut state = self.shared.registry.lock().await;

        let ids: Vec<TaskId> = state.records().map(|r| r.id.clone()).collect();
        report.total_tasks = ids.len();

        for id in ids {
            if state.is_active(&id) {
                continue;
            }
            if let Some(record) = state.get_mut(&id) {
                overrides.apply(&mut record.payload);
            }
            if self.shared.requeue_locked(&mut state, &id).await? {
                report.retried += 1;
            }
        }
        drop(state);

        metrics::record_retry("forced_all", report.retried);
        info!(
            retried = report.retried,
            total_tasks = report.total_tasks,
            "Force-retried all tasks"
        );
        Ok(report)
    }

    /// Walk the source chain in order.
    async fn recover(&self, id: &TaskId) -> Option<RecoveredTask> {
        for source in &self.sources {
            if let Some(task) = source.recover(id).await {
                return Some(task);
            }
        }
        None
    }

    async fn stored_record(&self, id: &TaskId) -> Option<TaskRecord> {
        self.shared.store.load(id).await.ok().flatten()
    }
}

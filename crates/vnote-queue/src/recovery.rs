//! Startup recovery.
//!
//! Runs once before any worker starts. A task found `RUNNING` on disk
//! was interrupted by a crash; it goes back to `PENDING` and is run again.

use serde::Serialize;
use tracing::{info, warn};

use vnote_models::TaskStatus;

use crate::error::QueueResult;
use crate::metrics;
use crate::shared::QueueShared;

/// What recovery found on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Records loaded into the registry
    pub loaded: usize,
    /// Records found `RUNNING` and reset to `PENDING`
    pub reset_running: usize,
    /// Records pushed onto the dispatch queue
    pub enqueued: usize,
    /// Unreadable record files that were skipped
    pub corrupt: usize,
}

pub struct RecoveryManager;

impl RecoveryManager {
    pub(crate) async fn run(shared: &QueueShared) -> QueueResult<RecoveryReport> {
        let loaded = shared.store.load_all().await?;
        let mut report = RecoveryReport {
            corrupt: loaded.corrupt.len(),
            ..Default::default()
        };
        for path in &loaded.corrupt {
            warn!(path = %path.display(), "Corrupt task record left in place");
        }

        let mut records = loaded.records;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let mut state = shared.registry.lock().await;
        for mut record in records {
            if let Err(e) = record.id.validate() {
                warn!(task_id = %record.id, "Skipping record with unusable id: {}", e);
                report.corrupt += 1;
                continue;
            }

            if record.status == TaskStatus::Running {
                record.reset_interrupted();
                shared.persist(&record).await;
                report.reset_running += 1;
            }

            let pending = !record.is_terminal();
            let (id, attempt) = (record.id.clone(), record.attempt);
            state.insert(record);
            report.loaded += 1;

            if pending {
                shared.enqueue(id, attempt)?;
                report.enqueued += 1;
            }
        }
        drop(state);

        metrics::record_recovery(&report);
        info!(
            loaded = report.loaded,
            reset_running = report.reset_running,
            enqueued = report.enqueued,
            corrupt = report.corrupt,
            "Task recovery complete"
        );
        Ok(report)
    }
}

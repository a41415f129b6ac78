//! Queue metrics collection.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! host process installs a recorder.

use metrics::{counter, gauge, histogram};

use vnote_models::{TaskStatus, TaskType};

use crate::recovery::RecoveryReport;

// =============================================================================
// Metric Names
// =============================================================================

/// Metric name constants for consistency.
pub mod names {
    /// Tasks accepted by `submit`, by type.
    pub const TASKS_SUBMITTED_TOTAL: &str = "vnote_tasks_submitted_total";

    /// Finished attempts by type and outcome status.
    pub const TASKS_FINISHED_TOTAL: &str = "vnote_tasks_finished_total";

    /// Handler wall time in seconds, by type.
    pub const TASK_DURATION_SECONDS: &str = "vnote_task_duration_seconds";

    /// Tasks reset to pending, by retry kind.
    pub const TASK_RETRIES_TOTAL: &str = "vnote_task_retries_total";

    /// Ids a forced retry could not rebuild.
    pub const REBUILD_MISSES_TOTAL: &str = "vnote_rebuild_misses_total";

    /// Dispatches waiting for a worker.
    pub const QUEUE_DEPTH: &str = "vnote_queue_depth";

    /// Tasks currently executing.
    pub const TASKS_ACTIVE: &str = "vnote_tasks_active";

    /// Records touched by startup recovery, by outcome.
    pub const RECOVERY_RECORDS_TOTAL: &str = "vnote_recovery_records_total";

    /// Failed persistence writes.
    pub const PERSIST_FAILURES_TOTAL: &str = "vnote_persist_failures_total";
}

// =============================================================================
// Recording Functions
// =============================================================================

pub fn record_submitted(task_type: TaskType) {
    counter!(names::TASKS_SUBMITTED_TOTAL, "type" => task_type.as_str()).increment(1);
}

/// Record a finished attempt.
pub fn record_finished(task_type: TaskType, status: TaskStatus, duration_secs: f64) {
    counter!(
        names::TASKS_FINISHED_TOTAL,
        "type" => task_type.as_str(),
        "status" => status.as_str()
    )
    .increment(1);

    histogram!(names::TASK_DURATION_SECONDS, "type" => task_type.as_str()).record(duration_secs);
}

pub fn record_retry(kind: &'static str, count: usize) {
    counter!(names::TASK_RETRIES_TOTAL, "kind" => kind).increment(count as u64);
}

pub fn record_rebuild_miss() {
    counter!(names::REBUILD_MISSES_TOTAL).increment(1);
}

pub fn set_queue_depth(depth: usize) {
    gauge!(names::QUEUE_DEPTH).set(depth as f64);
}

pub fn set_active(active: usize) {
    gauge!(names::TASKS_ACTIVE).set(active as f64);
}

pub fn record_persist_failure() {
    counter!(names::PERSIST_FAILURES_TOTAL).increment(1);
}

pub fn record_recovery(report: &RecoveryReport) {
    for (outcome, n) in [
        ("loaded", report.loaded),
        ("reset_running", report.reset_running),
        ("enqueued", report.enqueued),
        ("corrupt", report.corrupt),
    ] {
        counter!(names::RECOVERY_RECORDS_TOTAL, "outcome" => outcome).increment(n as u64);
    }
}

// =============================================================================
// Tests
// =============================================================================

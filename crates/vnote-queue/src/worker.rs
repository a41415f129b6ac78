//! Worker pool.
//!
//! Workers pull dispatches, claim the task under the registry lock,
//! run its handler in a separate tokio task and write the outcome back.
//! A handler error, panic or timeout only fails its own task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use vnote_models::{TaskRecord, TaskStatus};

use crate::dispatch::Dispatch;
use crate::handler::{HandlerRegistry, JobContext};
use crate::logging::TaskLogger;
use crate::metrics;
use crate::shared::{QueueShared, TaskSubmitter};

/// A running set of workers.
pub struct WorkerPool {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Launch `workers` long-lived workers.
    pub(crate) fn start(
        shared: Arc<QueueShared>,
        handlers: Arc<HandlerRegistry>,
        workers: usize,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let handles = (0..workers)
            .map(|n| {
                let worker = Worker {
                    name: format!("worker-{}", n),
                    shared: Arc::clone(&shared),
                    handlers: Arc::clone(&handlers),
                    shutdown: shutdown.subscribe(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!("Started worker pool with {} workers", workers);
        Self { shutdown, handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Ask workers to exit once their current task is done.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait for every worker to exit, up to `timeout`.
    ///
    /// Returns `false` if some workers were still busy at the deadline;
    /// those are aborted and their tasks stay `RUNNING` until the next
    /// startup recovery.
    pub async fn join(self, timeout: Duration) -> bool {
        let aborts: Vec<_> = self.handles.iter().map(|h| h.abort_handle()).collect();
        let all = join_workers(self.handles);

        match tokio::time::timeout(timeout, all).await {
            Ok(()) => {
                info!("Worker pool stopped");
                true
            }
            Err(_) => {
                warn!("Worker pool did not stop within {:?}, aborting", timeout);
                for handle in aborts {
                    handle.abort();
                }
                false
            }
        }
    }
}

async fn join_workers(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            if e.is_panic() {
                error!("Worker exited with panic");
            }
        }
    }
}

struct Worker {
    name: String,
    shared: Arc<QueueShared>,
    handlers: Arc<HandlerRegistry>,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    async fn run(self) {
        debug!(worker = %self.name, "Worker started");
        let poll = self.shared.config.poll_interval;
        let dispatch = self.shared.dispatch.clone();
        let mut shutdown = self.shutdown.clone();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let next = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    None
                }
                next = dispatch.pop_timeout(poll) => next,
            };

            if let Some(next) = next {
                metrics::set_queue_depth(dispatch.len());
                self.process(next).await;
            }
        }

        debug!(worker = %self.name, "Worker stopped");
    }

    async fn process(&self, dispatch: Dispatch) {
        let Some(claimed) = self.claim(&dispatch).await else {
            return;
        };

        let logger = TaskLogger::new(&claimed.id, claimed.task_type, claimed.attempt);
        let span = logger.create_span();
        let started = Instant::now();

        let outcome = self.execute(&claimed, logger.clone()).instrument(span).await;
        metrics::record_finished(
            claimed.task_type,
            if outcome.is_ok() {
                TaskStatus::Success
            } else {
                TaskStatus::Failed
            },
            started.elapsed().as_secs_f64(),
        );

        match &outcome {
            Ok(_) => logger.log_completion(&format!("worker {}", self.name)),
            Err(e) => logger.log_error(e),
        }
        self.finish(&claimed, outcome).await;
    }

    /// Move the task to `RUNNING` if this dispatch is still current.
    async fn claim(&self, dispatch: &Dispatch) -> Option<TaskRecord> {
        let mut state = self.shared.registry.lock().await;
        let id = &dispatch.task_id;

        let Some(record) = state.get(id) else {
            warn!(task_id = %id, "Dispatched task is not registered");
            return None;
        };
        if record.status != TaskStatus::Pending || record.attempt != dispatch.attempt {
            debug!(
                task_id = %id,
                status = %record.status,
                attempt = record.attempt,
                dispatched_attempt = dispatch.attempt,
                "Dropping stale dispatch"
            );
            return None;
        }
        if !state.activate(id) {
            debug!(task_id = %id, "Task already executing, dropping dispatch");
            return None;
        }

        let record = state.get_mut(id)?;
        record.mark_running();
        let claimed = record.clone();
        self.shared.persist(&claimed).await;
        metrics::set_active(state.active_count());

        Some(claimed)
    }

    /// Run the handler in its own task so a panic is contained.
    async fn execute(&self, record: &TaskRecord, logger: TaskLogger) -> Result<serde_json::Value, String> {
        let Some(handler) = self.handlers.get(record.task_type) else {
            return Err(format!("no handler registered for task type {}", record.task_type));
        };

        logger.log_start(&format!("worker {}", self.name));
        let ctx = JobContext {
            task_id: record.id.clone(),
            task_type: record.task_type,
            attempt: record.attempt,
            logger,
            submitter: TaskSubmitter::new(Arc::clone(&self.shared)),
        };
        let payload = record.payload.clone();
        let mut job = tokio::spawn(async move { handler.execute(ctx, payload).await });

        let joined = match self.shared.config.job_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut job).await {
                Ok(joined) => joined,
                Err(_) => {
                    job.abort();
                    return Err(format!("job timed out after {}s", limit.as_secs()));
                }
            },
            None => job.await,
        };

        match joined {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(e) if e.is_panic() => Err(format!("handler panicked: {}", panic_message(e))),
            Err(e) => Err(format!("handler was cancelled: {}", e)),
        }
    }

    async fn finish(&self, claimed: &TaskRecord, outcome: Result<serde_json::Value, String>) {
        let mut state = self.shared.registry.lock().await;
        state.deactivate(&claimed.id);
        metrics::set_active(state.active_count());

        let Some(record) = state.get_mut(&claimed.id) else {
            warn!(task_id = %claimed.id, "Finished task vanished from registry");
            return;
        };
        if record.attempt != claimed.attempt || record.status != TaskStatus::Running {
            warn!(
                task_id = %claimed.id,
                attempt = claimed.attempt,
                "Discarding outcome of superseded attempt"
            );
            return;
        }

        match outcome {
            Ok(result) => record.complete(result),
            Err(message) => record.fail(message),
        }
        let record = record.clone();
        self.shared.persist(&record).await;
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! Shared fixtures for queue integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::Semaphore;

use vnote_models::{Payload, TaskId, TaskRecord, TaskStatus, TaskType};
use vnote_queue::{HandlerRegistry, JobContext, JobHandler, QueueConfig, TaskQueue, TaskStore};

/// Handler driven by the payload's `mode` key.
///
/// - `ok` (default): returns `{"note": <video_url>}`
/// - `fail`: returns the payload's `error` string as an error
/// - `panic`: panics
/// - `sleep`: sleeps for `sleep_ms`
/// - `gate`: waits until the test releases a permit
pub struct ScriptedHandler {
    calls: Mutex<HashMap<String, usize>>,
    pub gate: Arc<Semaphore>,
}

impl ScriptedHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(HashMap::new()),
            gate: Arc::new(Semaphore::new(0)),
        })
    }

    pub fn calls(&self, id: &str) -> usize {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl JobHandler for ScriptedHandler {
    async fn execute(&self, ctx: JobContext, payload: Payload) -> anyhow::Result<Value> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(ctx.task_id.to_string())
            .or_default() += 1;

        match payload.get("mode").and_then(Value::as_str).unwrap_or("ok") {
            "fail" => {
                let msg = payload.get("error").and_then(Value::as_str).unwrap_or("failed");
                anyhow::bail!("{}", msg)
            }
            "panic" => panic!("handler exploded"),
            "sleep" => {
                let ms = payload.get("sleep_ms").and_then(Value::as_u64).unwrap_or(100);
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            "gate" => {
                self.gate.acquire().await?.forget();
            }
            _ => {}
        }

        Ok(json!({ "note": payload.get("video_url").cloned().unwrap_or(Value::Null) }))
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub config: QueueConfig,
    pub handler: Arc<ScriptedHandler>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = QueueConfig::with_dirs(dir.path().join("data"), dir.path().join("results"));
        config.poll_interval = Duration::from_millis(20);
        config.shutdown_timeout = Duration::from_secs(5);
        Self {
            dir,
            config,
            handler: ScriptedHandler::new(),
        }
    }

    pub fn handlers(&self) -> HandlerRegistry {
        HandlerRegistry::new().with(TaskType::SingleVideo, self.handler.clone())
    }

    pub async fn open(&self) -> TaskQueue {
        TaskQueue::open(self.config.clone(), self.handlers()).await.unwrap()
    }

    pub async fn store(&self) -> TaskStore {
        TaskStore::open(self.config.tasks_dir()).await.unwrap()
    }

    pub fn results_dir(&self) -> std::path::PathBuf {
        self.config.results_dir.clone()
    }
}

pub fn payload(url: &str) -> Payload {
    let mut p = Payload::new();
    p.insert("video_url".into(), json!(url));
    p.insert("platform".into(), json!("youtube"));
    p
}

pub fn payload_with(url: &str, extra: Value) -> Payload {
    let mut p = payload(url);
    if let Value::Object(map) = extra {
        p.extend(map);
    }
    p
}

/// Poll until the task reaches a status matching `want`.
pub async fn wait_for(queue: &TaskQueue, id: &TaskId, want: impl Fn(TaskStatus) -> bool) -> TaskRecord {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(record) = queue.get_status(id).await {
            if want(record.status) {
                return record;
            }
        }
        assert!(Instant::now() < deadline, "timed out waiting for task {}", id);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_terminal(queue: &TaskQueue, id: &TaskId) -> TaskRecord {
    wait_for(queue, id, |s| s.is_terminal()).await
}

//! Worker configuration.

use std::net::SocketAddr;

use vnote_queue::QueueConfig;

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queue settings (directories, pool size, timeouts)
    pub queue: QueueConfig,
    /// Command run for each single-video task
    pub pipeline_cmd: Option<String>,
    /// Command that lists the videos of a collection
    pub collection_cmd: Option<String>,
    /// `host:port` for the Prometheus scrape endpoint, disabled when unset
    pub metrics_addr: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            pipeline_cmd: None,
            collection_cmd: None,
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            queue: QueueConfig::from_env(),
            pipeline_cmd: non_empty_var("NOTE_PIPELINE_CMD"),
            collection_cmd: non_empty_var("NOTE_COLLECTION_CMD"),
            metrics_addr: non_empty_var("METRICS_ADDR"),
        }
    }

    /// The daemon cannot do anything useful without a pipeline command.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.pipeline_cmd.is_none() {
            return Err(WorkerError::config_error(
                "NOTE_PIPELINE_CMD must be set to run single-video tasks",
            ));
        }
        if self.queue.workers == 0 {
            return Err(WorkerError::config_error("QUEUE_WORKERS must be at least 1"));
        }
        self.metrics_socket_addr()?;
        Ok(())
    }

    /// Parsed metrics listener address; a malformed value is an error.
    pub fn metrics_socket_addr(&self) -> WorkerResult<Option<SocketAddr>> {
        self.metrics_addr
            .as_deref()
            .map(|raw| {
                raw.parse().map_err(|_| {
                    WorkerError::config_error(format!("METRICS_ADDR is not a socket address: {}", raw))
                })
            })
            .transpose()
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

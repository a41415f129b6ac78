//! Queue configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use vnote_models::RebuildDefaults;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Root data directory; records live in `<data_dir>/tasks`
    pub data_dir: PathBuf,
    /// Pipeline output directory (request snapshots and artifacts)
    pub results_dir: PathBuf,
    /// Number of workers
    pub workers: usize,
    /// Dequeue wait, bounds how long a worker takes to notice shutdown
    pub poll_interval: Duration,
    /// Per-job deadline, `None` to let handlers run unbounded
    pub job_timeout: Option<Duration>,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Cap on child tasks created from one collection
    pub max_collection_videos: usize,
    /// Payload defaults for rebuilt tasks
    pub rebuild: RebuildDefaults,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            results_dir: PathBuf::from("./note_results"),
            workers: 3,
            poll_interval: Duration::from_millis(1000),
            job_timeout: None,
            shutdown_timeout: Duration::from_secs(30),
            max_collection_videos: 50,
            rebuild: RebuildDefaults::default(),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let rebuild = RebuildDefaults::default();

        Self {
            data_dir: std::env::var("NOTE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            results_dir: std::env::var("NOTE_RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.results_dir),
            workers: std::env::var("QUEUE_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.workers),
            poll_interval: Duration::from_millis(
                std::env::var("QUEUE_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            job_timeout: std::env::var("QUEUE_JOB_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            shutdown_timeout: Duration::from_secs(
                std::env::var("QUEUE_SHUTDOWN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            max_collection_videos: std::env::var("QUEUE_MAX_COLLECTION_VIDEOS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_collection_videos),
            rebuild: RebuildDefaults {
                quality: std::env::var("REBUILD_DEFAULT_QUALITY").unwrap_or(rebuild.quality),
                model_name: std::env::var("REBUILD_DEFAULT_MODEL").unwrap_or(rebuild.model_name),
                provider_id: std::env::var("REBUILD_DEFAULT_PROVIDER")
                    .unwrap_or(rebuild.provider_id),
                style: std::env::var("REBUILD_DEFAULT_STYLE").unwrap_or(rebuild.style),
            },
        }
    }

    /// Config rooted at the given directories, everything else default.
    pub fn with_dirs(data_dir: impl AsRef<Path>, results_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            results_dir: results_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Directory holding one record file per task.
    pub fn tasks_dir(&self) -> PathBuf {
        self.data_dir.join("tasks")
    }
}

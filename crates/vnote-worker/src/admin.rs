//! Offline maintenance commands for `vnote-admin`.
//!
//! The tool opens the same data directory as the daemon without starting
//! workers. Anything it resets is persisted as `PENDING` and runs the next
//! time the daemon starts, so run it while the daemon is stopped.

use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};

use vnote_models::{RetryOverrides, TaskId};
use vnote_queue::{ForceRetryOutcome, TaskQueue};

use crate::error::{WorkerError, WorkerResult};

/// Inspect and repair the video note task queue
#[derive(Debug, Parser)]
#[command(name = "vnote-admin")]
#[command(about = "Inspect and repair the video note task queue", long_about = None)]
#[command(version)]
pub struct AdminCli {
    #[command(subcommand)]
    pub command: AdminCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum AdminCommand {
    /// Queue counters
    Status,

    /// Most recent tasks, newest first
    List {
        /// Number of tasks to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Reset FAILED or PENDING tasks to PENDING
    Retry {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Reset every FAILED task
    RetryFailed,

    /// Reset every task that has not succeeded
    RetryNonSuccess,

    /// Rebuild tasks from any surviving artifact and resubmit them
    ForceRetry {
        #[arg(required = true)]
        ids: Vec<String>,

        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// Reset every known task, any status
    ForceRetryAll {
        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// Delete stale pipeline outputs, then rebuild and resubmit
    ///
    /// The request snapshot of each task is kept.
    ClearReset {
        #[arg(required = true)]
        ids: Vec<String>,

        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// Show where each task was found and whether it needs a retry
    Validate {
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

/// Payload fields replaced on a forced rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct OverrideArgs {
    /// Model name
    #[arg(long = "model")]
    pub model_name: Option<String>,

    /// Model provider id
    #[arg(long = "provider")]
    pub provider_id: Option<String>,

    /// Note style
    #[arg(long)]
    pub style: Option<String>,

    /// Output format items, comma separated
    #[arg(long, value_delimiter = ',')]
    pub format: Option<Vec<String>>,

    /// Enable video understanding
    #[arg(long)]
    pub video_understanding: bool,

    /// Frame sampling interval in seconds
    #[arg(long)]
    pub video_interval: Option<u32>,
}

impl From<&OverrideArgs> for RetryOverrides {
    fn from(args: &OverrideArgs) -> Self {
        RetryOverrides {
            model_name: args.model_name.clone(),
            provider_id: args.provider_id.clone(),
            style: args.style.clone(),
            format: args.format.clone(),
            video_understanding: args.video_understanding.then_some(true),
            video_interval: args.video_interval,
        }
    }
}

impl AdminCommand {
    /// Run against an opened queue and return a JSON report.
    pub async fn run(&self, queue: &TaskQueue) -> WorkerResult<Value> {
        let report = match self {
            Self::Status => to_json(&queue.stats().await)?,
            Self::List { limit } => to_json(&queue.recent(*limit).await)?,
            Self::Retry { ids } => {
                let mut results = Vec::with_capacity(ids.len());
                for id in task_ids(ids) {
                    let retried = queue.retry(&id).await?;
                    results.push(json!({ "task_id": id, "retried": retried }));
                }
                Value::Array(results)
            }
            Self::RetryFailed => to_json(&queue.retry_failed().await?)?,
            Self::RetryNonSuccess => to_json(&queue.retry_non_success().await?)?,
            Self::ForceRetry { ids, overrides } if ids.len() == 1 => {
                let id = TaskId::from(ids[0].as_str());
                let outcome = queue.force_retry(&id, &overrides.into()).await?;
                json!({ "task_id": id, "outcome": outcome_label(&outcome) })
            }
            Self::ForceRetry { ids, overrides } => {
                to_json(&queue.force_retry_many(&task_ids(ids), &overrides.into()).await?)?
            }
            Self::ForceRetryAll { overrides } => {
                to_json(&queue.force_retry_all(&overrides.into()).await?)?
            }
            Self::ClearReset { ids, overrides } => {
                to_json(&queue.clear_reset_many(&task_ids(ids), &overrides.into()).await?)?
            }
            Self::Validate { ids } => to_json(&queue.validate(&task_ids(ids)).await)?,
        };
        Ok(report)
    }
}

fn task_ids(ids: &[String]) -> Vec<TaskId> {
    ids.iter().map(|id| TaskId::from(id.as_str())).collect()
}

fn outcome_label(outcome: &ForceRetryOutcome) -> String {
    match outcome {
        ForceRetryOutcome::Retried { source } => format!("retried from {}", source),
        ForceRetryOutcome::NotFound => "not found".to_string(),
        ForceRetryOutcome::SkippedActive => "skipped (active)".to_string(),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> WorkerResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| WorkerError::invalid_output(format!("report not serializable: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<AdminCommand, clap::Error> {
        let argv = std::iter::once("vnote-admin").chain(args.iter().copied());
        AdminCli::try_parse_from(argv).map(|cli| cli.command)
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse(&["status"]).unwrap(), AdminCommand::Status);
        assert_eq!(parse(&["list"]).unwrap(), AdminCommand::List { limit: 20 });
        assert_eq!(
            parse(&["list", "--limit", "5"]).unwrap(),
            AdminCommand::List { limit: 5 }
        );
        assert_eq!(
            parse(&["retry", "a", "b"]).unwrap(),
            AdminCommand::Retry {
                ids: vec!["a".into(), "b".into()]
            }
        );
        assert_eq!(parse(&["retry-non-success"]).unwrap(), AdminCommand::RetryNonSuccess);
        assert!(parse(&["retry"]).is_err());
        assert!(parse(&["explode"]).is_err());
        assert!(parse(&[]).is_err());
    }

    #[test]
    fn test_parse_overrides() {
        let cmd = parse(&[
            "force-retry",
            "t1",
            "--model",
            "qwen-max",
            "--format",
            "toc,link",
            "--video-understanding",
            "--video-interval",
            "6",
        ])
        .unwrap();

        let AdminCommand::ForceRetry { ids, overrides } = cmd else {
            panic!("expected force-retry");
        };
        assert_eq!(ids, vec!["t1".to_string()]);

        let overrides = RetryOverrides::from(&overrides);
        assert_eq!(overrides.model_name.as_deref(), Some("qwen-max"));
        assert_eq!(overrides.format, Some(vec!["toc".to_string(), "link".to_string()]));
        assert_eq!(overrides.video_understanding, Some(true));
        assert_eq!(overrides.video_interval, Some(6));

        let plain = parse(&["force-retry-all"]).unwrap();
        let AdminCommand::ForceRetryAll { overrides } = plain else {
            panic!("expected force-retry-all");
        };
        assert!(RetryOverrides::from(&overrides).is_empty());

        assert!(parse(&["force-retry-all", "--style"]).is_err());
        assert!(parse(&["force-retry-all", "--bogus"]).is_err());
        assert!(parse(&["clear-reset"]).is_err());
    }

    #[tokio::test]
    async fn test_run_against_empty_queue() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = vnote_queue::QueueConfig::with_dirs(dir.path().join("data"), dir.path().join("results"));
        let queue = TaskQueue::open(config, vnote_queue::HandlerRegistry::new())
            .await
            .unwrap();

        let status = AdminCommand::Status.run(&queue).await.unwrap();
        assert_eq!(status["total"], 0);

        let outcome = parse(&["force-retry", "gone"]).unwrap().run(&queue).await.unwrap();
        assert_eq!(outcome["outcome"], "not found");

        let cleared = parse(&["clear-reset", "gone", "also-gone"])
            .unwrap()
            .run(&queue)
            .await
            .unwrap();
        assert_eq!(cleared["not_found"].as_array().unwrap().len(), 2);
        assert_eq!(cleared["cleared_files"], 0);
    }
}

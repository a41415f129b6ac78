//! External command handlers.
//!
//! The note pipeline itself lives outside this daemon. A single-video task
//! runs a configured program with the payload JSON on stdin and takes its
//! stdout, parsed as JSON, as the task result. Collections are expanded the
//! same way by a second program that prints a list of videos.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use vnote_models::Payload;
use vnote_queue::{CollectionEntry, CollectionExpander, JobContext, JobHandler};

use crate::error::{WorkerError, WorkerResult};

/// How much of stderr is kept in a failure message.
const STDERR_TAIL_CHARS: usize = 2000;

/// A program plus its fixed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    program: String,
    args: Vec<String>,
}

impl ShellCommand {
    /// Create a command from a program name.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Split a command line on whitespace. No shell quoting is applied;
    /// wrap the pipeline in a script when arguments need spaces.
    pub fn parse(line: &str) -> WorkerResult<Self> {
        let mut parts = line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| WorkerError::config_error("empty command line"))?;
        Ok(Self::new(program).args(parts))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

/// Runs a [`ShellCommand`] with JSON in and JSON out.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    command: ShellCommand,
    timeout: Option<Duration>,
}

impl CommandRunner {
    pub fn new(command: ShellCommand) -> Self {
        Self {
            command,
            timeout: None,
        }
    }

    /// Kill the process if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn command(&self) -> &ShellCommand {
        &self.command
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run the command, feeding `input` on stdin.
    ///
    /// Empty stdout yields `Value::Null`. A non-zero exit becomes
    /// [`WorkerError::CommandFailed`] carrying the tail of stderr.
    pub async fn run_json(&self, input: &Value, env: &[(&str, &str)]) -> WorkerResult<Value> {
        debug!(
            "Running command: {} {}",
            self.command.program,
            self.command.args.join(" ")
        );

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .envs(env.iter().copied())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                WorkerError::command_failed(format!("failed to spawn {}: {}", self.command.program, e))
            })?;

        // Write stdin from its own task so a chatty child cannot block us
        // on a full stdout pipe.
        let bytes = serde_json::to_vec(input)
            .map_err(|e| WorkerError::invalid_output(format!("payload not serializable: {}", e)))?;
        let writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&bytes).await {
                    if e.kind() != std::io::ErrorKind::BrokenPipe {
                        warn!("Failed to write command stdin: {}", e);
                    }
                }
            })
        });

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result?,
                Err(_) => {
                    // Dropping the child future kills the process.
                    warn!(
                        "Command {} timed out after {:?}, killing process",
                        self.command.program, limit
                    );
                    return Err(WorkerError::command_failed(format!(
                        "{} timed out after {}s",
                        self.command.program,
                        limit.as_secs()
                    )));
                }
            },
            None => child.wait_with_output().await?,
        };

        if let Some(writer) = writer {
            let _ = writer.await;
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorkerError::command_failed(format!(
                "{} exited with {}: {}",
                self.command.program,
                output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                tail(stderr.trim(), STDERR_TAIL_CHARS)
            )));
        }

        parse_stdout(&output.stdout)
    }
}

fn parse_stdout(stdout: &[u8]) -> WorkerResult<Value> {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    if text.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|e| {
        WorkerError::invalid_output(format!("stdout is not JSON ({}): {}", e, tail(text, 200)))
    })
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// Job handler that delegates a single-video task to an external program.
///
/// The program sees the task id and type in `VNOTE_TASK_ID` and
/// `VNOTE_TASK_TYPE`.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    runner: CommandRunner,
}

impl CommandHandler {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl JobHandler for CommandHandler {
    async fn execute(&self, ctx: JobContext, payload: Payload) -> anyhow::Result<Value> {
        ctx.logger
            .log_progress(&format!("running {}", self.runner.command().program()));

        let input = Value::Object(payload);
        let env = [
            ("VNOTE_TASK_ID", ctx.task_id.as_str()),
            ("VNOTE_TASK_TYPE", ctx.task_type.as_str()),
        ];
        let result = self.runner.run_json(&input, &env).await?;
        Ok(result)
    }
}

/// Collection expander backed by an external program.
///
/// Receives `{"video_url", "platform", "limit"}` on stdin and prints either
/// a JSON array of entries or an object with a `videos` array.
#[derive(Debug, Clone)]
pub struct CommandExpander {
    runner: CommandRunner,
}

impl CommandExpander {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl CollectionExpander for CommandExpander {
    async fn expand(
        &self,
        collection_url: &str,
        platform: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<CollectionEntry>> {
        let input = serde_json::json!({
            "video_url": collection_url,
            "platform": platform,
            "limit": limit,
        });
        let output = self.runner.run_json(&input, &[]).await?;
        Ok(parse_entries(output)?)
    }
}

fn parse_entries(output: Value) -> WorkerResult<Vec<CollectionEntry>> {
    let list = match output {
        Value::Array(_) => output,
        Value::Object(mut map) => map.remove("videos").unwrap_or(Value::Null),
        Value::Null => return Ok(Vec::new()),
        other => other,
    };
    serde_json::from_value(list)
        .map_err(|e| WorkerError::invalid_output(format!("expected a list of videos: {}", e)))
}

//! Job handler seam.
//!
//! The queue knows nothing about downloading or summarising videos. Each
//! task type is bound to a [`JobHandler`] that receives the payload and
//! returns a JSON result or an error.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use vnote_models::{Payload, TaskId, TaskType};

use crate::logging::TaskLogger;
use crate::shared::TaskSubmitter;

/// Per-execution context passed to a handler.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub attempt: u32,
    pub logger: TaskLogger,
    /// Lets a handler enqueue follow-up tasks (collection fan-out).
    pub submitter: TaskSubmitter,
}

/// Executes one task attempt.
///
/// Handlers may run more than once for the same task: after a crash the
/// interrupted attempt is re-run from the start.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(&self, ctx: JobContext, payload: Payload) -> anyhow::Result<Value>;
}

/// Handlers keyed by task type.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler, replacing any earlier one for the type.
    pub fn register(&mut self, task_type: TaskType, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(task_type, handler);
    }

    pub fn with(mut self, task_type: TaskType, handler: Arc<dyn JobHandler>) -> Self {
        self.register(task_type, handler);
        self
    }

    pub fn get(&self, task_type: TaskType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&task_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().map(|t| t.as_str()).collect();
        types.sort_unstable();
        f.debug_struct("HandlerRegistry").field("types", &types).finish()
    }
}

//! In-memory task registry.
//!
//! One coarse async mutex guards both the task map and the set of ids a
//! worker is currently executing. Callers that change a record also
//! persist it while still holding the guard, which keeps memory and disk
//! in step.

use std::collections::{HashMap, HashSet};

use tokio::sync::{Mutex, MutexGuard};

use vnote_models::{TaskId, TaskRecord};

/// State behind the registry lock.
#[derive(Debug, Default)]
pub struct RegistryState {
    tasks: HashMap<TaskId, TaskRecord>,
    active: HashSet<TaskId>,
}

impl RegistryState {
    pub fn get(&self, id: &TaskId) -> Option<&TaskRecord> {
        self.tasks.get(id)
    }

    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut TaskRecord> {
        self.tasks.get_mut(id)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn insert(&mut self, record: TaskRecord) {
        self.tasks.insert(record.id.clone(), record);
    }

    pub fn records(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Whether a worker is executing this id right now.
    pub fn is_active(&self, id: &TaskId) -> bool {
        self.active.contains(id)
    }

    /// Mark an id as executing. Returns `false` if it already was.
    pub fn activate(&mut self, id: &TaskId) -> bool {
        self.active.insert(id.clone())
    }

    pub fn deactivate(&mut self, id: &TaskId) {
        self.active.remove(id);
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

/// Thread-safe map of id to task record.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    state: Mutex<RegistryState>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the lock for a multi-step transition.
    pub async fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().await
    }

    /// Copy of one record.
    pub async fn get(&self, id: &TaskId) -> Option<TaskRecord> {
        self.state.lock().await.get(id).cloned()
    }

    pub async fn set(&self, record: TaskRecord) {
        self.state.lock().await.insert(record);
    }

    /// Copy of every record, in no particular order.
    pub async fn list(&self) -> Vec<TaskRecord> {
        self.state.lock().await.records().cloned().collect()
    }

    pub async fn contains(&self, id: &TaskId) -> bool {
        self.state.lock().await.contains(id)
    }
}

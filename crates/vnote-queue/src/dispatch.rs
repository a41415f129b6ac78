//! FIFO channel of work awaiting execution.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use vnote_models::TaskId;

use crate::error::{QueueError, QueueResult};

/// One unit of dispatched work.
///
/// The attempt lets a worker recognise a dispatch that a later retry has
/// superseded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub task_id: TaskId,
    pub attempt: u32,
}

/// Multi-producer, multi-consumer queue of task ids.
///
/// Workers share the receiver through a mutex; only the worker holding it
/// waits on the channel, the rest wait on the lock.
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    tx: mpsc::UnboundedSender<Dispatch>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Dispatch>>>,
    depth: Arc<AtomicUsize>,
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            depth: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn push(&self, task_id: TaskId, attempt: u32) -> QueueResult<()> {
        // Counted before sending so a fast consumer never sees it negative.
        self.depth.fetch_add(1, Ordering::SeqCst);
        self.tx.send(Dispatch { task_id, attempt }).map_err(|e| {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            QueueError::enqueue_failed(format!("dispatch channel closed: {}", e.0.task_id))
        })
    }

    /// Wait up to `timeout` for the next dispatch.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<Dispatch> {
        let next = tokio::time::timeout(timeout, async {
            let mut rx = self.rx.lock().await;
            rx.recv().await
        })
        .await
        .ok()
        .flatten();

        if next.is_some() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
        next
    }

    /// Dispatches pushed but not yet taken.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Persistent task queue for video note generation.
//!
//! This crate provides:
//! - File-per-task durable records with atomic writes
//! - A bounded worker pool pulling from an in-process dispatch queue
//! - Startup recovery of interrupted tasks
//! - Plain, batch and forced retries, the last rebuilding lost tasks
//!   from whatever artifacts survived

pub mod artifacts;
pub mod collection;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod logging;
pub mod metrics;
pub mod recovery;
pub mod registry;
pub mod retry;
pub mod service;
mod shared;
pub mod sources;
pub mod store;
pub mod worker;

pub use artifacts::ArtifactStore;
pub use collection::{CollectionEntry, CollectionExpander, CollectionHandler};
pub use config::QueueConfig;
pub use dispatch::{Dispatch, DispatchQueue};
pub use error::{QueueError, QueueResult, StoreError, StoreResult};
pub use handler::{HandlerRegistry, JobContext, JobHandler};
pub use logging::TaskLogger;
pub use recovery::RecoveryReport;
pub use registry::TaskRegistry;
pub use retry::{
    BatchRetryReport, ClearResetOutcome, ClearResetSummary, ForceRetryAllReport,
    ForceRetryOutcome, ForceRetrySummary, NonSuccessRetryReport,
};
pub use service::{QueueStats, TaskLocation, TaskQueue, TaskValidation};
pub use shared::TaskSubmitter;
pub use sources::{RecoveredTask, RecoverySource};
pub use store::{LoadedRecords, TaskStore};
pub use worker::WorkerPool;

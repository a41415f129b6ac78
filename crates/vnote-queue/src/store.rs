//! File-per-task record persistence.
//!
//! Each task lives in `<tasks_dir>/<id>.json`. Writes go to a hidden
//! temporary file in the same directory, are synced, then renamed over
//! the target so a crash never leaves a truncated record behind.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use vnote_models::{TaskId, TaskRecord};

use crate::error::{StoreError, StoreResult};

/// Everything `load_all` could read, plus the files it could not.
#[derive(Debug, Default)]
pub struct LoadedRecords {
    pub records: Vec<TaskRecord>,
    pub corrupt: Vec<PathBuf>,
}

/// Durable task record store.
#[derive(Debug, Clone)]
pub struct TaskStore {
    dir: PathBuf,
}

impl TaskStore {
    /// Open the store, creating its directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record path for an id. Rejects ids that are not safe file stems.
    pub fn path_for(&self, id: &TaskId) -> StoreResult<PathBuf> {
        id.validate()?;
        Ok(self.dir.join(format!("{}.json", id)))
    }

    /// Write the whole record, replacing any previous version.
    pub async fn save(&self, record: &TaskRecord) -> StoreResult<()> {
        let path = self.path_for(&record.id)?;
        write_json_atomic(&path, record).await?;
        debug!(task_id = %record.id, status = %record.status, "Persisted task record");
        Ok(())
    }

    /// Load one record. A missing file is `Ok(None)`.
    pub async fn load(&self, id: &TaskId) -> StoreResult<Option<TaskRecord>> {
        let path = self.path_for(id)?;
        read_json(&path).await
    }

    /// Load every record in the directory.
    ///
    /// Files that cannot be read or parsed are reported in `corrupt`
    /// instead of failing the whole load.
    pub async fn load_all(&self) -> StoreResult<LoadedRecords> {
        let mut loaded = LoadedRecords::default();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?
        {
            let path = entry.path();
            if !is_record_file(&path) {
                continue;
            }

            match read_json::<TaskRecord>(&path).await {
                Ok(Some(record)) => loaded.records.push(record),
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), "Skipping unreadable task record: {}", e);
                    loaded.corrupt.push(path);
                }
            }
        }

        Ok(loaded)
    }
}

fn is_record_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(true);
    !hidden && path.extension().and_then(|e| e.to_str()) == Some("json")
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub(crate) async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = temp_path(path);

    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    file.write_all(&bytes)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    file.sync_all().await.map_err(|e| StoreError::io(&tmp, e))?;
    drop(file);

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StoreError::io(path, e));
    }
    Ok(())
}

/// Read and parse a JSON file. A missing file is `Ok(None)`.
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StoreError::malformed(path, e))
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("record");
    path.with_file_name(format!(".{}.tmp", name))
}

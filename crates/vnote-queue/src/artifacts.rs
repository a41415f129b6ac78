//! Access to the pipeline results directory.
//!
//! The queue writes exactly one file here, the request snapshot. The
//! other files are produced by the note pipeline; the queue reads them and
//! removes them before a clear-and-reset, never the snapshot.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

use vnote_models::{AudioMeta, RequestSnapshot, TaskId};

use crate::error::{StoreError, StoreResult};
use crate::store::{read_json, write_json_atomic};

/// Pipeline outputs removed by [`ArtifactStore::clear_outputs`].
const OUTPUT_SUFFIXES: [&str; 7] = [
    ".json",
    ".status.json",
    "_audio.json",
    "_audio.wav",
    "_audio.mp3",
    ".wav",
    ".mp3",
];

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
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

    fn path(&self, id: &TaskId, suffix: &str) -> StoreResult<PathBuf> {
        id.validate()?;
        Ok(self.dir.join(format!("{}{}", id, suffix)))
    }

    pub fn snapshot_path(&self, id: &TaskId) -> StoreResult<PathBuf> {
        self.path(id, ".request.json")
    }

    /// Write the snapshot unless one already exists.
    ///
    /// Returns `false` when an earlier snapshot was kept.
    pub async fn write_snapshot_once(&self, snapshot: &RequestSnapshot) -> StoreResult<bool> {
        let path = self.snapshot_path(&snapshot.task_id)?;
        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        if exists {
            return Ok(false);
        }
        write_json_atomic(&path, snapshot).await?;
        Ok(true)
    }

    pub async fn read_snapshot(&self, id: &TaskId) -> StoreResult<Option<RequestSnapshot>> {
        read_json(&self.snapshot_path(id)?).await
    }

    /// `<id>_audio.json`, written by the download stage.
    pub async fn read_audio_meta(&self, id: &TaskId) -> StoreResult<Option<AudioMeta>> {
        read_json(&self.path(id, "_audio.json")?).await
    }

    /// `<id>.json`, the final note or an error document.
    pub async fn read_result(&self, id: &TaskId) -> StoreResult<Option<Value>> {
        read_json(&self.path(id, ".json")?).await
    }

    /// Delete the pipeline outputs of a task, keeping its request snapshot.
    ///
    /// Returns the names of the files removed.
    pub async fn clear_outputs(&self, id: &TaskId) -> StoreResult<Vec<String>> {
        let mut removed = Vec::new();
        for suffix in OUTPUT_SUFFIXES {
            let path = self.path(id, suffix)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed.push(format!("{}{}", id, suffix)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(&path, e)),
            }
        }
        Ok(removed)
    }

    /// Whether any file for this id exists in the results directory.
    pub async fn has_any(&self, id: &TaskId) -> bool {
        for suffix in [".request.json", "_audio.json", ".json"] {
            let Ok(path) = self.path(id, suffix) else {
                return false;
            };
            match tokio::fs::try_exists(&path).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => warn!(path = %path.display(), "Failed to stat artifact: {}", e),
            }
        }
        false
    }
}

//! Per-task candidate artifacts.
//!
//! Each task owns exactly one candidate file under the store root,
//! overwritten in place whenever the repair loop adopts a new candidate.
//! The store never keeps more than one live candidate per task.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to create artifact directory {path}: {source}")]
    DirectoryCreation {
        path: String,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Flat-file store holding one overwrite-always candidate per task id.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the candidate file for a task.
    pub fn candidate_path(&self, task_id: &str) -> PathBuf {
        self.root
            .join(format!("code_{}.py", sanitize_task_id(task_id)))
    }

    /// Writes (or overwrites) the candidate for a task, creating the store
    /// root on first use.
    pub async fn write_candidate(
        &self,
        task_id: &str,
        source: &str,
    ) -> Result<PathBuf, StorageError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::DirectoryCreation {
                path: self.root.display().to_string(),
                source: e,
            })?;
        let path = self.candidate_path(task_id);
        tokio::fs::write(&path, source).await?;
        debug!(task_id = %task_id, path = %path.display(), "Wrote candidate artifact");
        Ok(path)
    }

    pub async fn read_candidate(&self, task_id: &str) -> Result<String, StorageError> {
        Ok(tokio::fs::read_to_string(self.candidate_path(task_id)).await?)
    }
}

/// Task ids may contain path separators ("Python/0"); the file name keeps
/// them unique while staying filesystem-safe.
fn sanitize_task_id(task_id: &str) -> String {
    task_id.replace('/', "-").replace(' ', "_")
}

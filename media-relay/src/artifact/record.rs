use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, warn};

use crate::utils::fs::{remove_file_if_exists, remove_file_if_exists_sync};
use crate::{Error, Result};

/// Lifecycle of a temporary file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    /// Path reserved, nothing written yet.
    Allocated,
    /// A stage is writing to the path.
    Writing,
    /// Fully written; length known.
    Complete,
    /// Removed from disk. Terminal.
    Deleted,
}

impl fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Allocated => "allocated",
            Self::Writing => "writing",
            Self::Complete => "complete",
            Self::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// One temporary file owned by one request.
///
/// The record is not `Clone`: whoever holds it is responsible for the file.
/// Deletion is idempotent, and a record dropped before it was deleted removes
/// its file in `Drop`, so no exit path can leak it.
pub struct ArtifactRecord {
    path: PathBuf,
    owner: String,
    state: ArtifactState,
    len: Option<u64>,
    live: Arc<AtomicUsize>,
}

impl ArtifactRecord {
    pub(super) fn new(path: PathBuf, owner: impl Into<String>, live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::AcqRel);
        Self {
            path,
            owner: owner.into(),
            state: ArtifactState::Allocated,
            len: None,
            live,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Correlation id of the owning request.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn state(&self) -> ArtifactState {
        self.state
    }

    /// Length in bytes, known once the artifact is complete.
    pub fn len(&self) -> Option<u64> {
        self.len
    }

    /// File name without extension.
    pub fn stem(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("artifact")
    }

    pub fn mark_writing(&mut self) {
        if self.state != ArtifactState::Deleted {
            self.state = ArtifactState::Writing;
        }
    }

    pub fn mark_complete(&mut self, len: u64) {
        if self.state != ArtifactState::Deleted {
            self.state = ArtifactState::Complete;
            self.len = Some(len);
        }
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Check that a stage actually produced the file and record its length.
    pub async fn finalize(&mut self) -> Result<u64> {
        let metadata = tokio::fs::metadata(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::transcode(format!("no output produced at {}", self.path.display()))
            } else {
                Error::io_path("inspecting artifact", &self.path, e)
            }
        })?;
        let len = metadata.len();
        self.mark_complete(len);
        Ok(len)
    }

    /// Remove the file. Deleting twice, or deleting a file that was never
    /// created, is a no-op.
    ///
    /// Returns `true` when a file was actually removed by this call.
    pub async fn delete(&mut self) -> Result<bool> {
        if self.state == ArtifactState::Deleted {
            return Ok(false);
        }
        match remove_file_if_exists(&self.path).await {
            Ok(removed) => {
                self.settle(removed);
                Ok(removed)
            }
            Err(source) => Err(Error::CleanupFailure {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Blocking variant of [`delete`](Self::delete) for synchronous contexts.
    pub fn delete_now(&mut self) -> Result<bool> {
        if self.state == ArtifactState::Deleted {
            return Ok(false);
        }
        match remove_file_if_exists_sync(&self.path) {
            Ok(removed) => {
                self.settle(removed);
                Ok(removed)
            }
            Err(source) => Err(Error::CleanupFailure {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn settle(&mut self, removed: bool) {
        debug!(
            path = %self.path.display(),
            owner = %self.owner,
            previous = %self.state,
            removed,
            "Artifact deleted"
        );
        self.state = ArtifactState::Deleted;
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for ArtifactRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactRecord")
            .field("path", &self.path)
            .field("owner", &self.owner)
            .field("state", &self.state)
            .field("len", &self.len)
            .finish()
    }
}

impl Drop for ArtifactRecord {
    fn drop(&mut self) {
        if self.state == ArtifactState::Deleted {
            return;
        }
        if let Err(e) = self.delete_now() {
            warn!(owner = %self.owner, error = %e, "Artifact cleanup failed");
            // The record is gone either way.
            self.live.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

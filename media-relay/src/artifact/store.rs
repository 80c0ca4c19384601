use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tracing::{debug, info, warn};

use super::ArtifactRecord;
use crate::Result;
use crate::utils::fs::{ensure_dir_all, io_error};

/// A directory of transient files, one per live request artifact.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    sequence: AtomicU64,
    live: Arc<AtomicUsize>,
}

impl ArtifactStore {
    /// Open the store, creating its directory if absent.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        ensure_dir_all(&root).await?;
        Ok(Self {
            root,
            sequence: AtomicU64::new(0),
            live: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of records handed out and not yet deleted.
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Reserve a unique path. Nothing is created on disk.
    pub fn allocate(&self, prefix: &str, extension: &str, owner: &str) -> ArtifactRecord {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "{}_{}_{}_{:04}.{}",
            prefix,
            chrono::Utc::now().timestamp_millis(),
            short_owner(owner),
            seq,
            extension
        );
        let path = self.root.join(name);
        debug!(path = %path.display(), owner, "Artifact allocated");
        ArtifactRecord::new(path, owner, Arc::clone(&self.live))
    }

    /// Reserve `<root>/<stem of record>.<extension>`.
    ///
    /// For tools that derive their output name from their input name.
    pub fn allocate_sibling(&self, record: &ArtifactRecord, extension: &str) -> ArtifactRecord {
        let path = self.root.join(format!("{}.{}", record.stem(), extension));
        debug!(path = %path.display(), owner = record.owner(), "Sibling artifact allocated");
        ArtifactRecord::new(path, record.owner(), Arc::clone(&self.live))
    }

    /// Remove files left over by a previous process.
    ///
    /// Must run before the store hands out records.
    pub async fn purge_stale(&self) -> Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| io_error("reading store directory", &self.root, e))?;

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error("reading store directory", &self.root, e))?
        {
            let path = entry.path();
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to purge stale artifact"),
            }
        }

        if removed > 0 {
            info!(root = %self.root.display(), removed, "Purged stale artifacts");
        }
        Ok(removed)
    }
}

fn short_owner(owner: &str) -> String {
    let short: String = owner
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect();
    if short.is_empty() {
        "anon".to_string()
    } else {
        short
    }
}

//! Snapshot persistence.
//!
//! The engine itself never does I/O. Callers load a [`ClusterSnapshot`]
//! through a [`ClusterRepository`], restore a store from it, run, and save
//! the resulting snapshot in one step.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::types::{ClusterSnapshot, SNAPSHOT_VERSION};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("repository I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported snapshot version {found} (expected {})", SNAPSHOT_VERSION)]
    UnsupportedVersion { found: u16 },
}

/// Single source of truth for the persisted cluster set.
#[async_trait]
pub trait ClusterRepository: Send + Sync {
    /// `None` when nothing was ever saved.
    async fn load(&self) -> Result<Option<ClusterSnapshot>, RepositoryError>;

    /// Replace the stored snapshot. Either the whole snapshot lands or none
    /// of it does.
    async fn save(&self, snapshot: &ClusterSnapshot) -> Result<(), RepositoryError>;
}

/// Process-local repository, mostly for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    snapshot: RwLock<Option<ClusterSnapshot>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: ClusterSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(Some(snapshot)),
        }
    }
}

#[async_trait]
impl ClusterRepository for InMemoryRepository {
    async fn load(&self) -> Result<Option<ClusterSnapshot>, RepositoryError> {
        Ok(self.snapshot.read().await.clone())
    }

    async fn save(&self, snapshot: &ClusterSnapshot) -> Result<(), RepositoryError> {
        *self.snapshot.write().await = Some(snapshot.clone());
        Ok(())
    }
}

/// Snapshot stored as one JSON document on disk.
///
/// Saves go to a sibling temp file that is renamed over the target, so a
/// crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "clusters.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ClusterRepository for JsonFileRepository {
    async fn load(&self) -> Result<Option<ClusterSnapshot>, RepositoryError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let snapshot: ClusterSnapshot = serde_json::from_slice(&bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(RepositoryError::UnsupportedVersion {
                found: snapshot.version,
            });
        }
        tracing::debug!(
            path = %self.path.display(),
            clusters = snapshot.clusters.len(),
            "snapshot loaded"
        );
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &ClusterSnapshot) -> Result<(), RepositoryError> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.temp_path();
        let written = match write_synced(&tmp, &bytes).await {
            Ok(()) => tokio::fs::rename(&tmp, &self.path).await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            // The previous snapshot is still in place; only the temp file goes.
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                tracing::warn!(path = %tmp.display(), error = %cleanup, "temp snapshot not removed");
            }
            return Err(err.into());
        }

        tracing::debug!(
            path = %self.path.display(),
            clusters = snapshot.clusters.len(),
            "snapshot saved"
        );
        Ok(())
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_starts_empty_and_keeps_last_save() {
        let repo = InMemoryRepository::new();
        assert!(repo.load().await.unwrap().is_none());

        repo.save(&ClusterSnapshot::empty(3)).await.unwrap();
        repo.save(&ClusterSnapshot::empty(4)).await.unwrap();
        assert_eq!(repo.load().await.unwrap().unwrap().dimension, 4);
    }

    #[test]
    fn temp_path_is_a_sibling() {
        let repo = JsonFileRepository::new("/data/clusters.json");
        assert_eq!(repo.temp_path(), PathBuf::from("/data/clusters.json.tmp"));
    }

    #[tokio::test]
    async fn failed_save_leaves_no_temp_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("clusters.json");
        // A directory in the target's place makes the final rename fail.
        tokio::fs::create_dir(&path).await.unwrap();

        let repo = JsonFileRepository::new(&path);
        let err = repo.save(&ClusterSnapshot::empty(2)).await.unwrap_err();

        assert!(matches!(err, RepositoryError::Io(_)));
        assert!(!repo.temp_path().exists());
        assert!(path.is_dir());
    }
}

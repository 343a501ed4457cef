use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::app::ports::ArchiveStore;
use crate::error::{PipelineError, Result};

/// Archive store on the local filesystem
#[derive(Debug, Default, Clone)]
pub struct FsArchiveStore;

impl FsArchiveStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ArchiveStore for FsArchiveStore {
    async fn move_artifact(&self, source: &Path, destination: &Path) -> Result<()> {
        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            return Err(PipelineError::Storage(format!(
                "source artifact {} does not exist",
                source.display()
            )));
        }
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        match tokio::fs::rename(source, destination).await {
            Ok(()) => {
                debug!("Renamed {} to {}", source.display(), destination.display());
                Ok(())
            }
            Err(e) => {
                // Rename cannot cross filesystems
                warn!("rename failed ({}); falling back to copy and remove", e);
                tokio::fs::copy(source, destination).await?;
                tokio::fs::remove_file(source).await?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn moves_file_and_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("data/ev.csv");
        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        std::fs::write(&source, "ID\n1\n").unwrap();
        let destination = dir.path().join("archive/2024/ev_2024-01-02.csv");

        FsArchiveStore::new().move_artifact(&source, &destination).await.unwrap();

        assert!(!source.exists());
        assert_eq!(std::fs::read_to_string(&destination).unwrap(), "ID\n1\n");
    }

    #[tokio::test]
    async fn missing_source_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsArchiveStore::new()
            .move_artifact(&dir.path().join("nope.csv"), &dir.path().join("a.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Storage(_)));
    }
}

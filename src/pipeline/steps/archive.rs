use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::app::ports::ArchiveStore;
use crate::constants::RUN_DATE_PLACEHOLDER;
use crate::observability::metrics;
use crate::pipeline::task::{TaskAction, TaskContext, TaskOutput, TaskResult};

/// Moves the consumed source artifact to a run-dated archive path
pub struct ArchiveStep {
    archive: Arc<dyn ArchiveStore>,
    source: PathBuf,
    destination_template: String,
}

impl ArchiveStep {
    pub fn new(archive: Arc<dyn ArchiveStore>, source: impl Into<PathBuf>, destination_template: impl Into<String>) -> Self {
        Self {
            archive,
            source: source.into(),
            destination_template: destination_template.into(),
        }
    }

    /// Archive path for a run date formatted as `YYYY-MM-DD`
    pub fn destination_for(&self, ds: &str) -> PathBuf {
        PathBuf::from(self.destination_template.replace(RUN_DATE_PLACEHOLDER, ds))
    }
}

#[async_trait]
impl TaskAction for ArchiveStep {
    async fn run(&self, ctx: TaskContext) -> TaskResult {
        let destination = self.destination_for(&ctx.ds());
        self.archive.move_artifact(&self.source, &destination).await?;
        metrics::storage::artifact_archived();
        info!("🗄️ Archived {} to {}", self.source.display(), destination.display());
        Ok(Some(TaskOutput::Artifact(destination)))
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::observability::metrics;
use crate::pipeline::ingestion::{Extractor, FetchParams};
use crate::pipeline::processing::normalize::Normalizer;
use crate::pipeline::processing::rows::RowSet;
use crate::pipeline::task::{TaskAction, TaskContext, TaskError, TaskOutput, TaskResult};

/// Fetches the provider payload, flattens it and writes the source artifact.
///
/// The normalized row set is handed to downstream tasks in memory; the CSV
/// artifact is what the archive task later moves.
pub struct ExtractStep {
    extractor: Extractor,
    normalizer: Arc<dyn Normalizer>,
    api_key: String,
    params: FetchParams,
    artifact_path: PathBuf,
    fail_on_empty: bool,
}

impl ExtractStep {
    pub fn new(
        extractor: Extractor,
        normalizer: Arc<dyn Normalizer>,
        api_key: impl Into<String>,
        params: FetchParams,
        artifact_path: impl Into<PathBuf>,
        fail_on_empty: bool,
    ) -> Self {
        Self {
            extractor,
            normalizer,
            api_key: api_key.into(),
            params,
            artifact_path: artifact_path.into(),
            fail_on_empty,
        }
    }

    async fn write_artifact(&self, rows: &RowSet) -> Result<(), PipelineError> {
        let mut csv = Vec::new();
        rows.write_csv(&mut csv)?;
        if let Some(parent) = self.artifact_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.artifact_path, csv).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskAction for ExtractStep {
    async fn run(&self, ctx: TaskContext) -> TaskResult {
        info!("📥 Extracting charge points for {}", ctx.ds());
        let payload = self.extractor.fetch(&self.api_key, &self.params).await?;

        if payload.is_empty() {
            if self.fail_on_empty {
                return Err(TaskError::new("No data fetched from API"));
            }
            warn!("⚠️ Provider returned no records; continuing with an empty row set");
        }

        let rows = self.normalizer.normalize(&payload)?;
        metrics::extract::rows_normalized(rows.len());
        info!(
            "🔧 Normalized {} records into {} rows ({} columns)",
            payload.len(),
            rows.len(),
            rows.columns().len()
        );

        self.write_artifact(&rows).await?;
        info!("💾 Wrote source artifact {}", self.artifact_path.display());

        Ok(Some(TaskOutput::Rows(Arc::new(rows))))
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::app::ports::StagingStore;
use crate::observability::metrics;
use crate::pipeline::task::{TaskAction, TaskContext, TaskOutput, TaskResult};

/// Overwrites a staging table with the row set produced by `source_task`
pub struct LoadStep {
    store: Arc<dyn StagingStore>,
    table: String,
    source_task: String,
}

impl LoadStep {
    pub fn new(store: Arc<dyn StagingStore>, table: impl Into<String>, source_task: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
            source_task: source_task.into(),
        }
    }
}

#[async_trait]
impl TaskAction for LoadStep {
    async fn run(&self, ctx: TaskContext) -> TaskResult {
        let rows = ctx.upstream_rows(&self.source_task)?;
        let written = self.store.overwrite(&self.table, &rows).await?;
        metrics::storage::rows_loaded(&self.table, written);
        info!("📦 Loaded {} rows into {}", written, self.table);
        Ok(Some(TaskOutput::RowCount(written)))
    }
}

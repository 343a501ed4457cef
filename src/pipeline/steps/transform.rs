use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::app::ports::StagingStore;
use crate::pipeline::task::{TaskAction, TaskContext, TaskResult};

/// Invokes the named staging-to-target procedure and waits for it
pub struct TransformStep {
    store: Arc<dyn StagingStore>,
    procedure: String,
}

impl TransformStep {
    pub fn new(store: Arc<dyn StagingStore>, procedure: impl Into<String>) -> Self {
        Self {
            store,
            procedure: procedure.into(),
        }
    }
}

#[async_trait]
impl TaskAction for TransformStep {
    async fn run(&self, _ctx: TaskContext) -> TaskResult {
        info!("⚙️ Calling procedure {}", self.procedure);
        self.store.call_procedure(&self.procedure).await?;
        info!("✅ Procedure {} completed", self.procedure);
        Ok(None)
    }
}

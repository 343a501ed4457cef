use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::app::ports::StagingStore;
use crate::error::PipelineError;
use crate::observability::metrics;
use crate::pipeline::processing::quality_gate::QualityGate;
use crate::pipeline::task::{TaskAction, TaskContext, TaskOutput, TaskResult};

/// Reads a staging table back and evaluates a quality gate over it.
///
/// A failing gate fails the task; the engine's skip propagation takes care of
/// everything downstream.
pub struct QualityGateStep {
    store: Arc<dyn StagingStore>,
    table: String,
    gate: QualityGate,
}

impl QualityGateStep {
    pub fn new(store: Arc<dyn StagingStore>, table: impl Into<String>, gate: QualityGate) -> Self {
        Self {
            store,
            table: table.into(),
            gate,
        }
    }
}

#[async_trait]
impl TaskAction for QualityGateStep {
    async fn run(&self, _ctx: TaskContext) -> TaskResult {
        let rows = self.store.read_table(&self.table).await?;
        let report = self.gate.evaluate(&rows);
        let failed = report.results.len() - report.passed_count();
        metrics::quality_gate::checks_evaluated(&self.gate.name, report.passed_count(), failed);

        if !report.passed() {
            warn!(
                "🚫 Quality gate '{}' failed {}/{} checks on {}",
                self.gate.name,
                failed,
                report.results.len(),
                self.table
            );
            return Err(PipelineError::QualityCheckFailure {
                gate: self.gate.name.clone(),
                details: report.failure_summary(),
            }
            .into());
        }

        info!(
            "✅ Quality gate '{}' passed {} checks over {} rows",
            self.gate.name,
            report.results.len(),
            report.rows_evaluated
        );
        Ok(Some(TaskOutput::Quality(report)))
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::app::ports::StagingStore;
use crate::error::PipelineError;
use crate::pipeline::processing::rows::Value;
use crate::pipeline::task::{TaskAction, TaskContext, TaskOutput, TaskResult};

/// Scalar query counting repeated non-null values of `column` in `table`
pub fn duplicate_count_sql(table: &str, column: &str) -> String {
    format!("SELECT COUNT(\"{column}\") - COUNT(DISTINCT \"{column}\") FROM \"{table}\"")
}

/// Runs a scalar SQL query and compares the result with an expected value
pub struct ValueCheckStep {
    store: Arc<dyn StagingStore>,
    name: String,
    sql: String,
    pass_value: Value,
    required_column: Option<(String, String)>,
}

impl ValueCheckStep {
    pub fn new(store: Arc<dyn StagingStore>, name: impl Into<String>, sql: impl Into<String>, pass_value: Value) -> Self {
        Self {
            store,
            name: name.into(),
            sql: sql.into(),
            pass_value,
            required_column: None,
        }
    }

    /// Fail unless `table` has `column` before querying; SQLite reads an
    /// unknown double-quoted column as a string literal.
    pub fn requiring_column(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.required_column = Some((table.into(), column.into()));
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

fn matches_expected(observed: &Value, expected: &Value) -> bool {
    match (observed.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => observed.distinct_key() == expected.distinct_key(),
    }
}

#[async_trait]
impl TaskAction for ValueCheckStep {
    async fn run(&self, _ctx: TaskContext) -> TaskResult {
        if let Some((table, column)) = &self.required_column {
            let rows = self.store.read_table(table).await?;
            if !rows.has_column(column) {
                return Err(PipelineError::QualityCheckFailure {
                    gate: self.name.clone(),
                    details: format!("column '{}' not found in {}", column, table),
                }
                .into());
            }
        }
        let observed = self.store.run_query(&self.sql).await?;
        if !matches_expected(&observed, &self.pass_value) {
            warn!("🚫 Check '{}' returned {} (expected {})", self.name, observed, self.pass_value);
            return Err(PipelineError::QualityCheckFailure {
                gate: self.name.clone(),
                details: format!("query returned {} (expected {})", observed, self.pass_value),
            }
            .into());
        }
        info!("✅ Check '{}' passed", self.name);
        Ok(Some(TaskOutput::Scalar(observed)))
    }
}

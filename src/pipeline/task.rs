//! Task-level types: what a task receives, what it returns, and how it ended.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::pipeline::processing::quality_gate::QualityReport;
use crate::pipeline::processing::rows::{RowSet, Value};

/// Everything a task action can see when it runs.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub run_id: Uuid,
    pub pipeline: String,
    pub logical_date: NaiveDate,
    pub task: String,
    /// 1-based attempt number
    pub attempt: u32,
    /// Outputs of the task's direct upstream tasks that produced one
    pub upstream: HashMap<String, TaskOutput>,
}

impl TaskContext {
    /// The row set handed over by upstream task `from`.
    pub fn upstream_rows(&self, from: &str) -> Result<Arc<RowSet>, TaskError> {
        match self.upstream.get(from) {
            Some(TaskOutput::Rows(rows)) => Ok(Arc::clone(rows)),
            Some(other) => Err(TaskError::new(format!(
                "upstream task '{}' produced {} instead of a row set",
                from,
                other.kind()
            ))),
            None => Err(TaskError::new(format!("no output from upstream task '{}'", from))),
        }
    }

    /// Run date formatted as `YYYY-MM-DD`
    pub fn ds(&self) -> String {
        self.logical_date.format("%Y-%m-%d").to_string()
    }
}

/// Payload a task hands to its dependents.
///
/// Row sets are shared read-only through `Arc`; nothing mutates them after the
/// producing task returns.
#[derive(Debug, Clone)]
pub enum TaskOutput {
    Rows(Arc<RowSet>),
    RowCount(usize),
    Quality(QualityReport),
    Scalar(Value),
    Artifact(PathBuf),
}

impl TaskOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            TaskOutput::Rows(_) => "a row set",
            TaskOutput::RowCount(_) => "a row count",
            TaskOutput::Quality(_) => "a quality report",
            TaskOutput::Scalar(_) => "a scalar",
            TaskOutput::Artifact(_) => "an artifact path",
        }
    }

    /// Short human-readable description for reports
    pub fn summary(&self) -> String {
        match self {
            TaskOutput::Rows(rows) => format!("{} rows x {} columns", rows.len(), rows.columns().len()),
            TaskOutput::RowCount(n) => format!("{} rows written", n),
            TaskOutput::Quality(report) => format!(
                "{}/{} checks passed over {} rows",
                report.passed_count(),
                report.results.len(),
                report.rows_evaluated
            ),
            TaskOutput::Scalar(value) => format!("value {}", value),
            TaskOutput::Artifact(path) => format!("artifact {}", path.display()),
        }
    }
}

/// Failure signalled by a task action.
#[derive(Debug)]
pub struct TaskError {
    reason: String,
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TaskError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            cause: None,
        }
    }

    pub fn with_cause(
        reason: impl Into<String>,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            reason: reason.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// The underlying pipeline error, when the failure came from one
    pub fn pipeline_error(&self) -> Option<&PipelineError> {
        self.cause.as_ref().and_then(|c| c.downcast_ref::<PipelineError>())
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

impl From<PipelineError> for TaskError {
    fn from(err: PipelineError) -> Self {
        TaskError {
            reason: err.to_string(),
            cause: Some(Box::new(err)),
        }
    }
}

pub type TaskResult = std::result::Result<Option<TaskOutput>, TaskError>;

/// The unit of work bound to a graph node.
#[async_trait]
pub trait TaskAction: Send + Sync {
    async fn run(&self, ctx: TaskContext) -> TaskResult;
}

/// Adapts an async closure into a [`TaskAction`].
pub struct FnAction<F> {
    f: F,
}

impl<F, Fut> FnAction<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = TaskResult> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> TaskAction for FnAction<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = TaskResult> + Send,
{
    async fn run(&self, ctx: TaskContext) -> TaskResult {
        (self.f)(ctx).await
    }
}

/// Terminal state of a task within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Succeeded => "SUCCEEDED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resolved result of one task. Written once by the engine.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub name: String,
    pub upstream: Vec<String>,
    pub status: TaskStatus,
    /// Failure reason, or the skip reason for skipped tasks
    pub error: Option<String>,
    pub output: Option<TaskOutput>,
    /// Number of times the action was invoked; 0 for skipped tasks
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn skipped(name: impl Into<String>, upstream: Vec<String>, reason: &str) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            upstream,
            status: TaskStatus::Skipped,
            error: Some(reason.to_string()),
            output: None,
            attempts: 0,
            started_at: None,
            ended_at: Some(now),
        }
    }
}

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::task::{TaskRecord, TaskStatus};

/// Overall state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "PENDING",
            RunStatus::Running => "RUNNING",
            RunStatus::Succeeded => "SUCCEEDED",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution of a pipeline for a logical date
#[derive(Debug, Clone)]
pub struct Run {
    pub run_id: Uuid,
    pub pipeline: String,
    pub logical_date: NaiveDate,
    pub status: RunStatus,
    /// Task results in topological order
    pub tasks: Vec<TaskRecord>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new(pipeline: impl Into<String>, logical_date: NaiveDate) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline: pipeline.into(),
            logical_date,
            status: RunStatus::Pending,
            tasks: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn get(&self, task: &str) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.name == task)
    }

    pub fn status_of(&self, task: &str) -> Option<TaskStatus> {
        self.get(task).map(|t| t.status)
    }

    /// First failed task in topological order
    pub fn first_failure(&self) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.status == TaskStatus::Failed)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.iter().filter(|t| t.status == TaskStatus::Skipped)
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    /// One structured line per task for the run report
    pub fn report_lines(&self) -> Vec<TaskReportLine> {
        let run_date = self.logical_date.format("%Y-%m-%d").to_string();
        self.tasks
            .iter()
            .map(|t| TaskReportLine {
                run_id: self.run_id.to_string(),
                pipeline: self.pipeline.clone(),
                run_date: run_date.clone(),
                run_status: self.status,
                task: t.name.clone(),
                status: t.status,
                started_at: t.started_at,
                ended_at: t.ended_at,
                attempts: t.attempts,
                error: t.error.clone(),
                output: t.output.as_ref().map(|o| o.summary()),
            })
            .collect()
    }

    /// Multi-line human-readable summary
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Run {} of '{}' for {}: {}\n",
            self.run_id, self.pipeline, self.logical_date, self.status
        );
        for t in &self.tasks {
            let detail = match (&t.error, &t.output) {
                (Some(err), _) => format!(" ({})", err),
                (None, Some(output)) => format!(" ({})", output.summary()),
                (None, None) => String::new(),
            };
            out.push_str(&format!("  {:<10} {}{}\n", t.status.as_str(), t.name, detail));
        }
        if let Some(failure) = self.first_failure() {
            out.push_str(&format!(
                "First failure: {}: {}\n",
                failure.name,
                failure.error.as_deref().unwrap_or("unknown error")
            ));
        }
        out
    }
}

/// Structured report record for one task of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReportLine {
    pub run_id: String,
    pub pipeline: String,
    pub run_date: String,
    pub run_status: RunStatus,
    pub task: String,
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub error: Option<String>,
    pub output: Option<String>,
}

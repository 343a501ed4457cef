use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use crate::app::ports::RunReportPort;
use crate::error::Result;
use crate::pipeline::run::Run;

/// Writes one NDJSON line per task, partitioned by run date:
/// `<report_dir>/run_date=YYYY-MM-DD/run-<run_id>.ndjson`
pub struct FileRunReportAdapter {
    report_dir: PathBuf,
}

impl FileRunReportAdapter {
    pub fn new(report_dir: impl Into<PathBuf>) -> Self {
        Self {
            report_dir: report_dir.into(),
        }
    }

    pub fn path_for(&self, run: &Run) -> PathBuf {
        self.report_dir
            .join(format!("run_date={}", run.logical_date.format("%Y-%m-%d")))
            .join(format!("run-{}.ndjson", run.run_id))
    }

    fn render(run: &Run) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for line in run.report_lines() {
            serde_json::to_writer(&mut out, &line)?;
            out.push(b'\n');
        }
        Ok(out)
    }
}

#[async_trait]
impl RunReportPort for FileRunReportAdapter {
    async fn write_run(&self, run: &Run) -> Result<()> {
        let path = self.path_for(run);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&path, Self::render(run)?).await?;
        info!("📝 Run report written to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::run::{RunStatus, TaskReportLine};
    use crate::pipeline::task::{TaskRecord, TaskStatus};
    use chrono::NaiveDate;

    #[tokio::test]
    async fn writes_one_line_per_task_under_date_partition() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = FileRunReportAdapter::new(dir.path());
        let mut run = Run::new("daily", NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        run.status = RunStatus::Failed;
        run.tasks = vec![
            TaskRecord::skipped("a", vec![], "run cancelled"),
            TaskRecord::skipped("b", vec!["a".into()], "upstream failure"),
        ];

        adapter.write_run(&run).await.unwrap();

        let path = adapter.path_for(&run);
        assert!(path.starts_with(dir.path().join("run_date=2024-01-31")));
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<TaskReportLine> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].task, "b");
        assert_eq!(lines[1].status, TaskStatus::Skipped);
    }
}

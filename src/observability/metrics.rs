//! Metric recording for pipeline runs.
//!
//! All calls go through the `metrics` facade. Without an installed recorder
//! they are no-ops, so library code and tests can record unconditionally.

use std::fmt;
use std::net::SocketAddr;

use tracing::info;

use crate::error::{PipelineError, Result};

/// Every metric emitted by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Run and task outcomes
    RunsSucceeded,
    RunsFailed,
    TasksSucceeded,
    TasksFailed,
    TasksSkipped,
    TaskRetries,
    TaskDuration,

    // Extraction
    ExtractRequestsSuccess,
    ExtractRequestsError,
    ExtractRequestDuration,
    ExtractRecordsFetched,
    NormalizeRowsProduced,

    // Quality gates
    QualityChecksPassed,
    QualityChecksFailed,

    // Storage
    StagingRowsLoaded,
    ArchiveMoves,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::RunsSucceeded => "ev_pipeline_runs_succeeded_total",
            MetricName::RunsFailed => "ev_pipeline_runs_failed_total",
            MetricName::TasksSucceeded => "ev_pipeline_tasks_succeeded_total",
            MetricName::TasksFailed => "ev_pipeline_tasks_failed_total",
            MetricName::TasksSkipped => "ev_pipeline_tasks_skipped_total",
            MetricName::TaskRetries => "ev_pipeline_task_retries_total",
            MetricName::TaskDuration => "ev_pipeline_task_duration_seconds",

            MetricName::ExtractRequestsSuccess => "ev_pipeline_extract_requests_success_total",
            MetricName::ExtractRequestsError => "ev_pipeline_extract_requests_error_total",
            MetricName::ExtractRequestDuration => "ev_pipeline_extract_request_duration_seconds",
            MetricName::ExtractRecordsFetched => "ev_pipeline_extract_records_fetched_total",
            MetricName::NormalizeRowsProduced => "ev_pipeline_normalize_rows_produced_total",

            MetricName::QualityChecksPassed => "ev_pipeline_quality_checks_passed_total",
            MetricName::QualityChecksFailed => "ev_pipeline_quality_checks_failed_total",

            MetricName::StagingRowsLoaded => "ev_pipeline_staging_rows_loaded_total",
            MetricName::ArchiveMoves => "ev_pipeline_archive_moves_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Install the Prometheus recorder and serve `/metrics` on `addr`
pub fn install_prometheus_exporter(addr: SocketAddr) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| PipelineError::Config(format!("Failed to install Prometheus exporter: {}", e)))?;
    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

// ============================================================================
// Engine Metrics
// ============================================================================

pub mod engine {
    use super::MetricName;

    pub fn task_succeeded(task: &str, secs: f64) {
        ::metrics::counter!(MetricName::TasksSucceeded.as_str(), "task" => task.to_string()).increment(1);
        ::metrics::histogram!(MetricName::TaskDuration.as_str(), "task" => task.to_string()).record(secs);
    }

    pub fn task_failed(task: &str, secs: f64) {
        ::metrics::counter!(MetricName::TasksFailed.as_str(), "task" => task.to_string()).increment(1);
        ::metrics::histogram!(MetricName::TaskDuration.as_str(), "task" => task.to_string()).record(secs);
    }

    pub fn task_skipped(task: &str) {
        ::metrics::counter!(MetricName::TasksSkipped.as_str(), "task" => task.to_string()).increment(1);
    }

    pub fn task_retried(task: &str) {
        ::metrics::counter!(MetricName::TaskRetries.as_str(), "task" => task.to_string()).increment(1);
    }

    pub fn run_completed(succeeded: bool) {
        let name = if succeeded {
            MetricName::RunsSucceeded
        } else {
            MetricName::RunsFailed
        };
        ::metrics::counter!(name.as_str()).increment(1);
    }
}

// ============================================================================
// Extraction Metrics
// ============================================================================

pub mod extract {
    use super::MetricName;

    pub fn request_success(secs: f64, records: usize) {
        ::metrics::counter!(MetricName::ExtractRequestsSuccess.as_str()).increment(1);
        ::metrics::histogram!(MetricName::ExtractRequestDuration.as_str()).record(secs);
        ::metrics::counter!(MetricName::ExtractRecordsFetched.as_str()).increment(records as u64);
    }

    pub fn request_error(status: u16) {
        ::metrics::counter!(MetricName::ExtractRequestsError.as_str(), "status" => status.to_string()).increment(1);
    }

    pub fn rows_normalized(rows: usize) {
        ::metrics::counter!(MetricName::NormalizeRowsProduced.as_str()).increment(rows as u64);
    }
}

// ============================================================================
// Quality Gate Metrics
// ============================================================================

pub mod quality_gate {
    use super::MetricName;

    pub fn checks_evaluated(gate: &str, passed: usize, failed: usize) {
        ::metrics::counter!(MetricName::QualityChecksPassed.as_str(), "gate" => gate.to_string())
            .increment(passed as u64);
        ::metrics::counter!(MetricName::QualityChecksFailed.as_str(), "gate" => gate.to_string())
            .increment(failed as u64);
    }
}

// ============================================================================
// Storage Metrics
// ============================================================================

pub mod storage {
    use super::MetricName;

    pub fn rows_loaded(table: &str, rows: usize) {
        ::metrics::counter!(MetricName::StagingRowsLoaded.as_str(), "table" => table.to_string())
            .increment(rows as u64);
    }

    pub fn artifact_archived() {
        ::metrics::counter!(MetricName::ArchiveMoves.as_str()).increment(1);
    }
}

use std::sync::Arc;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::ports::{RunReportPort, SecretSource};
use crate::config::Config;
use crate::error::Result;
use crate::pipeline::daily::{build_daily_graph, Collaborators};
use crate::pipeline::engine::Engine;
use crate::pipeline::run::Run;

/// Use case for running the daily charge point pipeline for one logical date
pub struct DailyRunUseCase {
    config: Config,
    secrets: Arc<dyn SecretSource>,
    collaborators: Collaborators,
    report: Option<Arc<dyn RunReportPort>>,
}

impl DailyRunUseCase {
    pub fn new(config: Config, secrets: Arc<dyn SecretSource>, collaborators: Collaborators) -> Self {
        Self {
            config,
            secrets,
            collaborators,
            report: None,
        }
    }

    /// Also hand every finished run to `report`
    pub fn with_report(mut self, report: Arc<dyn RunReportPort>) -> Self {
        self.report = Some(report);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every task of the daily graph for `logical_date`.
    ///
    /// Errors only when the run cannot start: the API key cannot be resolved or
    /// the graph is invalid. Task failures are reported through the returned run.
    pub async fn run_daily(&self, logical_date: NaiveDate, cancel: CancellationToken) -> Result<Run> {
        let api_key = self.secrets.get(&self.config.provider.api_key_secret)?;
        let graph = build_daily_graph(&self.config, &api_key, &self.collaborators)?;
        info!(
            "📅 Running '{}' for {} ({} tasks)",
            graph.name(),
            logical_date,
            graph.len()
        );

        let engine = Engine::new(self.config.engine.to_engine_config());
        let run = engine.execute(&graph, logical_date, cancel).await;

        if let Some(report) = &self.report {
            // The run outcome stands even when its report cannot be written
            if let Err(e) = report.write_run(&run).await {
                warn!("⚠️ Failed to write run report for {}: {}", run.run_id, e);
            }
        }
        Ok(run)
    }
}

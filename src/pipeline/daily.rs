//! The daily charge point graph:
//!
//! ```text
//! run_ev_extraction -> load_to_landing -> check_landing_columns    -> transform_to_target
//!                                      -> check_landing_duplicates ->
//! transform_to_target -> check_target_data_quality -> archive_source_artifact
//! ```

use std::sync::Arc;

use crate::app::ports::{ArchiveStore, HttpClientPort, StagingStore};
use crate::config::Config;
use crate::constants::*;
use crate::error::Result;
use crate::pipeline::graph::TaskGraph;
use crate::pipeline::ingestion::Extractor;
use crate::pipeline::processing::normalize::Normalizer;
use crate::pipeline::processing::quality_gate::QualityGate;
use crate::pipeline::processing::rows::Value;
use crate::pipeline::steps::{
    duplicate_count_sql, ArchiveStep, ExtractStep, LoadStep, QualityGateStep, TransformStep, ValueCheckStep,
};

/// External collaborators the daily tasks are bound to
#[derive(Clone)]
pub struct Collaborators {
    pub http: Arc<dyn HttpClientPort>,
    pub normalizer: Arc<dyn Normalizer>,
    pub staging: Arc<dyn StagingStore>,
    pub archive: Arc<dyn ArchiveStore>,
}

/// Build the seven-task daily graph from configuration.
pub fn build_daily_graph(config: &Config, api_key: &str, deps: &Collaborators) -> Result<TaskGraph> {
    let landing = config.staging.landing_table.as_str();
    let target = config.staging.target_table.as_str();

    let extract = ExtractStep::new(
        Extractor::new(Arc::clone(&deps.http), config.provider.endpoint.clone()),
        Arc::clone(&deps.normalizer),
        api_key,
        config.fetch_params(),
        config.pipeline.source_artifact.clone(),
        config.pipeline.fail_on_empty,
    );
    let load = LoadStep::new(Arc::clone(&deps.staging), landing, EXTRACT_TASK);
    let landing_columns = QualityGateStep::new(
        Arc::clone(&deps.staging),
        landing,
        QualityGate::new(LANDING_COLUMNS_TASK, config.checks.landing.clone()),
    );
    let landing_duplicates = ValueCheckStep::new(
        Arc::clone(&deps.staging),
        LANDING_DUPLICATES_TASK,
        duplicate_count_sql(landing, &config.staging.duplicate_column),
        Value::Int(0),
    )
    .requiring_column(landing, config.staging.duplicate_column.clone());
    let transform = TransformStep::new(Arc::clone(&deps.staging), config.staging.transform_procedure.clone());
    let target_quality = QualityGateStep::new(
        Arc::clone(&deps.staging),
        target,
        QualityGate::new(TARGET_QUALITY_TASK, config.checks.target.clone()),
    );
    let archive = ArchiveStep::new(
        Arc::clone(&deps.archive),
        config.pipeline.source_artifact.clone(),
        config.archive.template(),
    );

    TaskGraph::builder(config.pipeline.name.clone())
        .task(EXTRACT_TASK, extract, &[])
        .task(LOAD_LANDING_TASK, load, &[EXTRACT_TASK])
        .task(LANDING_COLUMNS_TASK, landing_columns, &[LOAD_LANDING_TASK])
        .task(LANDING_DUPLICATES_TASK, landing_duplicates, &[LOAD_LANDING_TASK])
        .task(TRANSFORM_TASK, transform, &[LANDING_COLUMNS_TASK, LANDING_DUPLICATES_TASK])
        .task(TARGET_QUALITY_TASK, target_quality, &[TRANSFORM_TASK])
        .task(ARCHIVE_TASK, archive, &[TARGET_QUALITY_TASK])
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::HttpGetResult;
    use crate::pipeline::processing::normalize::ConnectionNormalizer;
    use crate::pipeline::storage::{InMemoryArchiveStore, InMemoryStagingStore};
    use async_trait::async_trait;

    struct NoHttp;

    #[async_trait]
    impl HttpClientPort for NoHttp {
        async fn get(&self, _url: &str, _query: &[(String, String)]) -> std::result::Result<HttpGetResult, String> {
            Err("offline".into())
        }
    }

    #[test]
    fn daily_graph_has_expected_shape() {
        let deps = Collaborators {
            http: Arc::new(NoHttp),
            normalizer: Arc::new(ConnectionNormalizer::new()),
            staging: Arc::new(InMemoryStagingStore::new()),
            archive: Arc::new(InMemoryArchiveStore::new()),
        };
        let graph = build_daily_graph(&Config::default(), "key", &deps).unwrap();

        let order: Vec<&str> = graph.nodes().iter().map(|n| n.name()).collect();
        assert_eq!(
            order,
            [
                EXTRACT_TASK,
                LOAD_LANDING_TASK,
                LANDING_COLUMNS_TASK,
                LANDING_DUPLICATES_TASK,
                TRANSFORM_TASK,
                TARGET_QUALITY_TASK,
                ARCHIVE_TASK
            ]
        );
        let transform = graph.index_of(TRANSFORM_TASK).unwrap();
        assert!(graph.node(transform).is_join_point());
        assert!(graph.descendants(LANDING_DUPLICATES_TASK).contains(ARCHIVE_TASK));
    }
}

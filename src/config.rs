use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constants::*;
use crate::error::{PipelineError, Result};
use crate::pipeline::engine::EngineConfig;
use crate::pipeline::ingestion::FetchParams;
use crate::pipeline::processing::quality_gate::CheckSpec;

static SQL_IDENTIFIER: Lazy<std::result::Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$"));

/// Top-level configuration, read from `config.toml`.
///
/// Every section has defaults reproducing the daily central-London pipeline,
/// so a missing file or section is not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub provider: ProviderConfig,
    pub staging: StagingConfig,
    pub archive: ArchiveConfig,
    pub engine: EngineSection,
    pub checks: ChecksConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub name: String,
    /// Treat an empty provider response as a failed extraction
    pub fail_on_empty: bool,
    /// Normalized CSV written by extraction and moved by the archive task
    pub source_artifact: PathBuf,
    pub report_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_PIPELINE_NAME.to_string(),
            fail_on_empty: true,
            source_artifact: PathBuf::from(DEFAULT_SOURCE_ARTIFACT),
            report_dir: PathBuf::from("reports"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub endpoint: String,
    /// Name of the secret holding the API key; the key itself never lives in this file
    pub api_key_secret: String,
    pub latitude: f64,
    pub longitude: f64,
    pub distance: f64,
    pub distance_unit: String,
    pub max_results: u32,
    pub timeout_seconds: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key_secret: DEFAULT_API_KEY_SECRET.to_string(),
            latitude: DEFAULT_LATITUDE,
            longitude: DEFAULT_LONGITUDE,
            distance: DEFAULT_DISTANCE,
            distance_unit: DEFAULT_DISTANCE_UNIT.to_string(),
            max_results: DEFAULT_MAX_RESULTS,
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    pub database_path: PathBuf,
    pub landing_table: String,
    pub target_table: String,
    pub transform_procedure: String,
    /// Directory holding `<procedure>.sql` scripts
    pub procedures_dir: PathBuf,
    /// Column whose repeated values fail the landing duplicate check
    pub duplicate_column: String,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/staging.db"),
            landing_table: DEFAULT_LANDING_TABLE.to_string(),
            target_table: DEFAULT_TARGET_TABLE.to_string(),
            transform_procedure: DEFAULT_TRANSFORM_PROCEDURE.to_string(),
            procedures_dir: PathBuf::from("procedures"),
            duplicate_column: "conn_ID".to_string(),
        }
    }
}

impl StagingConfig {
    /// Placeholders available to procedure scripts, e.g. `{landing_table}`
    pub fn procedure_parameters(&self) -> Vec<(String, String)> {
        vec![
            ("landing_table".to_string(), self.landing_table.clone()),
            ("target_table".to_string(), self.target_table.clone()),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub root: PathBuf,
    /// Path under `root`; `{ds}` is replaced with the run date
    pub destination_template: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            destination_template: DEFAULT_ARCHIVE_TEMPLATE.to_string(),
        }
    }
}

impl ArchiveConfig {
    /// Full destination template, rooted
    pub fn template(&self) -> String {
        self.root.join(&self.destination_template).to_string_lossy().into_owned()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub max_concurrency: usize,
    pub retries: u32,
    pub retry_delay_seconds: u64,
    pub task_timeout_seconds: Option<u64>,
}

impl Default for EngineSection {
    fn default() -> Self {
        let defaults = EngineConfig::default();
        Self {
            max_concurrency: defaults.max_concurrency,
            retries: defaults.retries,
            retry_delay_seconds: defaults.retry_delay.as_secs(),
            task_timeout_seconds: None,
        }
    }
}

impl EngineSection {
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_concurrency: self.max_concurrency,
            retries: self.retries,
            retry_delay: Duration::from_secs(self.retry_delay_seconds),
            task_timeout: self.task_timeout_seconds.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksConfig {
    pub landing: Vec<CheckSpec>,
    pub target: Vec<CheckSpec>,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            landing: vec![
                CheckSpec::null_count_equals("ID", 0),
                CheckSpec::null_count_equals("conn_ID", 0),
                CheckSpec::min_greater_than("AddressInfo_Latitude", 50.0),
                CheckSpec::max_less_than("AddressInfo_Latitude", 53.0),
                CheckSpec::min_greater_than("AddressInfo_Longitude", -0.5),
                CheckSpec::max_less_than("AddressInfo_Longitude", 0.5),
            ],
            target: vec![
                CheckSpec::null_count_equals("station_id", 0),
                CheckSpec::min_at_least("power_kw", 0.0),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Address for the Prometheus exporter; metrics are not exported when unset
    pub listen_addr: Option<SocketAddr>,
}

impl Config {
    /// Load `config.toml` from the working directory
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config.toml"))
    }

    /// Load and validate a config file; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                PipelineError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
            })?;
            toml::from_str::<Config>(&content)?
        } else {
            info!("⚙️ No config file at {}, using defaults", path.display());
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.max_concurrency == 0 {
            return Err(PipelineError::Config("engine.max_concurrency must be at least 1".into()));
        }
        if !(-90.0..=90.0).contains(&self.provider.latitude) {
            return Err(PipelineError::Config(format!(
                "provider.latitude {} is out of range",
                self.provider.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.provider.longitude) {
            return Err(PipelineError::Config(format!(
                "provider.longitude {} is out of range",
                self.provider.longitude
            )));
        }
        if self.provider.distance.is_nan() || self.provider.distance <= 0.0 {
            return Err(PipelineError::Config("provider.distance must be positive".into()));
        }
        if self.provider.endpoint.trim().is_empty() {
            return Err(PipelineError::Config("provider.endpoint must not be empty".into()));
        }
        if self.provider.api_key_secret.trim().is_empty() {
            return Err(PipelineError::Config("provider.api_key_secret must not be empty".into()));
        }

        let identifiers = [
            ("staging.landing_table", self.staging.landing_table.as_str()),
            ("staging.target_table", self.staging.target_table.as_str()),
            ("staging.transform_procedure", self.staging.transform_procedure.as_str()),
            ("staging.duplicate_column", self.staging.duplicate_column.as_str()),
        ];
        for (key, value) in identifiers {
            if !is_sql_identifier(value)? {
                return Err(PipelineError::Config(format!(
                    "{} '{}' is not a plain SQL identifier",
                    key, value
                )));
            }
        }

        if !self.archive.destination_template.contains(RUN_DATE_PLACEHOLDER) {
            return Err(PipelineError::Config(format!(
                "archive.destination_template must contain {}",
                RUN_DATE_PLACEHOLDER
            )));
        }
        Ok(())
    }

    pub fn fetch_params(&self) -> FetchParams {
        FetchParams {
            latitude: self.provider.latitude,
            longitude: self.provider.longitude,
            distance: self.provider.distance,
            distance_unit: self.provider.distance_unit.clone(),
            max_results: self.provider.max_results,
        }
    }
}

fn is_sql_identifier(value: &str) -> Result<bool> {
    match SQL_IDENTIFIER.as_ref() {
        Ok(re) => Ok(re.is_match(value)),
        Err(e) => Err(PipelineError::Config(format!("identifier pattern failed to compile: {}", e))),
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Extraction failed (HTTP {status}): {message}")]
    Extraction { status: u16, message: String },

    #[error("Normalization failed: {0}")]
    Normalization(String),

    #[error("Quality gate '{gate}' failed: {details}")]
    QualityCheckFailure { gate: String, details: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cycle detected in task graph among: {}", .tasks.join(", "))]
    Cycle { tasks: Vec<String> },

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("Duplicate task name: {0}")]
    DuplicateTask(String),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for PipelineError {
    fn from(err: rusqlite::Error) -> Self {
        PipelineError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

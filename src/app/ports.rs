use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::pipeline::processing::rows::{RowSet, Value};
use crate::pipeline::run::Run;

// Ingest-side ports
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    async fn get(&self, url: &str, query: &[(String, String)]) -> std::result::Result<HttpGetResult, String>;
}

#[derive(Clone, Debug)]
pub struct HttpGetResult {
    pub status: u16,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Named secrets such as the provider API key
pub trait SecretSource: Send + Sync {
    fn get(&self, name: &str) -> Result<String>;
}

/// Relational staging area holding the landing and target tables
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Replace the table's contents (and schema) with `rows`; returns the number of rows written.
    async fn overwrite(&self, table: &str, rows: &RowSet) -> Result<usize>;

    /// Read every row of `table` back.
    async fn read_table(&self, table: &str) -> Result<RowSet>;

    /// Run a query returning a single scalar (first column of the first row).
    async fn run_query(&self, sql: &str) -> Result<Value>;

    /// Invoke a named stored transformation.
    async fn call_procedure(&self, name: &str) -> Result<()>;
}

/// Archive area for processed source artifacts
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Move `source` to `destination`, creating parent directories; the source no longer exists afterwards.
    async fn move_artifact(&self, source: &Path, destination: &Path) -> Result<()>;
}

/// Sink for finished run records
#[async_trait]
pub trait RunReportPort: Send + Sync {
    async fn write_run(&self, run: &Run) -> Result<()>;
}

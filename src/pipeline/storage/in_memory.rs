use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use crate::app::ports::{ArchiveStore, StagingStore};
use crate::error::{PipelineError, Result};
use crate::pipeline::processing::rows::{RowSet, Value};

pub type Tables = HashMap<String, RowSet>;
type QueryFn = Arc<dyn Fn(&Tables) -> Result<Value> + Send + Sync>;
type ProcedureFn = Arc<dyn Fn(&mut Tables) -> Result<()> + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| PipelineError::Storage("in-memory store lock poisoned".to_string()))
}

/// In-memory staging store for development/testing.
///
/// Queries and procedures are registered up front as closures over the
/// stored tables; anything unregistered is a storage error.
#[derive(Default)]
pub struct InMemoryStagingStore {
    tables: Mutex<Tables>,
    queries: Mutex<HashMap<String, QueryFn>>,
    procedures: Mutex<HashMap<String, ProcedureFn>>,
    calls: Mutex<Vec<String>>,
}

impl InMemoryStagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `sql` with a fixed value
    pub fn with_query_result(self, sql: impl Into<String>, value: Value) -> Self {
        self.with_query(sql, move |_tables| Ok(value.clone()))
    }

    /// Answer `sql` by computing over the stored tables
    pub fn with_query<F>(self, sql: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Tables) -> Result<Value> + Send + Sync + 'static,
    {
        if let Ok(mut queries) = self.queries.lock() {
            queries.insert(sql.into(), Arc::new(f));
        }
        self
    }

    pub fn with_procedure<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Tables) -> Result<()> + Send + Sync + 'static,
    {
        if let Ok(mut procedures) = self.procedures.lock() {
            procedures.insert(name.into(), Arc::new(f));
        }
        self
    }

    /// Seed a table directly
    pub fn with_table(self, name: impl Into<String>, rows: RowSet) -> Self {
        if let Ok(mut tables) = self.tables.lock() {
            tables.insert(name.into(), rows);
        }
        self
    }

    pub fn table(&self, name: &str) -> Option<RowSet> {
        self.tables.lock().ok()?.get(name).cloned()
    }

    /// Operations performed so far, e.g. `overwrite:landing`, `procedure:sp_x`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn log_call(&self, call: String) -> Result<()> {
        lock(&self.calls)?.push(call);
        Ok(())
    }
}

/// Count of repeated non-null values in `column`, as `COUNT(col) - COUNT(DISTINCT col)`
pub fn duplicate_count(tables: &Tables, table: &str, column: &str) -> Result<Value> {
    let rows = tables
        .get(table)
        .ok_or_else(|| PipelineError::Storage(format!("no such table: {}", table)))?;
    let keys: Vec<String> = rows.column_values(column).filter_map(Value::distinct_key).collect();
    let distinct: std::collections::HashSet<&String> = keys.iter().collect();
    Ok(Value::Int((keys.len() - distinct.len()) as i64))
}

#[async_trait]
impl StagingStore for InMemoryStagingStore {
    async fn overwrite(&self, table: &str, rows: &RowSet) -> Result<usize> {
        lock(&self.tables)?.insert(table.to_string(), rows.clone());
        self.log_call(format!("overwrite:{}", table))?;
        debug!("Replaced in-memory table {} with {} rows", table, rows.len());
        Ok(rows.len())
    }

    async fn read_table(&self, table: &str) -> Result<RowSet> {
        lock(&self.tables)?
            .get(table)
            .cloned()
            .ok_or_else(|| PipelineError::Storage(format!("no such table: {}", table)))
    }

    async fn run_query(&self, sql: &str) -> Result<Value> {
        let query = lock(&self.queries)?
            .get(sql)
            .cloned()
            .ok_or_else(|| PipelineError::Storage(format!("unregistered query: {}", sql)))?;
        self.log_call(format!("query:{}", sql))?;
        let tables = lock(&self.tables)?;
        query(&tables)
    }

    async fn call_procedure(&self, name: &str) -> Result<()> {
        let procedure = lock(&self.procedures)?
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::Storage(format!("unknown procedure: {}", name)))?;
        self.log_call(format!("procedure:{}", name))?;
        let mut tables = lock(&self.tables)?;
        // Work on a copy so a failing procedure leaves the tables untouched
        let mut staged = tables.clone();
        procedure(&mut staged)?;
        *tables = staged;
        Ok(())
    }
}

/// Archive store that only records the moves it was asked to make
#[derive(Default)]
pub struct InMemoryArchiveStore {
    moves: Mutex<Vec<(PathBuf, PathBuf)>>,
}

impl InMemoryArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn moves(&self) -> Vec<(PathBuf, PathBuf)> {
        self.moves.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn was_called(&self) -> bool {
        !self.moves().is_empty()
    }
}

#[async_trait]
impl ArchiveStore for InMemoryArchiveStore {
    async fn move_artifact(&self, source: &Path, destination: &Path) -> Result<()> {
        lock(&self.moves)?.push((source.to_path_buf(), destination.to_path_buf()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::rows::Row;

    fn ids(values: &[Option<i64>]) -> RowSet {
        let mut set = RowSet::with_columns(["conn_ID"]);
        for v in values {
            let mut row = Row::new();
            row.insert("conn_ID".to_string(), v.map(Value::Int).unwrap_or(Value::Null));
            set.push(row);
        }
        set
    }

    #[tokio::test]
    async fn overwrite_replaces_previous_contents() {
        let store = InMemoryStagingStore::new();
        store.overwrite("landing", &ids(&[Some(1), Some(2), Some(3)])).await.unwrap();
        store.overwrite("landing", &ids(&[Some(9)])).await.unwrap();

        let rows = store.read_table("landing").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(store.calls(), ["overwrite:landing", "overwrite:landing"]);
    }

    #[tokio::test]
    async fn duplicate_query_ignores_nulls() {
        let store = InMemoryStagingStore::new()
            .with_table("landing", ids(&[Some(1), None, None, Some(1), Some(2)]))
            .with_query("dups", |tables| duplicate_count(tables, "landing", "conn_ID"));

        assert_eq!(store.run_query("dups").await.unwrap(), Value::Int(1));
        assert!(store.run_query("unknown").await.is_err());
    }

    #[tokio::test]
    async fn failing_procedure_leaves_tables_untouched() {
        let store = InMemoryStagingStore::new()
            .with_table("landing", ids(&[Some(1)]))
            .with_procedure("sp_bad", |tables| {
                tables.remove("landing");
                Err(PipelineError::Storage("boom".into()))
            });

        assert!(store.call_procedure("sp_bad").await.is_err());
        assert!(store.table("landing").is_some());
        assert!(store.call_procedure("missing").await.is_err());
    }
}

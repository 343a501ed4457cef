use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, info};

use crate::app::ports::StagingStore;
use crate::error::{PipelineError, Result};
use crate::pipeline::processing::rows::{Row, RowSet, Value};

/// SQLite-backed staging area.
///
/// Statements run on the blocking pool; the connection is shared behind a mutex.
/// Procedures are SQL scripts named `<procedures_dir>/<name>.sql`; `{name}`
/// placeholders in a script are replaced with the quoted identifier registered
/// through [`SqliteStagingStore::with_parameter`].
pub struct SqliteStagingStore {
    conn: Arc<Mutex<Connection>>,
    procedures_dir: PathBuf,
    parameters: HashMap<String, String>,
}

static PLACEHOLDER: Lazy<std::result::Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}"));

impl SqliteStagingStore {
    pub fn open<P: AsRef<Path>>(db_path: P, procedures_dir: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!("🗃️ Opened staging database {}", db_path.display());
        Ok(Self::from_connection(conn, procedures_dir))
    }

    pub fn open_in_memory(procedures_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?, procedures_dir))
    }

    fn from_connection(conn: Connection, procedures_dir: impl Into<PathBuf>) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            procedures_dir: procedures_dir.into(),
            parameters: HashMap::new(),
        }
    }

    /// Bind `{name}` in procedure scripts to the identifier `value`
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_parameters<I, K, V>(self, parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        parameters
            .into_iter()
            .fold(self, |store, (name, value)| store.with_parameter(name, value))
    }

    /// Substitute every placeholder; an unbound one is an error rather than
    /// reaching SQLite as literal text.
    fn render_procedure(&self, name: &str, script: &str) -> Result<String> {
        let placeholder = PLACEHOLDER
            .as_ref()
            .map_err(|e| PipelineError::Storage(format!("invalid placeholder pattern: {}", e)))?;
        let mut unbound = BTreeSet::new();
        let rendered = placeholder.replace_all(script, |caps: &Captures| match self.parameters.get(&caps[1]) {
            Some(value) => quote_ident(value),
            None => {
                unbound.insert(caps[1].to_string());
                caps[0].to_string()
            }
        });
        if !unbound.is_empty() {
            return Err(PipelineError::Storage(format!(
                "procedure {} uses unbound parameters: {}",
                name,
                unbound.into_iter().collect::<Vec<_>>().join(", ")
            )));
        }
        Ok(rendered.into_owned())
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| PipelineError::Storage("staging connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| PipelineError::Storage(format!("staging worker failed: {}", e)))?
    }
}

/// Quote an identifier for SQLite, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Timestamp(_) => SqlValue::Text(value.to_string()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Text(String::from_utf8_lossy(b).into_owned()),
    }
}

#[async_trait]
impl StagingStore for SqliteStagingStore {
    async fn overwrite(&self, table: &str, rows: &RowSet) -> Result<usize> {
        if rows.columns().is_empty() {
            return Err(PipelineError::Storage(format!(
                "cannot create table {} without columns",
                table
            )));
        }
        let table = table.to_string();
        let rows = rows.clone();
        self.with_conn(move |conn| {
            let quoted_table = quote_ident(&table);
            let columns: Vec<String> = rows.columns().iter().map(|c| quote_ident(c)).collect();
            let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();

            // Drop, create and fill in one transaction: readers see the old table or the new one
            let tx = conn.transaction()?;
            tx.execute_batch(&format!(
                "DROP TABLE IF EXISTS {t}; CREATE TABLE {t} ({cols});",
                t = quoted_table,
                cols = columns.join(", ")
            ))?;
            {
                let mut stmt = tx.prepare(&format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    quoted_table,
                    columns.join(", "),
                    placeholders.join(", ")
                ))?;
                for row in rows.rows() {
                    let values = rows
                        .columns()
                        .iter()
                        .map(|c| row.get(c).map(to_sql).unwrap_or(SqlValue::Null));
                    stmt.execute(params_from_iter(values))?;
                }
            }
            tx.commit()?;
            debug!("Replaced {} with {} rows", table, rows.len());
            Ok(rows.len())
        })
        .await
    }

    async fn read_table(&self, table: &str) -> Result<RowSet> {
        let table = table.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!("SELECT * FROM {}", quote_ident(&table)))?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let mut set = RowSet::with_columns(columns.iter().cloned());
            let mut result = stmt.query([])?;
            while let Some(sql_row) = result.next()? {
                let mut row = Row::with_capacity(columns.len());
                for (i, column) in columns.iter().enumerate() {
                    row.insert(column.clone(), from_sql(sql_row.get_ref(i)?));
                }
                set.push(row);
            }
            Ok(set)
        })
        .await
    }

    async fn run_query(&self, sql: &str) -> Result<Value> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let value = conn.query_row(&sql, [], |row| Ok(from_sql(row.get_ref(0)?)))?;
            Ok(value)
        })
        .await
    }

    async fn call_procedure(&self, name: &str) -> Result<()> {
        let path = self.procedures_dir.join(format!("{}.sql", name));
        let script = tokio::fs::read_to_string(&path).await.map_err(|e| {
            PipelineError::Storage(format!("unknown procedure {} ({}): {}", name, path.display(), e))
        })?;
        let script = self.render_procedure(name, &script)?;
        let name = name.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute_batch(&script)
                .map_err(|e| PipelineError::Storage(format!("procedure {} failed: {}", name, e)))?;
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

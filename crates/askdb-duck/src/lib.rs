//! DuckDB executor for generated SQL
//!
//! Executes untrusted, LLM-generated SQL against a DuckDB database file and
//! serializes the result set for downstream answer composition. Generated
//! statements run over a read-only connection, so the store itself rejects
//! anything that would mutate data.

use std::path::{Path, PathBuf};

use duckdb::{AccessMode, Config, Connection};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("Database file not found: {0}")]
    NotFound(String),
}

/// Result set from one query execution.
///
/// Zero rows is a well-formed result, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
}

impl QueryResult {
    /// Serialize the result set as a compact JSON string, one object per row.
    ///
    /// This is the textual form handed to the answer-composition prompt.
    pub fn to_compact_string(&self) -> String {
        let rows: Vec<serde_json::Value> = self
            .rows
            .iter()
            .map(|row| {
                let mut obj = serde_json::Map::new();
                for (i, col) in self.columns.iter().enumerate() {
                    obj.insert(
                        col.clone(),
                        row.get(i).cloned().unwrap_or(serde_json::Value::Null),
                    );
                }
                serde_json::Value::Object(obj)
            })
            .collect();

        serde_json::Value::Array(rows).to_string()
    }
}

/// Executes SQL against a DuckDB database file.
///
/// DuckDB's `Connection` is not `Send + Sync`, so the executor holds only the
/// database path and opens a fresh read-only connection per call. Concurrent
/// requests never contend on a shared connection.
pub struct DuckExecutor {
    db_path: PathBuf,
}

impl DuckExecutor {
    /// Open an executor for the given database file.
    ///
    /// Verifies at construction that a read-only connection can be
    /// established, so a misconfigured path fails at startup rather than on
    /// the first request.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ExecutionError> {
        let db_path = path.as_ref().to_path_buf();
        if !db_path.exists() {
            return Err(ExecutionError::NotFound(
                db_path.to_string_lossy().to_string(),
            ));
        }

        // Fail fast on files DuckDB cannot open.
        Self::read_only_connection(&db_path)?;

        Ok(Self { db_path })
    }

    fn read_only_connection(path: &Path) -> Result<Connection, ExecutionError> {
        let config = Config::default().access_mode(AccessMode::ReadOnly)?;
        Ok(Connection::open_with_flags(path, config)?)
    }

    /// Execute one SQL statement and collect the full result set.
    ///
    /// The SQL is passed to DuckDB unmodified; the store's parser and the
    /// read-only access mode are the only validation layers.
    pub fn execute_sql(&self, sql: &str) -> Result<QueryResult, ExecutionError> {
        let conn = Self::read_only_connection(&self.db_path)?;

        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query([])?;

        let mut columns: Vec<String> = Vec::new();
        let mut result_rows = Vec::new();

        while let Some(row) = rows.next()? {
            if columns.is_empty() {
                columns = column_names(row.as_ref());
            }

            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(value_ref_to_json(row.get_ref(i)?));
            }
            result_rows.push(values);
        }
        drop(rows);

        // Zero-row results still carry the projection's column names.
        if columns.is_empty() {
            columns = column_names(&stmt);
        }

        let row_count = result_rows.len();
        Ok(QueryResult {
            columns,
            rows: result_rows,
            row_count,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

fn column_names(stmt: &duckdb::Statement<'_>) -> Vec<String> {
    (0..stmt.column_count())
        .map(|i| {
            stmt.column_name(i)
                .map(|name| name.to_string())
                .unwrap_or_else(|_| format!("col{}", i))
        })
        .collect()
}

/// Convert a DuckDB cell to a JSON value.
fn value_ref_to_json(value: duckdb::types::ValueRef<'_>) -> serde_json::Value {
    use duckdb::types::ValueRef;

    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Boolean(b) => serde_json::Value::Bool(b),
        ValueRef::TinyInt(i) => serde_json::json!(i),
        ValueRef::SmallInt(i) => serde_json::json!(i),
        ValueRef::Int(i) => serde_json::json!(i),
        ValueRef::BigInt(i) => serde_json::json!(i),
        ValueRef::HugeInt(i) => match i64::try_from(i) {
            Ok(v) => serde_json::json!(v),
            Err(_) => serde_json::Value::String(i.to_string()),
        },
        ValueRef::UTinyInt(i) => serde_json::json!(i),
        ValueRef::USmallInt(i) => serde_json::json!(i),
        ValueRef::UInt(i) => serde_json::json!(i),
        ValueRef::UBigInt(i) => serde_json::json!(i),
        ValueRef::Float(f) => serde_json::json!(f),
        ValueRef::Double(f) => serde_json::json!(f),
        ValueRef::Text(s) => {
            serde_json::Value::String(String::from_utf8_lossy(s).to_string())
        }
        ValueRef::Blob(b) => serde_json::Value::String(format!("<blob {} bytes>", b.len())),
        _ => serde_json::Value::String("<unsupported>".to_string()),
    }
}

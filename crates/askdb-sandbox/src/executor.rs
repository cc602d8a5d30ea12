//! Sandboxed execution of read-only SQL.
//!
//! Every call opens its own read-only connection, enforces `query_only`,
//! a busy timeout and a wall-clock deadline, reads at most `max_rows` rows
//! and closes the connection again. Nothing is pooled between calls.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, OpenFlags};
use serde_json::Value;
use tracing::{debug, warn};

use askdb_core::config::SandboxConfig;
use askdb_core::safety::{SafetyDecision, SqlSafetyGate};
use askdb_core::types::{QueryRows, Row};

use crate::error::ExecutionError;

/// Number of SQLite VM instructions between deadline checks.
const PROGRESS_INTERVAL_OPS: i32 = 1_000;

/// Executes gate-approved SQL against the analytical store.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<QueryRows, ExecutionError>;
}

/// SQLite-backed execution sandbox.
#[derive(Debug, Clone)]
pub struct SqlSandbox {
    path: PathBuf,
    max_rows: usize,
    timeout: Duration,
    gate: SqlSafetyGate,
}

impl SqlSandbox {
    pub fn new(path: impl Into<PathBuf>, max_rows: usize, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            max_rows,
            timeout,
            gate: SqlSafetyGate::new(),
        }
    }

    /// Build a sandbox from config, using an already-resolved database path.
    pub fn from_config(path: impl Into<PathBuf>, config: &SandboxConfig) -> Self {
        Self::new(path, config.max_rows, Duration::from_secs(config.timeout_secs))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a statement synchronously on the calling thread.
    pub fn execute_blocking(&self, sql: &str) -> Result<QueryRows, ExecutionError> {
        if let SafetyDecision::Deny { reason } = self.gate.classify(sql) {
            warn!(reason = %reason, "Sandbox refused statement rejected by the safety gate");
            return Err(ExecutionError::Denied(reason));
        }

        let conn = open_read_only(&self.path, self.timeout)?;

        let deadline = Instant::now() + self.timeout;
        conn.progress_handler(PROGRESS_INTERVAL_OPS, Some(move || Instant::now() >= deadline));

        let statement = sql.trim().trim_end_matches(';').trim_end();
        let started = Instant::now();
        let result = read_rows(&conn, statement, self.max_rows);
        conn.progress_handler(PROGRESS_INTERVAL_OPS, None::<fn() -> bool>);

        match result {
            Ok(rows) => {
                debug!(
                    rows = rows.len(),
                    truncated = rows.truncated,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Sandboxed query finished"
                );
                Ok(rows)
            }
            Err(e) if Instant::now() >= deadline || is_busy(&e) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Sandboxed query timed out");
                Err(ExecutionError::Timeout(self.timeout.as_secs()))
            }
            Err(e) => {
                warn!(error = %e, "Sandboxed query failed");
                Err(ExecutionError::Sql(first_line(&e.to_string())))
            }
        }
    }
}

#[async_trait]
impl QueryExecutor for SqlSandbox {
    async fn execute(&self, sql: &str) -> Result<QueryRows, ExecutionError> {
        let sandbox = self.clone();
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || sandbox.execute_blocking(&sql))
            .await
            .map_err(|e| ExecutionError::Join(e.to_string()))?
    }
}

/// Open the analytical database read-only with a bounded lock wait.
pub(crate) fn open_read_only(path: &Path, busy_timeout: Duration) -> Result<Connection, ExecutionError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| ExecutionError::Open(e.to_string()))?;

    conn.busy_timeout(busy_timeout)
        .map_err(|e| ExecutionError::Open(e.to_string()))?;
    conn.execute_batch("PRAGMA query_only = ON;")
        .map_err(|e| ExecutionError::Open(e.to_string()))?;

    Ok(conn)
}

/// Prepare and step a statement, collecting at most `max_rows` rows.
pub(crate) fn read_rows(
    conn: &Connection,
    sql: &str,
    max_rows: usize,
) -> rusqlite::Result<QueryRows> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt.query([])?;
    let mut collected = Vec::new();
    let mut truncated = false;

    while let Some(row) = rows.next()? {
        if collected.len() >= max_rows {
            truncated = true;
            break;
        }
        let mut record = Row::new();
        for (i, name) in columns.iter().enumerate() {
            record.insert(name.clone(), value_to_json(row.get_ref(i)?));
        }
        collected.push(record);
    }

    Ok(QueryRows {
        columns,
        rows: collected,
        truncated,
    })
}

/// Map a SQLite value to JSON. Non-finite reals and blobs become strings.
pub(crate) fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(f.to_string())),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
    }
}

/// The lock wait shares the execution timeout, so a lock held past it counts
/// as a timeout too.
fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::DatabaseBusy)
}

fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or_default().to_string()
}

//! Error types for sandboxed execution.

use askdb_core::error::AskError;

/// Failure of a sandboxed query. Each variant renders as a one-line diagnostic.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    #[error("{0}")]
    Denied(String),
    #[error("SQL execution timed out after {0}s")]
    Timeout(u64),
    #[error("SQL execution error: {0}")]
    Sql(String),
    #[error("Failed to open analytical database: {0}")]
    Open(String),
    #[error("SQL execution task failed: {0}")]
    Join(String),
}

impl From<ExecutionError> for AskError {
    fn from(err: ExecutionError) -> Self {
        AskError::Sandbox(err.to_string())
    }
}

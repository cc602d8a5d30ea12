//! Error types for the turn pipeline.

use askdb_core::error::AskError;
use askdb_sandbox::ExecutionError;

/// Diagnostic shown to the client when a turn dies on an unexpected fault.
pub const INTERNAL_FAILURE_MESSAGE: &str = "Processing failed: internal error";

/// Errors from the chat pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("{0}")]
    SafetyDenied(String),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("SQL generation failed: {0}")]
    Generation(String),
    #[error("chart generation failed: {0}")]
    Chart(String),
    #[error("failed to persist turn: {0}")]
    Persistence(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
}

impl ChatError {
    /// Text carried by the `error` event when this error ends a turn.
    ///
    /// Safety denials and execution failures are shown verbatim; everything
    /// else is wrapped in a generic prefix.
    pub fn client_message(&self) -> String {
        match self {
            ChatError::SafetyDenied(_) | ChatError::Execution(_) => self.to_string(),
            other => format!("Processing failed: {}", other),
        }
    }
}

impl From<AskError> for ChatError {
    fn from(err: AskError) -> Self {
        ChatError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Transport(err.to_string())
    }
}

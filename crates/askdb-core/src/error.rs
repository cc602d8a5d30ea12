use thiserror::Error;

/// Top-level error type for askdb.
///
/// Subsystem crates define their own error types and convert into
/// `AskError` where they cross a crate boundary, so `?` works throughout
/// the composition root.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AskError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for AskError {
    fn from(err: toml::de::Error) -> Self {
        AskError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for AskError {
    fn from(err: toml::ser::Error) -> Self {
        AskError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AskError {
    fn from(err: serde_json::Error) -> Self {
        AskError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for askdb operations.
pub type Result<T> = std::result::Result<T, AskError>;

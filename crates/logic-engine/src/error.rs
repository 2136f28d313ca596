//! Error types for the logic engine

use thiserror::Error;

/// Result type alias using LogicEngineError
pub type Result<T> = std::result::Result<T, LogicEngineError>;

/// Errors that can occur in the logic engine
#[derive(Debug, Error)]
pub enum LogicEngineError {
    /// Persistence layer failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing required input
    #[error("Missing required input: {0}")]
    MissingInput(String),

    /// Node execution failed
    #[error("{0}")]
    ExecutionFailed(String),

    /// Node type not present in the registry
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// HTTP transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Run was cancelled
    #[error("Run cancelled")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LogicEngineError {
    /// Create an execution failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Create a storage error with a message
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

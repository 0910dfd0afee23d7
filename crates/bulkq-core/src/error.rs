//! Error types for bulkq

use thiserror::Error;

/// Core error type for bulkq operations
#[derive(Error, Debug)]
pub enum BulkqError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl BulkqError {
    /// Whether this error came from an elapsed statement or connect timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, BulkqError::Timeout(_))
    }
}

/// Result type alias for bulkq operations
pub type Result<T> = std::result::Result<T, BulkqError>;

//! Error types for tessera

use thiserror::Error;

/// Core error type for DAO operations
#[derive(Error, Debug)]
pub enum DaoError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// An identifier or literal was rejected before it reached a query string
    #[error("Unsafe input rejected: {0}")]
    UnsafeInput(String),

    #[error("SSH tunnel error: {0}")]
    Tunnel(String),

    #[error("Table is too large for this operation: {0}")]
    LargeDataset(String),

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

    #[error("Cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl DaoError {
    /// Whether this error means the underlying client or tunnel is unusable
    /// and the cached entry should be thrown away.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            DaoError::Connection(_) | DaoError::Tunnel(_) | DaoError::Io(_)
        )
    }
}

/// Result type alias for DAO operations
pub type Result<T> = std::result::Result<T, DaoError>;

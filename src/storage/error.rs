//! Error types for storage operations

use thiserror::Error;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backing store unreachable at startup
    #[error("failed to connect to measurement store: {0}")]
    ConnectionFailed(String),

    /// Append rejected or store unreachable. Fatal for the recorder.
    #[error("measurement store write failed: {0}")]
    WriteFailed(String),

    /// Retention trim failed. Fatal for the recorder.
    #[error("measurement store trim failed: {0}")]
    TrimFailed(String),

    /// Range query failed. Surfaced to the query caller only.
    #[error("measurement store read failed: {0}")]
    ReadFailed(String),

    /// Schema migration failed
    #[error("database migration failed: {0}")]
    MigrationFailed(String),

    /// Invalid configuration
    #[error("invalid storage configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::MigrationFailed(err.to_string())
    }
}

//! Store error types.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or writing job rows.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to open store: {0}")]
    ConnectFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("A job with vod_id '{0}' already exists")]
    AlreadyExists(String),

    #[error("No job with vod_id '{0}'")]
    NotFound(String),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

use sea_orm::DbErr;
use thiserror::Error;

/// Errors raised by the persistence layer
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid database path: {0}")]
    InvalidPath(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

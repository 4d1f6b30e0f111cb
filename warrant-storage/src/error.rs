//! Storage error types

use sea_orm::DbErr;
use thiserror::Error;

/// Storage result type
pub type StorageResult<T> = Result<T, StorageError>;

/// Database-related errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DbError(#[from] DbErr),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

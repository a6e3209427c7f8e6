//! Error types for accounting storage operations

use thiserror::Error;

/// Errors raised by an [`AccountingStore`](super::AccountingStore)
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row with the same key already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Connection, query or other backend-specific failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// Row data that cannot be mapped to the domain model
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Serialization(format!("Postgres decode error: {}", err))
            }
            _ => StoreError::Backend(format!("Postgres error: {}", err)),
        }
    }
}

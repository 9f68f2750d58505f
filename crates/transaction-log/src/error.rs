use thiserror::Error;

use common::ParseServiceNameError;

/// Errors that can occur when interacting with the transaction log.
#[derive(Debug, Error)]
pub enum TransactionLogError {
    /// An entry or batch was rejected before reaching storage.
    #[error("Invalid log entry: {0}")]
    InvalidEntry(String),

    /// The outbox event does not exist.
    #[error("Outbox event not found: {0}")]
    OutboxEventNotFound(i64),

    /// A stored row carries a status code this build does not know.
    #[error("Unknown transaction status code: {0}")]
    UnknownStatus(String),

    /// A stored row carries an unknown participant name.
    #[error(transparent)]
    UnknownService(#[from] ParseServiceNameError),

    /// The store cannot be reached right now.
    #[error("Transaction log unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for transaction log operations.
pub type Result<T> = std::result::Result<T, TransactionLogError>;

//! Saga error types.

use common::TxId;
use domain::DomainError;
use thiserror::Error;
use transaction_log::TransactionLogError;

use crate::message::MessageType;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Domain error (invalid order or configuration).
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Transaction log error.
    #[error("Transaction log error: {0}")]
    TransactionLog(#[from] TransactionLogError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// There is no participant in the active configuration.
    #[error("No participants configured")]
    NoParticipants,

    /// A monitor could not be started.
    #[error("Cannot start monitor for {tx_id}: {reason}")]
    MonitorUnavailable { tx_id: TxId, reason: String },

    /// A message of the wrong kind reached a handler.
    #[error("Unexpected {message_type} message for transaction {tx_id}")]
    UnexpectedMessage {
        tx_id: TxId,
        message_type: MessageType,
    },
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

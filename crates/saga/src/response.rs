//! Records participant replies that arrive over the message transport.
//!
//! This is the inbound side for participants that answer asynchronously
//! instead of through the in-process relay; the HTTP reply endpoint feeds it.

use transaction_log::{
    TransactionLogEntry, TransactionLogStore, TransactionLogStoreExt, TransactionStatus,
};

use crate::error::{Result, SagaError};
use crate::message::{MessageType, SagaMessage};

/// What became of one participant reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyOutcome {
    /// Appended to the log with this status.
    Recorded(TransactionStatus),
    /// The service had already moved on, nothing was written. A success
    /// that arrives after the service was rolled back or closed out comes
    /// with the rollback command to send back to the participant.
    Stale { rollback: Option<SagaMessage> },
}

/// Turns a participant reply into a log entry.
///
/// Only records. Monitors pick up the new state on their next poll and
/// decide whether to compensate.
#[derive(Debug, Clone)]
pub struct ResponseHandler<S> {
    store: S,
}

impl<S: TransactionLogStore> ResponseHandler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, message), fields(tx_id = %message.tx_id, service = %message.service_name, message_type = %message.message_type))]
    pub async fn handle(&self, message: &SagaMessage) -> Result<ReplyOutcome> {
        let status = match message.message_type {
            MessageType::ExecuteSuccess => TransactionStatus::Success,
            MessageType::ExecuteFailure => TransactionStatus::Failed,
            MessageType::RollbackSuccess => TransactionStatus::RolledBack,
            MessageType::RollbackFailure => TransactionStatus::RollbackFailed,
            MessageType::ExecuteCommand | MessageType::RollbackCommand => {
                return Err(SagaError::UnexpectedMessage {
                    tx_id: message.tx_id,
                    message_type: message.message_type,
                });
            }
        };

        if message.is_execute()
            && let Some(latest) = self
                .store
                .latest_for_service(message.tx_id, message.service_name)
                .await?
            && !latest.status.is_pending()
        {
            let rollback = (status.is_success() && latest.status.is_terminal()).then(|| {
                SagaMessage::rollback_command(
                    message.tx_id,
                    message.order_id,
                    message.service_name,
                    message.participant_reference.clone(),
                )
            });
            tracing::warn!(current = %latest.status, late_success = rollback.is_some(), "stale participant reply");
            return Ok(ReplyOutcome::Stale { rollback });
        }

        let mut entry = TransactionLogEntry::new(
            message.tx_id,
            message.order_id,
            message.service_name,
            status,
        )
        .with_retry_count(message.retry_count);
        if message.is_failure() {
            let error = message
                .error_message
                .clone()
                .unwrap_or_else(|| "unknown error".to_string());
            entry = entry.with_error(error);
        }

        self.store.append(entry).await?;
        tracing::info!(%status, "participant reply recorded");
        Ok(ReplyOutcome::Recorded(status))
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{OrderId, ServiceName, TransactionStatus, TxId};

/// One immutable fact in the transaction log.
///
/// A new status for a service is always a new entry; the latest entry per
/// service is the current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLogEntry {
    pub tx_id: TxId,
    pub order_id: OrderId,
    pub service_name: ServiceName,
    pub status: TransactionStatus,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
}

impl TransactionLogEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(
        tx_id: TxId,
        order_id: OrderId,
        service_name: ServiceName,
        status: TransactionStatus,
    ) -> Self {
        Self {
            tx_id,
            order_id,
            service_name,
            status,
            error_message: None,
            retry_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Overrides the creation time (used when replaying or back-dating).
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

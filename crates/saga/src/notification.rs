//! Outbound notifications about saga outcomes.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ServiceName, TxId};
use serde::{Deserialize, Serialize};

/// Raised when a compensation keeps failing after every retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackFailureAlert {
    pub tx_id: TxId,
    pub order_id: OrderId,
    pub service_name: ServiceName,
    pub last_error: String,
    pub retry_count: u32,
    pub occurred_at: DateTime<Utc>,
}

impl RollbackFailureAlert {
    pub fn new(
        tx_id: TxId,
        order_id: OrderId,
        service_name: ServiceName,
        last_error: impl Into<String>,
        retry_count: u32,
    ) -> Self {
        Self {
            tx_id,
            order_id,
            service_name,
            last_error: last_error.into(),
            retry_count,
            occurred_at: Utc::now(),
        }
    }

    pub fn subject(&self) -> String {
        format!(
            "[ALERT] Rollback failed for {} after {} retries, manual intervention required",
            self.service_name.display_name(),
            self.retry_count
        )
    }
}

/// Sink for saga progress and operator alerts.
///
/// Delivery is best effort; implementations must not fail the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn rollback_progress(&self, tx_id: TxId, order_id: OrderId, service: ServiceName);

    async fn rolled_back(&self, tx_id: TxId, order_id: OrderId);

    async fn rollback_failed(&self, tx_id: TxId, order_id: OrderId, summary: &str);

    async fn rollback_failure_alert(&self, alert: &RollbackFailureAlert);

    async fn completed(&self, tx_id: TxId, order_id: OrderId);
}

/// Notifier that writes everything to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn rollback_progress(&self, tx_id: TxId, order_id: OrderId, service: ServiceName) {
        tracing::info!(%tx_id, %order_id, service = %service, "service compensated");
    }

    async fn rolled_back(&self, tx_id: TxId, order_id: OrderId) {
        tracing::info!(%tx_id, %order_id, "transaction rolled back");
    }

    async fn rollback_failed(&self, tx_id: TxId, order_id: OrderId, summary: &str) {
        tracing::warn!(%tx_id, %order_id, summary, "transaction rollback failed");
    }

    async fn rollback_failure_alert(&self, alert: &RollbackFailureAlert) {
        tracing::error!(
            tx_id = %alert.tx_id,
            order_id = %alert.order_id,
            service = %alert.service_name,
            retry_count = alert.retry_count,
            last_error = %alert.last_error,
            occurred_at = %alert.occurred_at,
            "{}",
            alert.subject()
        );
    }

    async fn completed(&self, tx_id: TxId, order_id: OrderId) {
        tracing::info!(%tx_id, %order_id, "transaction completed");
    }
}

/// A notification captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    RollbackProgress {
        tx_id: TxId,
        order_id: OrderId,
        service: ServiceName,
    },
    RolledBack {
        tx_id: TxId,
        order_id: OrderId,
    },
    RollbackFailed {
        tx_id: TxId,
        order_id: OrderId,
        summary: String,
    },
    Alert(RollbackFailureAlert),
    Completed {
        tx_id: TxId,
        order_id: OrderId,
    },
}

/// Notifier that keeps everything it receives, for tests and inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    received: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn alerts(&self) -> Vec<RollbackFailureAlert> {
        self.notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Alert(alert) => Some(alert),
                _ => None,
            })
            .collect()
    }

    /// Services reported as being compensated, in report order.
    pub fn progress_for(&self, tx_id: TxId) -> Vec<ServiceName> {
        self.notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::RollbackProgress {
                    tx_id: id, service, ..
                } if id == tx_id => {
                    Some(service)
                }
                _ => None,
            })
            .collect()
    }

    fn push(&self, notification: Notification) {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn rollback_progress(&self, tx_id: TxId, order_id: OrderId, service: ServiceName) {
        self.push(Notification::RollbackProgress {
            tx_id,
            order_id,
            service,
        });
    }

    async fn rolled_back(&self, tx_id: TxId, order_id: OrderId) {
        self.push(Notification::RolledBack { tx_id, order_id });
    }

    async fn rollback_failed(&self, tx_id: TxId, order_id: OrderId, summary: &str) {
        self.push(Notification::RollbackFailed {
            tx_id,
            order_id,
            summary: summary.to_string(),
        });
    }

    async fn rollback_failure_alert(&self, alert: &RollbackFailureAlert) {
        self.push(Notification::Alert(alert.clone()));
    }

    async fn completed(&self, tx_id: TxId, order_id: OrderId) {
        self.push(Notification::Completed { tx_id, order_id });
    }
}

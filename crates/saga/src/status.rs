//! Read-side projections of the transaction log.

use chrono::{DateTime, Utc};
use common::{OrderId, ServiceName, TxId};
use serde::{Deserialize, Serialize};
use transaction_log::{
    TransactionLogEntry, TransactionLogStore, TransactionStatus, latest_per_service,
};

use crate::error::Result;

/// Aggregate state of a transaction, derived from its latest entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Processing,
    Failed,
    RollingBack,
    Completed,
    RolledBack,
}

impl OverallStatus {
    /// Derives the aggregate status from the latest entry per service.
    pub fn from_latest(latest: &[TransactionLogEntry]) -> Self {
        let any = |f: fn(&TransactionStatus) -> bool| latest.iter().any(|e| f(&e.status));

        let rolled_back = any(|s| *s == TransactionStatus::RolledBack);
        let open = any(|s| matches!(s, TransactionStatus::Pending | TransactionStatus::Failed));

        if rolled_back && open {
            return OverallStatus::RollingBack;
        }
        if any(TransactionStatus::is_failure) {
            return OverallStatus::Failed;
        }
        if any(TransactionStatus::is_pending) || latest.is_empty() {
            return OverallStatus::Processing;
        }
        if latest.iter().all(|e| e.status.is_success()) {
            return OverallStatus::Completed;
        }
        if latest.iter().all(|e| {
            matches!(
                e.status,
                TransactionStatus::Success | TransactionStatus::RolledBack | TransactionStatus::Done
            )
        }) {
            return OverallStatus::RolledBack;
        }
        OverallStatus::Processing
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Processing => "PROCESSING",
            OverallStatus::Failed => "FAILED",
            OverallStatus::RollingBack => "ROLLING_BACK",
            OverallStatus::Completed => "COMPLETED",
            OverallStatus::RolledBack => "ROLLED_BACK",
        }
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatusView {
    pub service_name: ServiceName,
    pub status: TransactionStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<TransactionLogEntry> for ServiceStatusView {
    fn from(entry: TransactionLogEntry) -> Self {
        Self {
            service_name: entry.service_name,
            status: entry.status,
            timestamp: entry.created_at,
            error_message: entry.error_message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatusView {
    pub tx_id: TxId,
    pub order_id: OrderId,
    pub overall_status: OverallStatus,
    pub services: Vec<ServiceStatusView>,
}

impl TransactionStatusView {
    /// Builds the view from a non-empty log of one transaction.
    fn from_entries(entries: Vec<TransactionLogEntry>) -> Option<Self> {
        let first = entries.first()?;
        let (tx_id, order_id) = (first.tx_id, first.order_id);
        let latest = latest_per_service(entries);
        Some(Self {
            tx_id,
            order_id,
            overall_status: OverallStatus::from_latest(&latest),
            services: latest.into_iter().map(ServiceStatusView::from).collect(),
        })
    }
}

/// Every transaction started for an order, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTransactionHistory {
    pub order_id: OrderId,
    pub transactions: Vec<TransactionStatusView>,
}

/// Status lookups over the log.
#[derive(Debug, Clone)]
pub struct TransactionQuery<S> {
    store: S,
}

impl<S: TransactionLogStore> TransactionQuery<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// `None` when the log has no entry for `tx_id`.
    pub async fn status(&self, tx_id: TxId) -> Result<Option<TransactionStatusView>> {
        let entries = self.store.entries_for_transaction(tx_id).await?;
        Ok(TransactionStatusView::from_entries(entries))
    }

    pub async fn order_history(&self, order_id: OrderId) -> Result<OrderTransactionHistory> {
        let mut by_tx: Vec<(TxId, Vec<TransactionLogEntry>)> = Vec::new();
        for entry in self.store.entries_for_order(order_id).await? {
            match by_tx.iter_mut().find(|(tx_id, _)| *tx_id == entry.tx_id) {
                Some((_, entries)) => entries.push(entry),
                None => by_tx.push((entry.tx_id, vec![entry])),
            }
        }

        let transactions = by_tx
            .into_iter()
            .rev()
            .filter_map(|(_, entries)| TransactionStatusView::from_entries(entries))
            .collect();
        Ok(OrderTransactionHistory {
            order_id,
            transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use transaction_log::InMemoryTransactionLogStore;

    use super::*;

    fn latest(statuses: &[(ServiceName, TransactionStatus)]) -> Vec<TransactionLogEntry> {
        let (tx_id, order_id) = (TxId::new(), OrderId::new());
        statuses
            .iter()
            .map(|&(service, status)| TransactionLogEntry::new(tx_id, order_id, service, status))
            .collect()
    }

    #[test]
    fn overall_status_derivation() {
        use ServiceName::*;
        use TransactionStatus::*;

        let cases = [
            (vec![(CreditCard, Pending), (Inventory, Pending)], OverallStatus::Processing),
            (vec![(CreditCard, Success), (Inventory, Success)], OverallStatus::Completed),
            (vec![(CreditCard, Success), (Inventory, Failed)], OverallStatus::Failed),
            (vec![(CreditCard, RolledBack), (Inventory, Failed)], OverallStatus::RollingBack),
            (vec![(CreditCard, RolledBack), (Inventory, Done)], OverallStatus::RolledBack),
            (vec![(CreditCard, RolledBack), (Inventory, RollbackFailed)], OverallStatus::Failed),
            (vec![(CreditCard, Success), (Inventory, RolledBack)], OverallStatus::RolledBack),
        ];
        for (statuses, expected) in cases {
            assert_eq!(OverallStatus::from_latest(&latest(&statuses)), expected, "{statuses:?}");
        }
    }

    #[tokio::test]
    async fn unknown_transaction_is_none() {
        let query = TransactionQuery::new(InMemoryTransactionLogStore::new());
        assert!(query.status(TxId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_shows_latest_entry_per_service() {
        let store = InMemoryTransactionLogStore::new();
        let (tx_id, order_id) = (TxId::new(), OrderId::new());
        for (service, status) in [
            (ServiceName::CreditCard, TransactionStatus::Pending),
            (ServiceName::Inventory, TransactionStatus::Pending),
            (ServiceName::CreditCard, TransactionStatus::Success),
        ] {
            store
                .append(TransactionLogEntry::new(tx_id, order_id, service, status))
                .await
                .unwrap();
        }
        store
            .append(
                TransactionLogEntry::new(
                    tx_id,
                    order_id,
                    ServiceName::Inventory,
                    TransactionStatus::Failed,
                )
                .with_error("Out of stock: SKU-001"),
            )
            .await
            .unwrap();

        let view = TransactionQuery::new(store).status(tx_id).await.unwrap().unwrap();

        assert_eq!(view.overall_status, OverallStatus::Failed);
        assert_eq!(view.services.len(), 2);
        assert_eq!(view.services[0].status, TransactionStatus::Success);
        assert_eq!(
            view.services[1].error_message.as_deref(),
            Some("Out of stock: SKU-001")
        );
    }

    #[tokio::test]
    async fn order_history_is_newest_first() {
        let store = InMemoryTransactionLogStore::new();
        let order_id = OrderId::new();
        let (first, second) = (TxId::new(), TxId::new());
        for tx_id in [first, second] {
            store
                .append(TransactionLogEntry::new(
                    tx_id,
                    order_id,
                    ServiceName::CreditCard,
                    TransactionStatus::Pending,
                ))
                .await
                .unwrap();
        }

        let history = TransactionQuery::new(store).order_history(order_id).await.unwrap();

        let ids: Vec<TxId> = history.transactions.iter().map(|t| t.tx_id).collect();
        assert_eq!(ids, vec![second, first]);
    }
}

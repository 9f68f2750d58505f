use std::collections::HashMap;

use async_trait::async_trait;

use crate::{
    NewOutboxEvent, OrderId, OutboxEvent, Result, ServiceName, TransactionLogEntry,
    TransactionLogError, TransactionStatus, TxId,
};

/// A saga with at least one service still waiting on its forward action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnfinishedTransaction {
    pub tx_id: TxId,
    pub order_id: OrderId,
}

/// Append-only store for saga status transitions.
///
/// Implementations must be safe to share between the orchestrator, every
/// running monitor and the rollback engine.
#[async_trait]
pub trait TransactionLogStore: Send + Sync {
    /// Appends a single entry.
    async fn append(&self, entry: TransactionLogEntry) -> Result<()>;

    /// Writes the initial entries of a saga and its outbox event in one
    /// atomic unit. Either everything is stored or nothing is.
    ///
    /// Returns the ID assigned to the outbox event.
    async fn register_saga(
        &self,
        entries: Vec<TransactionLogEntry>,
        event: NewOutboxEvent,
    ) -> Result<i64>;

    /// All entries of a transaction in insertion order.
    async fn entries_for_transaction(&self, tx_id: TxId) -> Result<Vec<TransactionLogEntry>>;

    /// All entries of every transaction of an order, in insertion order.
    async fn entries_for_order(&self, order_id: OrderId) -> Result<Vec<TransactionLogEntry>>;

    /// Transactions with a PENDING entry that no later SUCCESS, ROLLED_BACK,
    /// ROLLBACK_FAILED or DONE entry for the same service resolves.
    async fn find_unfinished(&self) -> Result<Vec<UnfinishedTransaction>>;
}

/// Read and acknowledge side of the outbox.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Unprocessed events, oldest first.
    async fn unprocessed_outbox_events(&self, limit: usize) -> Result<Vec<OutboxEvent>>;

    /// Marks an event as processed. Marking it twice is a no-op.
    async fn mark_outbox_processed(&self, id: i64) -> Result<()>;
}

/// Derived views over the raw log.
#[async_trait]
pub trait TransactionLogStoreExt: TransactionLogStore {
    /// Latest entry per service, in execution order.
    async fn latest_for_transaction(&self, tx_id: TxId) -> Result<Vec<TransactionLogEntry>> {
        Ok(latest_per_service(self.entries_for_transaction(tx_id).await?))
    }

    async fn latest_for_service(
        &self,
        tx_id: TxId,
        service: ServiceName,
    ) -> Result<Option<TransactionLogEntry>> {
        let entries = self.entries_for_transaction(tx_id).await?;
        Ok(entries
            .into_iter()
            .rev()
            .find(|entry| entry.service_name == service))
    }

    /// Services whose latest status is SUCCESS, in execution order.
    async fn successful_services(&self, tx_id: TxId) -> Result<Vec<ServiceName>> {
        Ok(self
            .latest_for_transaction(tx_id)
            .await?
            .into_iter()
            .filter(|entry| entry.status.is_success())
            .map(|entry| entry.service_name)
            .collect())
    }

    /// Transactions started for an order, newest first.
    async fn transaction_ids_for_order(&self, order_id: OrderId) -> Result<Vec<TxId>> {
        let mut ids: Vec<TxId> = Vec::new();
        for entry in self.entries_for_order(order_id).await? {
            if !ids.contains(&entry.tx_id) {
                ids.push(entry.tx_id);
            }
        }
        ids.reverse();
        Ok(ids)
    }
}

impl<T: TransactionLogStore + ?Sized> TransactionLogStoreExt for T {}

/// Reduces a log to the latest entry per service.
///
/// Services keep the position of their first appearance, which for a saga
/// is the configured execution order.
pub fn latest_per_service(entries: Vec<TransactionLogEntry>) -> Vec<TransactionLogEntry> {
    let mut positions: HashMap<ServiceName, usize> = HashMap::new();
    let mut latest: Vec<TransactionLogEntry> = Vec::new();

    for entry in entries {
        match positions.get(&entry.service_name) {
            Some(&index) => latest[index] = entry,
            None => {
                positions.insert(entry.service_name, latest.len());
                latest.push(entry);
            }
        }
    }

    latest
}

/// Validates an entry before it is written.
pub(crate) fn validate_entry(entry: &TransactionLogEntry) -> Result<()> {
    if entry.tx_id.is_nil() {
        return Err(TransactionLogError::InvalidEntry(
            "transaction id must not be nil".to_string(),
        ));
    }
    if entry.order_id.is_nil() {
        return Err(TransactionLogError::InvalidEntry(
            "order id must not be nil".to_string(),
        ));
    }
    Ok(())
}

/// Validates the initial batch of a saga against its outbox event.
pub(crate) fn validate_registration(
    entries: &[TransactionLogEntry],
    event: &NewOutboxEvent,
) -> Result<()> {
    if entries.is_empty() {
        return Err(TransactionLogError::InvalidEntry(
            "a saga needs at least one participant entry".to_string(),
        ));
    }
    for entry in entries {
        validate_entry(entry)?;
        if entry.tx_id != event.tx_id || entry.order_id != event.order_id {
            return Err(TransactionLogError::InvalidEntry(
                "all entries must belong to the outbox event's transaction".to_string(),
            ));
        }
        if entry.status != TransactionStatus::Pending {
            return Err(TransactionLogError::InvalidEntry(format!(
                "initial entry for {} must be PENDING, got {}",
                entry.service_name, entry.status
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(tx_id: TxId, service: ServiceName, status: TransactionStatus) -> TransactionLogEntry {
        TransactionLogEntry::new(tx_id, OrderId::new(), service, status)
    }

    #[test]
    fn latest_per_service_keeps_first_appearance_order() {
        let tx = TxId::new();
        let entries = vec![
            entry(tx, ServiceName::CreditCard, TransactionStatus::Pending),
            entry(tx, ServiceName::Inventory, TransactionStatus::Pending),
            entry(tx, ServiceName::CreditCard, TransactionStatus::Success),
            entry(tx, ServiceName::Inventory, TransactionStatus::Failed),
            entry(tx, ServiceName::CreditCard, TransactionStatus::RolledBack),
        ];

        let latest = latest_per_service(entries);

        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].service_name, ServiceName::CreditCard);
        assert_eq!(latest[0].status, TransactionStatus::RolledBack);
        assert_eq!(latest[1].service_name, ServiceName::Inventory);
        assert_eq!(latest[1].status, TransactionStatus::Failed);
    }

    #[test]
    fn registration_rejects_non_pending_entries() {
        let tx = TxId::new();
        let order = OrderId::new();
        let event = NewOutboxEvent::order_confirmed(tx, order, serde_json::json!({}));
        let entries = vec![TransactionLogEntry::new(
            tx,
            order,
            ServiceName::CreditCard,
            TransactionStatus::Success,
        )];

        assert!(matches!(
            validate_registration(&entries, &event),
            Err(TransactionLogError::InvalidEntry(_))
        ));
    }

    #[test]
    fn registration_rejects_empty_batch() {
        let event =
            NewOutboxEvent::order_confirmed(TxId::new(), OrderId::new(), serde_json::json!({}));
        assert!(validate_registration(&[], &event).is_err());
    }

    #[test]
    fn nil_ids_are_rejected() {
        let entry = TransactionLogEntry::new(
            TxId::from_uuid(uuid::Uuid::nil()),
            OrderId::new(),
            ServiceName::Logistics,
            TransactionStatus::Pending,
        );
        assert!(validate_entry(&entry).is_err());
    }
}

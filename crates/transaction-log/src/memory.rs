use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    NewOutboxEvent, OrderId, OutboxEvent, Result, TransactionLogEntry, TransactionLogError, TxId,
    store::{
        OutboxStore, TransactionLogStore, UnfinishedTransaction, validate_entry,
        validate_registration,
    },
};

#[derive(Debug, Default)]
struct LogState {
    entries: Vec<TransactionLogEntry>,
    outbox: Vec<OutboxEvent>,
    next_outbox_id: i64,
}

/// In-memory transaction log for tests and single-process deployments.
///
/// Entries and outbox events live behind one lock, which gives
/// `register_saga` the same all-or-nothing behaviour as the database.
#[derive(Clone, Default)]
pub struct InMemoryTransactionLogStore {
    state: Arc<RwLock<LogState>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryTransactionLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of log entries.
    pub async fn entry_count(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Total number of outbox events, processed or not.
    pub async fn outbox_count(&self) -> usize {
        self.state.read().await.outbox.len()
    }

    /// Makes every operation fail until reset, simulating an outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TransactionLogError::Unavailable(
                "in-memory store switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionLogStore for InMemoryTransactionLogStore {
    async fn append(&self, entry: TransactionLogEntry) -> Result<()> {
        self.check_available()?;
        validate_entry(&entry)?;
        self.state.write().await.entries.push(entry);
        Ok(())
    }

    async fn register_saga(
        &self,
        entries: Vec<TransactionLogEntry>,
        event: NewOutboxEvent,
    ) -> Result<i64> {
        self.check_available()?;
        validate_registration(&entries, &event)?;

        let mut state = self.state.write().await;
        state.next_outbox_id += 1;
        let id = state.next_outbox_id;
        state.entries.extend(entries);
        state.outbox.push(event.into_event(id));
        Ok(id)
    }

    async fn entries_for_transaction(&self, tx_id: TxId) -> Result<Vec<TransactionLogEntry>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.tx_id == tx_id)
            .cloned()
            .collect())
    }

    async fn entries_for_order(&self, order_id: OrderId) -> Result<Vec<TransactionLogEntry>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn find_unfinished(&self) -> Result<Vec<UnfinishedTransaction>> {
        self.check_available()?;
        let state = self.state.read().await;

        let mut seen = HashSet::new();
        let mut unfinished = Vec::new();
        for pending in state.entries.iter().filter(|e| e.status.is_pending()) {
            if seen.contains(&pending.tx_id) {
                continue;
            }
            let resolved = state.entries.iter().any(|e| {
                e.tx_id == pending.tx_id
                    && e.service_name == pending.service_name
                    && e.status.resolves_pending()
            });
            if !resolved {
                seen.insert(pending.tx_id);
                unfinished.push(UnfinishedTransaction {
                    tx_id: pending.tx_id,
                    order_id: pending.order_id,
                });
            }
        }
        Ok(unfinished)
    }
}

#[async_trait]
impl OutboxStore for InMemoryTransactionLogStore {
    async fn unprocessed_outbox_events(&self, limit: usize) -> Result<Vec<OutboxEvent>> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut events: Vec<OutboxEvent> = state
            .outbox
            .iter()
            .filter(|e| !e.processed)
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.created_at, e.id));
        events.truncate(limit);
        Ok(events)
    }

    async fn mark_outbox_processed(&self, id: i64) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let event = state
            .outbox
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(TransactionLogError::OutboxEventNotFound(id))?;
        if !event.processed {
            event.processed = true;
            event.processed_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ServiceName, TransactionLogStoreExt, TransactionStatus};

    fn pending(tx_id: TxId, order_id: OrderId, service: ServiceName) -> TransactionLogEntry {
        TransactionLogEntry::new(tx_id, order_id, service, TransactionStatus::Pending)
    }

    async fn registered(store: &InMemoryTransactionLogStore) -> (TxId, OrderId) {
        let tx = TxId::new();
        let order = OrderId::new();
        let entries = ServiceName::ALL
            .iter()
            .map(|s| pending(tx, order, *s))
            .collect();
        store
            .register_saga(
                entries,
                NewOutboxEvent::order_confirmed(tx, order, serde_json::json!({"total": 10})),
            )
            .await
            .unwrap();
        (tx, order)
    }

    #[tokio::test]
    async fn register_saga_writes_entries_and_outbox() {
        let store = InMemoryTransactionLogStore::new();
        let (tx, _) = registered(&store).await;

        assert_eq!(store.entry_count().await, 3);
        assert_eq!(store.outbox_count().await, 1);

        let latest = store.latest_for_transaction(tx).await.unwrap();
        let services: Vec<_> = latest.iter().map(|e| e.service_name).collect();
        assert_eq!(services, ServiceName::ALL.to_vec());
    }

    #[tokio::test]
    async fn invalid_registration_writes_nothing() {
        let store = InMemoryTransactionLogStore::new();
        let tx = TxId::new();
        let order = OrderId::new();
        let entries = vec![
            pending(tx, order, ServiceName::CreditCard),
            TransactionLogEntry::new(tx, order, ServiceName::Inventory, TransactionStatus::Done),
        ];

        let result = store
            .register_saga(
                entries,
                NewOutboxEvent::order_confirmed(tx, order, serde_json::json!({})),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(store.entry_count().await, 0);
        assert_eq!(store.outbox_count().await, 0);
    }

    #[tokio::test]
    async fn find_unfinished_ignores_resolved_services() {
        let store = InMemoryTransactionLogStore::new();
        let (open_tx, _) = registered(&store).await;
        let (done_tx, done_order) = registered(&store).await;

        for service in ServiceName::ALL {
            store
                .append(TransactionLogEntry::new(
                    done_tx,
                    done_order,
                    service,
                    TransactionStatus::Success,
                ))
                .await
                .unwrap();
        }

        let unfinished = store.find_unfinished().await.unwrap();
        assert_eq!(unfinished.len(), 1);
        assert_eq!(unfinished[0].tx_id, open_tx);
    }

    #[tokio::test]
    async fn failed_entry_does_not_resolve_pending() {
        let store = InMemoryTransactionLogStore::new();
        let (tx, order) = registered(&store).await;
        store
            .append(
                TransactionLogEntry::new(tx, order, ServiceName::CreditCard, TransactionStatus::Failed)
                    .with_error("declined"),
            )
            .await
            .unwrap();

        let unfinished = store.find_unfinished().await.unwrap();
        assert_eq!(unfinished.len(), 1);
    }

    #[tokio::test]
    async fn outbox_events_are_marked_once() {
        let store = InMemoryTransactionLogStore::new();
        registered(&store).await;
        registered(&store).await;

        let events = store.unprocessed_outbox_events(10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].id < events[1].id);

        store.mark_outbox_processed(events[0].id).await.unwrap();
        store.mark_outbox_processed(events[0].id).await.unwrap();

        let remaining = store.unprocessed_outbox_events(10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, events[1].id);

        assert!(matches!(
            store.mark_outbox_processed(999).await,
            Err(TransactionLogError::OutboxEventNotFound(999))
        ));
    }

    #[tokio::test]
    async fn successful_services_follow_execution_order() {
        let store = InMemoryTransactionLogStore::new();
        let (tx, order) = registered(&store).await;
        for service in [ServiceName::Inventory, ServiceName::CreditCard] {
            store
                .append(TransactionLogEntry::new(
                    tx,
                    order,
                    service,
                    TransactionStatus::Success,
                ))
                .await
                .unwrap();
        }

        let services = store.successful_services(tx).await.unwrap();
        assert_eq!(services, vec![ServiceName::CreditCard, ServiceName::Inventory]);
    }

    #[tokio::test]
    async fn order_history_lists_newest_transaction_first() {
        let store = InMemoryTransactionLogStore::new();
        let order = OrderId::new();
        let first = TxId::new();
        let second = TxId::new();
        store.append(pending(first, order, ServiceName::CreditCard)).await.unwrap();
        store.append(pending(second, order, ServiceName::CreditCard)).await.unwrap();

        let ids = store.transaction_ids_for_order(order).await.unwrap();
        assert_eq!(ids, vec![second, first]);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = InMemoryTransactionLogStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.entries_for_transaction(TxId::new()).await,
            Err(TransactionLogError::Unavailable(_))
        ));
        store.set_unavailable(false);
        assert!(store.entries_for_transaction(TxId::new()).await.is_ok());
    }
}

//! Compensation of completed saga steps.
//!
//! The engine undoes successful participants last-completed-first. A
//! failing compensation never stops the remaining ones, and every outcome
//! is appended to the transaction log.

use std::time::Duration;

use async_trait::async_trait;
use common::{OrderId, ServiceName, TxId};
use transaction_log::{
    TransactionLogEntry, TransactionLogStore, TransactionLogStoreExt, TransactionStatus,
};

use crate::client::{CompensateRequest, RetryPolicy, ServiceClient};
use crate::notification::{Notifier, RollbackFailureAlert};

/// Retry settings for compensations started by monitors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollbackConfig {
    /// Attempts per service before giving up and alerting.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
}

impl RollbackConfig {
    fn policy(&self, attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, self.initial_backoff, self.multiplier)
    }
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(200),
            multiplier: 2.0,
        }
    }
}

/// Final result of a compensation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    RolledBack,
    /// At least one service ended ROLLBACK_FAILED. The summary joins the
    /// per-service errors.
    RollbackFailed { summary: String },
}

impl RollbackOutcome {
    pub fn is_rolled_back(&self) -> bool {
        matches!(self, RollbackOutcome::RolledBack)
    }

    fn label(&self) -> &'static str {
        match self {
            RollbackOutcome::RolledBack => "rolled_back",
            RollbackOutcome::RollbackFailed { .. } => "rollback_failed",
        }
    }
}

/// Something that can undo the successful steps of a transaction.
#[async_trait]
pub trait Compensator: Send + Sync {
    /// `successful` is in execution order.
    async fn rollback(
        &self,
        tx_id: TxId,
        order_id: OrderId,
        successful: Vec<ServiceName>,
    ) -> RollbackOutcome;
}

/// Calls compensating actions and records their outcome.
pub struct RollbackEngine<S, C, N> {
    store: S,
    client: C,
    notifier: N,
    config: RollbackConfig,
}

impl<S, C, N> RollbackEngine<S, C, N>
where
    S: TransactionLogStore,
    C: ServiceClient,
    N: Notifier,
{
    pub fn new(store: S, client: C, notifier: N, config: RollbackConfig) -> Self {
        Self {
            store,
            client,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &RollbackConfig {
        &self.config
    }

    /// Compensates each service once.
    #[tracing::instrument(skip(self, successful), fields(services = successful.len()))]
    pub async fn compensate(
        &self,
        tx_id: TxId,
        order_id: OrderId,
        successful: &[ServiceName],
    ) -> RollbackOutcome {
        self.run(tx_id, order_id, successful, 1, false).await
    }

    /// Compensates each service with up to `max_retries` attempts and
    /// raises an operator alert for every service that never succeeds.
    #[tracing::instrument(skip(self, successful), fields(services = successful.len()))]
    pub async fn compensate_with_retry(
        &self,
        tx_id: TxId,
        order_id: OrderId,
        successful: &[ServiceName],
        max_retries: u32,
    ) -> RollbackOutcome {
        self.run(tx_id, order_id, successful, max_retries.max(1), true)
            .await
    }

    async fn run(
        &self,
        tx_id: TxId,
        order_id: OrderId,
        successful: &[ServiceName],
        attempts: u32,
        alert: bool,
    ) -> RollbackOutcome {
        if successful.is_empty() {
            tracing::info!("nothing to compensate");
            self.close_out(tx_id, order_id).await;
            self.notifier.rolled_back(tx_id, order_id).await;
            return self.finish(RollbackOutcome::RolledBack);
        }

        let mut failures = Vec::new();
        for &service in successful.iter().rev() {
            if self.already_compensated(tx_id, service).await {
                tracing::debug!(service = %service, "already compensated, skipping");
                continue;
            }
            if let Err(error) = self
                .compensate_service(tx_id, order_id, service, attempts, alert)
                .await
            {
                failures.push(format!("{service}: {error}"));
            }
        }

        self.close_out(tx_id, order_id).await;
        if failures.is_empty() {
            self.notifier.rolled_back(tx_id, order_id).await;
            tracing::info!("transaction rolled back");
            self.finish(RollbackOutcome::RolledBack)
        } else {
            let summary = failures.join("; ");
            self.notifier
                .rollback_failed(tx_id, order_id, &summary)
                .await;
            tracing::warn!(%summary, "rollback failed");
            self.finish(RollbackOutcome::RollbackFailed { summary })
        }
    }

    /// Runs the attempts for one service. Returns the last error when all
    /// of them fail.
    async fn compensate_service(
        &self,
        tx_id: TxId,
        order_id: OrderId,
        service: ServiceName,
        attempts: u32,
        alert: bool,
    ) -> Result<(), String> {
        let policy = self.config.policy(attempts);
        let mut last_error = String::new();

        for attempt in 1..=policy.attempts() {
            metrics::counter!("saga_compensation_attempts_total", "service" => service.as_str())
                .increment(1);
            let request = CompensateRequest::new(tx_id, order_id).with_reason("saga rollback");
            let reply = self.client.compensate(service, request).await;

            if reply.success {
                self.record(
                    TransactionLogEntry::new(tx_id, order_id, service, TransactionStatus::RolledBack)
                        .with_retry_count(attempt - 1),
                )
                .await;
                self.notifier
                    .rollback_progress(tx_id, order_id, service)
                    .await;
                tracing::info!(service = %service, attempt, "service compensated");
                return Ok(());
            }

            tracing::warn!(service = %service, attempt, error = %reply.message, "compensation attempt failed");
            last_error = reply.message;
            if attempt < policy.attempts() {
                tokio::time::sleep(policy.backoff(attempt)).await;
            }
        }

        self.record(
            TransactionLogEntry::new(tx_id, order_id, service, TransactionStatus::RollbackFailed)
                .with_error(last_error.clone())
                .with_retry_count(policy.attempts() - 1),
        )
        .await;

        if alert {
            let alert =
                RollbackFailureAlert::new(tx_id, order_id, service, &last_error, policy.attempts());
            tracing::error!(service = %service, retry_count = alert.retry_count, error = %last_error, "compensation retries exhausted");
            metrics::counter!("saga_rollback_alerts_total").increment(1);
            self.notifier.rollback_failure_alert(&alert).await;
        }

        Err(last_error)
    }

    async fn already_compensated(&self, tx_id: TxId, service: ServiceName) -> bool {
        match self.store.latest_for_service(tx_id, service).await {
            Ok(Some(entry)) => matches!(
                entry.status,
                TransactionStatus::RolledBack | TransactionStatus::Done
            ),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(service = %service, error = %e, "could not read service status");
                false
            }
        }
    }

    /// Marks services that never completed as done, so the transaction no
    /// longer counts as unfinished. Runs after every compensation, failed
    /// ones included.
    async fn close_out(&self, tx_id: TxId, order_id: OrderId) {
        let latest = match self.store.latest_for_transaction(tx_id).await {
            Ok(latest) => latest,
            Err(e) => {
                tracing::error!(error = %e, "could not close out transaction");
                return;
            }
        };
        for entry in latest {
            if matches!(
                entry.status,
                TransactionStatus::Pending | TransactionStatus::Failed
            ) {
                self.record(TransactionLogEntry::new(
                    tx_id,
                    order_id,
                    entry.service_name,
                    TransactionStatus::Done,
                ))
                .await;
            }
        }
    }

    async fn record(&self, entry: TransactionLogEntry) {
        let (service, status) = (entry.service_name, entry.status);
        if let Err(e) = self.store.append(entry).await {
            tracing::error!(service = %service, %status, error = %e, "failed to record compensation result");
        }
    }

    fn finish(&self, outcome: RollbackOutcome) -> RollbackOutcome {
        metrics::counter!("saga_rollbacks_total", "outcome" => outcome.label()).increment(1);
        outcome
    }
}

#[async_trait]
impl<S, C, N> Compensator for RollbackEngine<S, C, N>
where
    S: TransactionLogStore,
    C: ServiceClient,
    N: Notifier,
{
    async fn rollback(
        &self,
        tx_id: TxId,
        order_id: OrderId,
        successful: Vec<ServiceName>,
    ) -> RollbackOutcome {
        self.compensate_with_retry(tx_id, order_id, &successful, self.config.max_retries)
            .await
    }
}

#[cfg(test)]
mod tests {
    use transaction_log::InMemoryTransactionLogStore;

    use super::*;
    use crate::client::{ResilienceConfig, ResilientServiceClient};
    use crate::notification::{Notification, RecordingNotifier};
    use crate::participants::{
        InMemoryCreditCardService, InMemoryInventoryService, InMemoryLogisticsService,
    };

    struct Fixture {
        store: InMemoryTransactionLogStore,
        credit_card: InMemoryCreditCardService,
        inventory: InMemoryInventoryService,
        logistics: InMemoryLogisticsService,
        notifier: RecordingNotifier,
        engine: RollbackEngine<InMemoryTransactionLogStore, ResilientServiceClient, RecordingNotifier>,
    }

    fn fixture() -> Fixture {
        let store = InMemoryTransactionLogStore::new();
        let credit_card = InMemoryCreditCardService::new();
        let inventory = InMemoryInventoryService::new();
        let logistics = InMemoryLogisticsService::new();
        let notifier = RecordingNotifier::new();
        let client = ResilientServiceClient::builder(ResilienceConfig::default())
            .participant(credit_card.clone())
            .participant(inventory.clone())
            .participant(logistics.clone())
            .build();
        let engine = RollbackEngine::new(
            store.clone(),
            client,
            notifier.clone(),
            RollbackConfig::default(),
        );
        Fixture {
            store,
            credit_card,
            inventory,
            logistics,
            notifier,
            engine,
        }
    }

    async fn statuses(store: &InMemoryTransactionLogStore, tx_id: TxId) -> Vec<TransactionStatus> {
        store
            .latest_for_transaction(tx_id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.status)
            .collect()
    }

    #[tokio::test]
    async fn compensates_in_reverse_order() {
        let f = fixture();
        let (tx_id, order_id) = (TxId::new(), OrderId::new());

        let outcome = f
            .engine
            .compensate(tx_id, order_id, &ServiceName::ALL)
            .await;

        assert_eq!(outcome, RollbackOutcome::RolledBack);
        assert_eq!(
            f.notifier.progress_for(tx_id),
            vec![
                ServiceName::Logistics,
                ServiceName::Inventory,
                ServiceName::CreditCard
            ]
        );
        let entries = f.store.entries_for_transaction(tx_id).await.unwrap();
        assert!(entries.iter().all(|e| e.status == TransactionStatus::RolledBack));
    }

    #[tokio::test]
    async fn empty_input_is_rolled_back_without_writes() {
        let f = fixture();
        let (tx_id, order_id) = (TxId::new(), OrderId::new());

        let outcome = f.engine.compensate(tx_id, order_id, &[]).await;

        assert!(outcome.is_rolled_back());
        assert_eq!(f.store.entry_count().await, 0);
        assert_eq!(
            f.notifier.notifications(),
            vec![Notification::RolledBack { tx_id, order_id }]
        );
    }

    #[tokio::test]
    async fn empty_input_closes_out_pending_services() {
        let f = fixture();
        let (tx_id, order_id) = (TxId::new(), OrderId::new());
        for service in ServiceName::ALL {
            f.store
                .append(TransactionLogEntry::new(tx_id, order_id, service, TransactionStatus::Pending))
                .await
                .unwrap();
        }

        let outcome = f.engine.compensate(tx_id, order_id, &[]).await;

        assert!(outcome.is_rolled_back());
        assert_eq!(statuses(&f.store, tx_id).await, vec![TransactionStatus::Done; 3]);
        assert!(f.store.find_unfinished().await.unwrap().is_empty());
        assert_eq!(f.credit_card.compensate_calls(), 0);
    }

    #[tokio::test]
    async fn failed_rollback_still_closes_out_pending_services() {
        let f = fixture();
        f.credit_card.set_fail_on_compensate(true);
        let (tx_id, order_id) = (TxId::new(), OrderId::new());
        for (service, status) in [
            (ServiceName::CreditCard, TransactionStatus::Success),
            (ServiceName::Inventory, TransactionStatus::Pending),
            (ServiceName::Logistics, TransactionStatus::Pending),
        ] {
            f.store
                .append(TransactionLogEntry::new(tx_id, order_id, service, status))
                .await
                .unwrap();
        }

        let outcome = f
            .engine
            .compensate(tx_id, order_id, &[ServiceName::CreditCard])
            .await;

        assert!(!outcome.is_rolled_back());
        assert_eq!(
            statuses(&f.store, tx_id).await,
            vec![
                TransactionStatus::RollbackFailed,
                TransactionStatus::Done,
                TransactionStatus::Done
            ]
        );
        assert!(f.store.find_unfinished().await.unwrap().is_empty());
        assert!(
            !f.notifier
                .notifications()
                .contains(&Notification::RolledBack { tx_id, order_id })
        );
    }

    #[tokio::test]
    async fn failure_does_not_stop_remaining_compensations() {
        let f = fixture();
        f.inventory.set_fail_on_compensate(true);
        let (tx_id, order_id) = (TxId::new(), OrderId::new());

        let outcome = f
            .engine
            .compensate(tx_id, order_id, &ServiceName::ALL)
            .await;

        assert_eq!(
            outcome,
            RollbackOutcome::RollbackFailed {
                summary: "INVENTORY: Inventory release failed".to_string()
            }
        );
        assert_eq!(f.credit_card.compensate_calls(), 1);
        assert_eq!(f.logistics.compensate_calls(), 1);
        assert_eq!(
            statuses(&f.store, tx_id).await,
            vec![
                TransactionStatus::RolledBack,
                TransactionStatus::RollbackFailed,
                TransactionStatus::RolledBack
            ]
        );
        assert!(f.notifier.alerts().is_empty());
    }

    #[tokio::test]
    async fn second_run_skips_compensated_services() {
        let f = fixture();
        let (tx_id, order_id) = (TxId::new(), OrderId::new());
        let services = [ServiceName::CreditCard, ServiceName::Inventory];

        f.engine.compensate(tx_id, order_id, &services).await;
        let outcome = f.engine.compensate(tx_id, order_id, &services).await;

        assert!(outcome.is_rolled_back());
        assert_eq!(f.credit_card.compensate_calls(), 1);
        assert_eq!(f.inventory.compensate_calls(), 1);
        assert_eq!(
            statuses(&f.store, tx_id).await,
            vec![TransactionStatus::RolledBack, TransactionStatus::RolledBack]
        );
    }

    #[tokio::test]
    async fn clean_rollback_closes_out_unfinished_services() {
        let f = fixture();
        let (tx_id, order_id) = (TxId::new(), OrderId::new());
        for (service, status) in [
            (ServiceName::CreditCard, TransactionStatus::Success),
            (ServiceName::Inventory, TransactionStatus::Failed),
            (ServiceName::Logistics, TransactionStatus::Pending),
        ] {
            f.store
                .append(TransactionLogEntry::new(tx_id, order_id, service, status))
                .await
                .unwrap();
        }

        let outcome = f
            .engine
            .compensate(tx_id, order_id, &[ServiceName::CreditCard])
            .await;

        assert!(outcome.is_rolled_back());
        assert_eq!(
            statuses(&f.store, tx_id).await,
            vec![
                TransactionStatus::RolledBack,
                TransactionStatus::Done,
                TransactionStatus::Done
            ]
        );
        assert_eq!(f.inventory.compensate_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_raise_one_alert() {
        let f = fixture();
        f.credit_card.set_fail_on_compensate(true);
        let (tx_id, order_id) = (TxId::new(), OrderId::new());

        let outcome = f
            .engine
            .compensate_with_retry(tx_id, order_id, &[ServiceName::CreditCard], 5)
            .await;

        assert!(!outcome.is_rolled_back());
        assert_eq!(f.credit_card.compensate_calls(), 5);
        let alerts = f.notifier.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].retry_count, 5);
        assert_eq!(alerts[0].service_name, ServiceName::CreditCard);
        assert_eq!(alerts[0].last_error, "Refund rejected by gateway");
    }
}

//! In-process outbox relay.
//!
//! Reads `ORDER_CONFIRMED` events from the outbox and drives the forward
//! actions of each saga through the participant client, in configured
//! order. Participant replies become SUCCESS or FAILED entries; compensation
//! stays with the monitors. Each call is bounded by the client's call
//! timeout, so a participant that never answers cannot hold up later events.
//! A success that arrives after a monitor rolled the service back is
//! compensated on the spot.

use std::time::Duration;

use common::{ServiceName, TxId};
use tokio::sync::watch;
use transaction_log::{
    OutboxEvent, OutboxStore, TransactionLogEntry, TransactionLogStore, TransactionLogStoreExt,
    TransactionStatus,
};

use crate::client::{CompensateRequest, NotifyRequest, ServiceClient};
use crate::error::Result;
use crate::notification::{Notifier, RollbackFailureAlert};

/// What happened to one outbox event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Every participant succeeded.
    Completed,
    /// A participant declined; later participants were not called.
    Failed(ServiceName),
    /// The saga was already past the forward phase, or was rolled back
    /// while a participant call was in flight.
    Halted,
}

pub struct OutboxRelay<S, C, N> {
    store: S,
    client: C,
    notifier: N,
    batch_size: usize,
}

impl<S, C, N> OutboxRelay<S, C, N>
where
    S: TransactionLogStore + OutboxStore,
    C: ServiceClient,
    N: Notifier,
{
    pub fn new(store: S, client: C, notifier: N, batch_size: usize) -> Self {
        Self {
            store,
            client,
            notifier,
            batch_size: batch_size.max(1),
        }
    }

    /// Dispatches one batch of unprocessed events, oldest first.
    ///
    /// Returns the number of events marked processed. An event whose
    /// dispatch hits a store error stays unprocessed and is retried on the
    /// next poll.
    pub async fn poll_once(&self) -> Result<usize> {
        let events = self.store.unprocessed_outbox_events(self.batch_size).await?;
        let mut processed = 0;

        for event in events {
            let outcome = match self.dispatch(&event).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(event_id = event.id, tx_id = %event.tx_id, error = %e, "dispatch failed, event left unprocessed");
                    continue;
                }
            };
            if let Err(e) = self.store.mark_outbox_processed(event.id).await {
                tracing::warn!(event_id = event.id, error = %e, "could not mark event processed");
                continue;
            }
            processed += 1;
            metrics::counter!("saga_outbox_events_processed_total").increment(1);
            tracing::debug!(event_id = event.id, tx_id = %event.tx_id, ?outcome, "outbox event processed");
        }

        Ok(processed)
    }

    #[tracing::instrument(skip(self, event), fields(event_id = event.id, tx_id = %event.tx_id))]
    async fn dispatch(&self, event: &OutboxEvent) -> Result<DispatchOutcome> {
        let latest = self.store.latest_for_transaction(event.tx_id).await?;

        for entry in latest {
            match entry.status {
                TransactionStatus::Success => continue,
                TransactionStatus::Pending => {}
                status => {
                    tracing::debug!(service = %entry.service_name, %status, "saga no longer forward, halting");
                    return Ok(DispatchOutcome::Halted);
                }
            }

            let service = entry.service_name;
            let request = NotifyRequest::new(event.tx_id, event.order_id, event.payload.clone());
            let reply = self.client.notify(service, request).await;

            // A monitor may have given up on the service while the call was
            // in flight.
            let current = self.current_status(event, service).await?;
            if !current.is_some_and(|status| status.is_pending()) {
                if reply.success && current.is_some_and(|status| status.is_terminal()) {
                    self.undo_late_success(event, service).await?;
                } else {
                    tracing::debug!(service = %service, ?current, "late reply ignored");
                }
                return Ok(DispatchOutcome::Halted);
            }

            if reply.success {
                self.store
                    .append(TransactionLogEntry::new(
                        event.tx_id,
                        event.order_id,
                        service,
                        TransactionStatus::Success,
                    ))
                    .await?;
                tracing::info!(service = %service, reference = ?reply.participant_reference, "participant succeeded");
            } else {
                self.store
                    .append(
                        TransactionLogEntry::new(
                            event.tx_id,
                            event.order_id,
                            service,
                            TransactionStatus::Failed,
                        )
                        .with_error(reply.message.clone()),
                    )
                    .await?;
                tracing::warn!(service = %service, error = %reply.message, "participant failed");
                return Ok(DispatchOutcome::Failed(service));
            }
        }

        self.notifier.completed(event.tx_id, event.order_id).await;
        Ok(DispatchOutcome::Completed)
    }

    async fn current_status(
        &self,
        event: &OutboxEvent,
        service: ServiceName,
    ) -> Result<Option<TransactionStatus>> {
        Ok(self
            .store
            .latest_for_service(event.tx_id, service)
            .await?
            .map(|entry| entry.status))
    }

    /// Compensates a forward action that succeeded after the saga was
    /// already rolled back.
    async fn undo_late_success(&self, event: &OutboxEvent, service: ServiceName) -> Result<()> {
        tracing::warn!(service = %service, "participant succeeded after rollback, compensating");
        let request = CompensateRequest::new(event.tx_id, event.order_id)
            .with_reason("reply arrived after rollback");
        let reply = self.client.compensate(service, request).await;

        let (tx_id, order_id) = (event.tx_id, event.order_id);
        let entry = if reply.success {
            TransactionLogEntry::new(tx_id, order_id, service, TransactionStatus::RolledBack)
        } else {
            let alert = RollbackFailureAlert::new(tx_id, order_id, service, &reply.message, 1);
            self.notifier.rollback_failure_alert(&alert).await;
            TransactionLogEntry::new(tx_id, order_id, service, TransactionStatus::RollbackFailed)
                .with_error(reply.message)
        };
        self.store.append(entry).await?;
        Ok(())
    }

    /// Polls until `shutdown` turns true or its sender is dropped.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval_ms = interval.as_millis() as u64, "outbox relay started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.poll_once().await {
                tracing::warn!(error = %e, "outbox poll failed");
            }
        }
        tracing::info!("outbox relay stopped");
    }

    /// Transaction IDs still waiting in the outbox.
    pub async fn pending_transactions(&self) -> Result<Vec<TxId>> {
        Ok(self
            .store
            .unprocessed_outbox_events(self.batch_size)
            .await?
            .into_iter()
            .map(|e| e.tx_id)
            .collect())
    }
}

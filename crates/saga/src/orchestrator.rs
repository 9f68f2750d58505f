//! Entry point of a saga.

use std::sync::Arc;

use common::TxId;
use domain::{DomainError, OrderConfirmation, SagaConfigService, SagaConfigStore};
use serde::{Deserialize, Serialize};
use transaction_log::{
    NewOutboxEvent, TransactionLogEntry, TransactionLogStore, TransactionStatus,
};

use crate::error::{Result, SagaError};
use crate::monitor::TransactionWatcher;
use crate::status::OverallStatus;

/// Reply to a confirmed order. Completion is asynchronous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedSaga {
    pub tx_id: TxId,
    pub status: OverallStatus,
}

/// Registers sagas and puts them under watch.
pub struct SagaOrchestrator<S, C, W> {
    store: S,
    config: Arc<SagaConfigService<C>>,
    watcher: Arc<W>,
}

impl<S, C, W> SagaOrchestrator<S, C, W>
where
    S: TransactionLogStore,
    C: SagaConfigStore,
    W: TransactionWatcher,
{
    pub fn new(store: S, config: Arc<SagaConfigService<C>>, watcher: Arc<W>) -> Self {
        Self {
            store,
            config,
            watcher,
        }
    }

    /// Starts a saga for a confirmed order.
    ///
    /// One PENDING entry per configured participant and the
    /// `ORDER_CONFIRMED` outbox event are written together; nothing is
    /// written if the order is invalid or the payload cannot be encoded.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.order_id))]
    pub async fn start(&self, order: &OrderConfirmation) -> Result<StartedSaga> {
        let started = std::time::Instant::now();
        order.validate().map_err(DomainError::from)?;

        let services = self.config.active_config().await?;
        if services.is_empty() {
            return Err(SagaError::NoParticipants);
        }
        let payload = serde_json::to_value(order)?;

        let tx_id = TxId::new();
        let order_id = order.order_id;
        let entries = services
            .iter()
            .map(|c| {
                TransactionLogEntry::new(tx_id, order_id, c.service_name, TransactionStatus::Pending)
            })
            .collect();
        let event_id = self
            .store
            .register_saga(entries, NewOutboxEvent::order_confirmed(tx_id, order_id, payload))
            .await?;

        let timeouts = services
            .iter()
            .map(|c| (c.service_name, c.timeout_seconds))
            .collect();
        self.watcher.watch(tx_id, order_id, timeouts)?;

        metrics::counter!("saga_started_total").increment(1);
        metrics::histogram!("saga_start_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(%tx_id, event_id, services = services.len(), "saga started");

        Ok(StartedSaga {
            tx_id,
            status: OverallStatus::Processing,
        })
    }
}

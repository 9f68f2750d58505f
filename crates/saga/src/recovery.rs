//! Re-attaches monitors to transactions left unfinished by a previous run.

use std::sync::Arc;

use domain::{SagaConfigService, SagaConfigStore, ServiceTimeouts, default_service_configs};
use transaction_log::TransactionLogStore;

use crate::error::Result;
use crate::monitor::TransactionWatcher;

pub struct RecoveryScanner<S, C, W> {
    store: S,
    config: Arc<SagaConfigService<C>>,
    watcher: Arc<W>,
}

impl<S, C, W> RecoveryScanner<S, C, W>
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

    /// Starts a monitor for every unfinished transaction that has none.
    ///
    /// Returns how many monitors were started. A transaction that cannot
    /// be re-attached is logged and skipped.
    #[tracing::instrument(skip(self))]
    pub async fn recover(&self) -> Result<usize> {
        let unfinished = self.store.find_unfinished().await?;
        if unfinished.is_empty() {
            tracing::info!("no unfinished transactions");
            return Ok(0);
        }
        let timeouts = self.timeouts().await;

        let mut recovered = 0;
        for tx in unfinished {
            if self.watcher.is_watching(tx.tx_id) {
                tracing::debug!(tx_id = %tx.tx_id, "already monitored");
                continue;
            }
            match self.watcher.watch(tx.tx_id, tx.order_id, timeouts.clone()) {
                Ok(true) => {
                    recovered += 1;
                    tracing::info!(tx_id = %tx.tx_id, order_id = %tx.order_id, "monitor re-attached");
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(tx_id = %tx.tx_id, error = %e, "could not recover transaction");
                }
            }
        }

        metrics::counter!("saga_recovered_total").increment(recovered as u64);
        tracing::info!(recovered, "recovery scan finished");
        Ok(recovered)
    }

    async fn timeouts(&self) -> ServiceTimeouts {
        match self.config.timeouts().await {
            Ok(timeouts) => timeouts,
            Err(e) => {
                tracing::warn!(error = %e, "active configuration unavailable, using defaults");
                default_service_configs()
                    .into_iter()
                    .map(|c| (c.service_name, c.timeout_seconds))
                    .collect()
            }
        }
    }
}

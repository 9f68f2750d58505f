use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use common::{OrderId, TxId};
use domain::ServiceTimeouts;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use transaction_log::TransactionLogStore;

use super::{MonitorConfig, TransactionMonitor};
use crate::error::{Result, SagaError};
use crate::rollback::Compensator;

/// Starts watching transactions. Implemented by [`MonitorManager`].
pub trait TransactionWatcher: Send + Sync {
    /// Starts a monitor unless one is already running for `tx_id`.
    /// Returns whether a new monitor was started.
    fn watch(&self, tx_id: TxId, order_id: OrderId, timeouts: ServiceTimeouts) -> Result<bool>;

    fn is_watching(&self, tx_id: TxId) -> bool;
}

struct MonitorHandle {
    /// Distinguishes this monitor from a later one for the same transaction.
    id: u64,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

type Registry = Arc<Mutex<Handles>>;

type Handles = HashMap<TxId, MonitorHandle>;

fn lock(registry: &Mutex<Handles>) -> MutexGuard<'_, Handles> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

fn publish_active(count: usize) {
    metrics::gauge!("saga_monitors_active").set(count as f64);
}

/// Registry of running monitors, at most one per transaction.
///
/// A monitor that finishes on its own removes itself. Stopping one from
/// outside removes it immediately and signals the task to exit.
pub struct MonitorManager<S, P> {
    store: S,
    compensator: Arc<P>,
    config: MonitorConfig,
    registry: Registry,
    next_id: AtomicU64,
}

impl<S, P> MonitorManager<S, P>
where
    S: TransactionLogStore + Clone + 'static,
    P: Compensator + 'static,
{
    pub fn new(store: S, compensator: Arc<P>, config: MonitorConfig) -> Self {
        Self {
            store,
            compensator,
            config,
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Spawns a monitor for `tx_id` on the current runtime unless one is
    /// already registered.
    pub fn start(&self, tx_id: TxId, order_id: OrderId, timeouts: ServiceTimeouts) -> Result<bool> {
        let runtime = Handle::try_current().map_err(|e| SagaError::MonitorUnavailable {
            tx_id,
            reason: e.to_string(),
        })?;

        let mut registry = lock(&self.registry);
        if registry.contains_key(&tx_id) {
            tracing::debug!(%tx_id, "monitor already running");
            return Ok(false);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (stop, stop_rx) = watch::channel(false);
        let monitor = TransactionMonitor {
            tx_id,
            order_id,
            timeouts,
            store: self.store.clone(),
            compensator: Arc::clone(&self.compensator),
            config: self.config,
        };
        let own_registry = Arc::clone(&self.registry);

        // the task cannot deregister before the insert below, it needs the lock
        let task = runtime.spawn(async move {
            monitor.run(stop_rx).await;
            let mut registry = lock(&own_registry);
            if registry.get(&tx_id).is_some_and(|handle| handle.id == id) {
                registry.remove(&tx_id);
            }
            publish_active(registry.len());
        });

        registry.insert(tx_id, MonitorHandle { id, stop, task });
        publish_active(registry.len());
        tracing::info!(%tx_id, %order_id, "monitor started");
        Ok(true)
    }

    /// Stops the monitor for `tx_id`. Returns whether one was running.
    pub fn stop(&self, tx_id: TxId) -> bool {
        let handle = {
            let mut registry = lock(&self.registry);
            let handle = registry.remove(&tx_id);
            publish_active(registry.len());
            handle
        };
        match handle {
            Some(handle) => {
                let _ = handle.stop.send(true);
                tracing::info!(%tx_id, "monitor stop requested");
                true
            }
            None => false,
        }
    }

    pub fn is_monitoring(&self, tx_id: TxId) -> bool {
        lock(&self.registry).contains_key(&tx_id)
    }

    pub fn active_count(&self) -> usize {
        lock(&self.registry).len()
    }

    pub fn active_transaction_ids(&self) -> Vec<TxId> {
        let mut ids: Vec<TxId> = lock(&self.registry).keys().copied().collect();
        ids.sort();
        ids
    }

    /// Signals every monitor, clears the registry and waits for the tasks
    /// to exit.
    pub async fn shutdown_all(&self) {
        let handles: Vec<(TxId, MonitorHandle)> = lock(&self.registry).drain().collect();
        publish_active(0);
        tracing::info!(monitors = handles.len(), "stopping all monitors");

        for (_, handle) in &handles {
            let _ = handle.stop.send(true);
        }
        for (tx_id, handle) in handles {
            if let Err(e) = handle.task.await
                && !e.is_cancelled()
            {
                tracing::warn!(%tx_id, error = %e, "monitor task ended abnormally");
            }
        }
    }
}

impl<S, P> TransactionWatcher for MonitorManager<S, P>
where
    S: TransactionLogStore + Clone + 'static,
    P: Compensator + 'static,
{
    fn watch(&self, tx_id: TxId, order_id: OrderId, timeouts: ServiceTimeouts) -> Result<bool> {
        self.start(tx_id, order_id, timeouts)
    }

    fn is_watching(&self, tx_id: TxId) -> bool {
        self.is_monitoring(tx_id)
    }
}

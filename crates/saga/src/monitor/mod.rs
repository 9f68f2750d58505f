//! Timeout and failure monitoring of in-flight transactions.
//!
//! Every transaction gets its own task that polls the log, runs
//! [`evaluate`] and either keeps waiting, stops, or hands the transaction
//! to a [`Compensator`] exactly once. A failure with nothing to compensate
//! still goes to the compensator, with an empty list, so the remaining
//! PENDING services are closed out.

mod manager;

pub use manager::{MonitorManager, TransactionWatcher};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{OrderId, ServiceName, TxId};
use domain::ServiceTimeouts;
use tokio::sync::watch;
use transaction_log::{
    TransactionLogEntry, TransactionLogStore, TransactionLogStoreExt, TransactionStatus,
};

use crate::rollback::Compensator;

/// Polling settings shared by all monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub check_interval: Duration,
    /// Used for services missing from the timeout map.
    pub default_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(1),
            default_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackReason {
    Timeout(ServiceName),
    Failure(ServiceName),
}

impl std::fmt::Display for RollbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RollbackReason::Timeout(service) => write!(f, "{service} timed out"),
            RollbackReason::Failure(service) => write!(f, "{service} failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    NothingToCompensate,
    RollbackComplete,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Completed => "completed",
            StopReason::NothingToCompensate => "nothing_to_compensate",
            StopReason::RollbackComplete => "rollback_complete",
        }
    }
}

/// What a monitor does after looking at the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorDecision {
    Continue,
    TriggerRollback {
        reason: RollbackReason,
        /// Services whose latest status is SUCCESS, in execution order.
        compensate: Vec<ServiceName>,
    },
    Stop(StopReason),
}

impl MonitorDecision {
    fn label(&self) -> &'static str {
        match self {
            MonitorDecision::Continue => "continue",
            MonitorDecision::TriggerRollback { .. } => "trigger_rollback",
            MonitorDecision::Stop(reason) => reason.as_str(),
        }
    }
}

/// Decides the next step from the latest entry per service.
///
/// Rules are checked in order: a timed-out PENDING service, a FAILED
/// service with something to compensate, a FAILED service with nothing to
/// compensate, all SUCCESS, all services settled after a rollback. An
/// empty log means the saga is not visible yet, so the monitor keeps
/// waiting.
pub fn evaluate(
    latest: &[TransactionLogEntry],
    timeouts: &ServiceTimeouts,
    default_timeout: Duration,
    now: DateTime<Utc>,
) -> MonitorDecision {
    if latest.is_empty() {
        return MonitorDecision::Continue;
    }

    let successful: Vec<ServiceName> = latest
        .iter()
        .filter(|e| e.status.is_success())
        .map(|e| e.service_name)
        .collect();

    for entry in latest.iter().filter(|e| e.status.is_pending()) {
        let timeout = match timeouts.get(&entry.service_name) {
            Some(&seconds) => Duration::from_secs(seconds),
            None => {
                tracing::warn!(
                    service = %entry.service_name,
                    default_secs = default_timeout.as_secs(),
                    "no timeout configured, using default"
                );
                default_timeout
            }
        };
        // negative elapsed (clock skew) never times out
        let elapsed = (now - entry.created_at).to_std().unwrap_or(Duration::ZERO);
        if elapsed > timeout {
            return MonitorDecision::TriggerRollback {
                reason: RollbackReason::Timeout(entry.service_name),
                compensate: successful,
            };
        }
    }

    if let Some(failed) = latest
        .iter()
        .find(|e| e.status == TransactionStatus::Failed)
    {
        return if successful.is_empty() {
            MonitorDecision::Stop(StopReason::NothingToCompensate)
        } else {
            MonitorDecision::TriggerRollback {
                reason: RollbackReason::Failure(failed.service_name),
                compensate: successful,
            }
        };
    }

    if successful.len() == latest.len() {
        return MonitorDecision::Stop(StopReason::Completed);
    }

    if latest
        .iter()
        .all(|e| e.status.is_success() || e.status.is_terminal())
    {
        return MonitorDecision::Stop(StopReason::RollbackComplete);
    }

    MonitorDecision::Continue
}

/// The polling loop of a single transaction.
struct TransactionMonitor<S, P> {
    tx_id: TxId,
    order_id: OrderId,
    timeouts: ServiceTimeouts,
    store: S,
    compensator: Arc<P>,
    config: MonitorConfig,
}

impl<S, P> TransactionMonitor<S, P>
where
    S: TransactionLogStore,
    P: Compensator,
{
    async fn run(self, mut stop: watch::Receiver<bool>) {
        let tx_id = self.tx_id;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.check_interval) => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        tracing::debug!(%tx_id, "monitor stopped");
                        return;
                    }
                }
            }
            if *stop.borrow() {
                return;
            }

            let latest = match self.store.latest_for_transaction(tx_id).await {
                Ok(latest) => latest,
                Err(e) => {
                    tracing::warn!(%tx_id, error = %e, "monitor poll failed, retrying next tick");
                    continue;
                }
            };

            let decision = evaluate(
                &latest,
                &self.timeouts,
                self.config.default_timeout,
                Utc::now(),
            );
            metrics::counter!("saga_monitor_decisions_total", "decision" => decision.label())
                .increment(1);

            match decision {
                MonitorDecision::Continue => {}
                MonitorDecision::Stop(StopReason::NothingToCompensate) => {
                    // Nothing to undo, but the services left PENDING still
                    // need closing out.
                    let outcome = self
                        .compensator
                        .rollback(tx_id, self.order_id, Vec::new())
                        .await;
                    tracing::info!(%tx_id, ?outcome, "monitor finished, nothing to compensate");
                    return;
                }
                MonitorDecision::Stop(reason) => {
                    tracing::info!(%tx_id, reason = reason.as_str(), "monitor finished");
                    return;
                }
                MonitorDecision::TriggerRollback { reason, compensate } => {
                    tracing::warn!(%tx_id, %reason, services = compensate.len(), "triggering rollback");
                    let outcome = self
                        .compensator
                        .rollback(tx_id, self.order_id, compensate)
                        .await;
                    tracing::info!(%tx_id, ?outcome, "monitor finished after rollback");
                    return;
                }
            }
        }
    }
}

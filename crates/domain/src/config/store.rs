use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ConfigError, ServiceConfig, default_service_configs};
use crate::Result;

/// Storage for the active and pending configuration generations.
#[async_trait]
pub trait SagaConfigStore: Send + Sync {
    async fn active(&self) -> Result<Vec<ServiceConfig>>;

    async fn pending(&self) -> Result<Option<Vec<ServiceConfig>>>;

    /// Replaces any previously staged configuration.
    async fn save_pending(&self, configs: Vec<ServiceConfig>) -> Result<()>;

    /// Promotes the pending generation to active and clears pending.
    ///
    /// Readers observe either the old or the new active list, never a mix.
    async fn activate_pending(&self) -> Result<Vec<ServiceConfig>>;

    /// Drops the pending generation. Returns whether there was one.
    async fn discard_pending(&self) -> Result<bool>;
}

#[derive(Debug)]
struct Generations {
    active: Vec<ServiceConfig>,
    pending: Option<Vec<ServiceConfig>>,
}

/// In-memory config store. Both generations sit behind one lock.
///
/// Staged and applied configuration lives only as long as the process; a
/// restart comes back up with the defaults even when the log is in Postgres.
#[derive(Debug, Clone)]
pub struct InMemorySagaConfigStore {
    generations: Arc<RwLock<Generations>>,
}

impl InMemorySagaConfigStore {
    /// Creates a store whose active generation is `active`.
    pub fn new(active: Vec<ServiceConfig>) -> Self {
        Self {
            generations: Arc::new(RwLock::new(Generations {
                active,
                pending: None,
            })),
        }
    }
}

impl Default for InMemorySagaConfigStore {
    fn default() -> Self {
        Self::new(default_service_configs())
    }
}

#[async_trait]
impl SagaConfigStore for InMemorySagaConfigStore {
    async fn active(&self) -> Result<Vec<ServiceConfig>> {
        Ok(self.generations.read().await.active.clone())
    }

    async fn pending(&self) -> Result<Option<Vec<ServiceConfig>>> {
        Ok(self.generations.read().await.pending.clone())
    }

    async fn save_pending(&self, configs: Vec<ServiceConfig>) -> Result<()> {
        self.generations.write().await.pending = Some(configs);
        Ok(())
    }

    async fn activate_pending(&self) -> Result<Vec<ServiceConfig>> {
        let mut generations = self.generations.write().await;
        let pending = generations
            .pending
            .take()
            .ok_or(ConfigError::NoPendingConfig)?;
        generations.active = pending.clone();
        Ok(pending)
    }

    async fn discard_pending(&self) -> Result<bool> {
        Ok(self.generations.write().await.pending.take().is_some())
    }
}

use common::ServiceName;

use super::{
    ServiceConfig, ServiceTimeouts, SagaConfigStore, sorted, validate_service_configs,
};
use crate::Result;

/// Read and edit participant configuration.
#[derive(Debug, Clone)]
pub struct SagaConfigService<C> {
    store: C,
}

impl<C: SagaConfigStore> SagaConfigService<C> {
    pub fn new(store: C) -> Self {
        Self { store }
    }

    /// Active configuration sorted by execution order.
    pub async fn active_config(&self) -> Result<Vec<ServiceConfig>> {
        Ok(sorted(self.store.active().await?))
    }

    pub async fn pending_config(&self) -> Result<Option<Vec<ServiceConfig>>> {
        Ok(self.store.pending().await?.map(sorted))
    }

    /// Validates and stages a configuration. Nothing is stored on error.
    #[tracing::instrument(skip(self, configs), fields(services = configs.len()))]
    pub async fn update_pending(&self, configs: Vec<ServiceConfig>) -> Result<()> {
        validate_service_configs(&configs)?;
        self.store.save_pending(configs).await?;
        tracing::info!("pending saga configuration staged");
        Ok(())
    }

    /// Makes the pending configuration active for all new sagas.
    #[tracing::instrument(skip(self))]
    pub async fn apply_pending(&self) -> Result<Vec<ServiceConfig>> {
        let applied = sorted(self.store.activate_pending().await?);
        metrics::counter!("saga_config_applied_total").increment(1);
        tracing::info!(services = applied.len(), "saga configuration applied");
        Ok(applied)
    }

    pub async fn discard_pending(&self) -> Result<bool> {
        let discarded = self.store.discard_pending().await?;
        if discarded {
            tracing::info!("pending saga configuration discarded");
        }
        Ok(discarded)
    }

    /// Active timeout per participant.
    pub async fn timeouts(&self) -> Result<ServiceTimeouts> {
        Ok(self
            .store
            .active()
            .await?
            .into_iter()
            .map(|c| (c.service_name, c.timeout_seconds))
            .collect())
    }

    /// Participants in active execution order.
    pub async fn service_order(&self) -> Result<Vec<ServiceName>> {
        Ok(self
            .active_config()
            .await?
            .into_iter()
            .map(|c| c.service_name)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConfigError, DomainError, InMemorySagaConfigStore};

    fn service() -> SagaConfigService<InMemorySagaConfigStore> {
        SagaConfigService::new(InMemorySagaConfigStore::default())
    }

    #[tokio::test]
    async fn active_config_defaults() {
        let service = service();
        assert_eq!(
            service.service_order().await.unwrap(),
            vec![
                ServiceName::CreditCard,
                ServiceName::Inventory,
                ServiceName::Logistics
            ]
        );
        let timeouts = service.timeouts().await.unwrap();
        assert_eq!(timeouts[&ServiceName::Logistics], 120);
        assert!(service.pending_config().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_update_leaves_pending_untouched() {
        let service = service();
        let result = service
            .update_pending(vec![ServiceConfig::new(1, ServiceName::CreditCard, 0)])
            .await;

        assert!(matches!(
            result,
            Err(DomainError::Config(ConfigError::InvalidTimeout { .. }))
        ));
        assert!(service.pending_config().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn apply_swaps_pending_into_active() {
        let service = service();
        service
            .update_pending(vec![
                ServiceConfig::new(2, ServiceName::CreditCard, 10),
                ServiceConfig::new(1, ServiceName::Inventory, 20),
            ])
            .await
            .unwrap();

        // staged edits do not affect the active generation
        assert_eq!(service.active_config().await.unwrap().len(), 3);

        let applied = service.apply_pending().await.unwrap();
        assert_eq!(applied[0].service_name, ServiceName::Inventory);
        assert_eq!(
            service.service_order().await.unwrap(),
            vec![ServiceName::Inventory, ServiceName::CreditCard]
        );
        assert!(service.pending_config().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn apply_without_pending_fails() {
        let service = service();
        let result = service.apply_pending().await;
        assert!(matches!(
            result,
            Err(DomainError::Config(ConfigError::NoPendingConfig))
        ));
    }

    #[tokio::test]
    async fn discard_clears_pending() {
        let service = service();
        service
            .update_pending(vec![ServiceConfig::new(1, ServiceName::Logistics, 5)])
            .await
            .unwrap();

        assert!(service.discard_pending().await.unwrap());
        assert!(!service.discard_pending().await.unwrap());
        assert!(service.pending_config().await.unwrap().is_none());
    }
}

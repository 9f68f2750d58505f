//! Participant configuration: execution order and per-service timeouts.
//!
//! Two generations exist. The *active* list is what new sagas use; the
//! *pending* list holds staged edits until they are applied, at which point
//! the pending list replaces the active one in a single swap.

mod service;
mod store;

pub use service::SagaConfigService;
pub use store::{InMemorySagaConfigStore, SagaConfigStore};

use std::collections::{HashMap, HashSet};

use common::ServiceName;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timeout in seconds per participant.
pub type ServiceTimeouts = HashMap<ServiceName, u64>;

/// Position and timeout of one participant in the saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// 1-based execution position.
    pub order: u32,
    pub service_name: ServiceName,
    pub timeout_seconds: u64,
}

impl ServiceConfig {
    pub fn new(order: u32, service_name: ServiceName, timeout_seconds: u64) -> Self {
        Self {
            order,
            service_name,
            timeout_seconds,
        }
    }
}

/// Errors raised while validating or applying participant configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Configuration must contain at least one service")]
    Empty,

    #[error("Invalid order {order} for {service}: must be at least 1")]
    InvalidOrder { service: ServiceName, order: u32 },

    #[error("Duplicate service order: {0}")]
    DuplicateOrder(u32),

    #[error("Duplicate service: {0}")]
    DuplicateService(ServiceName),

    #[error("Invalid timeout for {service}: must be positive")]
    InvalidTimeout { service: ServiceName },

    #[error("No pending configuration to apply")]
    NoPendingConfig,
}

/// Validates a whole configuration batch. The first violation rejects it.
pub fn validate_service_configs(configs: &[ServiceConfig]) -> Result<(), ConfigError> {
    if configs.is_empty() {
        return Err(ConfigError::Empty);
    }

    let mut orders = HashSet::new();
    let mut services = HashSet::new();
    for config in configs {
        if config.order < 1 {
            return Err(ConfigError::InvalidOrder {
                service: config.service_name,
                order: config.order,
            });
        }
        if !orders.insert(config.order) {
            return Err(ConfigError::DuplicateOrder(config.order));
        }
        if !services.insert(config.service_name) {
            return Err(ConfigError::DuplicateService(config.service_name));
        }
        if config.timeout_seconds == 0 {
            return Err(ConfigError::InvalidTimeout {
                service: config.service_name,
            });
        }
    }
    Ok(())
}

/// Configuration used until an operator applies something else.
pub fn default_service_configs() -> Vec<ServiceConfig> {
    vec![
        ServiceConfig::new(1, ServiceName::CreditCard, 30),
        ServiceConfig::new(2, ServiceName::Inventory, 60),
        ServiceConfig::new(3, ServiceName::Logistics, 120),
    ]
}

pub(crate) fn sorted(mut configs: Vec<ServiceConfig>) -> Vec<ServiceConfig> {
    configs.sort_by_key(|c| c.order);
    configs
}

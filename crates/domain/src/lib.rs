//! Domain layer for the saga orchestrator.
//!
//! This crate provides:
//! - The order confirmation that starts a saga, with its value objects
//! - Participant configuration (execution order and timeouts) with
//!   validation and an active/pending two-generation store

pub mod config;
pub mod error;
pub mod order;

pub use config::{
    ConfigError, InMemorySagaConfigStore, SagaConfigService, SagaConfigStore, ServiceConfig,
    ServiceTimeouts, default_service_configs, validate_service_configs,
};
pub use error::{DomainError, Result};
pub use order::{Money, OrderConfirmation, OrderError, OrderItem, ProductId};

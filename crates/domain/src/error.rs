//! Domain error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::order::OrderError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The order confirmation is invalid.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// The participant configuration is invalid or cannot be applied.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;

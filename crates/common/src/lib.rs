//! Shared types used across the saga orchestrator crates.

pub mod service;
pub mod types;

pub use service::{ParseServiceNameError, ServiceName};
pub use types::{OrderId, TxId};

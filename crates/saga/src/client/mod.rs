//! Participant port and the resilient client that guards it.
//!
//! [`Participant`] is the raw command/response contract of one service:
//! `Err` means the call itself failed (connection refused, timeout) while a
//! reply with `success == false` is a business decline. [`ServiceClient`]
//! is what the saga uses; it never fails, every problem becomes a failure
//! reply.

mod bulkhead;
mod circuit_breaker;
mod resilient;
mod retry;

pub use bulkhead::{Bulkhead, BulkheadConfig};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use resilient::{ResilienceConfig, ResilientServiceClient, ResilientServiceClientBuilder};
pub use retry::RetryPolicy;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ServiceName, TxId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Forward action request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    pub tx_id: TxId,
    pub order_id: OrderId,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl NotifyRequest {
    pub fn new(tx_id: TxId, order_id: OrderId, payload: serde_json::Value) -> Self {
        Self {
            tx_id,
            order_id,
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Forward action reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyResponse {
    pub success: bool,
    pub message: String,
    /// Participant-side ID of the performed action (payment, reservation...).
    pub participant_reference: Option<String>,
}

impl NotifyResponse {
    pub fn success(message: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            participant_reference: Some(reference.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            participant_reference: None,
        }
    }
}

/// Compensating action request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensateRequest {
    pub tx_id: TxId,
    pub order_id: OrderId,
    pub participant_reference: Option<String>,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CompensateRequest {
    pub fn new(tx_id: TxId, order_id: OrderId) -> Self {
        Self {
            tx_id,
            order_id,
            participant_reference: None,
            reason: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Compensating action reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensateResponse {
    pub success: bool,
    pub message: String,
}

impl CompensateResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Transport-level failure of a participant call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParticipantError {
    #[error("connection failed: {0}")]
    Unreachable(String),

    #[error("no reply within {0:?}")]
    Timeout(Duration),
}

/// One saga participant.
///
/// `compensate` must succeed when there is nothing to undo: the action never
/// happened, was already compensated, or was just compensated.
#[async_trait]
pub trait Participant: Send + Sync {
    fn service_name(&self) -> ServiceName;

    async fn notify(&self, request: &NotifyRequest) -> Result<NotifyResponse, ParticipantError>;

    async fn compensate(
        &self,
        request: &CompensateRequest,
    ) -> Result<CompensateResponse, ParticipantError>;
}

/// Saga-facing client for calling participants by name.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    async fn notify(&self, service: ServiceName, request: NotifyRequest) -> NotifyResponse;

    async fn compensate(
        &self,
        service: ServiceName,
        request: CompensateRequest,
    ) -> CompensateResponse;
}

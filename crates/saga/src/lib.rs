//! Saga orchestration for order confirmation.
//!
//! A saga charges the credit card, reserves inventory and schedules
//! shipment. Each participant's progress is an append-only row in the
//! transaction log. This crate provides:
//!
//! - [`SagaOrchestrator`] registers a saga and its outbox event atomically
//!   and starts a monitor for it
//! - [`MonitorManager`] runs one watcher task per in-flight transaction that
//!   detects timeouts and failures
//! - [`RollbackEngine`] compensates successful participants in reverse order
//! - [`ResilientServiceClient`] wraps every participant in its own circuit
//!   breaker, bulkhead and retry policy
//! - [`RecoveryScanner`] re-attaches monitors after a restart
//! - [`OutboxRelay`] and [`ResponseHandler`] bind the saga to participants

pub mod client;
pub mod error;
pub mod message;
pub mod monitor;
pub mod notification;
pub mod orchestrator;
pub mod participants;
pub mod recovery;
pub mod relay;
pub mod response;
pub mod rollback;
pub mod status;

pub use client::{
    Bulkhead, BulkheadConfig, CircuitBreaker, CircuitBreakerConfig, CircuitState,
    CompensateRequest, CompensateResponse, NotifyRequest, NotifyResponse, Participant,
    ParticipantError, ResilienceConfig, ResilientServiceClient, RetryPolicy, ServiceClient,
};
pub use error::{Result, SagaError};
pub use message::{MessageType, Phase, SagaMessage};
pub use monitor::{
    MonitorConfig, MonitorDecision, MonitorManager, RollbackReason, StopReason,
    TransactionWatcher, evaluate,
};
pub use notification::{
    Notification, Notifier, RecordingNotifier, RollbackFailureAlert, TracingNotifier,
};
pub use orchestrator::{SagaOrchestrator, StartedSaga};
pub use participants::{
    InMemoryCreditCardService, InMemoryInventoryService, InMemoryLogisticsService,
};
pub use recovery::RecoveryScanner;
pub use relay::{DispatchOutcome, OutboxRelay};
pub use response::{ReplyOutcome, ResponseHandler};
pub use rollback::{Compensator, RollbackConfig, RollbackEngine, RollbackOutcome};
pub use status::{
    OrderTransactionHistory, OverallStatus, ServiceStatusView, TransactionQuery,
    TransactionStatusView,
};

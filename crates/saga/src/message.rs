//! Envelope for commands and replies exchanged with participants over an
//! asynchronous transport.

use chrono::{DateTime, Utc};
use common::{OrderId, ServiceName, TxId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    ExecuteCommand,
    RollbackCommand,
    ExecuteSuccess,
    ExecuteFailure,
    RollbackSuccess,
    RollbackFailure,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::ExecuteCommand => "EXECUTE_COMMAND",
            MessageType::RollbackCommand => "ROLLBACK_COMMAND",
            MessageType::ExecuteSuccess => "EXECUTE_SUCCESS",
            MessageType::ExecuteFailure => "EXECUTE_FAILURE",
            MessageType::RollbackSuccess => "ROLLBACK_SUCCESS",
            MessageType::RollbackFailure => "ROLLBACK_FAILURE",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which half of the saga a reply belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Execute,
    Rollback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaMessage {
    pub tx_id: TxId,
    pub order_id: OrderId,
    pub service_name: ServiceName,
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_reference: Option<String>,
    /// Failure reason, or the participant's message on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Always the transaction ID.
    pub correlation_id: TxId,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
}

impl SagaMessage {
    fn new(
        tx_id: TxId,
        order_id: OrderId,
        service_name: ServiceName,
        message_type: MessageType,
    ) -> Self {
        Self {
            tx_id,
            order_id,
            service_name,
            message_type,
            payload: None,
            participant_reference: None,
            error_message: None,
            error_code: None,
            timestamp: Utc::now(),
            correlation_id: tx_id,
            retry_count: 0,
            processing_time_ms: None,
        }
    }

    pub fn execute_command(
        tx_id: TxId,
        order_id: OrderId,
        service_name: ServiceName,
        payload: serde_json::Value,
    ) -> Self {
        let mut message = Self::new(tx_id, order_id, service_name, MessageType::ExecuteCommand);
        message.payload = Some(payload);
        message
    }

    pub fn rollback_command(
        tx_id: TxId,
        order_id: OrderId,
        service_name: ServiceName,
        participant_reference: Option<String>,
    ) -> Self {
        let mut message = Self::new(tx_id, order_id, service_name, MessageType::RollbackCommand);
        message.participant_reference = participant_reference;
        message
    }

    pub fn success_response(
        tx_id: TxId,
        order_id: OrderId,
        service_name: ServiceName,
        phase: Phase,
        participant_reference: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        let message_type = match phase {
            Phase::Execute => MessageType::ExecuteSuccess,
            Phase::Rollback => MessageType::RollbackSuccess,
        };
        let mut reply = Self::new(tx_id, order_id, service_name, message_type);
        reply.participant_reference = participant_reference;
        reply.error_message = Some(message.into());
        reply
    }

    pub fn failure_response(
        tx_id: TxId,
        order_id: OrderId,
        service_name: ServiceName,
        phase: Phase,
        error_message: impl Into<String>,
        error_code: Option<String>,
    ) -> Self {
        let message_type = match phase {
            Phase::Execute => MessageType::ExecuteFailure,
            Phase::Rollback => MessageType::RollbackFailure,
        };
        let mut reply = Self::new(tx_id, order_id, service_name, message_type);
        reply.error_message = Some(error_message.into());
        reply.error_code = error_code;
        reply
    }

    pub fn with_processing_time(mut self, millis: u64) -> Self {
        self.processing_time_ms = Some(millis);
        self
    }

    pub fn is_command(&self) -> bool {
        matches!(
            self.message_type,
            MessageType::ExecuteCommand | MessageType::RollbackCommand
        )
    }

    pub fn is_response(&self) -> bool {
        !self.is_command()
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.message_type,
            MessageType::ExecuteSuccess | MessageType::RollbackSuccess
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self.message_type,
            MessageType::ExecuteFailure | MessageType::RollbackFailure
        )
    }

    pub fn is_rollback(&self) -> bool {
        matches!(
            self.message_type,
            MessageType::RollbackCommand
                | MessageType::RollbackSuccess
                | MessageType::RollbackFailure
        )
    }

    pub fn is_execute(&self) -> bool {
        !self.is_rollback()
    }

    /// Transport key. All messages of one order share a partition so they
    /// stay ordered.
    pub fn partition_key(&self) -> String {
        self.order_id.to_string()
    }
}

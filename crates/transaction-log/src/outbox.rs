use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{OrderId, TxId};

/// Event type written when an order confirmation starts a saga.
pub const ORDER_CONFIRMED: &str = "ORDER_CONFIRMED";

/// An event waiting to be relayed to participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: i64,
    pub tx_id: TxId,
    pub order_id: OrderId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Outbox event before the store has assigned it an ID.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOutboxEvent {
    pub tx_id: TxId,
    pub order_id: OrderId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl NewOutboxEvent {
    pub fn new(
        tx_id: TxId,
        order_id: OrderId,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            tx_id,
            order_id,
            event_type: event_type.into(),
            payload,
            created_at: Utc::now(),
        }
    }

    /// The saga start event.
    pub fn order_confirmed(tx_id: TxId, order_id: OrderId, payload: serde_json::Value) -> Self {
        Self::new(tx_id, order_id, ORDER_CONFIRMED, payload)
    }

    pub(crate) fn into_event(self, id: i64) -> OutboxEvent {
        OutboxEvent {
            id,
            tx_id: self.tx_id,
            order_id: self.order_id,
            event_type: self.event_type,
            payload: self.payload,
            processed: false,
            created_at: self.created_at,
            processed_at: None,
        }
    }
}

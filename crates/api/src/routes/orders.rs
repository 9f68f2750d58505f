//! Order confirmation and per-order history.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::OrderId;
use domain::{Money, OrderConfirmation, OrderItem};
use saga::{OrderTransactionHistory, StartedSaga};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::{AppState, SagaStore};

/// Body of `POST /api/v1/orders/confirm`.
///
/// `totalAmount` is optional; when present it must match the item total.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmOrderRequest {
    pub order_id: OrderId,
    pub user_id: String,
    pub items: Vec<OrderItem>,
    pub total_amount: Option<Money>,
    pub credit_card_number: String,
}

impl From<ConfirmOrderRequest> for OrderConfirmation {
    fn from(req: ConfirmOrderRequest) -> Self {
        let mut order =
            OrderConfirmation::new(req.order_id, req.user_id, req.items, req.credit_card_number);
        if let Some(total) = req.total_amount {
            order.total_amount = total;
        }
        order
    }
}

/// POST /api/v1/orders/confirm — starts a saga; completion is asynchronous.
#[tracing::instrument(skip(state, req), fields(order_id = %req.order_id))]
pub async fn confirm<S: SagaStore>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<ConfirmOrderRequest>,
) -> Result<(StatusCode, Json<StartedSaga>), ApiError> {
    let order = OrderConfirmation::from(req);
    let started = state.orchestrator.start(&order).await?;
    Ok((StatusCode::ACCEPTED, Json(started)))
}

/// GET /api/v1/orders/{order_id}/transactions — every saga of an order,
/// newest first.
#[tracing::instrument(skip(state))]
pub async fn transactions<S: SagaStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderTransactionHistory>, ApiError> {
    let history = state.query.order_history(OrderId::from_uuid(order_id)).await?;
    Ok(Json(history))
}

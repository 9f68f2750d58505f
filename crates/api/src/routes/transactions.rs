//! Transaction status lookup.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::TxId;
use saga::TransactionStatusView;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::{AppState, SagaStore};

/// GET /api/v1/transactions/{tx_id}
#[tracing::instrument(skip(state))]
pub async fn get<S: SagaStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(tx_id): Path<Uuid>,
) -> Result<Json<TransactionStatusView>, ApiError> {
    state
        .query
        .status(TxId::from_uuid(tx_id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Transaction {tx_id} not found")))
}

//! Participant configuration and monitor inspection.
//!
//! Configuration edits are staged as a pending generation and only take
//! effect for new sagas once applied.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::TxId;
use domain::ServiceConfig;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::{AppState, SagaStore};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorsResponse {
    pub count: usize,
    pub tx_ids: Vec<TxId>,
}

/// GET /api/v1/admin/config/active
pub async fn active_config<S: SagaStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<ServiceConfig>>, ApiError> {
    Ok(Json(state.config_service.active_config().await?))
}

/// GET /api/v1/admin/config/pending — 404 when nothing is staged.
pub async fn pending_config<S: SagaStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<ServiceConfig>>, ApiError> {
    state
        .config_service
        .pending_config()
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No pending configuration".to_string()))
}

/// PUT /api/v1/admin/config/pending — validates and stages a configuration.
#[tracing::instrument(skip(state, configs))]
pub async fn update_pending<S: SagaStore>(
    State(state): State<Arc<AppState<S>>>,
    Json(configs): Json<Vec<ServiceConfig>>,
) -> Result<Json<Vec<ServiceConfig>>, ApiError> {
    state.config_service.update_pending(configs).await?;
    let staged = state.config_service.pending_config().await?.unwrap_or_default();
    Ok(Json(staged))
}

/// DELETE /api/v1/admin/config/pending
pub async fn discard_pending<S: SagaStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<StatusCode, ApiError> {
    if state.config_service.discard_pending().await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("No pending configuration".to_string()))
    }
}

/// POST /api/v1/admin/config/apply — promotes the pending configuration.
#[tracing::instrument(skip(state))]
pub async fn apply_pending<S: SagaStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<ServiceConfig>>, ApiError> {
    Ok(Json(state.config_service.apply_pending().await?))
}

/// GET /api/v1/admin/monitors
pub async fn monitors<S: SagaStore>(State(state): State<Arc<AppState<S>>>) -> Json<MonitorsResponse> {
    let tx_ids = state.monitors.active_transaction_ids();
    Json(MonitorsResponse {
        count: tx_ids.len(),
        tx_ids,
    })
}

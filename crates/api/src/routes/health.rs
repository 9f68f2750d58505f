//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::{AppState, SagaStore};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_monitors: usize,
}

/// GET /health — liveness plus the number of transactions being watched.
pub async fn check<S: SagaStore>(State(state): State<Arc<AppState<S>>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_monitors: state.monitors.active_count(),
    })
}

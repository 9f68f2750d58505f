//! HTTP API server for the order confirmation saga.
//!
//! Exposes order confirmation, transaction status, participant reply, admin
//! configuration and monitor inspection endpoints, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, SagaStore, create_default_state};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: SagaStore>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/api/v1/orders/confirm", post(routes::orders::confirm::<S>))
        .route(
            "/api/v1/orders/{order_id}/transactions",
            get(routes::orders::transactions::<S>),
        )
        .route(
            "/api/v1/transactions/{tx_id}",
            get(routes::transactions::get::<S>),
        )
        .route(
            "/api/v1/participants/replies",
            post(routes::participants::reply::<S>),
        )
        .route(
            "/api/v1/admin/config/active",
            get(routes::admin::active_config::<S>),
        )
        .route(
            "/api/v1/admin/config/pending",
            get(routes::admin::pending_config::<S>)
                .put(routes::admin::update_pending::<S>)
                .delete(routes::admin::discard_pending::<S>),
        )
        .route(
            "/api/v1/admin/config/apply",
            post(routes::admin::apply_pending::<S>),
        )
        .route("/api/v1/admin/monitors", get(routes::admin::monitors::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

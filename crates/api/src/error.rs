//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{ConfigError, DomainError};
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Saga(#[from] SagaError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Domain(err) | ApiError::Saga(SagaError::Domain(err)) => domain_status(err),
            ApiError::Saga(SagaError::UnexpectedMessage { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Saga(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Order(_) => StatusCode::BAD_REQUEST,
        DomainError::Config(ConfigError::NoPendingConfig) => StatusCode::CONFLICT,
        DomainError::Config(_) => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use domain::OrderError;

    use super::*;

    #[test]
    fn validation_errors_are_bad_requests() {
        let err = ApiError::from(SagaError::Domain(DomainError::Order(OrderError::NoItems)));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_pending_config_is_a_conflict() {
        let err = ApiError::from(DomainError::Config(ConfigError::NoPendingConfig));
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn commands_posted_as_replies_are_bad_requests() {
        let err = ApiError::from(SagaError::UnexpectedMessage {
            tx_id: common::TxId::new(),
            message_type: saga::MessageType::ExecuteCommand,
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn other_saga_errors_are_internal() {
        assert_eq!(
            ApiError::from(SagaError::NoParticipants).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

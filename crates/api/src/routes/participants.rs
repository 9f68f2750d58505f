//! Inbound participant replies for asynchronous transports.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use saga::{CompensateRequest, Phase, ReplyOutcome, SagaMessage, ServiceClient};
use serde::Serialize;
use transaction_log::TransactionStatus;

use crate::error::ApiError;
use crate::state::{AppState, SagaStore};

/// What the endpoint did with a reply.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyReceipt {
    /// True when the reply itself was written to the log.
    pub recorded: bool,
    /// Status appended for the service, if any.
    pub status: Option<TransactionStatus>,
}

/// POST /api/v1/participants/replies — records a participant reply.
///
/// A success for a service that was already rolled back or closed out is
/// compensated straight away and the outcome of that rollback is recorded
/// instead.
#[tracing::instrument(skip(state, message), fields(tx_id = %message.tx_id, service = %message.service_name))]
pub async fn reply<S: SagaStore>(
    State(state): State<Arc<AppState<S>>>,
    Json(message): Json<SagaMessage>,
) -> Result<(StatusCode, Json<ReplyReceipt>), ApiError> {
    match state.responses.handle(&message).await? {
        ReplyOutcome::Recorded(status) => Ok((
            StatusCode::ACCEPTED,
            Json(ReplyReceipt {
                recorded: true,
                status: Some(status),
            }),
        )),
        ReplyOutcome::Stale { rollback: None } => Ok((
            StatusCode::OK,
            Json(ReplyReceipt {
                recorded: false,
                status: None,
            }),
        )),
        ReplyOutcome::Stale {
            rollback: Some(command),
        } => {
            let status = undo_late_success(&state, command).await?;
            Ok((
                StatusCode::OK,
                Json(ReplyReceipt {
                    recorded: false,
                    status,
                }),
            ))
        }
    }
}

async fn undo_late_success<S: SagaStore>(
    state: &AppState<S>,
    command: SagaMessage,
) -> Result<Option<TransactionStatus>, ApiError> {
    let mut request = CompensateRequest::new(command.tx_id, command.order_id)
        .with_reason("reply arrived after rollback");
    request.participant_reference = command.participant_reference.clone();
    let reply = state.client.compensate(command.service_name, request).await;

    let outcome = if reply.success {
        SagaMessage::success_response(
            command.tx_id,
            command.order_id,
            command.service_name,
            Phase::Rollback,
            command.participant_reference,
            reply.message,
        )
    } else {
        tracing::error!(error = %reply.message, "late success could not be compensated");
        SagaMessage::failure_response(
            command.tx_id,
            command.order_id,
            command.service_name,
            Phase::Rollback,
            reply.message,
            None,
        )
    };

    Ok(match state.responses.handle(&outcome).await? {
        ReplyOutcome::Recorded(status) => Some(status),
        ReplyOutcome::Stale { .. } => None,
    })
}

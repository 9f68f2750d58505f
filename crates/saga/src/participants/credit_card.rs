use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{ServiceName, TxId};
use domain::Money;

use super::{Faults, parse_order, read, write};
use crate::client::{
    CompensateRequest, CompensateResponse, NotifyRequest, NotifyResponse, Participant,
    ParticipantError,
};

#[derive(Debug, Clone)]
struct Payment {
    reference: String,
    amount: Money,
    refunded: bool,
}

#[derive(Debug, Default)]
struct CreditCardState {
    payments: HashMap<TxId, Payment>,
    next_id: u32,
    decline: bool,
    refunds: usize,
    faults: Faults,
}

/// In-memory card processor.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCreditCardService {
    state: Arc<RwLock<CreditCardState>>,
}

impl InMemoryCreditCardService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declines every new charge.
    pub fn set_decline(&self, decline: bool) {
        write(&self.state).decline = decline;
    }

    /// Rejects every refund with a failure reply.
    pub fn set_fail_on_compensate(&self, fail: bool) {
        write(&self.state).faults.fail_on_compensate = fail;
    }

    /// Fails every call at the transport level.
    pub fn set_unreachable(&self, unreachable: bool) {
        write(&self.state).faults.unreachable = unreachable;
    }

    /// Charges that have not been refunded.
    pub fn payment_count(&self) -> usize {
        read(&self.state)
            .payments
            .values()
            .filter(|p| !p.refunded)
            .count()
    }

    /// Amount charged for a transaction, refunded or not.
    pub fn charged_amount(&self, tx_id: TxId) -> Option<Money> {
        read(&self.state).payments.get(&tx_id).map(|p| p.amount)
    }

    /// Refunds actually performed.
    pub fn refund_count(&self) -> usize {
        read(&self.state).refunds
    }

    pub fn notify_calls(&self) -> usize {
        read(&self.state).faults.notify_calls
    }

    pub fn compensate_calls(&self) -> usize {
        read(&self.state).faults.compensate_calls
    }
}

#[async_trait]
impl Participant for InMemoryCreditCardService {
    fn service_name(&self) -> ServiceName {
        ServiceName::CreditCard
    }

    async fn notify(&self, request: &NotifyRequest) -> Result<NotifyResponse, ParticipantError> {
        let mut state = write(&self.state);
        state.faults.on_notify("credit card gateway")?;

        if let Some(existing) = state.payments.get(&request.tx_id) {
            return Ok(NotifyResponse::success(
                "Payment already processed",
                existing.reference.clone(),
            ));
        }
        if state.decline {
            return Ok(NotifyResponse::failure("Payment declined"));
        }
        let order = match parse_order(request) {
            Ok(order) => order,
            Err(message) => return Ok(NotifyResponse::failure(message)),
        };

        state.next_id += 1;
        let reference = format!("PAY-{:04}", state.next_id);
        state.payments.insert(
            request.tx_id,
            Payment {
                reference: reference.clone(),
                amount: order.total_amount,
                refunded: false,
            },
        );
        tracing::debug!(tx_id = %request.tx_id, amount = %order.total_amount, card = %order.masked_card(), "payment captured");

        Ok(NotifyResponse::success("Payment processed", reference))
    }

    async fn compensate(
        &self,
        request: &CompensateRequest,
    ) -> Result<CompensateResponse, ParticipantError> {
        let mut state = write(&self.state);
        state.faults.on_compensate("credit card gateway")?;

        if state.faults.fail_on_compensate {
            return Ok(CompensateResponse::failure("Refund rejected by gateway"));
        }
        let refunded = match state.payments.get_mut(&request.tx_id) {
            None => return Ok(CompensateResponse::success("No payment to rollback")),
            Some(payment) if payment.refunded => {
                return Ok(CompensateResponse::success("Payment already refunded"));
            }
            Some(payment) => {
                payment.refunded = true;
                payment.amount
            }
        };
        state.refunds += 1;

        Ok(CompensateResponse::success(format!("Refunded {refunded}")))
    }
}

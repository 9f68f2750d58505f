use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{ServiceName, TxId};

use super::{Faults, parse_order, read, write};
use crate::client::{
    CompensateRequest, CompensateResponse, NotifyRequest, NotifyResponse, Participant,
    ParticipantError,
};

#[derive(Debug, Clone)]
struct Shipment {
    tracking_number: String,
    units: u32,
    cancelled: bool,
}

#[derive(Debug, Default)]
struct LogisticsState {
    shipments: HashMap<TxId, Shipment>,
    next_id: u32,
    decline: bool,
    faults: Faults,
}

/// In-memory shipment scheduler.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLogisticsService {
    state: Arc<RwLock<LogisticsState>>,
}

impl InMemoryLogisticsService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declines every new shipment.
    pub fn set_decline(&self, decline: bool) {
        write(&self.state).decline = decline;
    }

    pub fn set_fail_on_compensate(&self, fail: bool) {
        write(&self.state).faults.fail_on_compensate = fail;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        write(&self.state).faults.unreachable = unreachable;
    }

    /// Shipments that have not been cancelled.
    pub fn shipment_count(&self) -> usize {
        read(&self.state)
            .shipments
            .values()
            .filter(|s| !s.cancelled)
            .count()
    }

    pub fn tracking_number(&self, tx_id: TxId) -> Option<String> {
        read(&self.state)
            .shipments
            .get(&tx_id)
            .map(|s| s.tracking_number.clone())
    }

    pub fn notify_calls(&self) -> usize {
        read(&self.state).faults.notify_calls
    }

    pub fn compensate_calls(&self) -> usize {
        read(&self.state).faults.compensate_calls
    }
}

#[async_trait]
impl Participant for InMemoryLogisticsService {
    fn service_name(&self) -> ServiceName {
        ServiceName::Logistics
    }

    async fn notify(&self, request: &NotifyRequest) -> Result<NotifyResponse, ParticipantError> {
        let mut state = write(&self.state);
        state.faults.on_notify("logistics service")?;

        if let Some(existing) = state.shipments.get(&request.tx_id) {
            return Ok(NotifyResponse::success(
                "Shipment already scheduled",
                existing.tracking_number.clone(),
            ));
        }
        if state.decline {
            return Ok(NotifyResponse::failure("No carrier available"));
        }
        let order = match parse_order(request) {
            Ok(order) => order,
            Err(message) => return Ok(NotifyResponse::failure(message)),
        };

        state.next_id += 1;
        let tracking_number = format!("TRK-{:04}", state.next_id);
        state.shipments.insert(
            request.tx_id,
            Shipment {
                tracking_number: tracking_number.clone(),
                units: order.total_quantity(),
                cancelled: false,
            },
        );

        Ok(NotifyResponse::success("Shipment scheduled", tracking_number))
    }

    async fn compensate(
        &self,
        request: &CompensateRequest,
    ) -> Result<CompensateResponse, ParticipantError> {
        let mut state = write(&self.state);
        state.faults.on_compensate("logistics service")?;

        if state.faults.fail_on_compensate {
            return Ok(CompensateResponse::failure("Carrier refused cancellation"));
        }
        match state.shipments.get_mut(&request.tx_id) {
            None => Ok(CompensateResponse::success("No shipment to cancel")),
            Some(shipment) if shipment.cancelled => {
                Ok(CompensateResponse::success("Shipment already cancelled"))
            }
            Some(shipment) => {
                shipment.cancelled = true;
                Ok(CompensateResponse::success(format!(
                    "Shipment {} cancelled ({} units)",
                    shipment.tracking_number, shipment.units
                )))
            }
        }
    }
}

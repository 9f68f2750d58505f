use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{ServiceName, TxId};
use domain::ProductId;

use super::{Faults, parse_order, read, write};
use crate::client::{
    CompensateRequest, CompensateResponse, NotifyRequest, NotifyResponse, Participant,
    ParticipantError,
};

#[derive(Debug, Clone)]
struct Reservation {
    reference: String,
    items: Vec<(ProductId, u32)>,
    released: bool,
}

#[derive(Debug, Default)]
struct InventoryState {
    /// Units on hand per SKU. SKUs without an entry are unlimited.
    stock: HashMap<ProductId, u32>,
    reservations: HashMap<TxId, Reservation>,
    next_id: u32,
    faults: Faults,
}

/// In-memory stock keeper.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryService {
    state: Arc<RwLock<InventoryState>>,
}

impl InMemoryInventoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the units on hand for a SKU.
    pub fn set_stock(&self, sku: impl Into<ProductId>, units: u32) {
        write(&self.state).stock.insert(sku.into(), units);
    }

    pub fn stock(&self, sku: &ProductId) -> Option<u32> {
        read(&self.state).stock.get(sku).copied()
    }

    pub fn set_fail_on_compensate(&self, fail: bool) {
        write(&self.state).faults.fail_on_compensate = fail;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        write(&self.state).faults.unreachable = unreachable;
    }

    /// Reservations that have not been released.
    pub fn reservation_count(&self) -> usize {
        read(&self.state)
            .reservations
            .values()
            .filter(|r| !r.released)
            .count()
    }

    pub fn notify_calls(&self) -> usize {
        read(&self.state).faults.notify_calls
    }

    pub fn compensate_calls(&self) -> usize {
        read(&self.state).faults.compensate_calls
    }
}

#[async_trait]
impl Participant for InMemoryInventoryService {
    fn service_name(&self) -> ServiceName {
        ServiceName::Inventory
    }

    async fn notify(&self, request: &NotifyRequest) -> Result<NotifyResponse, ParticipantError> {
        let mut state = write(&self.state);
        state.faults.on_notify("inventory service")?;

        if let Some(existing) = state.reservations.get(&request.tx_id) {
            return Ok(NotifyResponse::success(
                "Inventory already reserved",
                existing.reference.clone(),
            ));
        }
        let order = match parse_order(request) {
            Ok(order) => order,
            Err(message) => return Ok(NotifyResponse::failure(message)),
        };

        // check every line before touching stock
        for item in &order.items {
            if let Some(&available) = state.stock.get(&item.sku)
                && available < item.quantity
            {
                return Ok(NotifyResponse::failure(format!(
                    "Out of stock: {} (requested {}, available {available})",
                    item.sku, item.quantity
                )));
            }
        }
        for item in &order.items {
            if let Some(available) = state.stock.get_mut(&item.sku) {
                *available -= item.quantity;
            }
        }

        state.next_id += 1;
        let reference = format!("RES-{:04}", state.next_id);
        state.reservations.insert(
            request.tx_id,
            Reservation {
                reference: reference.clone(),
                items: order
                    .items
                    .iter()
                    .map(|item| (item.sku.clone(), item.quantity))
                    .collect(),
                released: false,
            },
        );

        Ok(NotifyResponse::success("Inventory reserved", reference))
    }

    async fn compensate(
        &self,
        request: &CompensateRequest,
    ) -> Result<CompensateResponse, ParticipantError> {
        let mut state = write(&self.state);
        state.faults.on_compensate("inventory service")?;

        if state.faults.fail_on_compensate {
            return Ok(CompensateResponse::failure("Inventory release failed"));
        }
        let items = match state.reservations.get_mut(&request.tx_id) {
            None => return Ok(CompensateResponse::success("No reservation to release")),
            Some(reservation) if reservation.released => {
                return Ok(CompensateResponse::success("Reservation already released"));
            }
            Some(reservation) => {
                reservation.released = true;
                reservation.items.clone()
            }
        };
        for (sku, quantity) in items {
            if let Some(available) = state.stock.get_mut(&sku) {
                *available += quantity;
            }
        }

        Ok(CompensateResponse::success("Reservation released"))
    }
}

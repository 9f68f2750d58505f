//! In-memory saga participants.
//!
//! Each one keeps its side effects per transaction so forward actions and
//! compensations are idempotent, and exposes switches for declines,
//! transport failures and failing compensations.

mod credit_card;
mod inventory;
mod logistics;

pub use credit_card::InMemoryCreditCardService;
pub use inventory::InMemoryInventoryService;
pub use logistics::InMemoryLogisticsService;

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use domain::OrderConfirmation;

use crate::client::{NotifyRequest, ParticipantError};

/// Switches shared by all in-memory participants.
#[derive(Debug, Default)]
struct Faults {
    unreachable: bool,
    fail_on_compensate: bool,
    notify_calls: usize,
    compensate_calls: usize,
}

impl Faults {
    fn on_notify(&mut self, service: &str) -> Result<(), ParticipantError> {
        self.notify_calls += 1;
        self.check_reachable(service)
    }

    fn on_compensate(&mut self, service: &str) -> Result<(), ParticipantError> {
        self.compensate_calls += 1;
        self.check_reachable(service)
    }

    fn check_reachable(&self, service: &str) -> Result<(), ParticipantError> {
        if self.unreachable {
            return Err(ParticipantError::Unreachable(format!(
                "{service} is not reachable"
            )));
        }
        Ok(())
    }
}

fn parse_order(request: &NotifyRequest) -> Result<OrderConfirmation, String> {
    serde_json::from_value(request.payload.clone()).map_err(|e| format!("Invalid order payload: {e}"))
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

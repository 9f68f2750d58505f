use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A participant service taking part in the order saga.
///
/// The set is closed: the transaction log, the config store and the
/// resilient client all key their state by this enum, so an unknown
/// service name can only appear at the parsing boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceName {
    CreditCard,
    Inventory,
    Logistics,
}

impl ServiceName {
    /// All participants in their default execution order.
    pub const ALL: [ServiceName; 3] = [
        ServiceName::CreditCard,
        ServiceName::Inventory,
        ServiceName::Logistics,
    ];

    /// Wire and storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceName::CreditCard => "CREDIT_CARD",
            ServiceName::Inventory => "INVENTORY",
            ServiceName::Logistics => "LOGISTICS",
        }
    }

    /// Human-readable name used in operator-facing messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            ServiceName::CreditCard => "Credit Card Service",
            ServiceName::Inventory => "Inventory Service",
            ServiceName::Logistics => "Logistics Service",
        }
    }
}

impl std::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known participant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown service name: {0}")]
pub struct ParseServiceNameError(pub String);

impl FromStr for ServiceName {
    type Err = ParseServiceNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREDIT_CARD" => Ok(ServiceName::CreditCard),
            "INVENTORY" => Ok(ServiceName::Inventory),
            "LOGISTICS" => Ok(ServiceName::Logistics),
            other => Err(ParseServiceNameError(other.to_string())),
        }
    }
}

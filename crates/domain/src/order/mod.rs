//! The order confirmation that starts a saga.

mod confirmation;
mod value_objects;

pub use confirmation::OrderConfirmation;
pub use value_objects::{Money, OrderItem, ProductId};

use thiserror::Error;

/// Validation errors for an order confirmation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("Order ID is required")]
    OrderIdRequired,

    #[error("User ID is required")]
    UserIdRequired,

    #[error("Credit card number is required")]
    CreditCardRequired,

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// Invalid quantity.
    #[error("Invalid quantity for {sku}: {quantity} (must be greater than 0)")]
    InvalidQuantity { sku: String, quantity: u32 },

    /// Invalid price.
    #[error("Invalid price for {sku}: {price} (must be greater than 0)")]
    InvalidPrice { sku: String, price: i64 },

    /// Some line total or the order total does not fit in an `i64` of cents.
    #[error("Order amount overflows")]
    AmountOverflow,

    /// The stated total does not match the sum of the items.
    #[error("Total amount {stated} does not match item total {computed}")]
    TotalMismatch { stated: Money, computed: Money },
}

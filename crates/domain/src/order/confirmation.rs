use serde::{Deserialize, Serialize};

use common::OrderId;

use super::{Money, OrderError, OrderItem};

/// A confirmed order handed to the saga orchestrator.
///
/// This is also the JSON payload of the `ORDER_CONFIRMED` outbox event and
/// of every forward command sent to participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmation {
    pub order_id: OrderId,
    pub user_id: String,
    pub items: Vec<OrderItem>,
    pub total_amount: Money,
    pub credit_card_number: String,
}

impl OrderConfirmation {
    /// Builds a confirmation whose total is the sum of its items. A total
    /// that overflows is left at zero and rejected by [`validate`].
    ///
    /// [`validate`]: OrderConfirmation::validate
    pub fn new(
        order_id: OrderId,
        user_id: impl Into<String>,
        items: Vec<OrderItem>,
        credit_card_number: impl Into<String>,
    ) -> Self {
        let total_amount = sum_items(&items).unwrap_or_default();
        Self {
            order_id,
            user_id: user_id.into(),
            items,
            total_amount,
            credit_card_number: credit_card_number.into(),
        }
    }

    /// Sum of `quantity * unit_price` over all items, `None` on overflow.
    pub fn item_total(&self) -> Option<Money> {
        sum_items(&self.items)
    }

    /// Total number of units across all items.
    pub fn total_quantity(&self) -> u32 {
        self.items
            .iter()
            .fold(0u32, |acc, item| acc.saturating_add(item.quantity))
    }

    /// Checks that the confirmation can start a saga.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.order_id.is_nil() {
            return Err(OrderError::OrderIdRequired);
        }
        if self.user_id.trim().is_empty() {
            return Err(OrderError::UserIdRequired);
        }
        if self.credit_card_number.trim().is_empty() {
            return Err(OrderError::CreditCardRequired);
        }
        if self.items.is_empty() {
            return Err(OrderError::NoItems);
        }
        for item in &self.items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    sku: item.sku.to_string(),
                    quantity: item.quantity,
                });
            }
            if !item.unit_price.is_positive() {
                return Err(OrderError::InvalidPrice {
                    sku: item.sku.to_string(),
                    price: item.unit_price.cents(),
                });
            }
        }
        let computed = self.item_total().ok_or(OrderError::AmountOverflow)?;
        if computed != self.total_amount {
            return Err(OrderError::TotalMismatch {
                stated: self.total_amount,
                computed,
            });
        }
        Ok(())
    }

    /// Last four digits of the card, for logs and participant references.
    pub fn masked_card(&self) -> String {
        let digits: Vec<char> = self
            .credit_card_number
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        let tail: String = digits[digits.len().saturating_sub(4)..].iter().collect();
        format!("****{tail}")
    }
}

fn sum_items(items: &[OrderItem]) -> Option<Money> {
    items.iter().try_fold(Money::zero(), |acc, item| {
        acc.checked_add(item.total_price()?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmation() -> OrderConfirmation {
        OrderConfirmation::new(
            OrderId::new(),
            "user-1",
            vec![OrderItem::new("SKU-001", 2, Money::from_cents(2999))],
            "4111-1111-1111-1111",
        )
    }

    #[test]
    fn new_computes_total_from_items() {
        let order = confirmation();
        assert_eq!(order.total_amount, Money::from_cents(5998));
        assert_eq!(order.total_quantity(), 2);
        assert!(order.validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_items() {
        let mut order = confirmation();
        order.items.clear();
        assert_eq!(order.validate(), Err(OrderError::NoItems));
    }

    #[test]
    fn validate_rejects_zero_quantity() {
        let mut order = confirmation();
        order.items[0].quantity = 0;
        order.total_amount = Money::zero();
        assert!(matches!(
            order.validate(),
            Err(OrderError::InvalidQuantity { quantity: 0, .. })
        ));
    }

    #[test]
    fn validate_rejects_blank_user() {
        let mut order = confirmation();
        order.user_id = "  ".to_string();
        assert_eq!(order.validate(), Err(OrderError::UserIdRequired));
    }

    #[test]
    fn validate_rejects_total_mismatch() {
        let mut order = confirmation();
        order.total_amount = Money::from_cents(100);
        assert!(matches!(
            order.validate(),
            Err(OrderError::TotalMismatch { .. })
        ));
    }

    #[test]
    fn validate_rejects_overflowing_amounts() {
        let mut order = confirmation();
        order.items = vec![OrderItem::new("SKU-001", 2, Money::from_cents(i64::MAX))];
        assert_eq!(order.validate(), Err(OrderError::AmountOverflow));

        order.items = vec![
            OrderItem::new("SKU-001", 1, Money::from_cents(i64::MAX)),
            OrderItem::new("SKU-002", 1, Money::from_cents(1)),
        ];
        assert_eq!(order.validate(), Err(OrderError::AmountOverflow));
    }

    #[test]
    fn masked_card_keeps_last_four_digits() {
        assert_eq!(confirmation().masked_card(), "****1111");
    }

    #[test]
    fn payload_uses_camel_case_fields() {
        let json = serde_json::to_value(confirmation()).unwrap();
        assert_eq!(json["userId"], "user-1");
        assert_eq!(json["totalAmount"], 5998);
        assert_eq!(json["items"][0]["quantity"], 2);
        assert!(json.get("creditCardNumber").is_some());
    }
}

use crate::domain::errors::ValidationError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Number of shares in an order. Fractional shares are allowed; zero and
/// negative amounts are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(Decimal);

impl Quantity {
    pub fn new(value: Decimal) -> Result<Self, ValidationError> {
        if value > Decimal::ZERO {
            Ok(Quantity(value))
        } else {
            Err(ValidationError::InvalidQuantity(format!(
                "shares must be positive, got {}",
                value
            )))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Signed lot quantity for this order.
    pub fn signed(&self, is_sell: bool) -> Decimal {
        if is_sell {
            -self.0
        } else {
            self.0
        }
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

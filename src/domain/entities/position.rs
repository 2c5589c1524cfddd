use crate::domain::value_objects::ticker::Ticker;
use rust_decimal::Decimal;
use serde::Serialize;

/// Holding derived from the lots of one ticker. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub ticker: Ticker,
    pub net_shares: Decimal,
    /// Lifetime average over buy lots; unaffected by sells.
    pub weighted_avg_cost: Decimal,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.net_shares > Decimal::ZERO
    }
}

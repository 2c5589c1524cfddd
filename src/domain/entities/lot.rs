//! Lot entity - one append-only buy or sell event

use crate::domain::value_objects::ticker::Ticker;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Immutable ledger entry. `shares` is signed: positive for buys,
/// negative for sells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lot {
    pub ticker: Ticker,
    pub shares: Decimal,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Lot {
    pub fn new(ticker: Ticker, shares: Decimal, price: Decimal) -> Self {
        Self {
            ticker,
            shares,
            price,
            created_at: Utc::now(),
        }
    }

    pub fn is_buy(&self) -> bool {
        self.shares > Decimal::ZERO
    }
}

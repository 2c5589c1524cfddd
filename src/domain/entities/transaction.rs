//! Transaction entity - audit record of a settled trade

use crate::domain::errors::ValidationError;
use crate::domain::value_objects::ticker::Ticker;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "BUY",
            TradeAction::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(TradeAction::Buy),
            "SELL" => Ok(TradeAction::Sell),
            other => Err(format!("Unknown trade action: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub ticker: Ticker,
    pub action: TradeAction,
    /// Always positive; direction is carried by `action`.
    pub shares: Decimal,
    pub price: Decimal,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Fails when `shares * price` does not fit in a `Decimal`.
    pub fn new(
        ticker: Ticker,
        action: TradeAction,
        shares: Decimal,
        price: Decimal,
    ) -> Result<Self, ValidationError> {
        let total = shares.checked_mul(price).ok_or_else(|| {
            ValidationError::AmountOutOfRange(format!("{} x {} overflows", shares, price))
        })?;
        Ok(Self {
            ticker,
            action,
            shares,
            price,
            total,
            created_at: Utc::now(),
        })
    }
}

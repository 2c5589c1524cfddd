//! Price Oracle Trait
//!
//! Source of daily closes for a ticker. The oracle never raises: every
//! outcome is a [`QuoteResult`] so callers decide how to degrade.

use crate::domain::value_objects::{period::Period, ticker::Ticker};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClosePoint {
    pub date: NaiveDate,
    pub close: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceHistory {
    pub ticker: Ticker,
    pub name: Option<String>,
    /// Ascending by date.
    pub closes: Vec<ClosePoint>,
}

impl PriceHistory {
    pub fn last_close(&self) -> Option<Decimal> {
        self.closes.last().map(|p| p.close)
    }

    pub fn previous_close(&self) -> Option<Decimal> {
        let n = self.closes.len();
        if n >= 2 {
            Some(self.closes[n - 2].close)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuoteResult {
    Found(PriceHistory),
    NotFound,
    TransientError(String),
}

impl QuoteResult {
    /// Latest close, treating not-found, errors and empty history alike.
    pub fn current_price(&self) -> Option<Decimal> {
        match self {
            QuoteResult::Found(history) => history.last_close(),
            _ => None,
        }
    }
}

#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn get_quote(&self, ticker: &Ticker, period: Period) -> QuoteResult;
}

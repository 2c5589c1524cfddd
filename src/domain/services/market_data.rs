//! MarketDataService - stock detail and search lookups
//!
//! Unlike portfolio valuation, these requests exist only to return a quote,
//! so a missing quote fails the request instead of degrading to zero.

use crate::domain::errors::MarketDataError;
use crate::domain::repositories::narrative::{Narrative, NarrativeService};
use crate::domain::repositories::price_oracle::{PriceHistory, PriceOracle, QuoteResult};
use crate::domain::services::valuation::{percent_of, round_money};
use crate::domain::value_objects::{period::Period, ticker::Ticker};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

const NARRATIVE_LOOKBACK_DAYS: u32 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub close: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockDetail {
    pub ticker: Ticker,
    pub name: String,
    pub current_price: Decimal,
    pub change: Decimal,
    pub change_pct: Decimal,
    pub history: Vec<HistoryPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative: Option<Narrative>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub ticker: Ticker,
    pub name: String,
    pub current_price: Decimal,
    pub change_pct: Decimal,
}

/// Day change of the latest close against the one before it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayChange {
    pub current: Decimal,
    pub change: Decimal,
    pub change_pct: Decimal,
}

impl DayChange {
    /// `None` for an empty history. With a single close the change is zero.
    pub fn of(history: &PriceHistory) -> Option<Self> {
        let current = history.last_close()?;
        let previous = history.previous_close().unwrap_or(current);
        let change = current - previous;
        Some(Self {
            current,
            change,
            change_pct: percent_of(change, previous),
        })
    }
}

pub struct MarketDataService {
    oracle: Arc<dyn PriceOracle>,
    narrative: Arc<dyn NarrativeService>,
    narrative_timeout: Duration,
}

impl MarketDataService {
    pub fn new(
        oracle: Arc<dyn PriceOracle>,
        narrative: Arc<dyn NarrativeService>,
        narrative_timeout: Duration,
    ) -> Self {
        Self {
            oracle,
            narrative,
            narrative_timeout,
        }
    }

    /// The narrative is best effort: an error or a reply slower than
    /// `narrative_timeout` leaves it out of the detail.
    async fn narrative_for(&self, ticker: &Ticker) -> Option<Narrative> {
        let lookup = self.narrative.explain(ticker, NARRATIVE_LOOKBACK_DAYS);
        match timeout(self.narrative_timeout, lookup).await {
            Ok(Ok(n)) => Some(n),
            Ok(Err(e)) => {
                debug!("Narrative for {} omitted: {}", ticker, e);
                None
            }
            Err(_) => {
                warn!(
                    "Narrative for {} timed out after {:?}",
                    ticker, self.narrative_timeout
                );
                None
            }
        }
    }

    pub async fn stock_detail(
        &self,
        ticker: &Ticker,
        period: Period,
    ) -> Result<StockDetail, MarketDataError> {
        let (quote, narrative) = tokio::join!(
            self.oracle.get_quote(ticker, period),
            self.narrative_for(ticker)
        );

        let history = found(ticker, quote)?;
        let day = DayChange::of(&history).ok_or_else(|| unavailable(ticker))?;

        Ok(StockDetail {
            ticker: ticker.clone(),
            name: history.name.clone().unwrap_or_else(|| ticker.to_string()),
            current_price: round_money(day.current),
            change: round_money(day.change),
            change_pct: round_money(day.change_pct),
            history: history
                .closes
                .iter()
                .map(|p| HistoryPoint {
                    date: p.date,
                    close: round_money(p.close),
                })
                .collect(),
            narrative,
        })
    }

    pub async fn search(&self, ticker: &Ticker) -> Result<SearchResult, MarketDataError> {
        let quote = self.oracle.get_quote(ticker, Period::FiveDays).await;
        let history = found(ticker, quote)?;
        let day = DayChange::of(&history).ok_or_else(|| unavailable(ticker))?;
        let name = history.name.clone().ok_or_else(|| unavailable(ticker))?;

        Ok(SearchResult {
            ticker: ticker.clone(),
            name,
            current_price: round_money(day.current),
            change_pct: round_money(day.change_pct),
        })
    }
}

fn unavailable(ticker: &Ticker) -> MarketDataError {
    MarketDataError::QuoteUnavailable {
        ticker: ticker.to_string(),
    }
}

fn found(ticker: &Ticker, quote: QuoteResult) -> Result<PriceHistory, MarketDataError> {
    match quote {
        QuoteResult::Found(history) => Ok(history),
        QuoteResult::NotFound => Err(unavailable(ticker)),
        QuoteResult::TransientError(reason) => {
            warn!("Quote lookup for {} failed: {}", ticker, reason);
            Err(MarketDataError::UpstreamService {
                service: "price oracle".to_string(),
                reason,
            })
        }
    }
}

//! Narrative Service Trait
//!
//! Optional collaborator that returns recent headlines and a short
//! explanation of a ticker's move. Failures never fail the caller's request.

use crate::domain::errors::MarketDataError;
use crate::domain::value_objects::ticker::Ticker;
use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Narrative {
    pub headlines: Vec<String>,
    pub explanation: Option<String>,
}

#[async_trait]
pub trait NarrativeService: Send + Sync {
    async fn explain(&self, ticker: &Ticker, lookback_days: u32)
        -> Result<Narrative, MarketDataError>;
}

/// Used when no narrative backend is configured.
pub struct DisabledNarrative;

#[async_trait]
impl NarrativeService for DisabledNarrative {
    async fn explain(
        &self,
        _ticker: &Ticker,
        _lookback_days: u32,
    ) -> Result<Narrative, MarketDataError> {
        Err(MarketDataError::UpstreamService {
            service: "narrative".to_string(),
            reason: "not configured".to_string(),
        })
    }
}

use crate::domain::repositories::price_oracle::{
    ClosePoint, PriceHistory, PriceOracle, QuoteResult,
};
use crate::domain::value_objects::{period::Period, ticker::Ticker};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Yahoo Finance API base
pub const YAHOO_API_BASE: &str = "https://query1.finance.yahoo.com";

const CLOSE_DECIMALS: u32 = 4;

/// Chart endpoint response
#[derive(Debug, Deserialize)]
pub struct ChartResponse {
    pub chart: Chart,
}

#[derive(Debug, Deserialize)]
pub struct Chart {
    pub result: Option<Vec<ChartResult>>,
    pub error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
pub struct ChartError {
    pub code: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChartResult {
    pub meta: ChartMeta,
    #[serde(default)]
    pub timestamp: Vec<i64>,
    pub indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMeta {
    pub long_name: Option<String>,
    pub short_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Indicators {
    #[serde(default)]
    pub quote: Vec<QuoteIndicator>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteIndicator {
    #[serde(default)]
    pub close: Vec<Option<f64>>,
}

/// Turn a decoded chart payload into a quote. Null closes (halted days,
/// the still-open session) are skipped.
pub fn parse_chart(ticker: &Ticker, response: ChartResponse) -> QuoteResult {
    if let Some(err) = response.chart.error {
        if err.code == "Not Found" {
            return QuoteResult::NotFound;
        }
        return QuoteResult::TransientError(format!(
            "{}: {}",
            err.code,
            err.description.unwrap_or_default()
        ));
    }

    let result = match response.chart.result.and_then(|r| r.into_iter().next()) {
        Some(r) => r,
        None => return QuoteResult::NotFound,
    };

    let closes_raw = result
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|q| q.close)
        .unwrap_or_default();

    let closes = result
        .timestamp
        .iter()
        .zip(closes_raw)
        .filter_map(|(ts, close)| {
            let close = Decimal::try_from(close?).ok()?.round_dp(CLOSE_DECIMALS);
            let date = DateTime::from_timestamp(*ts, 0)?.date_naive();
            Some(ClosePoint { date, close })
        })
        .collect();

    QuoteResult::Found(PriceHistory {
        ticker: ticker.clone(),
        name: result.meta.long_name.or(result.meta.short_name),
        closes,
    })
}

/// Price oracle over the Yahoo Finance chart API
pub struct YahooPriceOracle {
    client: Client,
    api_base: String,
}

impl YahooPriceOracle {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("meridian/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn chart_url(&self, ticker: &Ticker) -> String {
        format!("{}/v8/finance/chart/{}", self.api_base, ticker)
    }
}

#[async_trait]
impl PriceOracle for YahooPriceOracle {
    async fn get_quote(&self, ticker: &Ticker, period: Period) -> QuoteResult {
        let response = match self
            .client
            .get(self.chart_url(ticker))
            .query(&[("range", period.as_str()), ("interval", "1d")])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("Quote request for {} failed: {}", ticker, e);
                return QuoteResult::TransientError(e.to_string());
            }
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("Quote for {} not found", ticker);
            return QuoteResult::NotFound;
        }
        if !status.is_success() {
            warn!("Quote request for {} returned HTTP {}", ticker, status);
            return QuoteResult::TransientError(format!("HTTP {}", status));
        }

        match response.json::<ChartResponse>().await {
            Ok(body) => parse_chart(ticker, body),
            Err(e) => {
                warn!("Unreadable quote payload for {}: {}", ticker, e);
                QuoteResult::TransientError(format!("invalid payload: {}", e))
            }
        }
    }
}

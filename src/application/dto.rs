use crate::domain::entities::transaction::Transaction;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Register and login body
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<Decimal>,
}

/// Buy and sell body. `price` is the per-share price the client saw.
#[derive(Debug, Deserialize)]
pub struct TradeRequest {
    pub ticker: String,
    pub shares: Decimal,
    pub price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct StockQuery {
    pub period: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Serialize)]
pub struct LeaderView {
    pub rank: usize,
    pub username: String,
    pub score: Decimal,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub leaders: Vec<LeaderView>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

use crate::domain::entities::account::AccountId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Persisted ranking row; `score` mirrors the account balance at the last
/// recompute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub account_id: AccountId,
    pub username: String,
    pub score: Decimal,
    pub updated_at: DateTime<Utc>,
}

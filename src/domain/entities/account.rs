//! Account entity - identity and cash balance of a trader

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub password_hash: String,
    /// Cash available for buying. Never negative after settlement.
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Input for account creation.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub password_hash: String,
    pub starting_balance: Decimal,
}

/// Balance snapshot used by the leaderboard recompute pass.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountBalance {
    pub account_id: AccountId,
    pub username: String,
    pub balance: Decimal,
}

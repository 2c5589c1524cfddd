//! Database Models
//!
//! Row types for the SQLite tables. Decimal columns are TEXT and are parsed
//! when a record is converted into its domain entity.

use crate::domain::entities::account::{Account, AccountBalance, AccountId};
use crate::domain::entities::leaderboard::LeaderboardEntry;
use crate::domain::entities::lot::Lot;
use crate::domain::entities::transaction::{TradeAction, Transaction};
use crate::domain::errors::StoreError;
use crate::domain::value_objects::ticker::Ticker;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use std::str::FromStr;

pub(crate) fn parse_decimal(column: &str, raw: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(raw)
        .map_err(|e| StoreError::Backend(format!("Corrupt {} value '{}': {}", column, raw, e)))
}

fn parse_ticker(raw: &str) -> Result<Ticker, StoreError> {
    Ticker::parse(raw).map_err(|e| StoreError::Backend(format!("Corrupt ticker: {}", e)))
}

#[derive(Debug, Clone, FromRow)]
pub struct AccountRecord {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub balance: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AccountRecord> for Account {
    type Error = StoreError;

    fn try_from(r: AccountRecord) -> Result<Self, Self::Error> {
        Ok(Account {
            id: AccountId(r.id),
            balance: parse_decimal("balance", &r.balance)?,
            username: r.username,
            password_hash: r.password_hash,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct BalanceRecord {
    pub id: i64,
    pub username: String,
    pub balance: String,
}

impl TryFrom<BalanceRecord> for AccountBalance {
    type Error = StoreError;

    fn try_from(r: BalanceRecord) -> Result<Self, Self::Error> {
        Ok(AccountBalance {
            account_id: AccountId(r.id),
            balance: parse_decimal("balance", &r.balance)?,
            username: r.username,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct LotRecord {
    pub id: i64,
    pub account_id: i64,
    pub ticker: String,
    pub shares: String, // signed
    pub price: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<LotRecord> for Lot {
    type Error = StoreError;

    fn try_from(r: LotRecord) -> Result<Self, Self::Error> {
        Ok(Lot {
            ticker: parse_ticker(&r.ticker)?,
            shares: parse_decimal("shares", &r.shares)?,
            price: parse_decimal("price", &r.price)?,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TransactionRecord {
    pub id: i64,
    pub account_id: i64,
    pub ticker: String,
    pub action: String, // "BUY" or "SELL"
    pub shares: String,
    pub price: String,
    pub total: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRecord> for Transaction {
    type Error = StoreError;

    fn try_from(r: TransactionRecord) -> Result<Self, Self::Error> {
        Ok(Transaction {
            ticker: parse_ticker(&r.ticker)?,
            action: TradeAction::from_str(&r.action).map_err(StoreError::Backend)?,
            shares: parse_decimal("shares", &r.shares)?,
            price: parse_decimal("price", &r.price)?,
            total: parse_decimal("total", &r.total)?,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct LeaderboardRecord {
    pub account_id: i64,
    pub username: String,
    pub score: String,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<LeaderboardRecord> for LeaderboardEntry {
    type Error = StoreError;

    fn try_from(r: LeaderboardRecord) -> Result<Self, Self::Error> {
        Ok(LeaderboardEntry {
            account_id: AccountId(r.account_id),
            score: parse_decimal("score", &r.score)?,
            username: r.username,
            updated_at: r.updated_at,
        })
    }
}

//! Database Repository
//!
//! SQLite implementations of the account, ledger and leaderboard stores.

use super::models::*;
use super::DbPool;
use crate::domain::entities::account::{Account, AccountBalance, AccountId, NewAccount};
use crate::domain::entities::leaderboard::LeaderboardEntry;
use crate::domain::entities::lot::Lot;
use crate::domain::entities::transaction::Transaction;
use crate::domain::errors::StoreError;
use crate::domain::repositories::account_store::AccountStore;
use crate::domain::repositories::leaderboard_store::LeaderboardStore;
use crate::domain::repositories::ledger_store::{
    LedgerSnapshot, LedgerStore, LedgerTransaction, StoreResult,
};
use crate::domain::value_objects::ticker::Ticker;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::Sqlite;
use tracing::{debug, error, warn};

/// Primary result codes for SQLITE_BUSY and SQLITE_LOCKED; extended codes
/// carry the primary code in their low byte.
fn is_busy_code(code: &str) -> bool {
    code.parse::<i32>()
        .map(|c| matches!(c & 0xff, 5 | 6))
        .unwrap_or(false)
}

fn map_sqlx(context: &str, e: sqlx::Error) -> StoreError {
    if let Some(db) = e.as_database_error() {
        if db.is_unique_violation() {
            return StoreError::Duplicate(context.to_string());
        }
        if db.code().map(|c| is_busy_code(&c)).unwrap_or(false) {
            warn!("{}: database busy: {}", context, e);
            return StoreError::Conflict;
        }
    }
    error!("{}: {}", context, e);
    StoreError::Backend(format!("{}: {}", context, e))
}

fn convert_all<R, T>(records: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    records.into_iter().map(T::try_from).collect()
}

/// Account repository
#[derive(Clone)]
pub struct AccountRepository {
    pool: DbPool,
}

impl AccountRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for AccountRepository {
    async fn create(&self, account: NewAccount) -> StoreResult<Account> {
        let record = sqlx::query_as::<_, AccountRecord>(
            r#"
            INSERT INTO accounts (username, password_hash, balance, created_at)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING *
            "#,
        )
        .bind(&account.username)
        .bind(&account.password_hash)
        .bind(account.starting_balance.to_string())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match map_sqlx("Failed to create account", e) {
            StoreError::Duplicate(_) => StoreError::Duplicate(account.username.clone()),
            other => other,
        })?;

        debug!("Created account: {} ({})", record.id, record.username);
        Account::try_from(record)
    }

    async fn get(&self, id: AccountId) -> StoreResult<Option<Account>> {
        let record = sqlx::query_as::<_, AccountRecord>("SELECT * FROM accounts WHERE id = ?1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx("Failed to get account", e))?;

        record.map(Account::try_from).transpose()
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Account>> {
        let record =
            sqlx::query_as::<_, AccountRecord>("SELECT * FROM accounts WHERE username = ?1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx("Failed to find account by username", e))?;

        record.map(Account::try_from).transpose()
    }

    async fn list_balances(&self) -> StoreResult<Vec<AccountBalance>> {
        let records = sqlx::query_as::<_, BalanceRecord>(
            "SELECT id, username, balance FROM accounts ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx("Failed to list balances", e))?;

        convert_all(records)
    }
}

/// Lot and transaction ledger repository
#[derive(Clone)]
pub struct LedgerRepository {
    pool: DbPool,
}

impl LedgerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for LedgerRepository {
    /// Starts with a no-op write on the account row so the unit of work holds
    /// SQLite's write lock before it reads anything.
    async fn begin(&self, account: AccountId) -> StoreResult<Box<dyn LedgerTransaction>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx("Failed to begin ledger transaction", e))?;

        let rows = sqlx::query("UPDATE accounts SET balance = balance WHERE id = ?1")
            .bind(account.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx("Failed to lock account", e))?
            .rows_affected();

        if rows == 0 {
            return Err(StoreError::NotFound(format!("account {}", account)));
        }

        Ok(Box::new(SqliteLedgerTransaction { tx, account }))
    }

    async fn balance(&self, account: AccountId) -> StoreResult<Decimal> {
        let row: Option<(String,)> = sqlx::query_as("SELECT balance FROM accounts WHERE id = ?1")
            .bind(account.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx("Failed to get balance", e))?;

        match row {
            Some((raw,)) => parse_decimal("balance", &raw),
            None => Err(StoreError::NotFound(format!("account {}", account))),
        }
    }

    async fn lots(&self, account: AccountId) -> StoreResult<Vec<Lot>> {
        let records = sqlx::query_as::<_, LotRecord>(
            "SELECT * FROM lots WHERE account_id = ?1 ORDER BY id",
        )
        .bind(account.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx("Failed to get lots", e))?;

        convert_all(records)
    }

    /// Both reads run in one read transaction, which SQLite serves from a
    /// single snapshot of the database.
    async fn snapshot(&self, account: AccountId) -> StoreResult<LedgerSnapshot> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx("Failed to begin snapshot read", e))?;

        let row: Option<(String,)> = sqlx::query_as("SELECT balance FROM accounts WHERE id = ?1")
            .bind(account.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx("Failed to get balance", e))?;
        let balance = match row {
            Some((raw,)) => parse_decimal("balance", &raw)?,
            None => return Err(StoreError::NotFound(format!("account {}", account))),
        };

        let records = sqlx::query_as::<_, LotRecord>(
            "SELECT * FROM lots WHERE account_id = ?1 ORDER BY id",
        )
        .bind(account.0)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx("Failed to get lots", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx("Failed to end snapshot read", e))?;

        Ok(LedgerSnapshot {
            balance,
            lots: convert_all(records)?,
        })
    }

    async fn transactions(&self, account: AccountId, limit: usize) -> StoreResult<Vec<Transaction>> {
        let records = sqlx::query_as::<_, TransactionRecord>(
            "SELECT * FROM transactions WHERE account_id = ?1 ORDER BY id DESC LIMIT ?2",
        )
        .bind(account.0)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx("Failed to get transactions", e))?;

        convert_all(records)
    }
}

/// Open SQLite transaction for one account. Dropped without `commit`, sqlx
/// rolls it back.
pub struct SqliteLedgerTransaction {
    tx: sqlx::Transaction<'static, Sqlite>,
    account: AccountId,
}

#[async_trait]
impl LedgerTransaction for SqliteLedgerTransaction {
    async fn balance(&mut self) -> StoreResult<Decimal> {
        let (raw,): (String,) = sqlx::query_as("SELECT balance FROM accounts WHERE id = ?1")
            .bind(self.account.0)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx("Failed to read balance", e))?;

        parse_decimal("balance", &raw)
    }

    async fn lots_for(&mut self, ticker: &Ticker) -> StoreResult<Vec<Lot>> {
        let records = sqlx::query_as::<_, LotRecord>(
            "SELECT * FROM lots WHERE account_id = ?1 AND ticker = ?2 ORDER BY id",
        )
        .bind(self.account.0)
        .bind(ticker.as_str())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx("Failed to read lots", e))?;

        convert_all(records)
    }

    async fn update_balance(&mut self, balance: Decimal) -> StoreResult<()> {
        if balance < Decimal::ZERO {
            return Err(StoreError::Backend(format!(
                "refusing negative balance {} for account {}",
                balance, self.account
            )));
        }

        sqlx::query("UPDATE accounts SET balance = ?1 WHERE id = ?2")
            .bind(balance.to_string())
            .bind(self.account.0)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx("Failed to update balance", e))?;

        Ok(())
    }

    async fn append_lot(&mut self, lot: &Lot) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO lots (account_id, ticker, shares, price, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(self.account.0)
        .bind(lot.ticker.as_str())
        .bind(lot.shares.to_string())
        .bind(lot.price.to_string())
        .bind(lot.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx("Failed to append lot", e))?;

        Ok(())
    }

    async fn append_transaction(&mut self, transaction: &Transaction) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (account_id, ticker, action, shares, price, total, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(self.account.0)
        .bind(transaction.ticker.as_str())
        .bind(transaction.action.as_str())
        .bind(transaction.shares.to_string())
        .bind(transaction.price.to_string())
        .bind(transaction.total.to_string())
        .bind(transaction.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx("Failed to append transaction", e))?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let account = self.account;
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx("Failed to commit ledger transaction", e))?;
        debug!("Committed ledger transaction for account {}", account);
        Ok(())
    }
}

/// Leaderboard repository
#[derive(Clone)]
pub struct LeaderboardRepository {
    pool: DbPool,
}

impl LeaderboardRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeaderboardStore for LeaderboardRepository {
    async fn upsert(&self, entries: &[LeaderboardEntry]) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx("Failed to begin leaderboard update", e))?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO leaderboard (account_id, username, score, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(account_id) DO UPDATE SET
                    username = excluded.username,
                    score = excluded.score,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(entry.account_id.0)
            .bind(&entry.username)
            .bind(entry.score.to_string())
            .bind(entry.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx("Failed to upsert leaderboard entry", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx("Failed to commit leaderboard update", e))?;

        debug!("Upserted {} leaderboard entries", entries.len());
        Ok(())
    }

    async fn entries(&self) -> StoreResult<Vec<LeaderboardEntry>> {
        let records = sqlx::query_as::<_, LeaderboardRecord>("SELECT * FROM leaderboard")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx("Failed to get leaderboard", e))?;

        convert_all(records)
    }
}

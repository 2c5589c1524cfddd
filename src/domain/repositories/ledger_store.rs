//! Ledger Store Trait
//!
//! The ledger is the append-only record of lots and transactions per account
//! together with the account's cash balance. Mutations go through a
//! [`LedgerTransaction`], a unit of work that either commits every write or
//! none of them. Dropping a unit of work without calling `commit` discards
//! its writes.
//!
//! Implementations must serialize units of work on the same account: while
//! one is open, another `begin` for that account waits or reports
//! [`StoreError::Conflict`].

use crate::domain::entities::account::AccountId;
use crate::domain::entities::lot::Lot;
use crate::domain::entities::transaction::Transaction;
use crate::domain::errors::StoreError;
use crate::domain::value_objects::ticker::Ticker;
use async_trait::async_trait;
use rust_decimal::Decimal;

pub type StoreResult<T> = Result<T, StoreError>;

/// Cash balance and lots of one account as of a single point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSnapshot {
    pub balance: Decimal,
    pub lots: Vec<Lot>,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a unit of work holding the account's write lock.
    async fn begin(&self, account: AccountId) -> StoreResult<Box<dyn LedgerTransaction>>;

    /// Current cash balance outside any unit of work.
    async fn balance(&self, account: AccountId) -> StoreResult<Decimal>;

    /// All lots of the account in chronological order.
    async fn lots(&self, account: AccountId) -> StoreResult<Vec<Lot>>;

    /// Balance and lots read together, so no settlement lands between them.
    async fn snapshot(&self, account: AccountId) -> StoreResult<LedgerSnapshot>;

    /// Newest-first audit records, at most `limit`.
    async fn transactions(&self, account: AccountId, limit: usize)
        -> StoreResult<Vec<Transaction>>;
}

#[async_trait]
pub trait LedgerTransaction: Send {
    async fn balance(&mut self) -> StoreResult<Decimal>;

    /// Lots for one ticker, chronological.
    async fn lots_for(&mut self, ticker: &Ticker) -> StoreResult<Vec<Lot>>;

    async fn update_balance(&mut self, balance: Decimal) -> StoreResult<()>;

    async fn append_lot(&mut self, lot: &Lot) -> StoreResult<()>;

    async fn append_transaction(&mut self, transaction: &Transaction) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

//! In-memory implementation of the account, ledger and leaderboard stores.
//!
//! Each account's ledger sits behind its own async mutex; a unit of work
//! holds that mutex from `begin` until it is committed or dropped, and stages
//! its writes until commit.

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
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

struct AccountLedger {
    account: Account,
    lots: Vec<Lot>,
    transactions: Vec<Transaction>,
}

#[derive(Default)]
pub struct InMemoryStore {
    ledgers: Mutex<HashMap<AccountId, Arc<AsyncMutex<AccountLedger>>>>,
    usernames: Mutex<HashMap<String, AccountId>>,
    leaderboard: Mutex<HashMap<AccountId, LeaderboardEntry>>,
    next_id: AtomicI64,
}

fn lock<T>(m: &Mutex<T>) -> StoreResult<MutexGuard<'_, T>> {
    m.lock()
        .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ledger(&self, account: AccountId) -> StoreResult<Arc<AsyncMutex<AccountLedger>>> {
        lock(&self.ledgers)?
            .get(&account)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("account {}", account)))
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn create(&self, new: NewAccount) -> StoreResult<Account> {
        let mut usernames = lock(&self.usernames)?;
        if usernames.contains_key(&new.username) {
            return Err(StoreError::Duplicate(new.username));
        }

        let id = AccountId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let account = Account {
            id,
            username: new.username.clone(),
            password_hash: new.password_hash,
            balance: new.starting_balance,
            created_at: Utc::now(),
        };

        usernames.insert(new.username, id);
        lock(&self.ledgers)?.insert(
            id,
            Arc::new(AsyncMutex::new(AccountLedger {
                account: account.clone(),
                lots: Vec::new(),
                transactions: Vec::new(),
            })),
        );

        Ok(account)
    }

    async fn get(&self, id: AccountId) -> StoreResult<Option<Account>> {
        let ledger = match lock(&self.ledgers)?.get(&id).cloned() {
            Some(l) => l,
            None => return Ok(None),
        };
        let account = ledger.lock().await.account.clone();
        Ok(Some(account))
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Account>> {
        let id = lock(&self.usernames)?.get(username).copied();
        match id {
            Some(id) => self.get(id).await,
            None => Ok(None),
        }
    }

    async fn list_balances(&self) -> StoreResult<Vec<AccountBalance>> {
        let ledgers: Vec<_> = lock(&self.ledgers)?.values().cloned().collect();
        let mut balances = Vec::with_capacity(ledgers.len());
        for ledger in ledgers {
            let ledger = ledger.lock().await;
            balances.push(AccountBalance {
                account_id: ledger.account.id,
                username: ledger.account.username.clone(),
                balance: ledger.account.balance,
            });
        }
        Ok(balances)
    }
}

pub struct InMemoryLedgerTransaction {
    guard: OwnedMutexGuard<AccountLedger>,
    balance: Decimal,
    staged_lots: Vec<Lot>,
    staged_transactions: Vec<Transaction>,
}

#[async_trait]
impl LedgerTransaction for InMemoryLedgerTransaction {
    async fn balance(&mut self) -> StoreResult<Decimal> {
        Ok(self.balance)
    }

    async fn lots_for(&mut self, ticker: &Ticker) -> StoreResult<Vec<Lot>> {
        Ok(self
            .guard
            .lots
            .iter()
            .chain(self.staged_lots.iter())
            .filter(|l| &l.ticker == ticker)
            .cloned()
            .collect())
    }

    async fn update_balance(&mut self, balance: Decimal) -> StoreResult<()> {
        if balance < Decimal::ZERO {
            return Err(StoreError::Backend(format!(
                "refusing negative balance {} for account {}",
                balance, self.guard.account.id
            )));
        }
        self.balance = balance;
        Ok(())
    }

    async fn append_lot(&mut self, lot: &Lot) -> StoreResult<()> {
        self.staged_lots.push(lot.clone());
        Ok(())
    }

    async fn append_transaction(&mut self, transaction: &Transaction) -> StoreResult<()> {
        self.staged_transactions.push(transaction.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryLedgerTransaction {
            mut guard,
            balance,
            staged_lots,
            staged_transactions,
        } = *self;
        guard.account.balance = balance;
        guard.lots.extend(staged_lots);
        guard.transactions.extend(staged_transactions);
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn begin(&self, account: AccountId) -> StoreResult<Box<dyn LedgerTransaction>> {
        let guard = self.ledger(account)?.lock_owned().await;
        let balance = guard.account.balance;
        Ok(Box::new(InMemoryLedgerTransaction {
            guard,
            balance,
            staged_lots: Vec::new(),
            staged_transactions: Vec::new(),
        }))
    }

    async fn balance(&self, account: AccountId) -> StoreResult<Decimal> {
        Ok(self.ledger(account)?.lock().await.account.balance)
    }

    async fn lots(&self, account: AccountId) -> StoreResult<Vec<Lot>> {
        Ok(self.ledger(account)?.lock().await.lots.clone())
    }

    async fn snapshot(&self, account: AccountId) -> StoreResult<LedgerSnapshot> {
        let ledger = self.ledger(account)?;
        let ledger = ledger.lock().await;
        Ok(LedgerSnapshot {
            balance: ledger.account.balance,
            lots: ledger.lots.clone(),
        })
    }

    async fn transactions(
        &self,
        account: AccountId,
        limit: usize,
    ) -> StoreResult<Vec<Transaction>> {
        let ledger = self.ledger(account)?;
        let ledger = ledger.lock().await;
        Ok(ledger
            .transactions
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LeaderboardStore for InMemoryStore {
    async fn upsert(&self, entries: &[LeaderboardEntry]) -> StoreResult<()> {
        let mut board = lock(&self.leaderboard)?;
        for entry in entries {
            board.insert(entry.account_id, entry.clone());
        }
        Ok(())
    }

    async fn entries(&self) -> StoreResult<Vec<LeaderboardEntry>> {
        Ok(lock(&self.leaderboard)?.values().cloned().collect())
    }
}

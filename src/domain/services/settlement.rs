//! TradeSettlement - applies buy and sell orders to an account
//!
//! A settlement reads the balance and lots, checks the order against them and
//! writes the new balance, lot and transaction inside one ledger unit of work.
//! Settlements on the same account are serialized by [`AccountLocks`]; a
//! conflict reported by the store is retried once.
//!
//! The order price is supplied by the caller and is not checked against a
//! live quote.

use crate::domain::entities::account::AccountId;
use crate::domain::entities::lot::Lot;
use crate::domain::entities::transaction::{TradeAction, Transaction};
use crate::domain::errors::{TradingError, ValidationError};
use crate::domain::repositories::ledger_store::LedgerStore;
use crate::domain::services::position_aggregator::PositionAggregator;
use crate::domain::value_objects::{price::Price, quantity::Quantity, ticker::Ticker};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, warn};

/// Validated buy or sell request. Its total is known to fit in a `Decimal`.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeOrder {
    pub ticker: Ticker,
    pub shares: Quantity,
    pub price: Price,
    total: Decimal,
}

impl TradeOrder {
    pub fn new(ticker: &str, shares: Decimal, price: Decimal) -> Result<Self, ValidationError> {
        let ticker = Ticker::parse(ticker)?;
        let shares = Quantity::new(shares)?;
        let price = Price::new(price)?;
        let total = shares.value().checked_mul(price.value()).ok_or_else(|| {
            ValidationError::AmountOutOfRange(format!(
                "order total of {} shares at {} is too large",
                shares, price
            ))
        })?;

        Ok(Self {
            ticker,
            shares,
            price,
            total,
        })
    }

    pub fn total(&self) -> Decimal {
        self.total
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementReceipt {
    pub action: TradeAction,
    pub ticker: Ticker,
    pub shares: Decimal,
    pub price: Decimal,
    pub total: Decimal,
    /// Cash balance after the trade.
    pub balance: Decimal,
    pub message: String,
}

/// One async mutex per account, created on first use.
#[derive(Default)]
pub struct AccountLocks {
    locks: Mutex<HashMap<AccountId, Arc<AsyncMutex<()>>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<AccountId, Arc<AsyncMutex<()>>>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn acquire(&self, account: AccountId) -> OwnedMutexGuard<()> {
        let lock = self.table().entry(account).or_default().clone();
        lock.lock_owned().await
    }

    /// Drop the mutexes nobody holds or waits on. Holders and waiters keep a
    /// clone of the `Arc`, so a count of one means only the table refers to it.
    pub fn prune_idle(&self) -> usize {
        let mut locks = self.table();
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct TradeSettlement {
    ledger: Arc<dyn LedgerStore>,
    locks: AccountLocks,
}

impl TradeSettlement {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self {
            ledger,
            locks: AccountLocks::new(),
        }
    }

    /// Forget per-account locks that are not in use.
    pub fn prune_idle_locks(&self) -> usize {
        self.locks.prune_idle()
    }

    pub async fn buy(
        &self,
        account: AccountId,
        order: &TradeOrder,
    ) -> Result<SettlementReceipt, TradingError> {
        self.settle(account, TradeAction::Buy, order).await
    }

    pub async fn sell(
        &self,
        account: AccountId,
        order: &TradeOrder,
    ) -> Result<SettlementReceipt, TradingError> {
        self.settle(account, TradeAction::Sell, order).await
    }

    async fn settle(
        &self,
        account: AccountId,
        action: TradeAction,
        order: &TradeOrder,
    ) -> Result<SettlementReceipt, TradingError> {
        let _guard = self.locks.acquire(account).await;

        let result = match self.try_settle(account, action, order).await {
            Err(TradingError::ConcurrencyConflict(_)) => {
                warn!(
                    "Conflict settling {} {} for account {}, retrying once",
                    action, order.ticker, account
                );
                self.try_settle(account, action, order).await
            }
            other => other,
        };

        match &result {
            Ok(receipt) => info!(
                "Account {}: {} (balance {})",
                account, receipt.message, receipt.balance
            ),
            Err(e) => warn!("Account {}: {} {} rejected: {}", account, action, order.ticker, e),
        }

        result
    }

    async fn try_settle(
        &self,
        account: AccountId,
        action: TradeAction,
        order: &TradeOrder,
    ) -> Result<SettlementReceipt, TradingError> {
        let store_err = move |e| TradingError::from_store(account, e);

        let mut tx = self.ledger.begin(account).await.map_err(store_err)?;
        let balance = tx.balance().await.map_err(store_err)?;
        let total = order.total();

        let lots = tx.lots_for(&order.ticker).await.map_err(store_err)?;
        let is_sell = action == TradeAction::Sell;
        let lot = Lot::new(
            order.ticker.clone(),
            order.shares.signed(is_sell),
            order.price.value(),
        );

        let new_balance = match action {
            TradeAction::Buy => {
                if balance < total {
                    return Err(TradingError::InsufficientFunds {
                        required: total,
                        available: balance,
                    });
                }
                let mut after = lots;
                after.push(lot.clone());
                if PositionAggregator::position_for(&after, &order.ticker).is_none() {
                    return Err(out_of_range(format!(
                        "{} position would exceed the representable share count or cost",
                        order.ticker
                    )));
                }
                balance - total
            }
            TradeAction::Sell => {
                let held = PositionAggregator::net_shares(&lots, &order.ticker);
                if held < order.shares.value() {
                    return Err(TradingError::InsufficientShares {
                        ticker: order.ticker.to_string(),
                        requested: order.shares.value(),
                        held,
                    });
                }
                balance.checked_add(total).ok_or_else(|| {
                    out_of_range(format!("balance after selling {} is too large", order.ticker))
                })?
            }
        };

        let transaction = Transaction::new(
            order.ticker.clone(),
            action,
            order.shares.value(),
            order.price.value(),
        )?;

        tx.update_balance(new_balance).await.map_err(store_err)?;
        tx.append_lot(&lot).await.map_err(store_err)?;
        tx.append_transaction(&transaction)
            .await
            .map_err(store_err)?;
        tx.commit().await.map_err(store_err)?;

        let verb = if is_sell { "Sold" } else { "Bought" };
        Ok(SettlementReceipt {
            action,
            ticker: order.ticker.clone(),
            shares: order.shares.value(),
            price: order.price.value(),
            total,
            balance: new_balance,
            message: format!(
                "{} {} shares of {} at {}",
                verb, order.shares, order.ticker, order.price
            ),
        })
    }
}

fn out_of_range(reason: String) -> TradingError {
    TradingError::Validation(ValidationError::AmountOutOfRange(reason))
}

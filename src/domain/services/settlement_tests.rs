//! Settlement tests against the in-memory ledger

#[cfg(test)]
mod settlement_tests {
    use crate::domain::entities::account::{AccountId, NewAccount};
    use crate::domain::entities::lot::Lot;
    use crate::domain::entities::transaction::{TradeAction, Transaction};
    use crate::domain::errors::{StoreError, TradingError, ValidationError};
    use crate::domain::repositories::account_store::AccountStore;
    use crate::domain::repositories::ledger_store::{
        LedgerSnapshot, LedgerStore, LedgerTransaction, StoreResult,
    };
    use crate::domain::services::position_aggregator::PositionAggregator;
    use crate::domain::services::settlement::{TradeOrder, TradeSettlement};
    use crate::domain::value_objects::ticker::Ticker;
    use crate::infrastructure::memory_store::InMemoryStore;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn setup() -> (Arc<InMemoryStore>, TradeSettlement, AccountId) {
        let store = Arc::new(InMemoryStore::new());
        let account = store
            .create(NewAccount {
                username: "trader".to_string(),
                password_hash: "x".to_string(),
                starting_balance: dec!(100000),
            })
            .await
            .unwrap();
        let settlement = TradeSettlement::new(store.clone());
        (store, settlement, account.id)
    }

    fn order(ticker: &str, shares: Decimal, price: Decimal) -> TradeOrder {
        TradeOrder::new(ticker, shares, price).unwrap()
    }

    #[tokio::test]
    async fn test_buy_then_sell_updates_balance_and_position() {
        let (store, settlement, id) = setup().await;

        let receipt = settlement
            .buy(id, &order("AAPL", dec!(10), dec!(150)))
            .await
            .unwrap();
        assert_eq!(receipt.balance, dec!(98500));
        assert_eq!(receipt.total, dec!(1500));
        assert_eq!(receipt.message, "Bought 10 shares of AAPL at $150.00");

        let receipt = settlement
            .sell(id, &order("AAPL", dec!(4), dec!(180)))
            .await
            .unwrap();
        assert_eq!(receipt.balance, dec!(99220));
        assert_eq!(receipt.message, "Sold 4 shares of AAPL at $180.00");

        let lots = store.lots(id).await.unwrap();
        let position =
            PositionAggregator::position_for(&lots, &Ticker::parse("AAPL").unwrap()).unwrap();
        assert_eq!(position.net_shares, dec!(6));
        assert_eq!(position.weighted_avg_cost, dec!(150));

        let history = store.transactions(id, 50).await.unwrap();
        let actions: Vec<_> = history.iter().map(|t| t.action).collect();
        assert_eq!(actions, vec![TradeAction::Sell, TradeAction::Buy]);
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_ledger_untouched() {
        let (store, settlement, id) = setup().await;

        let err = settlement
            .buy(id, &order("AAPL", dec!(1000), dec!(150)))
            .await
            .unwrap_err();
        assert!(matches!(err, TradingError::InsufficientFunds { .. }));

        assert_eq!(LedgerStore::balance(store.as_ref(), id).await.unwrap(), dec!(100000));
        assert!(store.lots(id).await.unwrap().is_empty());
        assert!(store.transactions(id, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_buy_of_entire_balance_allowed() {
        let (store, settlement, id) = setup().await;
        settlement
            .buy(id, &order("AAPL", dec!(1000), dec!(100)))
            .await
            .unwrap();
        assert_eq!(LedgerStore::balance(store.as_ref(), id).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_insufficient_shares_leaves_ledger_untouched() {
        let (store, settlement, id) = setup().await;
        settlement
            .buy(id, &order("AAPL", dec!(2), dec!(100)))
            .await
            .unwrap();

        let err = settlement
            .sell(id, &order("AAPL", dec!(3), dec!(100)))
            .await
            .unwrap_err();
        match err {
            TradingError::InsufficientShares { requested, held, .. } => {
                assert_eq!(requested, dec!(3));
                assert_eq!(held, dec!(2));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert_eq!(LedgerStore::balance(store.as_ref(), id).await.unwrap(), dec!(99800));
        assert_eq!(store.lots(id).await.unwrap().len(), 1);
        assert_eq!(store.transactions(id, 50).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sell_of_unheld_ticker_rejected() {
        let (_store, settlement, id) = setup().await;
        let err = settlement
            .sell(id, &order("MSFT", dec!(1), dec!(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, TradingError::InsufficientShares { .. }));
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let (_store, settlement, _id) = setup().await;
        let err = settlement
            .buy(AccountId(999), &order("AAPL", dec!(1), dec!(1)))
            .await
            .unwrap_err();
        assert_eq!(err, TradingError::AccountNotFound(AccountId(999)));
    }

    #[test]
    fn test_order_validation() {
        assert!(matches!(
            TradeOrder::new("AAPL", dec!(0), dec!(10)),
            Err(ValidationError::InvalidQuantity(_))
        ));
        assert!(matches!(
            TradeOrder::new("AAPL", dec!(1), dec!(-10)),
            Err(ValidationError::InvalidPrice(_))
        ));
        assert!(matches!(
            TradeOrder::new("", dec!(1), dec!(10)),
            Err(ValidationError::InvalidTicker(_))
        ));
        assert_eq!(order("aapl", dec!(2.5), dec!(4)).total(), dec!(10));
    }

    fn big(exp: u32) -> Decimal {
        Decimal::from(10i64.pow(exp))
    }

    #[test]
    fn test_order_total_overflow_rejected() {
        assert!(matches!(
            TradeOrder::new("AAPL", big(15), big(15)),
            Err(ValidationError::AmountOutOfRange(_))
        ));
    }

    #[tokio::test]
    async fn test_huge_affordable_looking_order_is_insufficient_funds() {
        let (store, settlement, id) = setup().await;
        let err = settlement
            .buy(id, &order("AAPL", big(13), big(13)))
            .await
            .unwrap_err();
        assert!(matches!(err, TradingError::InsufficientFunds { .. }));
        assert_eq!(LedgerStore::balance(store.as_ref(), id).await.unwrap(), dec!(100000));
        assert!(store.lots(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sell_that_overflows_balance_rejected() {
        let (store, settlement, id) = setup().await;
        settlement
            .buy(id, &order("AAPL", dec!(1), dec!(1)))
            .await
            .unwrap();

        let err = settlement
            .sell(id, &order("AAPL", dec!(1), Decimal::MAX))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TradingError::Validation(ValidationError::AmountOutOfRange(_))
        ));
        assert_eq!(LedgerStore::balance(store.as_ref(), id).await.unwrap(), dec!(99999));
        assert_eq!(store.lots(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_buy_that_overflows_share_count_rejected() {
        let (store, settlement, id) = setup().await;
        let tiny = Decimal::new(1, 28);
        settlement
            .buy(id, &order("PENNY", Decimal::MAX, tiny))
            .await
            .unwrap();

        let err = settlement
            .buy(id, &order("PENNY", Decimal::MAX, tiny))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TradingError::Validation(ValidationError::AmountOutOfRange(_))
        ));
        assert_eq!(store.lots(id).await.unwrap().len(), 1);
        assert_eq!(store.transactions(id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_idle_locks_are_pruned() {
        let (_store, settlement, id) = setup().await;
        settlement
            .buy(id, &order("AAPL", dec!(1), dec!(1)))
            .await
            .unwrap();
        assert_eq!(settlement.prune_idle_locks(), 1);
        assert_eq!(settlement.prune_idle_locks(), 0);
    }

    /// Replaying the transaction history from the starting balance must land
    /// on the stored balance and the stored lots.
    #[tokio::test]
    async fn test_history_replays_to_current_state() {
        let (store, settlement, id) = setup().await;
        let steps = [
            (TradeAction::Buy, "AAPL", dec!(10), dec!(150)),
            (TradeAction::Buy, "MSFT", dec!(3), dec!(310.55)),
            (TradeAction::Sell, "AAPL", dec!(20), dec!(155)),
            (TradeAction::Sell, "AAPL", dec!(4), dec!(170.10)),
            (TradeAction::Buy, "AAPL", dec!(0.5), dec!(160)),
            (TradeAction::Buy, "TSLA", dec!(100000), dec!(200)),
            (TradeAction::Sell, "MSFT", dec!(3), dec!(300)),
        ];
        for (action, ticker, shares, price) in steps {
            let o = order(ticker, shares, price);
            let _ = match action {
                TradeAction::Buy => settlement.buy(id, &o).await,
                TradeAction::Sell => settlement.sell(id, &o).await,
            };
        }

        let mut history = store.transactions(id, 100).await.unwrap();
        history.reverse();
        assert_eq!(history.len(), 5);

        let replayed_balance = history.iter().fold(dec!(100000), |bal, t| match t.action {
            TradeAction::Buy => bal - t.total,
            TradeAction::Sell => bal + t.total,
        });
        assert_eq!(
            replayed_balance,
            LedgerStore::balance(store.as_ref(), id).await.unwrap()
        );

        let replayed_lots: Vec<(String, Decimal)> = history
            .iter()
            .map(|t| {
                let signed = if t.action == TradeAction::Sell { -t.shares } else { t.shares };
                (t.ticker.to_string(), signed)
            })
            .collect();
        let stored_lots: Vec<(String, Decimal)> = store
            .lots(id)
            .await
            .unwrap()
            .into_iter()
            .map(|l| (l.ticker.to_string(), l.shares))
            .collect();
        assert_eq!(replayed_lots, stored_lots);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sells_never_oversell() {
        let (store, settlement, id) = setup().await;
        settlement
            .buy(id, &order("AAPL", dec!(5), dec!(100)))
            .await
            .unwrap();

        let settlement = Arc::new(settlement);
        let handles: Vec<_> = (0..20)
            .map(|_| {
                let settlement = settlement.clone();
                tokio::spawn(async move {
                    settlement
                        .sell(id, &order("AAPL", dec!(1), dec!(100)))
                        .await
                })
            })
            .collect();

        let mut filled = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => filled += 1,
                Err(TradingError::InsufficientShares { .. }) => {}
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        assert_eq!(filled, 5);
        let lots = store.lots(id).await.unwrap();
        let aapl = Ticker::parse("AAPL").unwrap();
        assert_eq!(PositionAggregator::net_shares(&lots, &aapl), Decimal::ZERO);
        assert_eq!(LedgerStore::balance(store.as_ref(), id).await.unwrap(), dec!(100000));
    }

    /// Reports a conflict on the first `failures` calls to `begin`.
    struct ConflictingStore {
        inner: Arc<InMemoryStore>,
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LedgerStore for ConflictingStore {
        async fn begin(&self, account: AccountId) -> StoreResult<Box<dyn LedgerTransaction>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(StoreError::Conflict);
            }
            self.inner.begin(account).await
        }

        async fn balance(&self, account: AccountId) -> StoreResult<Decimal> {
            LedgerStore::balance(self.inner.as_ref(), account).await
        }

        async fn lots(&self, account: AccountId) -> StoreResult<Vec<Lot>> {
            self.inner.lots(account).await
        }

        async fn snapshot(&self, account: AccountId) -> StoreResult<LedgerSnapshot> {
            self.inner.snapshot(account).await
        }

        async fn transactions(
            &self,
            account: AccountId,
            limit: usize,
        ) -> StoreResult<Vec<Transaction>> {
            self.inner.transactions(account, limit).await
        }
    }

    async fn conflicting(failures: usize) -> (Arc<ConflictingStore>, TradeSettlement, AccountId) {
        let (inner, _, id) = setup().await;
        let store = Arc::new(ConflictingStore {
            inner,
            failures,
            calls: AtomicUsize::new(0),
        });
        let settlement = TradeSettlement::new(store.clone());
        (store, settlement, id)
    }

    #[tokio::test]
    async fn test_single_conflict_is_retried() {
        let (store, settlement, id) = conflicting(1).await;
        let receipt = settlement
            .buy(id, &order("AAPL", dec!(1), dec!(100)))
            .await
            .unwrap();
        assert_eq!(receipt.balance, dec!(99900));
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_repeated_conflict_surfaces() {
        let (store, settlement, id) = conflicting(2).await;
        let err = settlement
            .buy(id, &order("AAPL", dec!(1), dec!(100)))
            .await
            .unwrap_err();
        assert_eq!(err, TradingError::ConcurrencyConflict(id));
        assert_eq!(LedgerStore::balance(store.as_ref(), id).await.unwrap(), dec!(100000));
    }
}

//! PositionAggregator - derives holdings from the lot ledger
//!
//! Average cost is the lifetime average of buy lots. Sells reduce the share
//! count but never the average, and no FIFO/LIFO lot matching is done.

use crate::domain::entities::lot::Lot;
use crate::domain::entities::position::Position;
use crate::domain::value_objects::ticker::Ticker;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    net_shares: Decimal,
    bought_shares: Decimal,
    bought_cost: Decimal,
    /// Set once any running sum left the `Decimal` range; the sums then
    /// saturate instead of panicking.
    overflowed: bool,
}

impl Accumulator {
    fn add(&mut self, lot: &Lot) {
        self.net_shares = self.sum(self.net_shares, Some(lot.shares));
        if lot.is_buy() {
            self.bought_shares = self.sum(self.bought_shares, Some(lot.shares));
            self.bought_cost = self.sum(self.bought_cost, lot.shares.checked_mul(lot.price));
        }
    }

    fn sum(&mut self, acc: Decimal, term: Option<Decimal>) -> Decimal {
        match term.and_then(|t| acc.checked_add(t)) {
            Some(v) => v,
            None => {
                self.overflowed = true;
                Decimal::MAX
            }
        }
    }

    fn weighted_avg_cost(&self) -> Decimal {
        if self.bought_shares.is_zero() {
            Decimal::ZERO
        } else {
            self.bought_cost
                .checked_div(self.bought_shares)
                .unwrap_or(Decimal::ZERO)
        }
    }

    fn position(&self, ticker: &Ticker) -> Position {
        Position {
            ticker: ticker.clone(),
            net_shares: self.net_shares,
            weighted_avg_cost: self.weighted_avg_cost(),
        }
    }
}

pub struct PositionAggregator;

impl PositionAggregator {
    /// Every ticker that appears in `lots`, including closed and oversold
    /// ones, in ticker order.
    pub fn aggregate(lots: &[Lot]) -> Vec<Position> {
        let mut by_ticker: BTreeMap<&Ticker, Accumulator> = BTreeMap::new();
        for lot in lots {
            by_ticker.entry(&lot.ticker).or_default().add(lot);
        }

        by_ticker
            .into_iter()
            .map(|(ticker, acc)| acc.position(ticker))
            .collect()
    }

    /// Positions with a strictly positive share count.
    pub fn open_positions(lots: &[Lot]) -> Vec<Position> {
        Self::aggregate(lots)
            .into_iter()
            .filter(Position::is_open)
            .collect()
    }

    /// Position for a single ticker; lots of other tickers are ignored.
    /// `None` when its share count or cost does not fit in a `Decimal`.
    pub fn position_for(lots: &[Lot], ticker: &Ticker) -> Option<Position> {
        let mut acc = Accumulator::default();
        for lot in lots.iter().filter(|l| &l.ticker == ticker) {
            acc.add(lot);
        }
        (!acc.overflowed).then(|| acc.position(ticker))
    }

    pub fn net_shares(lots: &[Lot], ticker: &Ticker) -> Decimal {
        lots.iter()
            .filter(|l| &l.ticker == ticker)
            .fold(Decimal::ZERO, |acc, l| acc.saturating_add(l.shares))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn lot(ticker: &str, shares: Decimal, price: Decimal) -> Lot {
        Lot::new(Ticker::parse(ticker).unwrap(), shares, price)
    }

    #[test]
    fn test_net_shares_is_sum_of_signed_lots() {
        let lots = vec![
            lot("AAPL", dec!(10), dec!(150)),
            lot("AAPL", dec!(-4), dec!(180)),
            lot("MSFT", dec!(3), dec!(300)),
        ];
        let aapl = Ticker::parse("AAPL").unwrap();
        assert_eq!(PositionAggregator::net_shares(&lots, &aapl), dec!(6));
    }

    #[test]
    fn test_weighted_average_over_buy_lots() {
        let lots = vec![
            lot("AAPL", dec!(10), dec!(10)),
            lot("AAPL", dec!(10), dec!(20)),
        ];
        let pos = PositionAggregator::position_for(&lots, &Ticker::parse("AAPL").unwrap()).unwrap();
        assert_eq!(pos.net_shares, dec!(20));
        assert_eq!(pos.weighted_avg_cost, dec!(15));
    }

    #[test]
    fn test_sell_does_not_change_average_cost() {
        let mut lots = vec![
            lot("AAPL", dec!(10), dec!(10)),
            lot("AAPL", dec!(10), dec!(20)),
        ];
        lots.push(lot("AAPL", dec!(-5), dec!(99)));

        let pos = PositionAggregator::position_for(&lots, &Ticker::parse("AAPL").unwrap()).unwrap();
        assert_eq!(pos.net_shares, dec!(15));
        assert_eq!(pos.weighted_avg_cost, dec!(15));
    }

    #[test]
    fn test_open_positions_excludes_closed_and_oversold() {
        let lots = vec![
            lot("AAPL", dec!(5), dec!(100)),
            lot("AAPL", dec!(-5), dec!(110)),
            lot("TSLA", dec!(2), dec!(200)),
            lot("TSLA", dec!(-3), dec!(210)),
            lot("NVDA", dec!(1), dec!(400)),
        ];

        let all = PositionAggregator::aggregate(&lots);
        assert_eq!(all.len(), 3);

        let open = PositionAggregator::open_positions(&lots);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].ticker.as_str(), "NVDA");
    }

    #[test]
    fn test_aggregate_sorted_by_ticker() {
        let lots = vec![
            lot("TSLA", dec!(1), dec!(1)),
            lot("AAPL", dec!(1), dec!(1)),
            lot("MSFT", dec!(1), dec!(1)),
        ];
        let tickers: Vec<_> = PositionAggregator::aggregate(&lots)
            .into_iter()
            .map(|p| p.ticker.to_string())
            .collect();
        assert_eq!(tickers, vec!["AAPL", "MSFT", "TSLA"]);
    }

    #[test]
    fn test_no_buy_lots_means_zero_average() {
        let lots = vec![lot("AAPL", dec!(-1), dec!(50))];
        let pos = PositionAggregator::position_for(&lots, &Ticker::parse("AAPL").unwrap()).unwrap();
        assert_eq!(pos.weighted_avg_cost, Decimal::ZERO);
        assert!(!pos.is_open());
    }

    #[test]
    fn test_unknown_ticker_is_empty_position() {
        let lots = vec![lot("AAPL", dec!(1), dec!(50))];
        let pos = PositionAggregator::position_for(&lots, &Ticker::parse("GOOG").unwrap()).unwrap();
        assert_eq!(pos.net_shares, Decimal::ZERO);
    }

    #[test]
    fn test_unrepresentable_position_is_none() {
        let lots = vec![
            lot("AAPL", Decimal::MAX, dec!(0.0000000001)),
            lot("AAPL", Decimal::MAX, dec!(0.0000000001)),
        ];
        let aapl = Ticker::parse("AAPL").unwrap();
        assert!(PositionAggregator::position_for(&lots, &aapl).is_none());

        // Views still aggregate without panicking.
        assert_eq!(PositionAggregator::net_shares(&lots, &aapl), Decimal::MAX);
        assert_eq!(PositionAggregator::aggregate(&lots).len(), 1);
    }

    #[test]
    fn test_large_cost_basis_overflow_detected() {
        let lots = vec![lot("AAPL", Decimal::from(10i64.pow(15)), Decimal::from(10i64.pow(15)))];
        let aapl = Ticker::parse("AAPL").unwrap();
        assert!(PositionAggregator::position_for(&lots, &aapl).is_none());
    }
}

//! ValuationEngine - marks positions to market and totals the portfolio
//!
//! One bad quote must not block the rest of the portfolio: a failed, empty
//! or timed-out quote values that holding at a price of zero and flags it
//! with `quote_available = false`.

use crate::domain::entities::position::Position;
use crate::domain::repositories::price_oracle::{PriceOracle, QuoteResult};
use crate::domain::value_objects::period::Period;
use crate::domain::value_objects::ticker::Ticker;
use futures_util::future::join_all;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Round a reported amount to cents, midpoint away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `part / whole * 100`, or zero when `whole` is zero or the ratio does not
/// fit in a `Decimal`.
pub fn percent_of(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        return Decimal::ZERO;
    }
    part.checked_div(whole)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingValuation {
    pub ticker: Ticker,
    pub shares: Decimal,
    pub avg_price: Decimal,
    pub current_price: Decimal,
    pub market_value: Decimal,
    pub cost_basis: Decimal,
    pub gain_loss: Decimal,
    pub gain_loss_pct: Decimal,
    pub quote_available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioValuation {
    pub balance: Decimal,
    pub invested_value: Decimal,
    pub total_value: Decimal,
    pub overall_gain: Decimal,
    pub overall_gain_pct: Decimal,
    pub holdings: Vec<HoldingValuation>,
}

/// Full-precision figures for one holding; rounded only when reported.
#[derive(Debug, Clone, Copy)]
struct Marks {
    market_value: Decimal,
    cost_basis: Decimal,
    gain_loss: Decimal,
}

impl Marks {
    const ZERO: Marks = Marks {
        market_value: Decimal::ZERO,
        cost_basis: Decimal::ZERO,
        gain_loss: Decimal::ZERO,
    };

    /// `None` when any figure leaves the `Decimal` range.
    fn of(position: &Position, current_price: Decimal) -> Option<Self> {
        let market_value = current_price.checked_mul(position.net_shares)?;
        let cost_basis = position.weighted_avg_cost.checked_mul(position.net_shares)?;
        Some(Self {
            market_value,
            cost_basis,
            gain_loss: market_value.checked_sub(cost_basis)?,
        })
    }

    fn unpriced(position: &Position) -> Self {
        Self::of(position, Decimal::ZERO).unwrap_or(Self::ZERO)
    }
}

/// Price actually used for a holding and its marks. A holding whose value
/// cannot be represented is treated like one without a quote.
fn mark(position: &Position, current_price: Option<Decimal>) -> (Option<Decimal>, Marks) {
    let Some(price) = current_price else {
        return (None, Marks::unpriced(position));
    };
    match Marks::of(position, price) {
        Some(marks) => (Some(price), marks),
        None => {
            warn!(
                "{} shares of {} at {} are out of range, valuing at 0",
                position.net_shares, position.ticker, price
            );
            (None, Marks::unpriced(position))
        }
    }
}

fn holding(position: &Position, price: Option<Decimal>, marks: Marks) -> HoldingValuation {
    HoldingValuation {
        ticker: position.ticker.clone(),
        shares: position.net_shares,
        avg_price: round_money(position.weighted_avg_cost),
        current_price: round_money(price.unwrap_or(Decimal::ZERO)),
        market_value: round_money(marks.market_value),
        cost_basis: round_money(marks.cost_basis),
        gain_loss: round_money(marks.gain_loss),
        gain_loss_pct: round_money(percent_of(marks.gain_loss, marks.cost_basis)),
        quote_available: price.is_some(),
    }
}

/// Value a single position. `None` means no usable quote.
pub fn value_position(position: &Position, current_price: Option<Decimal>) -> HoldingValuation {
    let (price, marks) = mark(position, current_price);
    holding(position, price, marks)
}

/// Portfolio totals over already-priced holdings. A holding that would push
/// the total out of range is valued at zero instead.
pub fn summarize(
    cash: Decimal,
    positions: &[(Position, Option<Decimal>)],
    starting_balance: Decimal,
) -> PortfolioValuation {
    let mut total_value = cash;
    let mut holdings = Vec::with_capacity(positions.len());

    for (position, current_price) in positions {
        let (mut price, mut marks) = mark(position, *current_price);
        match total_value.checked_add(marks.market_value) {
            Some(total) => total_value = total,
            None => {
                warn!(
                    "Portfolio total out of range at {}, valuing it at 0",
                    position.ticker
                );
                price = None;
                marks = Marks::unpriced(position);
            }
        }
        holdings.push(holding(position, price, marks));
    }

    let invested = total_value.saturating_sub(cash);
    let overall_gain = total_value.saturating_sub(starting_balance);

    PortfolioValuation {
        balance: round_money(cash),
        invested_value: round_money(invested),
        total_value: round_money(total_value),
        overall_gain: round_money(overall_gain),
        overall_gain_pct: round_money(percent_of(overall_gain, starting_balance)),
        holdings,
    }
}

pub struct ValuationEngine {
    oracle: Arc<dyn PriceOracle>,
    quote_timeout: Duration,
    starting_balance: Decimal,
}

impl ValuationEngine {
    pub fn new(
        oracle: Arc<dyn PriceOracle>,
        quote_timeout: Duration,
        starting_balance: Decimal,
    ) -> Self {
        Self {
            oracle,
            quote_timeout,
            starting_balance,
        }
    }

    /// Value the open positions among `positions` against live quotes.
    pub async fn value_portfolio(&self, cash: Decimal, positions: &[Position]) -> PortfolioValuation {
        let open: Vec<&Position> = positions.iter().filter(|p| p.is_open()).collect();

        let prices = join_all(open.iter().map(|p| self.current_price(&p.ticker))).await;

        let priced: Vec<(Position, Option<Decimal>)> = open
            .into_iter()
            .cloned()
            .zip(prices)
            .collect();

        debug!(
            "Valued {} holdings ({} without quote)",
            priced.len(),
            priced.iter().filter(|(_, p)| p.is_none()).count()
        );

        summarize(cash, &priced, self.starting_balance)
    }

    async fn current_price(&self, ticker: &Ticker) -> Option<Decimal> {
        match tokio::time::timeout(
            self.quote_timeout,
            self.oracle.get_quote(ticker, Period::FiveDays),
        )
        .await
        {
            Ok(result) => {
                let price = result.current_price();
                if price.is_none() {
                    warn!("No quote for {}, valuing at 0: {}", ticker, result_kind(&result));
                }
                price
            }
            Err(_) => {
                warn!(
                    "Quote for {} timed out after {:?}, valuing at 0",
                    ticker, self.quote_timeout
                );
                None
            }
        }
    }
}

fn result_kind(result: &QuoteResult) -> String {
    match result {
        QuoteResult::Found(_) => "empty history".to_string(),
        QuoteResult::NotFound => "not found".to_string(),
        QuoteResult::TransientError(reason) => format!("transient error: {}", reason),
    }
}

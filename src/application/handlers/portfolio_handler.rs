use crate::application::response::{ok, Success};
use crate::application::state::AppState;
use crate::auth::AuthenticatedAccount;
use crate::domain::errors::{ApiError, TradingError};
use crate::domain::services::position_aggregator::PositionAggregator;
use crate::domain::services::valuation::PortfolioValuation;
use axum::{extract::State, Extension, Json};

/// GET /api/portfolio
pub async fn portfolio(
    State(state): State<AppState>,
    Extension(account): Extension<AuthenticatedAccount>,
) -> Result<Json<Success<PortfolioValuation>>, ApiError> {
    let snapshot = state
        .ledger
        .snapshot(account.id)
        .await
        .map_err(|e| TradingError::from_store(account.id, e))?;
    let positions = PositionAggregator::open_positions(&snapshot.lots);

    Ok(ok(state
        .valuation
        .value_portfolio(snapshot.balance, &positions)
        .await))
}

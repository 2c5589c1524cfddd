use crate::application::dto::TradeRequest;
use crate::application::response::{ok, Success};
use crate::application::state::AppState;
use crate::auth::AuthenticatedAccount;
use crate::domain::errors::ApiError;
use crate::domain::services::settlement::{SettlementReceipt, TradeOrder};
use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};

fn parse_order(payload: Result<Json<TradeRequest>, JsonRejection>) -> Result<TradeOrder, ApiError> {
    let Json(req) = payload?;
    Ok(TradeOrder::new(&req.ticker, req.shares, req.price)?)
}

/// POST /api/buy
pub async fn buy(
    State(state): State<AppState>,
    Extension(account): Extension<AuthenticatedAccount>,
    payload: Result<Json<TradeRequest>, JsonRejection>,
) -> Result<Json<Success<SettlementReceipt>>, ApiError> {
    let order = parse_order(payload)?;
    Ok(ok(state.settlement.buy(account.id, &order).await?))
}

/// POST /api/sell
pub async fn sell(
    State(state): State<AppState>,
    Extension(account): Extension<AuthenticatedAccount>,
    payload: Result<Json<TradeRequest>, JsonRejection>,
) -> Result<Json<Success<SettlementReceipt>>, ApiError> {
    let order = parse_order(payload)?;
    Ok(ok(state.settlement.sell(account.id, &order).await?))
}

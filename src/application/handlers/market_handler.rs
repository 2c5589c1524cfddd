use crate::application::dto::StockQuery;
use crate::application::response::{ok, Success};
use crate::application::state::AppState;
use crate::domain::errors::ApiError;
use crate::domain::services::market_data::{SearchResult, StockDetail};
use crate::domain::value_objects::{period::Period, ticker::Ticker};
use axum::{
    extract::{Path, Query, State},
    Json,
};

/// GET /api/stock/:ticker?period=
pub async fn stock_detail(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(query): Query<StockQuery>,
) -> Result<Json<Success<StockDetail>>, ApiError> {
    let ticker = Ticker::parse(&ticker)?;
    let period = match query.period.as_deref() {
        Some(raw) => raw.parse::<Period>()?,
        None => Period::default(),
    };

    Ok(ok(state.market_data.stock_detail(&ticker, period).await?))
}

/// GET /api/search/:ticker
pub async fn search(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<Success<SearchResult>>, ApiError> {
    let ticker = Ticker::parse(&ticker)?;
    Ok(ok(state.market_data.search(&ticker).await?))
}

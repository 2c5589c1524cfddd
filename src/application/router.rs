use crate::application::dto::HealthResponse;
use crate::application::handlers::{
    account_handler, leaderboard_handler, market_handler, portfolio_handler, trade_handler,
};
use crate::application::response::{ok, Success};
use crate::application::state::AppState;
use crate::auth::require_auth;
use crate::rate_limit::rate_limit_middleware;
use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Request bodies above this size are rejected with 413
pub const MAX_BODY_BYTES: usize = 64 * 1024;

async fn health() -> Json<Success<HealthResponse>> {
    ok(HealthResponse { status: "running" })
}

pub fn build_router(state: AppState) -> Router {
    // Layers run outermost-last: authentication first, then rate limiting.
    let protected = Router::new()
        .route("/api/user", get(account_handler::current_user))
        .route("/api/transactions", get(account_handler::transactions))
        .route("/api/stock/:ticker", get(market_handler::stock_detail))
        .route("/api/search/:ticker", get(market_handler::search))
        .route("/api/portfolio", get(portfolio_handler::portfolio))
        .route("/api/buy", post(trade_handler::buy))
        .route("/api/sell", post(trade_handler::sell))
        .route("/api/leaderboard/top10", get(leaderboard_handler::top))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .route("/api/register", post(account_handler::register))
        .route("/api/login", post(account_handler::login))
        .merge(protected)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

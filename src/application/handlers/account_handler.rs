use crate::application::dto::{AuthResponse, CredentialsRequest, TransactionsQuery, TransactionsResponse};
use crate::application::response::{ok, Success};
use crate::application::state::AppState;
use crate::auth::AuthenticatedAccount;
use crate::domain::errors::ApiError;
use crate::domain::services::account_service::{Profile, DEFAULT_TRANSACTION_LIMIT};
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Extension, Json,
};

const MAX_TRANSACTION_LIMIT: usize = 500;

/// POST /api/register
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<Success<AuthResponse>>, ApiError> {
    let Json(req) = payload?;
    let account = state.accounts.register(&req.username, &req.password).await?;
    let token = state.jwt.issue(account.id, &account.username)?;

    Ok(ok(AuthResponse {
        token,
        username: account.username,
        balance: Some(account.balance),
    }))
}

/// POST /api/login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<Success<AuthResponse>>, ApiError> {
    let Json(req) = payload?;
    let account = state
        .accounts
        .authenticate(&req.username, &req.password)
        .await?;
    let token = state.jwt.issue(account.id, &account.username)?;

    Ok(ok(AuthResponse {
        token,
        username: account.username,
        balance: None,
    }))
}

/// GET /api/user
pub async fn current_user(
    State(state): State<AppState>,
    Extension(account): Extension<AuthenticatedAccount>,
) -> Result<Json<Success<Profile>>, ApiError> {
    Ok(ok(state.accounts.profile(account.id).await?))
}

/// GET /api/transactions?limit=
pub async fn transactions(
    State(state): State<AppState>,
    Extension(account): Extension<AuthenticatedAccount>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<Success<TransactionsResponse>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_TRANSACTION_LIMIT)
        .clamp(1, MAX_TRANSACTION_LIMIT);
    let transactions = state.accounts.transactions(account.id, limit).await?;
    Ok(ok(TransactionsResponse { transactions }))
}

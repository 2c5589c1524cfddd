use crate::application::state::AppState;
use crate::auth::AuthenticatedAccount;
use crate::domain::entities::account::AccountId;
use crate::domain::errors::ApiError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter configuration
pub struct RateLimiterConfig {
    /// Maximum requests per minute for one account
    pub requests_per_minute: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 120,
        }
    }
}

/// Per-account rate limiter
pub type AccountRateLimiter =
    Arc<RateLimiter<AccountId, DefaultKeyedStateStore<AccountId>, DefaultClock>>;

/// Create a new rate limiter. A zero rate is clamped to one request per minute.
pub fn create_rate_limiter(config: RateLimiterConfig) -> AccountRateLimiter {
    let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute)))
}

/// Drop accounts whose quota has fully replenished, so the keyed store only
/// holds recently active accounts. Returns the number of accounts dropped.
pub fn prune_idle(limiter: &AccountRateLimiter) -> usize {
    let before = limiter.len();
    limiter.retain_recent();
    limiter.shrink_to_fit();
    before.saturating_sub(limiter.len())
}

/// Middleware to apply rate limiting. Runs after `require_auth`, so requests
/// without an identity pass through untouched.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let account = request
        .extensions()
        .get::<AuthenticatedAccount>()
        .map(|a| a.id);

    if let Some(id) = account {
        if state.rate_limiter.check_key(&id).is_err() {
            tracing::warn!("Rate limit exceeded for account {}", id);
            return ApiError::RateLimitExceeded.into_response();
        }
    }

    next.run(request).await
}

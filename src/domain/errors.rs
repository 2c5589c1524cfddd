use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::domain::entities::account::AccountId;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid ticker: {0}")]
    InvalidTicker(String),

    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Amount out of range: {0}")]
    AmountOutOfRange(String),
}

/// Failures reported by the repository implementations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Conflicting concurrent update")]
    Conflict,

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Errors that terminate a buy or sell request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TradingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("Not enough shares of {ticker}: requested {requested}, held {held}")]
    InsufficientShares {
        ticker: String,
        requested: Decimal,
        held: Decimal,
    },

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Concurrent update detected for account {0}, please retry")]
    ConcurrencyConflict(AccountId),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl TradingError {
    pub fn from_store(account: AccountId, e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => TradingError::AccountNotFound(account),
            StoreError::Conflict => TradingError::ConcurrencyConflict(account),
            StoreError::Duplicate(msg) | StoreError::Backend(msg) => TradingError::Storage(msg),
        }
    }
}

/// Errors for market data requests where the quote is the whole answer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MarketDataError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("No quote available for {ticker}")]
    QuoteUnavailable { ticker: String },

    #[error("{service} unavailable: {reason}")]
    UpstreamService { service: String, reason: String },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AccountError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Username taken")]
    UsernameTaken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account not found: {0}")]
    NotFound(AccountId),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for AccountError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(_) => AccountError::UsernameTaken,
            other => AccountError::Storage(other.to_string()),
        }
    }
}

/// HTTP-facing error, one variant per response class.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InsufficientFunds(String),

    #[error("{0}")]
    InsufficientShares(String),

    #[error("{0}")]
    UsernameTaken(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    ConcurrencyConflict(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

/// Body of every failed API response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub kind: &'static str,
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::InsufficientFunds(_) => "insufficient_funds",
            ApiError::InsufficientShares(_) => "insufficient_shares",
            ApiError::UsernameTaken(_) => "username_taken",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::NotFound(_) => "quote_unavailable",
            ApiError::RateLimitExceeded => "rate_limited",
            ApiError::Upstream(_) => "upstream_service_error",
            ApiError::ConcurrencyConflict(_) => "concurrency_conflict",
            ApiError::InternalServerError(_) => "internal_error",
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            success: false,
            error: self.to_string(),
            kind: self.kind(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Validation(e.to_string())
    }
}

impl From<TradingError> for ApiError {
    fn from(e: TradingError) -> Self {
        match e {
            TradingError::Validation(v) => ApiError::Validation(v.to_string()),
            e @ TradingError::InsufficientFunds { .. } => ApiError::InsufficientFunds(e.to_string()),
            e @ TradingError::InsufficientShares { .. } => {
                ApiError::InsufficientShares(e.to_string())
            }
            e @ TradingError::ConcurrencyConflict(_) => ApiError::ConcurrencyConflict(e.to_string()),
            e @ TradingError::AccountNotFound(_) => ApiError::Unauthorized(e.to_string()),
            TradingError::Storage(msg) => ApiError::InternalServerError(msg),
        }
    }
}

impl From<MarketDataError> for ApiError {
    fn from(e: MarketDataError) -> Self {
        match e {
            MarketDataError::Validation(v) => ApiError::Validation(v.to_string()),
            e @ MarketDataError::QuoteUnavailable { .. } => ApiError::NotFound(e.to_string()),
            e @ MarketDataError::UpstreamService { .. } => ApiError::Upstream(e.to_string()),
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::Validation(v) => ApiError::Validation(v.to_string()),
            AccountError::UsernameTaken => ApiError::UsernameTaken("Username taken".to_string()),
            AccountError::InvalidCredentials => {
                ApiError::Unauthorized("Invalid credentials".to_string())
            }
            e @ AccountError::NotFound(_) => ApiError::Unauthorized(e.to_string()),
            AccountError::Hashing(msg) | AccountError::Storage(msg) => {
                ApiError::InternalServerError(msg)
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::InternalServerError(e.to_string())
    }
}

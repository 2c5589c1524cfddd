use crate::infrastructure::yahoo_oracle::YAHOO_API_BASE;
use crate::persistence::DatabaseConfig;
use rust_decimal::Decimal;
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Minimum JWT signing secret length (256 bits)
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("JWT_SECRET environment variable is not set")]
    MissingJwtSecret,

    #[error("JWT_SECRET must be at least {minimum} bytes, got {length}")]
    WeakJwtSecret { length: usize, minimum: usize },

    #[error("Invalid {name} '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime configuration of the server
#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database: DatabaseConfig,
    /// Cash credited to every new account
    pub starting_balance: Decimal,
    pub quote_timeout: Duration,
    /// Zero disables the quote cache
    pub quote_cache_ttl: Duration,
    pub quote_cache_capacity: usize,
    pub leaderboard_refresh: Duration,
    pub leaderboard_size: usize,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub rate_limit_per_minute: u32,
    pub yahoo_api_base: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database", &self.database)
            .field("starting_balance", &self.starting_balance)
            .field("quote_timeout", &self.quote_timeout)
            .field("quote_cache_ttl", &self.quote_cache_ttl)
            .field("quote_cache_capacity", &self.quote_cache_capacity)
            .field("leaderboard_refresh", &self.leaderboard_refresh)
            .field("leaderboard_size", &self.leaderboard_size)
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_hours", &self.token_ttl_hours)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("yahoo_api_base", &self.yahoo_api_base)
            .finish()
    }
}

/// Parse an optional variable, falling back to `default` with a warning when
/// it is unparsable or fails `valid`.
fn parse_or_default<T, L>(
    lookup: &L,
    name: &str,
    default: T,
    valid: impl Fn(&T) -> bool,
    rule: &str,
) -> T
where
    T: FromStr + Display,
    T::Err: Display,
    L: Fn(&str) -> Option<String>,
{
    let raw = match lookup(name) {
        Some(raw) => raw,
        None => return default,
    };

    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        Ok(value) => {
            tracing::warn!(
                "Invalid {} value: {} ({}), using default: {}",
                name,
                value,
                rule,
                default
            );
            default
        }
        Err(e) => {
            tracing::warn!(
                "Failed to parse {} '{}': {}, using default: {}",
                name,
                raw,
                e,
                default
            );
            default
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<AppConfig, ConfigError> {
        let mut config = Self::from_lookup(|name| std::env::var(name).ok())?;
        config.database = DatabaseConfig::from_env();
        Ok(config)
    }

    /// Build the configuration from any variable source.
    pub fn from_lookup<L>(lookup: L) -> Result<AppConfig, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET").ok_or(ConfigError::MissingJwtSecret)?;
        if jwt_secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ConfigError::WeakJwtSecret {
                length: jwt_secret.len(),
                minimum: MIN_JWT_SECRET_LENGTH,
            });
        }

        let bind_raw = lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:3000".to_string());
        let bind_addr = bind_raw
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                name: "BIND_ADDR",
                value: bind_raw.clone(),
                reason: e.to_string(),
            })?;

        let starting_balance = parse_or_default(
            &lookup,
            "STARTING_BALANCE",
            Decimal::from(100_000),
            |v| *v > Decimal::ZERO,
            "must be positive",
        );

        let quote_timeout_ms = parse_or_default(
            &lookup,
            "QUOTE_TIMEOUT_MS",
            5000u64,
            |v| (100..=60_000).contains(v),
            "must be between 100 and 60000",
        );

        let quote_cache_ttl_seconds =
            parse_or_default(&lookup, "QUOTE_CACHE_TTL_SECONDS", 30u64, |_| true, "");

        let quote_cache_capacity = parse_or_default(
            &lookup,
            "QUOTE_CACHE_CAPACITY",
            256usize,
            |v| *v > 0,
            "must be positive",
        );

        let leaderboard_refresh_seconds = parse_or_default(
            &lookup,
            "LEADERBOARD_REFRESH_SECONDS",
            60u64,
            |v| (5..=3600).contains(v),
            "must be between 5 and 3600",
        );

        let leaderboard_size = parse_or_default(
            &lookup,
            "LEADERBOARD_SIZE",
            10usize,
            |v| *v > 0,
            "must be positive",
        );

        let token_ttl_hours = parse_or_default(
            &lookup,
            "TOKEN_TTL_HOURS",
            24i64,
            |v| *v > 0,
            "must be positive",
        );

        let rate_limit_per_minute = parse_or_default(
            &lookup,
            "RATE_LIMIT_PER_MINUTE",
            120u32,
            |v| *v > 0,
            "must be positive",
        );

        let yahoo_api_base =
            lookup("YAHOO_API_BASE").unwrap_or_else(|| YAHOO_API_BASE.to_string());

        Ok(AppConfig {
            bind_addr,
            database: DatabaseConfig::default(),
            starting_balance,
            quote_timeout: Duration::from_millis(quote_timeout_ms),
            quote_cache_ttl: Duration::from_secs(quote_cache_ttl_seconds),
            quote_cache_capacity,
            leaderboard_refresh: Duration::from_secs(leaderboard_refresh_seconds),
            leaderboard_size,
            jwt_secret,
            token_ttl_hours,
            rate_limit_per_minute,
            yahoo_api_base,
        })
    }
}

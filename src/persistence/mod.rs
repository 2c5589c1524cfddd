//! Persistence Layer
//!
//! SQLite storage for accounts, the lot/transaction ledger and the
//! leaderboard, using sqlx with async connections.
//!
//! # Database Schema
//!
//! ## accounts
//! - id: INTEGER primary key
//! - username: unique
//! - password_hash: bcrypt hash
//! - balance: decimal as TEXT
//! - created_at: Timestamp
//!
//! ## lots
//! - account_id, ticker
//! - shares: signed decimal as TEXT (negative for sells)
//! - price: decimal as TEXT
//! - created_at: Timestamp
//!
//! ## transactions
//! - account_id, ticker, action ('BUY' or 'SELL')
//! - shares, price, total: decimals as TEXT
//! - created_at: Timestamp
//!
//! ## leaderboard
//! - account_id: primary key
//! - username, score (decimal as TEXT), updated_at
//!
//! Decimals are stored as text so amounts survive a round trip exactly.

pub mod models;
pub mod repository;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shared SQLite pool
pub type DbPool = SqlitePool;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/meridian.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const MAX_CONNECTIONS_LIMIT: u32 = 64;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure to open or migrate the database
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// Initialize the database connection pool and run migrations.
///
/// In-memory databases are private to a connection, so they get a single
/// connection that is never recycled.
pub async fn init_database(
    database_url: &str,
    max_connections: u32,
) -> Result<DbPool, DatabaseError> {
    info!("Opening database {}", database_url);

    let memory = is_memory_url(database_url);

    if !memory {
        if let Some(db_path) = database_url.strip_prefix("sqlite://") {
            if let Some(parent) = Path::new(db_path).parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
                })?;
            }
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .busy_timeout(BUSY_TIMEOUT);

    let pool_options = if memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(max_connections)
    };

    let pool = pool_options.connect_with(options).await?;

    run_migrations(&pool).await?;

    info!("Database ready");

    Ok(pool)
}

/// Create tables and indexes. Every statement is idempotent.
async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    debug!("Applying schema migrations");

    let statements: [(&str, &str); 8] = [
        (
            "accounts table",
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                balance TEXT NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        ),
        (
            "lots table",
            r#"
            CREATE TABLE IF NOT EXISTS lots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                ticker TEXT NOT NULL,
                shares TEXT NOT NULL,
                price TEXT NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (account_id) REFERENCES accounts(id)
            )
            "#,
        ),
        (
            "transactions table",
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                ticker TEXT NOT NULL,
                action TEXT NOT NULL CHECK(action IN ('BUY', 'SELL')),
                shares TEXT NOT NULL,
                price TEXT NOT NULL,
                total TEXT NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (account_id) REFERENCES accounts(id)
            )
            "#,
        ),
        (
            "leaderboard table",
            r#"
            CREATE TABLE IF NOT EXISTS leaderboard (
                account_id INTEGER PRIMARY KEY,
                username TEXT NOT NULL,
                score TEXT NOT NULL,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (account_id) REFERENCES accounts(id)
            )
            "#,
        ),
        (
            "lots account index",
            "CREATE INDEX IF NOT EXISTS idx_lots_account_ticker ON lots(account_id, ticker)",
        ),
        (
            "transactions account index",
            "CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account_id, id)",
        ),
        (
            "accounts username index",
            "CREATE INDEX IF NOT EXISTS idx_accounts_username ON accounts(username)",
        ),
        (
            "leaderboard updated index",
            "CREATE INDEX IF NOT EXISTS idx_leaderboard_updated_at ON leaderboard(updated_at)",
        ),
    ];

    for (name, sql) in statements {
        sqlx::query(sql).execute(pool).await.map_err(|e| {
            DatabaseError::MigrationError(format!("Failed to create {}: {}", name, e))
        })?;
    }

    info!("Schema up to date");

    Ok(())
}

/// Database configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://data/meridian.db")
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl DatabaseConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let max_connections = match std::env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(raw) => match raw.parse::<u32>() {
                Ok(n) if (1..=MAX_CONNECTIONS_LIMIT).contains(&n) => n,
                _ => {
                    warn!(
                        "Invalid DATABASE_MAX_CONNECTIONS '{}', must be 1..={}. Using default: {}",
                        raw, MAX_CONNECTIONS_LIMIT, DEFAULT_MAX_CONNECTIONS
                    );
                    DEFAULT_MAX_CONNECTIONS
                }
            },
            Err(_) => DEFAULT_MAX_CONNECTIONS,
        };

        Self {
            url,
            max_connections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_init() {
        let pool = init_database("sqlite::memory:", 5).await;
        assert!(pool.is_ok());
    }

    #[tokio::test]
    async fn test_migrations() {
        let pool = init_database("sqlite::memory:", 1).await.unwrap();

        let result: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('accounts', 'lots', 'transactions', 'leaderboard')"
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        assert_eq!(result.0, 4);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = init_database("sqlite::memory:", 1).await.unwrap();
        assert!(run_migrations(&pool).await.is_ok());
    }

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.url, "sqlite://data/meridian.db");
        assert_eq!(config.max_connections, 5);
    }

    #[test]
    fn test_memory_url_detection() {
        assert!(is_memory_url("sqlite::memory:"));
        assert!(is_memory_url("sqlite://file?mode=memory"));
        assert!(!is_memory_url("sqlite://data/meridian.db"));
    }
}

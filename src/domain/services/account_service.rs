//! AccountService - registration, login and account lookups

use crate::domain::entities::account::{Account, AccountId, NewAccount};
use crate::domain::entities::transaction::Transaction;
use crate::domain::errors::{AccountError, ValidationError};
use crate::domain::repositories::account_store::AccountStore;
use crate::domain::repositories::ledger_store::LedgerStore;
use bcrypt::{hash, verify, DEFAULT_COST};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_TRANSACTION_LIMIT: usize = 50;

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 32;
const PASSWORD_MIN: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub username: String,
    pub balance: Decimal,
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(ValidationError::InvalidUsername(format!(
            "must be {} to {} characters",
            USERNAME_MIN, USERNAME_MAX
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(ValidationError::InvalidUsername(
            "only letters, digits, '_', '.' and '-' are allowed".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < PASSWORD_MIN {
        return Err(ValidationError::InvalidPassword(format!(
            "must be at least {} characters",
            PASSWORD_MIN
        )));
    }
    Ok(())
}

pub struct AccountService {
    accounts: Arc<dyn AccountStore>,
    ledger: Arc<dyn LedgerStore>,
    starting_balance: Decimal,
    hash_cost: u32,
}

impl AccountService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        ledger: Arc<dyn LedgerStore>,
        starting_balance: Decimal,
    ) -> Self {
        Self {
            accounts,
            ledger,
            starting_balance,
            hash_cost: DEFAULT_COST,
        }
    }

    /// Override the bcrypt cost factor (4..=31).
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<Account, AccountError> {
        validate_username(username)?;
        validate_password(password)?;

        if self.accounts.find_by_username(username).await?.is_some() {
            return Err(AccountError::UsernameTaken);
        }

        let password = password.to_string();
        let cost = self.hash_cost;
        let password_hash = tokio::task::spawn_blocking(move || hash(password, cost))
            .await
            .map_err(|e| AccountError::Hashing(e.to_string()))?
            .map_err(|e| AccountError::Hashing(e.to_string()))?;

        let account = self
            .accounts
            .create(NewAccount {
                username: username.to_string(),
                password_hash,
                starting_balance: self.starting_balance,
            })
            .await?;

        info!("Registered account {} ({})", account.id, account.username);
        Ok(account)
    }

    /// Unknown users and wrong passwords fail the same way.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Account, AccountError> {
        let account = match self.accounts.find_by_username(username).await? {
            Some(a) => a,
            None => {
                warn!("Login attempt for unknown user {}", username);
                return Err(AccountError::InvalidCredentials);
            }
        };

        let password = password.to_string();
        let stored = account.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || verify(password, &stored))
            .await
            .map_err(|e| AccountError::Hashing(e.to_string()))?
            .map_err(|e| AccountError::Hashing(e.to_string()))?;

        if !valid {
            warn!("Failed login for account {}", account.id);
            return Err(AccountError::InvalidCredentials);
        }
        Ok(account)
    }

    pub async fn profile(&self, id: AccountId) -> Result<Profile, AccountError> {
        let account = self
            .accounts
            .get(id)
            .await?
            .ok_or(AccountError::NotFound(id))?;
        Ok(Profile {
            username: account.username,
            balance: account.balance,
        })
    }

    pub async fn transactions(
        &self,
        id: AccountId,
        limit: usize,
    ) -> Result<Vec<Transaction>, AccountError> {
        Ok(self.ledger.transactions(id, limit).await?)
    }
}

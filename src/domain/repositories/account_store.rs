use crate::domain::entities::account::{Account, AccountBalance, AccountId, NewAccount};
use crate::domain::repositories::ledger_store::StoreResult;
use async_trait::async_trait;

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fails with `StoreError::Duplicate` when the username exists.
    async fn create(&self, account: NewAccount) -> StoreResult<Account>;

    async fn get(&self, id: AccountId) -> StoreResult<Option<Account>>;

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Account>>;

    async fn list_balances(&self) -> StoreResult<Vec<AccountBalance>>;
}

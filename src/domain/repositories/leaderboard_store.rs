use crate::domain::entities::leaderboard::LeaderboardEntry;
use crate::domain::repositories::ledger_store::StoreResult;
use async_trait::async_trait;

#[async_trait]
pub trait LeaderboardStore: Send + Sync {
    /// Insert or replace the entry of each account.
    async fn upsert(&self, entries: &[LeaderboardEntry]) -> StoreResult<()>;

    /// Every persisted entry, unordered.
    async fn entries(&self) -> StoreResult<Vec<LeaderboardEntry>>;
}

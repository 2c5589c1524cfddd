//! LeaderboardRanker - periodic ranking of accounts by cash balance
//!
//! `recompute` snapshots every account balance into the leaderboard store.
//! Reads go through `top`, which serves the last persisted snapshot, so the
//! ranking can lag live balances by up to one refresh interval.

use crate::domain::entities::account::AccountBalance;
use crate::domain::entities::leaderboard::LeaderboardEntry;
use crate::domain::errors::StoreError;
use crate::domain::repositories::account_store::AccountStore;
use crate::domain::repositories::leaderboard_store::LeaderboardStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

/// Highest score first; equal scores ordered by username.
pub fn rank(mut entries: Vec<LeaderboardEntry>, limit: usize) -> Vec<LeaderboardEntry> {
    entries.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.username.cmp(&b.username))
    });
    entries.truncate(limit);
    entries
}

pub struct LeaderboardRanker {
    accounts: Arc<dyn AccountStore>,
    board: Arc<dyn LeaderboardStore>,
}

impl LeaderboardRanker {
    pub fn new(accounts: Arc<dyn AccountStore>, board: Arc<dyn LeaderboardStore>) -> Self {
        Self { accounts, board }
    }

    /// Refresh every entry from the current balances. Returns the number of
    /// entries written.
    pub async fn recompute(&self) -> Result<usize, StoreError> {
        let balances = self.accounts.list_balances().await?;
        let now = Utc::now();
        let entries: Vec<LeaderboardEntry> = balances
            .into_iter()
            .map(|AccountBalance { account_id, username, balance }| LeaderboardEntry {
                account_id,
                username,
                score: balance,
                updated_at: now,
            })
            .collect();

        self.board.upsert(&entries).await?;
        info!("Leaderboard recomputed for {} accounts", entries.len());
        Ok(entries.len())
    }

    pub async fn top(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let entries = self.board.entries().await?;
        debug!("Ranking {} leaderboard entries", entries.len());
        Ok(rank(entries, limit))
    }
}

use crate::application::dto::{LeaderView, LeaderboardResponse};
use crate::application::response::{ok, Success};
use crate::application::state::AppState;
use crate::domain::errors::ApiError;
use crate::domain::services::valuation::round_money;
use axum::{extract::State, Json};

/// GET /api/leaderboard/top10
///
/// Serves the ranking persisted by the last refresh.
pub async fn top(State(state): State<AppState>) -> Result<Json<Success<LeaderboardResponse>>, ApiError> {
    let entries = state.leaderboard.top(state.leaderboard_size).await?;

    let leaders = entries
        .into_iter()
        .enumerate()
        .map(|(i, e)| LeaderView {
            rank: i + 1,
            username: e.username,
            score: round_money(e.score),
            updated_at: e.updated_at,
        })
        .collect();

    Ok(ok(LeaderboardResponse { leaders }))
}

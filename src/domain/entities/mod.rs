pub mod account;
pub mod leaderboard;
pub mod lot;
pub mod position;
pub mod transaction;

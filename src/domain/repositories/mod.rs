pub mod account_store;
pub mod leaderboard_store;
pub mod ledger_store;
pub mod narrative;
pub mod price_oracle;

pub mod account_service;
pub mod leaderboard;
pub mod market_data;
pub mod position_aggregator;
pub mod settlement;
pub mod valuation;

#[cfg(test)]
mod settlement_tests;

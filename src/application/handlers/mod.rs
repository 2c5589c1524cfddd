pub mod account_handler;
pub mod leaderboard_handler;
pub mod market_handler;
pub mod portfolio_handler;
pub mod trade_handler;

//! Meridian Paper Trading Library
//!
//! Accounts, simulated equity trades settled against a persistent ledger,
//! portfolio valuation from live quotes and a periodic leaderboard.

pub mod application;
pub mod auth;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod rate_limit;
pub mod task_runner;

use crate::auth::JwtHandler;
use crate::config::AppConfig;
use crate::domain::repositories::account_store::AccountStore;
use crate::domain::repositories::leaderboard_store::LeaderboardStore;
use crate::domain::repositories::ledger_store::LedgerStore;
use crate::domain::repositories::narrative::NarrativeService;
use crate::domain::repositories::price_oracle::PriceOracle;
use crate::domain::services::account_service::AccountService;
use crate::domain::services::leaderboard::LeaderboardRanker;
use crate::domain::services::market_data::MarketDataService;
use crate::domain::services::settlement::TradeSettlement;
use crate::domain::services::valuation::ValuationEngine;
use crate::infrastructure::quote_cache::CachedPriceOracle;
use crate::rate_limit::{self, create_rate_limiter, AccountRateLimiter, RateLimiterConfig};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info};

/// Storage collaborators the services are wired to
#[derive(Clone)]
pub struct Stores {
    pub accounts: Arc<dyn AccountStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub leaderboard: Arc<dyn LeaderboardStore>,
}

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub ledger: Arc<dyn LedgerStore>,
    pub settlement: Arc<TradeSettlement>,
    pub valuation: Arc<ValuationEngine>,
    pub market_data: Arc<MarketDataService>,
    pub leaderboard: Arc<LeaderboardRanker>,
    pub leaderboard_size: usize,
    pub jwt: Arc<JwtHandler>,
    pub rate_limiter: AccountRateLimiter,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        stores: Stores,
        oracle: Arc<dyn PriceOracle>,
        narrative: Arc<dyn NarrativeService>,
    ) -> Self {
        let oracle: Arc<dyn PriceOracle> = match NonZeroUsize::new(config.quote_cache_capacity) {
            Some(capacity) if !config.quote_cache_ttl.is_zero() => {
                info!(
                    "Quote cache enabled: {} entries, ttl {:?}",
                    capacity, config.quote_cache_ttl
                );
                Arc::new(CachedPriceOracle::new(oracle, config.quote_cache_ttl, capacity))
            }
            _ => {
                info!("Quote cache disabled");
                oracle
            }
        };

        Self {
            accounts: Arc::new(AccountService::new(
                stores.accounts.clone(),
                stores.ledger.clone(),
                config.starting_balance,
            )),
            ledger: stores.ledger.clone(),
            settlement: Arc::new(TradeSettlement::new(stores.ledger)),
            valuation: Arc::new(ValuationEngine::new(
                oracle.clone(),
                config.quote_timeout,
                config.starting_balance,
            )),
            market_data: Arc::new(MarketDataService::new(
                oracle,
                narrative,
                config.quote_timeout,
            )),
            leaderboard: Arc::new(LeaderboardRanker::new(stores.accounts, stores.leaderboard)),
            leaderboard_size: config.leaderboard_size,
            jwt: Arc::new(JwtHandler::new(&config.jwt_secret, config.token_ttl_hours)),
            rate_limiter: create_rate_limiter(RateLimiterConfig {
                requests_per_minute: config.rate_limit_per_minute,
            }),
        }
    }

    /// Release per-account bookkeeping for accounts that went quiet: idle
    /// settlement locks and fully replenished rate-limit entries.
    pub fn prune_idle(&self) {
        let locks = self.settlement.prune_idle_locks();
        let limits = rate_limit::prune_idle(&self.rate_limiter);
        debug!(
            "Pruned {} idle account locks and {} rate-limit entries",
            locks, limits
        );
    }

    /// Replace the account service, e.g. to lower the bcrypt cost.
    pub fn with_account_service(mut self, accounts: AccountService) -> Self {
        self.accounts = Arc::new(accounts);
        self
    }
}

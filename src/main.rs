use meridian::application::router::build_router;
use meridian::application::state::{AppState, Stores};
use meridian::config::AppConfig;
use meridian::domain::repositories::narrative::DisabledNarrative;
use meridian::infrastructure::yahoo_oracle::YahooPriceOracle;
use meridian::persistence::init_database;
use meridian::persistence::repository::{
    AccountRepository, LeaderboardRepository, LedgerRepository,
};
use meridian::task_runner::{run_periodic, BackoffConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meridian=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    info!("Meridian starting with {:?}", config);

    let pool = init_database(&config.database.url, config.database.max_connections).await?;
    let stores = Stores {
        accounts: Arc::new(AccountRepository::new(pool.clone())),
        ledger: Arc::new(LedgerRepository::new(pool.clone())),
        leaderboard: Arc::new(LeaderboardRepository::new(pool.clone())),
    };

    let oracle = Arc::new(YahooPriceOracle::new(
        &config.yahoo_api_base,
        config.quote_timeout,
    )?);
    let state = AppState::new(&config, stores, oracle, Arc::new(DisabledNarrative));

    match state.leaderboard.recompute().await {
        Ok(n) => info!("Initial leaderboard computed for {} accounts", n),
        Err(e) => error!("Initial leaderboard computation failed: {}", e),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ranker = state.leaderboard.clone();
    let leaderboard_job = tokio::spawn(run_periodic(
        "leaderboard_refresh",
        config.leaderboard_refresh,
        BackoffConfig::default(),
        shutdown_rx.clone(),
        move || {
            let ranker = ranker.clone();
            async move {
                ranker
                    .recompute()
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }
        },
    ));

    let housekeeping_state = state.clone();
    let housekeeping_job = tokio::spawn(run_periodic(
        "housekeeping",
        HOUSEKEEPING_INTERVAL,
        BackoffConfig::default(),
        shutdown_rx.clone(),
        move || {
            housekeeping_state.prune_idle();
            async { Ok(()) }
        },
    ));

    let app = build_router(state);

    info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let server = axum::serve(listener, app);

    let shutdown_signal = async move {
        let ctrl_c = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C signal"),
                Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                    info!("Received SIGTERM signal");
                }
                Err(e) => error!("Failed to install SIGTERM handler: {}", e),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    };

    server.with_graceful_shutdown(shutdown_signal).await?;
    info!("Server shutting down gracefully...");

    let _ = shutdown_tx.send(true);
    if let Err(e) = leaderboard_job.await {
        error!("Leaderboard job ended abnormally: {}", e);
    }
    if let Err(e) = housekeeping_job.await {
        error!("Housekeeping job ended abnormally: {}", e);
    }
    pool.close().await;

    info!("Shutdown complete");
    Ok(())
}

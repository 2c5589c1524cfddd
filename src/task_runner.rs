//! Periodic background jobs
//!
//! A job runs on a fixed interval. Failures are retried with exponential
//! backoff, and a long failure streak falls back to the maximum delay until
//! the job succeeds again.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Retry schedule of a periodic job
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Failures in a row before retries drop to `max_retry_delay`
    pub max_consecutive_failures: u32,
    /// First retry delay, doubled on each further failure
    pub initial_retry_delay: Duration,
    /// Upper bound of the retry delay
    pub max_retry_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 5,
            initial_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(60),
        }
    }
}

/// Failure streak and the delay before the next retry
#[derive(Debug)]
struct BackoffState {
    consecutive_failures: u32,
    current_retry_delay: Duration,
}

impl BackoffState {
    fn new(initial_delay: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            current_retry_delay: initial_delay,
        }
    }

    fn record_failure(&mut self, max_delay: Duration) -> Duration {
        self.consecutive_failures += 1;
        let delay = self.current_retry_delay;
        self.current_retry_delay = std::cmp::min(self.current_retry_delay * 2, max_delay);
        delay
    }

    fn reset(&mut self, initial_delay: Duration) {
        self.consecutive_failures = 0;
        self.current_retry_delay = initial_delay;
    }
}

/// Wait for `delay`, returning `true` if shutdown was signalled first.
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

/// Run `run_once` every `interval` until `shutdown` turns true or its sender
/// is dropped. A failed run is retried after the current backoff delay
/// instead of the interval; the name only labels log lines.
pub async fn run_periodic<F, Fut>(
    job: &str,
    interval: Duration,
    config: BackoffConfig,
    mut shutdown: watch::Receiver<bool>,
    mut run_once: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    let mut state = BackoffState::new(config.initial_retry_delay);
    info!("Job {} scheduled every {:?}", job, interval);

    loop {
        let delay = match run_once().await {
            Ok(()) => {
                if state.consecutive_failures > 0 {
                    warn!(
                        "Job {} healthy again after {} failed runs",
                        job, state.consecutive_failures
                    );
                }
                state.reset(config.initial_retry_delay);
                interval
            }
            Err(e) => {
                let backoff = state.record_failure(config.max_retry_delay);
                if state.consecutive_failures >= config.max_consecutive_failures {
                    error!(
                        "Job {} failing repeatedly ({} in a row), slowing down: {}",
                        job, state.consecutive_failures, e
                    );
                    config.max_retry_delay
                } else {
                    error!(
                        "Job {} failed ({} of {} before backing off fully): {}",
                        job, state.consecutive_failures, config.max_consecutive_failures, e
                    );
                    warn!("Job {} retrying in {:?}", job, backoff);
                    backoff
                }
            }
        };

        if sleep_or_shutdown(delay, &mut shutdown).await {
            info!("Job {} stopped", job);
            return;
        }
    }
}

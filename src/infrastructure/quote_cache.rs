//! LRU cache in front of a price oracle
//!
//! Only found, non-empty histories are cached; not-found and transient
//! results always go back to the inner oracle.

use crate::domain::repositories::price_oracle::{PriceHistory, PriceOracle, QuoteResult};
use crate::domain::value_objects::{period::Period, ticker::Ticker};
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

type CacheKey = (Ticker, Period);

pub struct CachedPriceOracle {
    inner: Arc<dyn PriceOracle>,
    ttl: Duration,
    cache: Mutex<LruCache<CacheKey, (Instant, PriceHistory)>>,
}

impl CachedPriceOracle {
    pub fn new(inner: Arc<dyn PriceOracle>, ttl: Duration, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            ttl,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn cached(&self, key: &CacheKey) -> Option<PriceHistory> {
        let mut cache = self.cache.lock().ok()?;
        match cache.get(key) {
            Some((stored_at, history)) if stored_at.elapsed() < self.ttl => Some(history.clone()),
            Some(_) => {
                cache.pop(key);
                None
            }
            None => None,
        }
    }

    fn store(&self, key: CacheKey, history: &PriceHistory) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, (Instant::now(), history.clone()));
        }
    }
}

#[async_trait]
impl PriceOracle for CachedPriceOracle {
    async fn get_quote(&self, ticker: &Ticker, period: Period) -> QuoteResult {
        let key = (ticker.clone(), period);
        if let Some(history) = self.cached(&key) {
            debug!("Quote cache hit for {} ({})", ticker, period.as_str());
            return QuoteResult::Found(history);
        }

        let result = self.inner.get_quote(ticker, period).await;
        if let QuoteResult::Found(history) = &result {
            if !history.closes.is_empty() {
                self.store(key, history);
            }
        }
        result
    }
}

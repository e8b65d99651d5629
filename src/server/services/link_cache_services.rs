use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::database::{CachedLink, DynLinkStore, StoreError};

pub type DynLinkCacheService = Arc<dyn LinkCacheServiceTrait + Send + Sync>;

#[async_trait::async_trait]
pub trait LinkCacheServiceTrait {
    /// the entry for `key` if it's still inside the ttl at `now` (unix seconds).
    /// Expired and unreadable entries both come back as `None`.
    async fn get(&self, key: &str, now: i64) -> Option<CachedLink>;

    /// best effort, a failed write only loses the entry
    async fn put(&self, key: &str, resolved_url: &str, now: i64);

    async fn health_check(&self) -> Result<f64, StoreError>;

    fn backend(&self) -> &'static str;

    fn ttl(&self) -> Duration;
}

/// ttl bookkeeping on top of whichever store is configured
pub struct LinkCacheService {
    store: DynLinkStore,
    ttl: Duration,
}

impl LinkCacheService {
    pub fn new(store: DynLinkStore, ttl: Duration) -> Self {
        Self { store, ttl }
    }
}

#[async_trait::async_trait]
impl LinkCacheServiceTrait for LinkCacheService {
    async fn get(&self, key: &str, now: i64) -> Option<CachedLink> {
        let link = match self.store.get(key).await {
            Ok(Some(link)) => link,
            Ok(None) => {
                metrics::counter!("portal_proxy_link_cache_total", "result" => "miss").increment(1);
                return None;
            }
            Err(e) => {
                warn!("Link cache unavailable, treating {} as a miss: {}", key, e);
                metrics::counter!("portal_proxy_link_cache_total", "result" => "unavailable")
                    .increment(1);
                return None;
            }
        };

        if link.is_valid(now, self.ttl) {
            debug!("Link cache HIT for {}", key);
            metrics::counter!("portal_proxy_link_cache_total", "result" => "hit").increment(1);
            return Some(link);
        }

        debug!(
            "Link cache entry for {} expired ({}s old)",
            key,
            now - link.resolved_at
        );
        metrics::counter!("portal_proxy_link_cache_total", "result" => "expired").increment(1);

        // lazy purge, nothing else ever sweeps the store. Only this exact record goes, a fresh one
        // written since the read survives.
        match self.store.purge(&link).await {
            Ok(true) => debug!("Purged expired link {}", key),
            Ok(false) => debug!("Expired link {} already replaced", key),
            Err(e) => warn!("Failed to purge expired link {}: {}", key, e),
        }

        None
    }

    async fn put(&self, key: &str, resolved_url: &str, now: i64) {
        let link = CachedLink::new(key, resolved_url, now);

        match self.store.put(&link).await {
            Ok(()) => debug!("Cached link for {} (TTL {}s)", key, self.ttl.as_secs()),
            Err(e) => error!("Failed to cache link for {}: {}", key, e),
        }
    }

    async fn health_check(&self) -> Result<f64, StoreError> {
        self.store.health_check().await
    }

    fn backend(&self) -> &'static str {
        self.store.backend()
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// a temp link that has already been resolved into something playable.
///
/// `key` is the command string the portal handed out, either the loopback flavour or the
/// provider domain flavour, both families live side by side in the same store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedLink {
    pub key: String,
    pub resolved_url: String,
    /// unix seconds
    pub resolved_at: i64,
}

impl CachedLink {
    pub fn new(key: &str, resolved_url: &str, resolved_at: i64) -> Self {
        Self {
            key: key.to_string(),
            resolved_url: resolved_url.to_string(),
            resolved_at,
        }
    }

    /// valid iff now - resolved_at < ttl
    pub fn is_valid(&self, now: i64, ttl: Duration) -> bool {
        now - self.resolved_at < ttl.as_secs() as i64
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("link store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("link store redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("corrupt link record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// commands are long and full of spaces and slashes so every backend stores them under a digest
pub fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

pub type DynLinkStore = Arc<dyn LinkStore + Send + Sync>;

/// durable key value storage for resolved links, expiry is not its problem
#[automock]
#[async_trait]
pub trait LinkStore {
    async fn get(&self, key: &str) -> Result<Option<CachedLink>, StoreError>;

    /// single key, atomic
    async fn put(&self, link: &CachedLink) -> Result<(), StoreError>;

    /// removes the record for `stale.key`, but only while it is still exactly `stale`. A record
    /// rewritten in the meantime stays. Returns whether anything was removed.
    async fn purge(&self, stale: &CachedLink) -> Result<bool, StoreError>;

    /// response time in milliseconds
    async fn health_check(&self) -> Result<f64, StoreError>;

    fn backend(&self) -> &'static str;
}

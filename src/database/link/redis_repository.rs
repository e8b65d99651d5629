use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::{AsyncCommands, Script};
use tracing::debug;

use super::{CachedLink, LinkStore, StoreError, hash_key};
use crate::database::RedisDatabase;

// compare and delete in one step, a record rewritten since it was read is left alone.
// Records that don't decode are dropped as well.
static PURGE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
    return 0
end
local ok, record = pcall(cjson.decode, raw)
if ok and (record.resolved_at ~= tonumber(ARGV[1]) or record.resolved_url ~= ARGV[2]) then
    return 0
end
return redis.call('DEL', KEYS[1])
"#,
    )
});

/// redis backed link store. records also get a redis expiry so dead keys don't pile up, the
/// ttl check itself still happens on read in the cache service.
pub struct RedisLinkStore {
    redis: Arc<RedisDatabase>,
    retention_secs: u64,
}

impl RedisLinkStore {
    pub fn new(redis: Arc<RedisDatabase>, retention_secs: u64) -> Self {
        Self {
            redis,
            retention_secs,
        }
    }

    fn link_key(key: &str) -> String {
        format!("link_cache:{}", hash_key(key))
    }
}

#[async_trait]
impl LinkStore for RedisLinkStore {
    async fn get(&self, key: &str) -> Result<Option<CachedLink>, StoreError> {
        let mut conn = self.redis.connection.clone();
        let raw: Option<String> = conn.get(Self::link_key(key)).await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, link: &CachedLink) -> Result<(), StoreError> {
        let json = serde_json::to_string(link)?;
        let mut conn = self.redis.connection.clone();

        let _: () = conn
            .set_ex(Self::link_key(&link.key), &json, self.retention_secs)
            .await?;

        debug!(
            "Stored link in redis ({} bytes, TTL {}s)",
            json.len(),
            self.retention_secs
        );
        Ok(())
    }

    async fn purge(&self, stale: &CachedLink) -> Result<bool, StoreError> {
        let mut conn = self.redis.connection.clone();
        let removed: i64 = PURGE_SCRIPT
            .key(Self::link_key(&stale.key))
            .arg(stale.resolved_at)
            .arg(&stale.resolved_url)
            .invoke_async(&mut conn)
            .await?;

        Ok(removed > 0)
    }

    async fn health_check(&self) -> Result<f64, StoreError> {
        Ok(self.redis.ping().await?)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

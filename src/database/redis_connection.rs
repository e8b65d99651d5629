use std::time::Instant;

use anyhow::Context;
use redis::aio::MultiplexedConnection;
use tracing::info;

/// shared multiplexed connection, cloning it is cheap and every clone talks over the same socket.
/// Only used when REDIS_URL is set, the link cache lives in plain files otherwise.
#[derive(Debug, Clone)]
pub struct RedisDatabase {
    pub connection: MultiplexedConnection,
}

impl RedisDatabase {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url).context("Invalid REDIS_URL")?;
        // the url can carry a password, only the address goes in the logs
        let addr = client.get_connection_info().addr.to_string();

        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .with_context(|| format!("Failed to connect to redis at {}", addr))?;

        info!("Redis link store connected at {}", addr);

        Ok(Self { connection })
    }

    /// round trip time of a PING in milliseconds
    pub async fn ping(&self) -> Result<f64, redis::RedisError> {
        let started = Instant::now();

        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        Ok(started.elapsed().as_secs_f64() * 1000.0)
    }
}

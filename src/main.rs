use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};

use portal_proxy::{
    AppConfig, DynLinkStore, EdgeApplicationServer, FileLinkStore, Logger, RedisDatabase,
    RedisLinkStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Arc::new(
        AppConfig::parse()
            .validate()
            .context("invalid configuration")?,
    );

    // guards are kept alive to flush logs and keep sentry around
    let _guards = Logger::init(
        config.cargo_env,
        &config.log_dir,
        config.sentry_dsn.clone(),
    );

    info!("logger and env prepped...");

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("metrics recorder not installed, /_proxy/metrics disabled: {}", e);
            None
        }
    };

    let store: DynLinkStore = match config.redis_url.as_deref() {
        Some(redis_url) => {
            info!("connecting to redis for the link cache...");
            let redis = RedisDatabase::connect(redis_url).await?;
            // redis drops records a while after they went stale, the ttl check is still ours
            Arc::new(RedisLinkStore::new(
                Arc::new(redis),
                config.cache_ttl_secs.saturating_mul(2),
            ))
        }
        None => Arc::new(
            FileLinkStore::open(&config.cache_dir)
                .await
                .with_context(|| format!("failed to open link cache at {}", config.cache_dir))?,
        ),
    };

    info!("link cache ok, starting proxy...");

    EdgeApplicationServer::serve(config, store, metrics)
        .await
        .context("edge server failed to start")?;

    Ok(())
}

pub mod api;
pub mod dtos;
pub mod error;
pub mod extractors;
pub mod services;
pub mod utils;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::{Extension, Router, extract::DefaultBodyLimit, routing::get};
use metrics_exporter_prometheus::PrometheusHandle;
use once_cell::sync::Lazy;
use tokio::net::TcpListener;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{config::AppConfig, database::DynLinkStore};
use api::{
    ProxyController,
    health_controller::{health_endpoint, metrics_endpoint},
};
use services::edge_services::EdgeServices;

// set top boxes post the odd big blob, same ceiling the original middleware had
const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

pub fn get_uptime_seconds() -> u64 {
    START_TIME.elapsed().as_secs()
}

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub struct EdgeApplicationServer;

impl EdgeApplicationServer {
    /// `/_proxy/*` is ours, everything else is the portal's
    pub fn router(services: EdgeServices) -> Router {
        let max_concurrent = services.config.max_concurrent_requests;

        Router::new()
            .route("/_proxy/health", get(health_endpoint))
            .route("/_proxy/metrics", get(metrics_endpoint))
            .fallback(ProxyController::proxy)
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(GlobalConcurrencyLimitLayer::new(max_concurrent))
            .layer(TraceLayer::new_for_http())
            .layer(Extension(services))
    }

    pub async fn serve(
        config: Arc<AppConfig>,
        store: DynLinkStore,
        metrics: Option<PrometheusHandle>,
    ) -> anyhow::Result<()> {
        Lazy::force(&START_TIME);

        let services = EdgeServices::new(config.clone(), store, metrics)?;
        let app = Self::router(services);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;

        info!("portal proxy listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server stopped unexpectedly")?;

        info!("portal proxy shut down");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

use crate::{config::AppConfig, database::DynLinkStore};

use super::{
    link_cache_services::{DynLinkCacheService, LinkCacheService},
    link_resolver_services::{DynLinkResolverService, LinkResolverService},
    throttle_services::UpstreamThrottle,
    transform_services::TransformService,
    upstream_services::UpstreamClient,
};

/// everything a request handler needs, cloned into every request through an Extension
#[derive(Clone)]
pub struct EdgeServices {
    pub upstream: Arc<UpstreamClient>,
    pub link_cache: DynLinkCacheService,
    pub resolver: DynLinkResolverService,
    pub transform: Arc<TransformService>,
    pub throttle: Arc<UpstreamThrottle>,
    pub metrics: Option<PrometheusHandle>,
    pub config: Arc<AppConfig>,
}

impl EdgeServices {
    pub fn new(
        config: Arc<AppConfig>,
        store: DynLinkStore,
        metrics: Option<PrometheusHandle>,
    ) -> anyhow::Result<Self> {
        info!("starting edge services ({} link store)...", store.backend());

        let upstream = Arc::new(UpstreamClient::new(&config)?);

        let link_cache =
            Arc::new(LinkCacheService::new(store, config.cache_ttl())) as DynLinkCacheService;

        let throttle = Arc::new(UpstreamThrottle::new(
            config.throttle_budget,
            config.throttle_window(),
        ));
        info!(
            "create_link calls spaced {}ms apart",
            throttle.spacing().as_millis()
        );

        let resolver = Arc::new(LinkResolverService::new(
            upstream.clone(),
            link_cache.clone(),
            throttle.clone(),
            config.loopback_marker.clone(),
        )) as DynLinkResolverService;

        let transform = Arc::new(TransformService::new(
            resolver.clone(),
            config.upstream_domain.clone(),
        ));

        Ok(Self {
            upstream,
            link_cache,
            resolver,
            transform,
            throttle,
            metrics,
            config,
        })
    }
}

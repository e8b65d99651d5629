use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use axum::http::HeaderMap;
use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared, WeakShared};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{
    link_cache_services::DynLinkCacheService, throttle_services::UpstreamThrottle,
    upstream_services::UpstreamClient,
};
use crate::server::{
    dtos::portal_dto::{ChannelCommand, channel_id, channels_mut},
    error::ResolveError,
};

/// which of the two portal calls resolves a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hop {
    /// `get_link_for_ch`, turns a loopback command into a provider command
    Local,
    /// `create_link`, turns a provider command into the playable link
    Provider,
}

impl Hop {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Provider => "provider",
        }
    }
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// what happened to one `cmds[]` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// nothing to resolve in it
    Skipped,
    Resolved(String),
    /// left as it was, the reason is already logged
    Failed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionReport {
    pub resolved: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub type DynLinkResolverService = Arc<dyn LinkResolverServiceTrait + Send + Sync>;

#[async_trait::async_trait]
pub trait LinkResolverServiceTrait {
    /// resolves every flagged command of every channel in a portal payload, in place.
    /// Payloads without channels come back untouched.
    async fn resolve_payload(&self, payload: &mut Value, headers: &HeaderMap) -> ResolutionReport;

    /// runs one command through the loopback and provider hops
    async fn resolve_command(&self, url: &str, headers: &HeaderMap) -> CommandOutcome;
}

type LinkFuture = BoxFuture<'static, Result<String, ResolveError>>;

/// resolutions currently talking to the portal. Entries are weak, when every waiter of a
/// resolution is gone (clients hung up) the portal call is dropped with them and the stale entry
/// gets replaced by the next caller.
type InflightRegistry = Mutex<HashMap<(Hop, String), WeakShared<LinkFuture>>>;

pub struct LinkResolverService {
    inner: Arc<ResolverInner>,
}

struct ResolverInner {
    upstream: Arc<UpstreamClient>,
    cache: DynLinkCacheService,
    throttle: Arc<UpstreamThrottle>,
    loopback_marker: String,
    inflight: InflightRegistry,
}

impl LinkResolverService {
    pub fn new(
        upstream: Arc<UpstreamClient>,
        cache: DynLinkCacheService,
        throttle: Arc<UpstreamThrottle>,
        loopback_marker: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                upstream,
                cache,
                throttle,
                loopback_marker: loopback_marker.into(),
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// cache first, then the portal. Identical keys resolving at the same time share one call.
    async fn resolve_hop(
        &self,
        hop: Hop,
        key: &str,
        headers: &HeaderMap,
    ) -> Result<String, ResolveError> {
        if let Some(link) = self.inner.cache.get(key, Utc::now().timestamp()).await {
            return Ok(link.resolved_url);
        }

        self.join_or_start(hop, key, headers).await
    }

    fn join_or_start(&self, hop: Hop, key: &str, headers: &HeaderMap) -> Shared<LinkFuture> {
        let registry_key = (hop, key.to_string());
        let mut inflight = self
            .inner
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = inflight.get(&registry_key).and_then(WeakShared::upgrade) {
            debug!("Joining in-flight {} resolution of {}", hop, key);
            return existing;
        }

        let inner = self.inner.clone();
        let key = key.to_string();
        let headers = headers.clone();
        let flight_key = registry_key.clone();

        let flight: LinkFuture = async move {
            // a flight that just finished may have filled the cache after our caller missed it
            let result = match inner.cache.get(&key, Utc::now().timestamp()).await {
                Some(link) => Ok(link.resolved_url),
                None => inner.resolve_and_store(hop, &key, &headers).await,
            };

            inner
                .inflight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&flight_key);

            result
        }
        .boxed();

        let flight = flight.shared();
        if let Some(weak) = flight.downgrade() {
            inflight.insert(registry_key, weak);
        }

        flight
    }
}

impl ResolverInner {
    async fn resolve_and_store(
        &self,
        hop: Hop,
        key: &str,
        headers: &HeaderMap,
    ) -> Result<String, ResolveError> {
        let result = self.fetch(hop, key, headers).await;

        match &result {
            Ok(url) => {
                metrics::counter!(
                    "portal_proxy_link_resolutions_total",
                    "hop" => hop.as_str(), "outcome" => "ok"
                )
                .increment(1);
                self.cache.put(key, url, Utc::now().timestamp()).await;
            }
            Err(_) => {
                metrics::counter!(
                    "portal_proxy_link_resolutions_total",
                    "hop" => hop.as_str(), "outcome" => "failed"
                )
                .increment(1);
            }
        }

        result
    }

    async fn fetch(
        &self,
        hop: Hop,
        key: &str,
        headers: &HeaderMap,
    ) -> Result<String, ResolveError> {
        match hop {
            Hop::Local => {
                let ch_id =
                    channel_id(key).ok_or_else(|| ResolveError::NoChannelId(key.to_string()))?;
                debug!("Asking portal for channel {} link ({})", ch_id, key);

                self.upstream
                    .request_link(
                        &[
                            ("type", "itv"),
                            ("action", "get_link_for_ch"),
                            ("ch_id", ch_id.as_str()),
                        ],
                        headers,
                    )
                    .await
            }
            Hop::Provider => {
                self.throttle.acquire().await;
                debug!("Asking portal to create link for {}", key);

                self.upstream
                    .request_link(
                        &[
                            ("type", "itv"),
                            ("action", "create_link"),
                            ("cmd", key),
                            ("JsHttpRequest", "1-xml"),
                        ],
                        headers,
                    )
                    .await
            }
        }
    }
}

#[async_trait::async_trait]
impl LinkResolverServiceTrait for LinkResolverService {
    async fn resolve_payload(&self, payload: &mut Value, headers: &HeaderMap) -> ResolutionReport {
        let mut report = ResolutionReport::default();

        let Some(channels) = channels_mut(payload) else {
            return report;
        };

        for channel in channels.iter_mut() {
            let Some(channel) = channel.as_object_mut() else {
                continue;
            };

            let mut resolved_pairs: Vec<(String, String)> = Vec::new();

            if let Some(cmds) = channel.get_mut("cmds").and_then(Value::as_array_mut) {
                for entry in cmds.iter_mut() {
                    let Some(command) = ChannelCommand::from_value(entry) else {
                        continue;
                    };
                    if !command.wants_tmp_link() {
                        continue;
                    }

                    match self.resolve_command(&command.url, headers).await {
                        CommandOutcome::Resolved(new_url) => {
                            if let Some(fields) = entry.as_object_mut() {
                                fields.insert("url".to_string(), Value::String(new_url.clone()));
                                fields.insert(
                                    "use_http_tmp_link".to_string(),
                                    Value::String("0".to_string()),
                                );
                            }
                            resolved_pairs.push((command.url, new_url));
                            report.resolved += 1;
                        }
                        CommandOutcome::Failed => report.failed += 1,
                        CommandOutcome::Skipped => report.skipped += 1,
                    }
                }
            }

            // the channel's own cmd usually mirrors one of its entries, keep them in step
            for (original, new_url) in resolved_pairs {
                if channel.get("cmd").and_then(Value::as_str) == Some(original.as_str()) {
                    channel.insert("cmd".to_string(), Value::String(new_url));
                }
            }
        }

        if report.resolved + report.failed > 0 {
            info!(
                "Link resolution: {} resolved, {} failed, {} skipped",
                report.resolved, report.failed, report.skipped
            );
        }

        report
    }

    async fn resolve_command(&self, url: &str, headers: &HeaderMap) -> CommandOutcome {
        let marker = self.inner.loopback_marker.as_str();
        let domain = self.inner.upstream.domain();

        if !url.contains(marker) && !url.contains(domain) {
            return CommandOutcome::Skipped;
        }

        let mut current = url.to_string();

        // the loopback hop always runs first, even if the provider hop of its result is cached
        if current.contains(marker) {
            match self.resolve_hop(Hop::Local, &current, headers).await {
                Ok(resolved) => current = resolved,
                Err(e) => {
                    warn!("Could not resolve loopback link {}: {}", url, e);
                    return CommandOutcome::Failed;
                }
            }

            // some portals hand out the final link straight away
            if !current.contains(domain) {
                return CommandOutcome::Resolved(current);
            }
        }

        match self.resolve_hop(Hop::Provider, &current, headers).await {
            Ok(resolved) => CommandOutcome::Resolved(resolved),
            Err(e) => {
                warn!("Could not fetch temporary link for {}: {}", current, e);
                CommandOutcome::Failed
            }
        }
    }
}

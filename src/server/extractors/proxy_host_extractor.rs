use axum::Extension;
use axum::extract::FromRequestParts;
use axum::http::header::HOST;
use axum::http::request::Parts;
use tracing::{debug, warn};

use crate::server::error::Error;
use crate::server::services::edge_services::EdgeServices;
use crate::server::utils::domain_utils::proxy_origin;

/// the origin clients use to reach us (`http://proxy.host:5000`) plus the services.
/// Rejects with 403 when the Host isn't ours, before anything is forwarded.
pub struct ProxyHost(pub String, pub EdgeServices);

/// host without the port, lowercased
fn bare_host(host: &str) -> String {
    let host = host.trim().to_ascii_lowercase();
    if host.starts_with('[') {
        // ipv6 literal, the port comes after the closing bracket
        return host
            .split_once(']')
            .map(|(addr, _)| format!("{}]", addr))
            .unwrap_or(host);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name.to_string(),
        _ => host,
    }
}

/// a host is ours if it is the configured proxy host or one of its subdomains
pub fn host_allowed(host: &str, proxy_host: &str) -> bool {
    let host = bare_host(host);
    let expected = bare_host(proxy_host);
    host == expected || host.ends_with(&format!(".{}", expected))
}

impl<S> FromRequestParts<S> for ProxyHost
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(services): Extension<EdgeServices> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|err| Error::InternalServerErrorWithContext(err.to_string()))?;

        // http/2 clients send :authority instead of Host
        let host = parts
            .headers
            .get(HOST)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string())
            .or_else(|| parts.uri.authority().map(|a| a.to_string()))
            .filter(|h| !h.trim().is_empty());

        let Some(host) = host else {
            warn!("Rejecting request without a host");
            return Err(Error::Forbidden(
                "Invalid host header. This proxy is only for the specified IPTV provider."
                    .to_string(),
            ));
        };

        if let Some(proxy_host) = services.config.proxy_host.as_deref()
            && !host_allowed(&host, proxy_host)
        {
            warn!("Rejecting request for foreign host {}", host);
            return Err(Error::Forbidden(
                "Invalid host header. This proxy is only for the specified IPTV provider."
                    .to_string(),
            ));
        }

        let origin = proxy_origin(&services.config.public_scheme, host.trim());
        debug!("Proxy origin for this request: {}", origin);

        Ok(ProxyHost(origin, services))
    }
}

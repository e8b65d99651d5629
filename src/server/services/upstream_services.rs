use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use reqwest::redirect::Policy;
use tracing::{debug, error, warn};

use crate::{
    config::AppConfig,
    server::{
        dtos::portal_dto::LinkResponse,
        error::{ResolveError, UpstreamError},
        utils::{
            encoding_utils::{ContentEncoding, UPSTREAM_ACCEPT_ENCODING},
            header_utils::{hop_headers, outbound_headers},
        },
    },
};

pub const LOAD_PATH: &str = "/stalker_portal/server/load.php";

/// what came back from the portal, body already decoded when we knew how
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// body is still in the encoding named by its Content-Encoding header
    pub still_encoded: bool,
}

impl UpstreamReply {
    pub fn content_type(&self) -> &str {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }
}

/// every request to the portal goes through here, forwards and link resolution hops alike
pub struct UpstreamClient {
    http: reqwest::Client,
    domain: String,
}

impl UpstreamClient {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        // redirects are passed to the client as they are, the portal's Location is its business
        let http = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(config.upstream_timeout())
            .connect_timeout(config.upstream_timeout())
            .build()?;

        Ok(Self {
            http,
            domain: config.upstream_domain.clone(),
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// `{domain}{path}?{query}`, query kept byte for byte
    pub fn target_url(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.domain, path, q),
            _ => format!("{}{}", self.domain, path),
        }
    }

    pub async fn forward(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        inbound_headers: &HeaderMap,
        body: Bytes,
    ) -> Result<UpstreamReply, UpstreamError> {
        let target_url = self.target_url(path, query);
        debug!("Forwarding {} to {}", method, target_url);

        let mut headers = outbound_headers(inbound_headers);
        headers.insert(
            header::ACCEPT_ENCODING,
            HeaderValue::from_static(UPSTREAM_ACCEPT_ENCODING),
        );

        let response = self
            .http
            .request(method, &target_url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!("Forward to {} failed: {}", target_url, e);
                metrics::counter!("portal_proxy_forward_total", "outcome" => "connect_failure")
                    .increment(1);
                UpstreamError::ConnectFailure(e.to_string())
            })?;

        let status = response.status();
        let headers = response.headers().clone();

        let raw = response.bytes().await.map_err(|e| {
            error!("Failed to read portal response from {}: {}", target_url, e);
            metrics::counter!("portal_proxy_forward_total", "outcome" => "connect_failure")
                .increment(1);
            UpstreamError::ConnectFailure(e.to_string())
        })?;

        debug!(
            "Portal answered {} with {} bytes for {}",
            status,
            raw.len(),
            target_url
        );
        metrics::counter!("portal_proxy_forward_total", "outcome" => "ok").increment(1);

        let (body, still_encoded) = decode_body(&headers, raw);

        Ok(UpstreamReply {
            status,
            headers,
            body,
            still_encoded,
        })
    }

    /// one call to load.php that's expected to answer with a link, `{"js":{"cmd":"..."}}`
    pub async fn request_link(
        &self,
        params: &[(&str, &str)],
        inbound_headers: &HeaderMap,
    ) -> Result<String, ResolveError> {
        let endpoint = format!("{}{}", self.domain, LOAD_PATH);
        let target = url::Url::parse_with_params(&endpoint, params)
            .map_err(|e| ResolveError::Network(format!("bad link url: {}", e)))?;

        let mut headers = hop_headers(inbound_headers);
        headers.insert(
            header::ACCEPT_ENCODING,
            HeaderValue::from_static(UPSTREAM_ACCEPT_ENCODING),
        );

        let response = self
            .http
            .get(target.as_str())
            .headers(headers)
            .send()
            .await
            .map_err(|e| ResolveError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Status(status.as_u16()));
        }

        let response_headers = response.headers().clone();
        let raw = response
            .bytes()
            .await
            .map_err(|e| ResolveError::Network(e.to_string()))?;

        let (body, still_encoded) = decode_body(&response_headers, raw);
        if still_encoded {
            return Err(ResolveError::Malformed(
                "body encoding could not be undone".to_string(),
            ));
        }

        // never trust, and never cache, a refusal even if it happens to be valid json
        if body.windows(b"Unauthorized".len()).any(|w| w == b"Unauthorized") {
            return Err(ResolveError::Unauthorized);
        }

        let parsed: LinkResponse =
            serde_json::from_slice(&body).map_err(|e| ResolveError::Malformed(e.to_string()))?;

        parsed.into_link().ok_or(ResolveError::MissingLink)
    }
}

fn decode_body(headers: &HeaderMap, raw: Bytes) -> (Bytes, bool) {
    let encoding = ContentEncoding::from_header(
        headers
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok()),
    );

    if encoding == ContentEncoding::Identity {
        return (raw, false);
    }

    match encoding.decode(&raw) {
        Ok(decoded) => {
            debug!(
                "Decoded {:?} body from {} to {} bytes",
                encoding,
                raw.len(),
                decoded.len()
            );
            (Bytes::from(decoded), false)
        }
        Err(e) => {
            warn!("Passing {:?} body through undecoded: {}", encoding, e);
            (raw, true)
        }
    }
}

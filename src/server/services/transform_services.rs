use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::{link_resolver_services::DynLinkResolverService, upstream_services::UpstreamReply};
use crate::server::utils::{domain_utils::DomainRewriter, header_utils::reconcile_headers};

/// how a portal body gets treated, decided by its Content-Type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// parsed, temp links resolved, then anonymized as text
    Json,
    /// anonymized if it decodes as utf-8
    Text,
    /// sent as is
    Binary,
}

impl BodyKind {
    pub fn classify(content_type: &str) -> Self {
        let content_type = content_type.to_ascii_lowercase();
        if content_type.contains("application/json") || content_type.contains("+json") {
            Self::Json
        } else if content_type.contains("text/") {
            Self::Text
        } else {
            Self::Binary
        }
    }
}

/// response on its way to the client
#[derive(Debug)]
pub struct ClientReply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// turns a portal response into the client's response. Nothing in here can fail, the worst case
/// is the portal's body going out unrewritten.
pub struct TransformService {
    resolver: DynLinkResolverService,
    upstream_domain: String,
}

impl TransformService {
    pub fn new(resolver: DynLinkResolverService, upstream_domain: impl Into<String>) -> Self {
        Self {
            resolver,
            upstream_domain: upstream_domain.into(),
        }
    }

    pub async fn transform(
        &self,
        reply: UpstreamReply,
        proxy_origin: &str,
        request_headers: &HeaderMap,
    ) -> ClientReply {
        let anonymizer = DomainRewriter::for_response(&self.upstream_domain, proxy_origin);
        let UpstreamReply {
            status,
            mut headers,
            body,
            still_encoded,
        } = reply;

        let kind = if still_encoded {
            // can't look inside it, so it's bytes whatever the header says
            BodyKind::Binary
        } else {
            BodyKind::classify(
                headers
                    .get(axum::http::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or(""),
            )
        };
        debug!("Treating portal body as {:?} ({} bytes)", kind, body.len());

        let body = match kind {
            BodyKind::Json => match serde_json::from_slice::<Value>(&body) {
                Ok(mut payload) => {
                    self.resolver
                        .resolve_payload(&mut payload, request_headers)
                        .await;
                    match serde_json::to_string(&payload) {
                        Ok(text) => Bytes::from(anonymizer.rewrite_str(&text).into_owned()),
                        Err(e) => {
                            warn!("Failed to serialize rewritten payload: {}", e);
                            anonymizer.rewrite_bytes(body)
                        }
                    }
                }
                Err(e) => {
                    warn!("Portal sent malformed json, treating it as text: {}", e);
                    anonymizer.rewrite_bytes(body)
                }
            },
            BodyKind::Text => anonymizer.rewrite_bytes(body),
            BodyKind::Binary => body,
        };

        reconcile_headers(&mut headers, body.len(), still_encoded);

        ClientReply {
            status,
            headers,
            body,
        }
    }
}

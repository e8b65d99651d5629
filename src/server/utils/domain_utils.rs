use std::borrow::Cow;

use axum::body::Bytes;

/// literal replacement of one origin by another, used both ways: client bodies get the proxy
/// origin swapped for the portal's before forwarding, portal bodies get the opposite on the way
/// back.
#[derive(Debug, Clone)]
pub struct DomainRewriter {
    from: String,
    to: String,
}

impl DomainRewriter {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// proxy origin -> portal domain, for request bodies
    pub fn for_request(proxy_origin: &str, upstream_domain: &str) -> Self {
        Self::new(proxy_origin, upstream_domain)
    }

    /// portal domain -> proxy origin, for response bodies
    pub fn for_response(upstream_domain: &str, proxy_origin: &str) -> Self {
        Self::new(upstream_domain, proxy_origin)
    }

    fn is_noop(&self) -> bool {
        self.from.is_empty() || self.from == self.to
    }

    pub fn rewrite_str<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if self.is_noop() || !text.contains(&self.from) {
            return Cow::Borrowed(text);
        }
        Cow::Owned(text.replace(&self.from, &self.to))
    }

    /// bytes that aren't utf-8 are returned untouched
    pub fn rewrite_bytes(&self, body: Bytes) -> Bytes {
        let Ok(text) = std::str::from_utf8(&body) else {
            return body;
        };

        match self.rewrite_str(text) {
            Cow::Borrowed(_) => body,
            Cow::Owned(rewritten) => Bytes::from(rewritten),
        }
    }
}

/// what clients see as the proxy, built from the Host they used
pub fn proxy_origin(scheme: &str, host: &str) -> String {
    format!("{}://{}", scheme, host)
}

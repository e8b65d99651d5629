// the catch all route, every path that isn't one of ours ends up here and goes to the portal
use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header},
    response::Response,
};
use tracing::{debug, info};

use crate::server::{
    error::{AppResult, Error},
    extractors::ProxyHost,
    services::{
        edge_services::EdgeServices, link_resolver_services::CommandOutcome,
        transform_services::ClientReply, upstream_services::LOAD_PATH,
    },
    utils::domain_utils::DomainRewriter,
};

pub struct ProxyController;

impl ProxyController {
    fn is_proxied_method(method: &Method) -> bool {
        matches!(
            *method,
            Method::GET
                | Method::POST
                | Method::PUT
                | Method::DELETE
                | Method::PATCH
                | Method::OPTIONS
        )
    }

    pub async fn proxy(
        ProxyHost(proxy_origin, services): ProxyHost,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> AppResult<Response> {
        if !Self::is_proxied_method(&method) {
            return Err(Error::MethodNotAllowed(method.to_string()));
        }

        info!("Incoming request: {} {}", method, uri);

        if method == Method::GET {
            if let Some(response) =
                Self::answer_create_link(&services, &proxy_origin, &uri, &headers).await
            {
                return Ok(response);
            }
        }

        // clients only know our origin, the portal only knows its own
        let body = DomainRewriter::for_request(&proxy_origin, services.upstream.domain())
            .rewrite_bytes(body);

        let reply = services
            .upstream
            .forward(method, uri.path(), uri.query(), &headers, body)
            .await?;

        debug!(
            "Portal response: {} ({})",
            reply.status,
            reply.content_type()
        );

        let ClientReply {
            status,
            headers: response_headers,
            body,
        } = services
            .transform
            .transform(reply, &proxy_origin, &headers)
            .await;

        // built by hand so axum doesn't slip in a content-type the portal never sent
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;

        Ok(response)
    }

    /// the `cmd` of a client `create_link` call for one of our loopback commands
    fn loopback_create_link(uri: &Uri, marker: &str) -> Option<String> {
        if uri.path() != LOAD_PATH {
            return None;
        }

        let mut is_itv = false;
        let mut is_create_link = false;
        let mut cmd = None;
        for (name, value) in url::form_urlencoded::parse(uri.query()?.as_bytes()) {
            match name.as_ref() {
                "type" => is_itv = value == "itv",
                "action" => is_create_link = value == "create_link",
                "cmd" => cmd = Some(value.into_owned()),
                _ => {}
            }
        }

        cmd.filter(|cmd| is_itv && is_create_link && cmd.contains(marker))
    }

    /// answers a client `create_link` for a loopback command from the link resolver, so the
    /// portal only sees it once per cache lifetime. None when the request has to go upstream.
    async fn answer_create_link(
        services: &EdgeServices,
        proxy_origin: &str,
        uri: &Uri,
        headers: &HeaderMap,
    ) -> Option<Response> {
        let cmd = Self::loopback_create_link(uri, &services.config.loopback_marker)?;

        let CommandOutcome::Resolved(link) = services.resolver.resolve_command(&cmd, headers).await
        else {
            debug!("No link for {}, asking the portal", cmd);
            return None;
        };

        info!("Answering create_link for {} with a resolved link", cmd);

        let body = serde_json::json!({ "js": { "cmd": link } }).to_string();
        let body = DomainRewriter::for_response(services.upstream.domain(), proxy_origin)
            .rewrite_str(&body)
            .into_owned();

        let length = body.len();
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = StatusCode::OK;
        let response_headers = response.headers_mut();
        response_headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));

        Some(response)
    }
}

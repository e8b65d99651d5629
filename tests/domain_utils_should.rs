use std::io::Write;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, header};
use flate2::{Compression, write::GzEncoder};

use portal_proxy::server::dtos::portal_dto::{LinkResponse, channel_id, channels_mut, stream_url};
use portal_proxy::server::extractors::host_allowed;
use portal_proxy::server::services::transform_services::BodyKind;
use portal_proxy::server::utils::{
    domain_utils::DomainRewriter,
    encoding_utils::ContentEncoding,
    header_utils::{hop_headers, outbound_headers, reconcile_headers},
};

const PORTAL: &str = "http://portal.example.com";
const PROXY: &str = "http://proxy.local:5000";

#[test]
fn anonymize_every_occurrence() {
    let rewriter = DomainRewriter::for_response(PORTAL, PROXY);
    let body = format!("{0}/a {0}/b http://cdn.example/c", PORTAL);

    assert_eq!(
        rewriter.rewrite_str(&body),
        format!("{0}/a {0}/b http://cdn.example/c", PROXY)
    );
}

#[test]
fn anonymize_is_idempotent() {
    let rewriter = DomainRewriter::for_response(PORTAL, PROXY);
    let once = rewriter.rewrite_str(&format!("see {}/x", PORTAL)).into_owned();
    let twice = rewriter.rewrite_str(&once).into_owned();

    assert_eq!(once, twice);
    assert!(!twice.contains(PORTAL));
}

#[test]
fn rewrite_request_bodies_towards_the_portal() {
    let rewriter = DomainRewriter::for_request(PROXY, PORTAL);
    let body = Bytes::from(format!("cb={}/done", PROXY));

    assert_eq!(
        rewriter.rewrite_bytes(body),
        Bytes::from(format!("cb={}/done", PORTAL))
    );
}

#[test]
fn leave_non_utf8_bodies_alone() {
    let rewriter = DomainRewriter::for_response(PORTAL, PROXY);
    let mut raw = vec![0xc3, 0x28];
    raw.extend_from_slice(PORTAL.as_bytes());
    let body = Bytes::from(raw.clone());

    assert_eq!(rewriter.rewrite_bytes(body).as_ref(), raw.as_slice());
}

#[test]
fn do_nothing_when_origins_match() {
    let rewriter = DomainRewriter::new(PORTAL, PORTAL);
    assert_eq!(rewriter.rewrite_str(PORTAL), PORTAL);

    let empty = DomainRewriter::new("", PROXY);
    assert_eq!(empty.rewrite_str("abc"), "abc");
}

#[test]
fn reconcile_content_length_and_encoding() {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("999"));
    headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

    reconcile_headers(&mut headers, 42, false);

    assert_eq!(headers[header::CONTENT_LENGTH], "42");
    assert!(headers.get(header::CONTENT_ENCODING).is_none());
    assert!(headers.get(header::TRANSFER_ENCODING).is_none());
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
}

#[test]
fn keep_encoding_of_undecoded_bodies() {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("br"));

    reconcile_headers(&mut headers, 7, true);

    assert_eq!(headers[header::CONTENT_ENCODING], "br");
    assert_eq!(headers[header::CONTENT_LENGTH], "7");
}

#[test]
fn strip_framing_headers_before_forwarding() {
    let mut inbound = HeaderMap::new();
    inbound.insert(header::HOST, HeaderValue::from_static("proxy.local:5000"));
    inbound.insert(header::CONTENT_LENGTH, HeaderValue::from_static("12"));
    inbound.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("br"));
    inbound.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    inbound.insert(header::COOKIE, HeaderValue::from_static("mac=00:1A"));
    inbound.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));

    let outbound = outbound_headers(&inbound);
    assert!(outbound.get(header::HOST).is_none());
    assert!(outbound.get(header::CONTENT_LENGTH).is_none());
    assert!(outbound.get(header::ACCEPT_ENCODING).is_none());
    assert_eq!(outbound[header::COOKIE], "mac=00:1A");
    assert_eq!(outbound[header::AUTHORIZATION], "Bearer abc");
    assert_eq!(outbound[header::CONTENT_TYPE], "text/plain");

    let hop = hop_headers(&inbound);
    assert!(hop.get(header::CONTENT_TYPE).is_none());
    assert_eq!(hop[header::COOKIE], "mac=00:1A");
}

#[test]
fn classify_bodies_by_content_type() {
    assert_eq!(BodyKind::classify("application/json"), BodyKind::Json);
    assert_eq!(
        BodyKind::classify("Application/JSON; charset=UTF-8"),
        BodyKind::Json
    );
    assert_eq!(BodyKind::classify("application/ld+json"), BodyKind::Json);
    assert_eq!(BodyKind::classify("text/javascript"), BodyKind::Text);
    assert_eq!(BodyKind::classify("text/html; charset=utf-8"), BodyKind::Text);
    assert_eq!(BodyKind::classify("image/png"), BodyKind::Binary);
    assert_eq!(BodyKind::classify(""), BodyKind::Binary);
}

#[test]
fn decode_gzip_bodies() {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(b"{\"js\":true}").unwrap();
    let compressed = encoder.finish().unwrap();

    let encoding = ContentEncoding::from_header(Some("GZIP"));
    assert_eq!(encoding, ContentEncoding::Gzip);
    assert_eq!(encoding.decode(&compressed).unwrap(), b"{\"js\":true}");

    // header lies about the body
    assert!(encoding.decode(b"plain text").is_err());
}

#[test]
fn refuse_unknown_encodings() {
    let encoding = ContentEncoding::from_header(Some("br"));
    assert_eq!(encoding, ContentEncoding::Unsupported("br".to_string()));
    assert!(encoding.decode(b"abc").is_err());

    assert_eq!(ContentEncoding::from_header(None), ContentEncoding::Identity);
    assert_eq!(
        ContentEncoding::from_header(Some("identity")),
        ContentEncoding::Identity
    );
}

#[test]
fn find_the_channel_id() {
    assert_eq!(
        channel_id("ffmpeg http://localhost/ch/1234_"),
        Some("1234_".to_string())
    );
    assert_eq!(
        channel_id("ffmpeg http://localhost/ch/77/"),
        Some("77".to_string())
    );
    assert_eq!(
        channel_id("http://localhost/ch/5?token=x"),
        Some("5".to_string())
    );
    assert_eq!(channel_id("ffmpeg http://localhost"), None);
    assert_eq!(channel_id("no url here"), None);
}

#[test]
fn find_the_stream_url() {
    assert_eq!(
        stream_url("ffmpeg http://cdn.example/a.m3u8"),
        Some("http://cdn.example/a.m3u8")
    );
    assert_eq!(stream_url("auto rtmp://x/y"), Some("rtmp://x/y"));
    assert_eq!(stream_url("ffmpeg"), None);
    assert_eq!(stream_url("ffmpeg http://"), None);
}

#[test]
fn accept_only_usable_links() {
    let parse = |text: &str| serde_json::from_str::<LinkResponse>(text).unwrap().into_link();

    assert_eq!(
        parse(r#"{"js":{"cmd":" ffmpeg http://cdn.example/a.m3u8 ","error":""}}"#),
        Some("ffmpeg http://cdn.example/a.m3u8".to_string())
    );
    assert_eq!(
        parse(r#"{"js":{"cmd":"http://cdn.example/b.ts"}}"#),
        Some("http://cdn.example/b.ts".to_string())
    );
    assert_eq!(
        parse(r#"{"js":{"cmd":"ffmpeg http://cdn.example/a.m3u8","error":"limit"}}"#),
        None
    );
    assert_eq!(parse(r#"{"js":{"cmd":"ffmpeg "}}"#), None);
    assert_eq!(parse(r#"{"js":{"error":""}}"#), None);
}

#[test]
fn find_channels_in_both_payload_shapes() {
    let mut paged = serde_json::json!({"js": {"total_items": 1, "data": [{"id": "1"}]}});
    assert_eq!(channels_mut(&mut paged).map(|c| c.len()), Some(1));

    let mut bare = serde_json::json!([{"id": "1"}, {"id": "2"}]);
    assert_eq!(channels_mut(&mut bare).map(|c| c.len()), Some(2));

    let mut other = serde_json::json!({"js": {"token": "abc"}});
    assert!(channels_mut(&mut other).is_none());
}

#[test]
fn gate_requests_on_the_proxy_host() {
    assert!(host_allowed("iptv.proxy.example", "iptv.proxy.example"));
    assert!(host_allowed("IPTV.proxy.example:8080", "iptv.proxy.example"));
    assert!(host_allowed("eu.iptv.proxy.example", "iptv.proxy.example"));
    assert!(!host_allowed("evil-iptv.proxy.example", "iptv.proxy.example"));
    assert!(!host_allowed("iptv.proxy.example.evil.com", "iptv.proxy.example"));
    assert!(!host_allowed("portal.example.com", "iptv.proxy.example"));
}

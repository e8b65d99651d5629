use axum::http::{HeaderMap, HeaderValue, header};

/// request headers that never go to the portal as they came in. Host and the body framing
/// are set by the client library, Accept-Encoding is replaced by what we can decode.
const NOT_FORWARDED: [header::HeaderName; 5] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
    header::ACCEPT_ENCODING,
];

pub fn outbound_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    for name in NOT_FORWARDED.iter() {
        headers.remove(name);
    }
    headers
}

/// outbound headers for the link resolution calls, which are GETs without a body
pub fn hop_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = outbound_headers(inbound);
    headers.remove(header::CONTENT_TYPE);
    headers
}

/// makes the response headers match the body we actually send.
///
/// Content-Encoding goes unless the body is still in its original encoding (we couldn't decode
/// it), Transfer-Encoding always goes, Content-Length is set to the final length.
pub fn reconcile_headers(headers: &mut HeaderMap, body_len: usize, still_encoded: bool) {
    if !still_encoded {
        headers.remove(header::CONTENT_ENCODING);
    }
    headers.remove(header::TRANSFER_ENCODING);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body_len));
}

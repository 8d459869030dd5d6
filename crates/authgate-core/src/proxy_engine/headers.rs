use http::header::{
    AUTHORIZATION, CONNECTION, CONTENT_ENCODING, CONTENT_LENGTH, HOST, TRANSFER_ENCODING,
};
use http::{HeaderMap, HeaderName};

/// Inbound headers that must not reach the backend. The body may be rewritten,
/// so the length is recomputed by the client.
fn is_stripped_request_header(name: &HeaderName) -> bool {
    name == HOST || name == AUTHORIZATION || name == CONTENT_LENGTH
}

/// Backend framing headers. They describe the upstream connection, not the
/// body the caller will receive.
fn is_stripped_response_header(name: &HeaderName) -> bool {
    name == CONTENT_ENCODING
        || name == CONTENT_LENGTH
        || name == TRANSFER_ENCODING
        || name == CONNECTION
}

pub fn upstream_request_headers(inbound: &HeaderMap) -> HeaderMap {
    filter_headers(inbound, is_stripped_request_header)
}

pub fn downstream_response_headers(upstream: &HeaderMap) -> HeaderMap {
    filter_headers(upstream, is_stripped_response_header)
}

fn filter_headers(headers: &HeaderMap, stripped: fn(&HeaderName) -> bool) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if stripped(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};

use crate::upstream_client::UpstreamBody;

/// A caller's request as the engine sees it, detached from the HTTP server.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Request path without scheme or host.
    pub path: String,
    /// Raw query string, relayed byte-for-byte.
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// What goes back to the caller.
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: UpstreamBody,
}

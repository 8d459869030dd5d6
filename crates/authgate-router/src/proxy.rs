use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Extension, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use bytes::Bytes;
use futures_util::TryStreamExt;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{info, warn};

use authgate_core::{InboundRequest, ProxyEngine, ProxyError, ProxyResponse, UpstreamBody};

#[derive(Clone)]
pub struct ProxyState {
    pub engine: Arc<ProxyEngine>,
}

#[derive(Clone)]
struct RequestTraceId(String);

/// Every method on every path goes through the auth middleware and then to
/// the backend. CORS is the outermost layer so preflights never need a key.
pub fn proxy_router(engine: Arc<ProxyEngine>) -> Router {
    let state = ProxyState { engine };

    Router::new()
        .route("/", any(proxy_forward))
        .route("/{*path}", any(proxy_forward))
        .layer(middleware::from_fn_with_state(state.clone(), proxy_auth))
        // Chat histories can be large; the backend enforces its own limits.
        .layer(DefaultBodyLimit::disable())
        .layer(cors_layer())
        .with_state(state)
}

/// Any origin, method and header, with credentials.
///
/// Browsers never let a `*` allow-headers value cover `Authorization`, so
/// everything is echoed back from the request instead of answered with `*`.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

async fn proxy_auth(
    State(state): State<ProxyState>,
    mut req: axum::http::Request<Body>,
    next: Next,
) -> Response {
    let trace_id = uuid::Uuid::now_v7().to_string();

    // `Body` is not `Sync`; the request cannot be borrowed across the lookup.
    let headers = req.headers().clone();
    if let Err(err) = state.engine.authenticate(&headers).await {
        info!(
            event = "downstream_rejected",
            trace_id = %trace_id,
            method = %req.method(),
            path = %req.uri().path(),
            status = err.status().as_u16()
        );
        return error_response(err);
    }

    strip_downstream_auth_headers(req.headers_mut());
    req.extensions_mut().insert(RequestTraceId(trace_id));
    next.run(req).await
}

fn strip_downstream_auth_headers(headers: &mut HeaderMap) {
    headers.remove(header::AUTHORIZATION);
}

async fn proxy_forward(
    State(state): State<ProxyState>,
    Extension(trace_id): Extension<RequestTraceId>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started_at = Instant::now();
    let req = InboundRequest {
        method: method.clone(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body,
    };

    match state.engine.forward(req).await {
        Ok(resp) => {
            info!(
                event = "downstream_response",
                trace_id = %trace_id.0,
                method = %method,
                path = %uri.path(),
                status = resp.status.as_u16(),
                elapsed_ms = started_at.elapsed().as_millis()
            );
            to_axum_response(resp, trace_id.0)
        }
        Err(err) => {
            warn!(
                event = "downstream_error",
                trace_id = %trace_id.0,
                method = %method,
                path = %uri.path(),
                status = err.status().as_u16(),
                error = %err
            );
            error_response(err)
        }
    }
}

fn to_axum_response(resp: ProxyResponse, trace_id: String) -> Response {
    let mut builder = Response::builder().status(resp.status);
    if let Some(headers) = builder.headers_mut() {
        // Hop-by-hop and framing headers were already dropped; hyper sets framing itself.
        *headers = resp.headers;
    }

    let body = match resp.body {
        UpstreamBody::Bytes(bytes) => Body::from(bytes),
        UpstreamBody::Stream(stream) => {
            let stream = stream.inspect_err(move |err| {
                warn!(
                    event = "downstream_stream_aborted",
                    trace_id = %trace_id,
                    kind = err.kind.as_str(),
                    error = %err
                );
            });
            Body::from_stream(stream)
        }
    };

    builder.body(body).unwrap_or_else(|_| {
        (StatusCode::INTERNAL_SERVER_ERROR, "response_build_failed").into_response()
    })
}

fn error_response(err: ProxyError) -> Response {
    let mut builder = Response::builder().status(err.status());
    if let Some(headers) = builder.headers_mut() {
        *headers = err.headers();
    }
    builder.body(Body::from(err.body())).unwrap_or_else(|_| {
        (StatusCode::INTERNAL_SERVER_ERROR, "response_build_failed").into_response()
    })
}

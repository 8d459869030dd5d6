use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::HeaderMap;
use tracing::{error, info};

use authgate_transform::chat::openai_chat_completions2ollama::{
    transform_request_body, transform_response_body,
};

use crate::auth::{self, AuthError, CredentialStore};
use crate::classify::classify_path;
use crate::error::ProxyError;
use crate::upstream_client::{UpstreamBody, UpstreamClient, UpstreamFailure, UpstreamHttpRequest};

mod headers;
mod types;

pub use headers::{downstream_response_headers, upstream_request_headers};
pub use types::{InboundRequest, ProxyResponse};

/// Authenticates, routes and relays requests to the inference backend.
///
/// Holds no per-request state. The credential store is consulted on every
/// call and the upstream client owns the shared connection pool.
#[derive(Clone)]
pub struct ProxyEngine {
    store: Arc<dyn CredentialStore>,
    client: Arc<dyn UpstreamClient>,
    backend_url: String,
}

impl ProxyEngine {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        client: Arc<dyn UpstreamClient>,
        backend_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            client,
            backend_url: backend_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn backend_url(&self) -> &str {
        &self.backend_url
    }

    /// Runs the credential lookup on the blocking pool. Stores may hit the
    /// filesystem on every call and must not stall the request workers.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<(), ProxyError> {
        let store = self.store.clone();
        let headers = headers.clone();
        let outcome =
            tokio::task::spawn_blocking(move || auth::authenticate(store.as_ref(), &headers))
                .await;
        match outcome {
            Ok(result) => result?,
            Err(err) => {
                error!(event = "credential_lookup_failed", error = %err);
                return Err(AuthError::Unavailable.into());
            }
        }
        Ok(())
    }

    /// Full lifecycle: reject unauthenticated callers before any upstream work,
    /// then forward.
    pub async fn handle(&self, req: InboundRequest) -> Result<ProxyResponse, ProxyError> {
        self.authenticate(&req.headers).await?;
        self.forward(req).await
    }

    /// Relay an already-authenticated request.
    pub async fn forward(&self, req: InboundRequest) -> Result<ProxyResponse, ProxyError> {
        let route = classify_path(&req.path);
        let url = route.target_url(&self.backend_url, req.query.as_deref());
        let headers = upstream_request_headers(&req.headers);
        let body = if route.transform {
            rewrite_request_body(req.body)
        } else {
            req.body
        };

        info!(
            event = "upstream_forward",
            method = %req.method,
            path = %req.path,
            url = %url,
            transform = route.transform
        );
        let started_at = Instant::now();

        let upstream_req = UpstreamHttpRequest {
            method: req.method,
            url,
            headers,
            body,
            buffer_response: route.transform,
        };
        let response = self
            .client
            .send(upstream_req)
            .await
            .map_err(|failure| upstream_unreachable(failure, started_at))?;

        let status = response.status;
        let headers = downstream_response_headers(&response.headers);
        let body = if route.transform {
            let raw = response
                .body
                .into_bytes()
                .await
                .map_err(|failure| upstream_unreachable(failure, started_at))?;
            UpstreamBody::Bytes(rewrite_response_body(raw))
        } else {
            response.body
        };

        info!(
            event = "upstream_responded",
            status = status.as_u16(),
            elapsed_ms = started_at.elapsed().as_millis(),
            transform = route.transform
        );

        Ok(ProxyResponse {
            status,
            headers,
            body,
        })
    }
}

fn upstream_unreachable(failure: UpstreamFailure, started_at: Instant) -> ProxyError {
    error!(
        event = "upstream_failed",
        kind = failure.kind.as_str(),
        error = %failure.message,
        elapsed_ms = started_at.elapsed().as_millis()
    );
    ProxyError::UpstreamUnreachable(failure.message)
}

/// Chat request in OpenAI shape → Ollama shape. Unparseable bodies go out untouched.
fn rewrite_request_body(body: Bytes) -> Bytes {
    match transform_request_body(&body) {
        Ok(rewritten) => Bytes::from(rewritten),
        Err(err) => {
            error!(event = "request_transform_skipped", error = %err);
            body
        }
    }
}

/// Ollama chat response → OpenAI chat completion. Unparseable bodies come back untouched.
fn rewrite_response_body(body: Bytes) -> Bytes {
    match transform_response_body(&body) {
        Ok(rewritten) => Bytes::from(rewritten),
        Err(err) => {
            error!(event = "response_transform_skipped", error = %err);
            body
        }
    }
}

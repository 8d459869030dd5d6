use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header};
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use serde_json::{Value as JsonValue, json};
use tower::ServiceExt as _;

use authgate_core::{
    MemoryCredentialStore, ProxyEngine, UpstreamBody, UpstreamClient, UpstreamFailure,
    UpstreamHttpRequest, UpstreamHttpResponse, UpstreamTransportErrorKind,
};
use authgate_router::proxy_router;

const KEY: &str = "sk-router-key";

struct StubBackend {
    status: StatusCode,
    content_type: &'static str,
    body: Bytes,
    fail: bool,
    calls: Mutex<Vec<UpstreamHttpRequest>>,
}

impl StubBackend {
    fn ok(content_type: &'static str, body: &'static str) -> Arc<Self> {
        Arc::new(Self {
            status: StatusCode::OK,
            content_type,
            body: Bytes::from_static(body.as_bytes()),
            fail: false,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn down() -> Arc<Self> {
        Arc::new(Self {
            status: StatusCode::OK,
            content_type: "text/plain",
            body: Bytes::new(),
            fail: true,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<UpstreamHttpRequest> {
        self.calls.lock().unwrap().clone()
    }
}

impl UpstreamClient for StubBackend {
    fn send<'a>(
        &'a self,
        req: UpstreamHttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>>
    {
        Box::pin(async move {
            let buffer = req.buffer_response;
            self.calls.lock().unwrap().push(req);
            if self.fail {
                return Err(UpstreamFailure::new(
                    UpstreamTransportErrorKind::Connect,
                    "tcp connect error: Connection refused",
                ));
            }
            let mut headers = HeaderMap::new();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(self.content_type),
            );
            headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
            headers.insert("x-ollama-version", HeaderValue::from_static("0.5.1"));
            let body = if buffer {
                UpstreamBody::Bytes(self.body.clone())
            } else {
                let chunks: Vec<Result<Bytes, UpstreamFailure>> = self
                    .body
                    .chunks(4)
                    .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
                    .collect();
                UpstreamBody::Stream(stream::iter(chunks).boxed())
            };
            Ok(UpstreamHttpResponse {
                status: self.status,
                headers,
                body,
            })
        })
    }
}

fn app(backend: Arc<StubBackend>) -> axum::Router {
    let engine = ProxyEngine::new(
        Arc::new(MemoryCredentialStore::new([KEY])),
        backend,
        "http://127.0.0.1:11434",
    );
    proxy_router(Arc::new(engine))
}

async fn body_json(body: Body) -> JsonValue {
    let bytes = to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn missing_key_is_rejected_with_detail() {
    let backend = StubBackend::ok("application/json", "{}");
    let response = app(backend.clone())
        .oneshot(
            Request::builder()
                .uri("/v1/models")
                .header(header::ORIGIN, "https://chat.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://chat.example"
    );
    assert_eq!(
        body_json(response.into_body()).await,
        json!({"detail": "Invalid or missing API key"})
    );
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn wrong_key_looks_like_missing_key() {
    let backend = StubBackend::ok("application/json", "{}");
    let response = app(backend.clone())
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/v1/chat/completions")
                .header(header::AUTHORIZATION, "Bearer sk-nope")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(response.into_body()).await,
        json!({"detail": "Invalid or missing API key"})
    );
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn cors_preflight_needs_no_key() {
    let backend = StubBackend::ok("application/json", "{}");
    let response = app(backend.clone())
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/v1/chat/completions")
                .header(header::ORIGIN, "https://chat.example")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization,content-type")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://chat.example"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "POST");

    // A `*` here would not cover `Authorization` in a browser.
    let allowed = headers[header::ACCESS_CONTROL_ALLOW_HEADERS]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert_ne!(allowed, "*");
    let allowed: Vec<&str> = allowed.split(',').map(str::trim).collect();
    assert!(allowed.contains(&"authorization"), "{allowed:?}");
    assert!(allowed.contains(&"content-type"), "{allowed:?}");
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn chat_completion_round_trip() {
    let backend = StubBackend::ok(
        "application/json",
        r#"{"model":"llama3","message":{"role":"assistant","content":"pong"},"done":true}"#,
    );
    let response = app(backend.clone())
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/v1/chat/completions")
                .header(header::AUTHORIZATION, format!("Bearer {KEY}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "model": "llama3",
                        "messages": [{"role": "user", "content": "ping"}],
                        "max_tokens": 8
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::CONNECTION).is_none());

    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].url, "http://127.0.0.1:11434/api/chat");
    assert!(calls[0].headers.get(header::AUTHORIZATION).is_none());
    let sent: JsonValue = serde_json::from_slice(&calls[0].body).unwrap();
    assert_eq!(sent["options"], json!({"num_predict": 8}));
    assert_eq!(sent["stream"], false);

    let body = body_json(response.into_body()).await;
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["choices"][0]["message"]["role"], "assistant");
    assert_eq!(body["choices"][0]["message"]["content"], "pong");
}

#[tokio::test]
async fn passthrough_streams_backend_bytes() {
    let payload = r#"{"models":[{"name":"llama3:latest"},{"name":"qwen2:7b"}]}"#;
    let backend = StubBackend::ok("application/json", payload);
    let response = app(backend.clone())
        .oneshot(
            Request::builder()
                .uri("/api/tags?verbose=1&verbose=2")
                .header(header::AUTHORIZATION, format!("Bearer {KEY}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ollama-version"], "0.5.1");

    let calls = backend.calls();
    assert_eq!(calls[0].method, Method::GET);
    assert_eq!(
        calls[0].url,
        "http://127.0.0.1:11434/api/tags?verbose=1&verbose=2"
    );
    assert!(!calls[0].buffer_response);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes, Bytes::from_static(payload.as_bytes()));
}

#[tokio::test]
async fn root_path_is_forwarded() {
    let backend = StubBackend::ok("text/plain", "Ollama is running");
    let response = app(backend.clone())
        .oneshot(
            Request::builder()
                .uri("/")
                .header(header::AUTHORIZATION, format!("Bearer {KEY}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(backend.calls()[0].url, "http://127.0.0.1:11434/");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes, Bytes::from_static(b"Ollama is running"));
}

#[tokio::test]
async fn unreachable_backend_is_a_500_with_cause() {
    let backend = StubBackend::down();
    let response = app(backend.clone())
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri("/api/delete")
                .header(header::AUTHORIZATION, format!("Bearer {KEY}"))
                .body(Body::from(r#"{"name":"llama3"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    assert_eq!(
        body_json(response.into_body()).await,
        json!({"detail": "Error connecting to backend server: tcp connect error: Connection refused"})
    );
}

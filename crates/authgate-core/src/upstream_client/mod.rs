use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt, TryStreamExt};
use http::{HeaderMap, Method, StatusCode};
use wreq::Client;
use wreq::redirect::Policy;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamFailure>> + Send>>;

/// Outbound HTTP capability. The engine only ever talks to the backend through this.
pub trait UpstreamClient: Send + Sync {
    fn send<'a>(
        &'a self,
        req: UpstreamHttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>>;
}

#[derive(Debug, Clone)]
pub struct UpstreamHttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Read the whole response before returning instead of handing back a stream.
    pub buffer_response: bool,
}

#[derive(Debug)]
pub struct UpstreamHttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: UpstreamBody,
}

pub enum UpstreamBody {
    Bytes(Bytes),
    Stream(ByteStream),
}

impl UpstreamBody {
    /// Drain the body into memory.
    pub async fn into_bytes(self) -> Result<Bytes, UpstreamFailure> {
        match self {
            UpstreamBody::Bytes(bytes) => Ok(bytes),
            UpstreamBody::Stream(stream) => {
                let buf = stream
                    .try_fold(BytesMut::new(), |mut buf, chunk| async move {
                        buf.extend_from_slice(&chunk);
                        Ok(buf)
                    })
                    .await?;
                Ok(buf.freeze())
            }
        }
    }
}

impl fmt::Debug for UpstreamBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamBody::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            UpstreamBody::Stream(_) => f.debug_tuple("Stream").field(&"<opaque>").finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamTransportErrorKind {
    Connect,
    Dns,
    Tls,
    Body,
    Other,
}

impl UpstreamTransportErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UpstreamTransportErrorKind::Connect => "connect",
            UpstreamTransportErrorKind::Dns => "dns",
            UpstreamTransportErrorKind::Tls => "tls",
            UpstreamTransportErrorKind::Body => "body",
            UpstreamTransportErrorKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct UpstreamFailure {
    pub kind: UpstreamTransportErrorKind,
    pub message: String,
}

impl UpstreamFailure {
    pub fn new(kind: UpstreamTransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamClientConfig {
    pub max_redirects: usize,
}

impl Default for UpstreamClientConfig {
    fn default() -> Self {
        Self { max_redirects: 10 }
    }
}

/// Pooled client for the backend.
///
/// No connect, read or total timeout is configured: generation can stream for
/// as long as the model keeps producing tokens. Dropping the last clone closes
/// the pool.
#[derive(Clone)]
pub struct WreqUpstreamClient {
    client: Client,
}

impl WreqUpstreamClient {
    pub fn new(config: UpstreamClientConfig) -> Result<Self, wreq::Error> {
        Ok(Self {
            client: build_client(&config)?,
        })
    }
}

fn build_client(config: &UpstreamClientConfig) -> Result<Client, wreq::Error> {
    Client::builder()
        .redirect(Policy::limited(config.max_redirects))
        .build()
}

impl UpstreamClient for WreqUpstreamClient {
    fn send<'a>(
        &'a self,
        req: UpstreamHttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>>
    {
        Box::pin(async move {
            let mut builder = self.client.request(req.method, &req.url);

            for (name, value) in &req.headers {
                builder = builder.header(name, value);
            }

            if !req.body.is_empty() {
                builder = builder.body(req.body);
            }

            let resp = builder.send().await.map_err(map_wreq_error)?;
            convert_response(resp, req.buffer_response).await
        })
    }
}

async fn convert_response(
    resp: wreq::Response,
    buffer: bool,
) -> Result<UpstreamHttpResponse, UpstreamFailure> {
    let status = resp.status();
    let headers = resp.headers().clone();

    if buffer {
        let body = resp.bytes().await.map_err(map_body_error)?;
        return Ok(UpstreamHttpResponse {
            status,
            headers,
            body: UpstreamBody::Bytes(body),
        });
    }

    // Polled directly by the downstream body; dropping it aborts the upstream read.
    let stream = resp.bytes_stream().map_err(map_body_error);
    Ok(UpstreamHttpResponse {
        status,
        headers,
        body: UpstreamBody::Stream(stream.boxed()),
    })
}

fn map_wreq_error(err: wreq::Error) -> UpstreamFailure {
    UpstreamFailure::new(classify_wreq_error(&err), err.to_string())
}

fn map_body_error(err: wreq::Error) -> UpstreamFailure {
    UpstreamFailure::new(UpstreamTransportErrorKind::Body, err.to_string())
}

fn classify_wreq_error(err: &wreq::Error) -> UpstreamTransportErrorKind {
    let message = err.to_string().to_ascii_lowercase();
    if err.is_connect() {
        if message.contains("dns") || message.contains("resolve") {
            return UpstreamTransportErrorKind::Dns;
        }
        if message.contains("tls") || message.contains("ssl") {
            return UpstreamTransportErrorKind::Tls;
        }
        return UpstreamTransportErrorKind::Connect;
    }
    if err.is_connection_reset() {
        return UpstreamTransportErrorKind::Connect;
    }
    if message.contains("tls") || message.contains("ssl") {
        return UpstreamTransportErrorKind::Tls;
    }
    UpstreamTransportErrorKind::Other
}

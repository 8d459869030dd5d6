pub mod auth;
pub mod bootstrap;
pub mod classify;
pub mod error;
pub mod proxy_engine;
pub mod upstream_client;

pub use auth::{
    AUDIT_TARGET, AuthError, CredentialStore, KeyFileError, KeyFileStore, MemoryCredentialStore,
    extract_bearer_token,
};
pub use classify::{RouteDecision, classify_path};
pub use error::ProxyError;
pub use proxy_engine::{InboundRequest, ProxyEngine, ProxyResponse};
pub use upstream_client::{
    UpstreamBody, UpstreamClient, UpstreamClientConfig, UpstreamFailure, UpstreamHttpRequest,
    UpstreamHttpResponse, UpstreamTransportErrorKind, WreqUpstreamClient,
};

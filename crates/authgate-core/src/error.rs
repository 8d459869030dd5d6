use bytes::Bytes;
use http::header::{CONTENT_TYPE, WWW_AUTHENTICATE};
use http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::json;

use crate::auth::AuthError;

const UNAUTHENTICATED_DETAIL: &str = "Invalid or missing API key";

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(#[from] AuthError),
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ProxyError::UpstreamUnreachable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Caller-facing message. Missing and unknown tokens are indistinguishable here.
    pub fn detail(&self) -> String {
        match self {
            ProxyError::Unauthenticated(_) => UNAUTHENTICATED_DETAIL.to_string(),
            ProxyError::UpstreamUnreachable(cause) => {
                format!("Error connecting to backend server: {cause}")
            }
        }
    }

    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if matches!(self, ProxyError::Unauthenticated(_)) {
            headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        headers
    }

    /// `{"detail": "..."}`
    pub fn body(&self) -> Bytes {
        Bytes::from(json!({ "detail": self.detail() }).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_share_one_response() {
        let missing = ProxyError::from(AuthError::Missing);
        let invalid = ProxyError::from(AuthError::Invalid);
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(missing.body(), invalid.body());
        assert_eq!(missing.headers().get(WWW_AUTHENTICATE).unwrap(), "Bearer");
    }

    #[test]
    fn upstream_error_carries_cause() {
        let err = ProxyError::UpstreamUnreachable("connection refused".to_string());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_slice(&err.body()).unwrap();
        assert_eq!(
            body["detail"],
            "Error connecting to backend server: connection refused"
        );
        assert!(err.headers().get(WWW_AUTHENTICATE).is_none());
    }
}

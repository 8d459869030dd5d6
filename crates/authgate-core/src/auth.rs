use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use http::HeaderMap;
use http::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{error, warn};

/// Tracing target for credential audit records.
pub const AUDIT_TARGET: &str = "authgate::audit";

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    Missing,
    #[error("unknown bearer token")]
    Invalid,
    /// The lookup itself did not complete. Treated like any other rejection.
    #[error("credential lookup failed")]
    Unavailable,
}

/// Source of the authorized bearer tokens.
///
/// Implementations are consulted on every request, so a change to the
/// underlying source takes effect on the next call.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> HashSet<String>;

    fn is_valid(&self, token: &str) -> bool {
        !token.is_empty() && self.load().contains(token)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KeyFileError {
    #[error("keys file {} not found", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read keys file {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to parse keys file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct KeyFile {
    #[serde(default)]
    keys: Vec<JsonValue>,
}

/// Reads `{"keys": ["..."]}` from disk on every lookup.
#[derive(Debug, Clone)]
pub struct KeyFileStore {
    path: PathBuf,
}

impl KeyFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<HashSet<String>, KeyFileError> {
        let raw = std::fs::read(&self.path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                KeyFileError::NotFound(self.path.clone())
            } else {
                KeyFileError::Io {
                    path: self.path.clone(),
                    source,
                }
            }
        })?;
        let file: KeyFile = serde_json::from_slice(&raw).map_err(|source| KeyFileError::Parse {
            path: self.path.clone(),
            source,
        })?;
        // Non-string entries can never match a header value.
        Ok(file
            .keys
            .into_iter()
            .filter_map(|key| match key {
                JsonValue::String(key) => Some(key),
                _ => None,
            })
            .collect())
    }
}

impl CredentialStore for KeyFileStore {
    fn load(&self) -> HashSet<String> {
        match self.read() {
            Ok(keys) => keys,
            Err(err) => {
                error!(event = "keys_file_unavailable", path = %self.path.display(), error = %err);
                HashSet::new()
            }
        }
    }
}

/// In-process key set that can be swapped at runtime.
#[derive(Debug)]
pub struct MemoryCredentialStore {
    keys: ArcSwap<HashSet<String>>,
}

impl MemoryCredentialStore {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: ArcSwap::from_pointee(keys.into_iter().map(Into::into).collect()),
        }
    }

    pub fn replace_keys<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys
            .store(Arc::new(keys.into_iter().map(Into::into).collect()));
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> HashSet<String> {
        self.keys.load().as_ref().clone()
    }

    fn is_valid(&self, token: &str) -> bool {
        !token.is_empty() && self.keys.load().contains(token)
    }
}

/// Token from `Authorization: Bearer <token>`.
///
/// The scheme prefix is matched exactly. Any other scheme, or an empty token,
/// counts as no token.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix(BEARER_PREFIX)?;
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

/// Check the request's bearer token against `store`.
///
/// Rejections are recorded on [`AUDIT_TARGET`]; an unknown token is logged
/// verbatim so operators can trace who is probing the proxy.
pub fn authenticate(store: &dyn CredentialStore, headers: &HeaderMap) -> Result<(), AuthError> {
    let Some(token) = extract_bearer_token(headers) else {
        warn!(target: AUDIT_TARGET, event = "auth_rejected", reason = "missing");
        return Err(AuthError::Missing);
    };
    if !store.is_valid(&token) {
        warn!(target: AUDIT_TARGET, event = "auth_rejected", reason = "invalid", token = %token);
        return Err(AuthError::Invalid);
    }
    Ok(())
}

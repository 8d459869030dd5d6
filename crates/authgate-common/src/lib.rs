use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:11434";
pub const DEFAULT_KEYS_FILE: &str = "keys.json";
pub const DEFAULT_CERT_DIR: &str = "certs";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("backend url must start with http:// or https://, got {0:?}")]
    InvalidBackendUrl(String),
    #[error("port must be non-zero")]
    InvalidPort,
}

/// Final configuration used by the running process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    /// Base URL of the inference server, without a trailing slash.
    pub backend_url: String,
    /// JSON file holding the authorized bearer tokens. Re-read on every request.
    pub keys_file: PathBuf,
    /// Directory searched for `server.crt` / `server.key`. `None` disables TLS.
    pub cert_dir: Option<PathBuf>,
}

impl ProxyConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Values collected from CLI/ENV. Unset fields fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub backend_url: Option<String>,
    pub keys_file: Option<PathBuf>,
    pub cert_dir: Option<PathBuf>,
    pub disable_tls: Option<bool>,
}

impl ProxyConfigPatch {
    pub fn into_config(self) -> Result<ProxyConfig, ConfigError> {
        let host = self
            .host
            .map(|host| host.trim().to_string())
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = self.port.unwrap_or(DEFAULT_PORT);
        if port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        let backend_url = normalize_backend_url(
            self.backend_url
                .as_deref()
                .unwrap_or(DEFAULT_BACKEND_URL),
        )?;
        let cert_dir = if self.disable_tls.unwrap_or(false) {
            None
        } else {
            Some(
                self.cert_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_CERT_DIR)),
            )
        };

        Ok(ProxyConfig {
            host,
            port,
            backend_url,
            keys_file: self
                .keys_file
                .unwrap_or_else(|| PathBuf::from(DEFAULT_KEYS_FILE)),
            cert_dir,
        })
    }
}

fn normalize_backend_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let lower = trimmed.to_ascii_lowercase();
    let has_host = lower
        .strip_prefix("http://")
        .or_else(|| lower.strip_prefix("https://"))
        .is_some_and(|rest| !rest.is_empty());
    if !has_host {
        return Err(ConfigError::InvalidBackendUrl(raw.to_string()));
    }
    Ok(trimmed.to_string())
}

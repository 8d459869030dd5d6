use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use authgate_common::{ProxyConfig, ProxyConfigPatch};

use crate::auth::KeyFileStore;
use crate::proxy_engine::ProxyEngine;
use crate::upstream_client::{UpstreamClientConfig, WreqUpstreamClient};

const KEYS_FILE_EXAMPLE: &str = r#"{"keys": ["sk-myapikey1234567890", "sk-testkey9876543210"]}"#;

#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "authgate",
    version,
    about = "Bearer-token gate and OpenAI chat adapter for a local Ollama server"
)]
pub struct CliArgs {
    /// Base URL of the inference backend.
    #[arg(long, env = "OLLAMA_HOST")]
    pub backend_url: Option<String>,

    /// JSON file with the authorized keys: {"keys": ["..."]}.
    #[arg(long, env = "KEYS_FILE")]
    pub keys_file: Option<String>,

    /// Bind host.
    #[arg(long, env = "AUTHGATE_HOST")]
    pub host: Option<String>,

    /// Bind port.
    #[arg(long, env = "AUTHGATE_PORT")]
    pub port: Option<String>,

    /// Directory holding server.crt and server.key.
    #[arg(long, env = "AUTHGATE_CERT_DIR")]
    pub cert_dir: Option<String>,

    /// Serve plain HTTP even when certificates are present.
    #[arg(long, env = "AUTHGATE_DISABLE_TLS")]
    pub disable_tls: Option<String>,
}

pub struct Bootstrap {
    pub config: ProxyConfig,
    pub engine: Arc<ProxyEngine>,
}

pub fn bootstrap_from_env() -> anyhow::Result<Bootstrap> {
    let args = CliArgs::parse();
    bootstrap(args)
}

pub fn bootstrap(args: CliArgs) -> anyhow::Result<Bootstrap> {
    let config = config_from_args(args)?;
    info!(
        host = %config.host,
        port = config.port,
        backend_url = %config.backend_url,
        keys_file = %config.keys_file.display(),
        cert_dir = %config.cert_dir.as_deref().map(|dir| dir.display().to_string()).unwrap_or_default(),
        "config loaded"
    );
    check_keys_file(&config);

    let client = WreqUpstreamClient::new(UpstreamClientConfig::default())
        .context("build upstream client")?;
    let store = KeyFileStore::new(config.keys_file.clone());
    let engine = ProxyEngine::new(
        Arc::new(store),
        Arc::new(client),
        config.backend_url.clone(),
    );

    Ok(Bootstrap {
        config,
        engine: Arc::new(engine),
    })
}

pub fn config_from_args(args: CliArgs) -> anyhow::Result<ProxyConfig> {
    let patch = ProxyConfigPatch {
        host: sanitize_optional_env_value(args.host),
        port: parse_u16_env_value(args.port, "AUTHGATE_PORT")?,
        backend_url: sanitize_optional_env_value(args.backend_url),
        keys_file: sanitize_optional_env_value(args.keys_file).map(PathBuf::from),
        cert_dir: sanitize_optional_env_value(args.cert_dir).map(PathBuf::from),
        disable_tls: parse_bool_env_value(args.disable_tls, "AUTHGATE_DISABLE_TLS")?,
    };
    patch.into_config().context("finalize proxy config")
}

/// The keys file is only read per request; a missing file is not fatal, every
/// request will simply be rejected until it appears.
fn check_keys_file(config: &ProxyConfig) {
    if config.keys_file.exists() {
        info!(path = %config.keys_file.display(), "using keys file");
    } else {
        warn!(
            path = %config.keys_file.display(),
            "keys file not found; all requests will be rejected until it is created"
        );
        info!(example = KEYS_FILE_EXAMPLE, "expected keys file format");
    }
}

fn sanitize_optional_env_value(value: Option<String>) -> Option<String> {
    let trimmed = value?.trim().to_string();
    if trimmed.is_empty() {
        return None;
    }
    // Some PaaS systems may inject unresolved placeholders like `${VAR}`.
    if trimmed.starts_with("${") && trimmed.ends_with('}') {
        return None;
    }
    Some(trimmed)
}

fn parse_u16_env_value(value: Option<String>, env_name: &str) -> anyhow::Result<Option<u16>> {
    let Some(raw) = sanitize_optional_env_value(value) else {
        return Ok(None);
    };
    let parsed = raw
        .parse::<u16>()
        .with_context(|| format!("invalid {env_name} value: {raw}"))?;
    Ok(Some(parsed))
}

fn parse_bool_env_value(value: Option<String>, env_name: &str) -> anyhow::Result<Option<bool>> {
    let Some(raw) = sanitize_optional_env_value(value) else {
        return Ok(None);
    };
    let parsed = match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => return Err(anyhow::anyhow!("invalid {env_name} value: {raw}")),
    };
    Ok(Some(parsed))
}

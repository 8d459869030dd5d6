use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum_server::tls_rustls::RustlsConfig;
use tokio::sync::oneshot;
use tracing::{info, warn};

use authgate_core::ProxyEngine;
use authgate_core::bootstrap::{Bootstrap, bootstrap_from_env};
use authgate_router::proxy_router;

mod tls;

use crate::tls::{CertDirProvider, CertificatePem, CertificateProvider};

/// How long open connections, streamed generations included, may keep the
/// process alive after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("authgate failed: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let Bootstrap { config, engine } = bootstrap_from_env()?;
    let bind = config.bind_addr();

    let certificate = match config.cert_dir.as_deref() {
        Some(dir) => {
            let provider = CertDirProvider::new(dir);
            let loaded = provider
                .load()
                .with_context(|| format!("read certificates from {}", provider.dir().display()))?;
            if loaded.is_none() {
                warn!(
                    cert = %provider.cert_path().display(),
                    key = %provider.key_path().display(),
                    "certificate pair not found; serving plain HTTP"
                );
            }
            loaded
        }
        None => {
            info!("TLS disabled");
            None
        }
    };

    let app = proxy_router(engine.clone());
    match certificate {
        Some(pem) => serve_https(app, &bind, pem).await?,
        None => serve_http(app, &bind).await?,
    }

    release_upstream(engine);
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("authgate=info,authgate_core=info,authgate_router=info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve_http(app: axum::Router, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(addr = %bind, scheme = "http", "listening");

    let (draining_tx, draining_rx) = oneshot::channel();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = draining_tx.send(());
        })
        .into_future();
    let drained = drain_within(server, draining_rx, SHUTDOWN_GRACE)
        .await
        .context("http server")?;
    if !drained {
        warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "connections still open after grace period; closing them"
        );
    }
    Ok(())
}

/// Run `server` to completion, but give up `grace` after `draining` fires.
///
/// Returns `false` when the deadline cut the drain short.
async fn drain_within<F>(
    server: F,
    draining: oneshot::Receiver<()>,
    grace: Duration,
) -> std::io::Result<bool>
where
    F: Future<Output = std::io::Result<()>>,
{
    let deadline = async move {
        if draining.await.is_err() {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(grace).await;
    };
    tokio::select! {
        result = server => result.map(|()| true),
        _ = deadline => Ok(false),
    }
}

async fn serve_https(app: axum::Router, bind: &str, pem: CertificatePem) -> anyhow::Result<()> {
    let addr = resolve_bind_addr(bind).await?;
    let rustls = RustlsConfig::from_pem(pem.cert, pem.key)
        .await
        .context("load TLS certificate")?;

    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    info!(addr = %addr, scheme = "https", "listening");
    axum_server::bind_rustls(addr, rustls)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .context("https server")?;
    Ok(())
}

async fn resolve_bind_addr(bind: &str) -> anyhow::Result<SocketAddr> {
    tokio::net::lookup_host(bind)
        .await
        .with_context(|| format!("resolve {bind}"))?
        .next()
        .with_context(|| format!("no address for {bind}"))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}

/// The router has been dropped by now; this is the last handle on the pool.
fn release_upstream(engine: Arc<ProxyEngine>) {
    drop(engine);
    info!(event = "upstream_pool_released", "upstream connection pool closed");
}
